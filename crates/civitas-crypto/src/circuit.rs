//! Groth16 circuit for identity proofs — carried for **test/dev key
//! generation only**. Production verification never synthesizes or
//! proves this circuit; it only loads an externally supplied
//! verification key (spec's non-goal: "the core does not generate
//! proofs... it does not implement the circuit or the verification
//! key — both are inputs"). This module lets the test suite produce a
//! matching `(pk, vk)` pair locally without a real trusted setup.
//!
//! Public signals, in spec order: `root, nullifierHash, signalHash,
//! externalNullifier`. Witnesses: `nullifier, trapdoor, leafIndex,
//! merklePath`.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    select::CondSelectGadget,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_snark::SNARK;
use ark_std::rand::thread_rng;

fn poseidon_hash2_gadget(
    left: &FpVar<Fr>,
    right: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let config = crate::poseidon::config();
    let mut state = vec![FpVar::constant(Fr::from(0u64)), left.clone(), right.clone()];
    let half_full = config.full_rounds / 2;

    let sbox = |s: &mut FpVar<Fr>| -> Result<(), SynthesisError> {
        let s2 = s.clone() * s.clone();
        let s4 = s2.clone() * &s2;
        *s = s4 * s.clone();
        Ok(())
    };

    let mds_apply = |state: &[FpVar<Fr>]| -> Vec<FpVar<Fr>> {
        config
            .mds
            .iter()
            .map(|row| {
                let mut acc = FpVar::constant(Fr::from(0u64));
                for (coeff, s) in row.iter().zip(state.iter()) {
                    acc = acc + FpVar::constant(*coeff) * s;
                }
                acc
            })
            .collect()
    };

    for round in 0..(config.full_rounds + config.partial_rounds) {
        for (i, s) in state.iter_mut().enumerate() {
            *s = s.clone() + FpVar::constant(config.ark[round][i]);
        }
        if round < half_full || round >= half_full + config.partial_rounds {
            for s in state.iter_mut() {
                sbox(s)?;
            }
        } else {
            sbox(&mut state[0])?;
        }
        state = mds_apply(&state);
    }

    Ok(state[1].clone())
}

/// Identity circuit over a Merkle tree of runtime-chosen depth (the
/// number of witnessed path siblings).
#[derive(Clone)]
pub struct IdentityCircuit {
    pub nullifier: Option<Fr>,
    pub trapdoor: Option<Fr>,
    pub leaf_index: Option<u64>,
    pub merkle_path: Option<Vec<Fr>>,
    pub root: Option<Fr>,
    pub nullifier_hash: Option<Fr>,
    pub signal_hash: Option<Fr>,
    pub external_nullifier: Option<Fr>,
}

impl IdentityCircuit {
    pub fn empty(depth: usize) -> Self {
        Self {
            nullifier: None,
            trapdoor: None,
            leaf_index: None,
            merkle_path: Some(vec![Fr::from(0u64); depth]),
            root: None,
            nullifier_hash: None,
            signal_hash: None,
            external_nullifier: None,
        }
    }
}

impl ConstraintSynthesizer<Fr> for IdentityCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let nullifier_var = FpVar::new_witness(cs.clone(), || {
            self.nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let trapdoor_var = FpVar::new_witness(cs.clone(), || {
            self.trapdoor.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let path = self
            .merkle_path
            .clone()
            .ok_or(SynthesisError::AssignmentMissing)?;
        let mut path_vars = Vec::with_capacity(path.len());
        for sibling in &path {
            path_vars.push(FpVar::new_witness(cs.clone(), || Ok(*sibling))?);
        }

        let root_var = FpVar::new_input(cs.clone(), || {
            self.root.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier_hash_var = FpVar::new_input(cs.clone(), || {
            self.nullifier_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let _signal_hash_var = FpVar::new_input(cs.clone(), || {
            self.signal_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let external_nullifier_var = FpVar::new_input(cs.clone(), || {
            self.external_nullifier
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        // commitment = Poseidon2(nullifier, trapdoor)
        let mut current = poseidon_hash2_gadget(&nullifier_var, &trapdoor_var)?;

        let mut index = self.leaf_index.unwrap_or(0);
        for sibling_var in &path_vars {
            let is_right = Boolean::constant(index & 1 == 1);
            let left = FpVar::conditionally_select(&is_right, sibling_var, &current)?;
            let right = FpVar::conditionally_select(&is_right, &current, sibling_var)?;
            current = poseidon_hash2_gadget(&left, &right)?;
            index >>= 1;
        }
        current.enforce_equal(&root_var)?;

        // nullifierHash = Poseidon2(nullifier, externalNullifier)
        let computed_hash = poseidon_hash2_gadget(&nullifier_var, &external_nullifier_var)?;
        computed_hash.enforce_equal(&nullifier_hash_var)?;

        Ok(())
    }
}

/// Run a circuit-specific trusted setup for the given tree depth.
/// **Test/dev only** — production deployments load an externally
/// generated verification key.
pub fn dev_setup(depth: usize) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), SynthesisError> {
    let mut rng = thread_rng();
    let circuit = IdentityCircuit::empty(depth);
    Groth16::<Bn254>::circuit_specific_setup(circuit, &mut rng).map_err(|_| SynthesisError::Unsatisfiable)
}
