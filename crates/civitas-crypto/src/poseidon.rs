//! Poseidon2 hash over the BN254 scalar field.
//!
//! Single canonical configuration shared by the Merkle engine, identity
//! commitment, and the in-circuit gadget in [`crate::circuit`]. Width 3
//! (rate 2, capacity 1), arkworks' standard Grain LFSR round constants.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

pub fn config() -> &'static PoseidonConfig<Fr> {
    CONFIG.get_or_init(|| {
        let rate = 2;
        let full_rounds = 8;
        let partial_rounds = 57;
        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(254, rate, full_rounds, partial_rounds, 0);
        PoseidonConfig {
            full_rounds: full_rounds as usize,
            partial_rounds: partial_rounds as usize,
            alpha: 5,
            ark,
            mds,
            rate,
            capacity: 1,
        }
    })
}

fn hash_fields(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(config());
    for input in inputs {
        sponge.absorb(input);
    }
    sponge.squeeze_field_elements::<Fr>(1)[0]
}

pub fn hash2_fields(left: Fr, right: Fr) -> Fr {
    hash_fields(&[left, right])
}

pub fn hash3_fields(a: Fr, b: Fr, c: Fr) -> Fr {
    hash_fields(&[a, b, c])
}

pub fn fr_to_bytes(f: &Fr) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    f.serialize_compressed(&mut bytes[..]).expect("Fr is always 32 bytes compressed");
    bytes
}

pub fn bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Hash two 32-byte field elements. The tree's inner-node operation.
pub fn hash2(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    fr_to_bytes(&hash2_fields(bytes_to_fr(left), bytes_to_fr(right)))
}

/// Hash three 32-byte field elements. Used for nullifier derivation.
pub fn hash3(a: &[u8; 32], b: &[u8; 32], c: &[u8; 32]) -> [u8; 32] {
    fr_to_bytes(&hash3_fields(bytes_to_fr(a), bytes_to_fr(b), bytes_to_fr(c)))
}
