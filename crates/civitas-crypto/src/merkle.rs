//! Incremental Poseidon Merkle tree.
//!
//! Unlike a full-recompute tree, appends touch only the `O(depth)`
//! frontier nodes on the path from the new leaf to the root. Empty
//! subtrees of height `h` hash to `zero[h]`, with `zero[0] = 0` (not
//! `H(0)`) so an empty tree's root is computable without ever hashing.

use crate::poseidon::{bytes_to_fr, fr_to_bytes, hash2_fields};
use ark_bn254::Fr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MerkleError {
    #[error("tree is at capacity for depth {0}")]
    TreeFull(usize),
    #[error("leaf index {0} is out of range")]
    UnknownLeaf(u64),
}

/// One sibling on an inclusion path, tagged with which side it sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathNode {
    pub sibling: [u8; 32],
    pub sibling_is_left: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InclusionProof {
    pub leaf_index: u64,
    pub path: Vec<PathNode>,
}

/// Append-only Poseidon Merkle tree with an `O(depth)`-update frontier.
///
/// `leaves` retains every inserted leaf so historical inclusion proofs
/// can be recomputed by replay; the frontier exists purely to make
/// `root()` and `append()` cheap on the hot path.
pub struct MerkleTree {
    depth: usize,
    leaves: Vec<Fr>,
    /// frontier[h] is the left sibling carried at height h, valid only
    /// while the subtree it roots is not yet complete.
    frontier: Vec<Fr>,
    zero: Vec<Fr>,
    root: Fr,
}

impl MerkleTree {
    pub fn new(depth: usize) -> Self {
        let mut zero = Vec::with_capacity(depth + 1);
        zero.push(Fr::from(0u64));
        for h in 0..depth {
            zero.push(hash2_fields(zero[h], zero[h]));
        }
        let root = zero[depth];
        Self {
            depth,
            leaves: Vec::new(),
            frontier: vec![Fr::from(0u64); depth],
            zero,
            root,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn root(&self) -> [u8; 32] {
        fr_to_bytes(&self.root)
    }

    pub fn root_field(&self) -> Fr {
        self.root
    }

    /// Append a leaf, returning its index. `O(depth)`.
    pub fn append(&mut self, leaf: [u8; 32]) -> Result<u64, MerkleError> {
        self.append_field(bytes_to_fr(&leaf))
    }

    pub fn append_field(&mut self, leaf: Fr) -> Result<u64, MerkleError> {
        let index = self.leaves.len() as u64;
        if index >= self.capacity() {
            return Err(MerkleError::TreeFull(self.depth));
        }

        let mut current = leaf;
        let mut pos = index;
        for h in 0..self.depth {
            if pos & 1 == 0 {
                // current becomes the left sibling carried upward until its
                // pair arrives.
                self.frontier[h] = current;
                current = hash2_fields(current, self.zero[h]);
            } else {
                current = hash2_fields(self.frontier[h], current);
            }
            pos >>= 1;
        }

        self.root = current;
        self.leaves.push(leaf);
        Ok(index)
    }

    /// Recompute the inclusion proof for `leaf_index` by replaying all
    /// stored leaves. `O(n)`; used for historical proof requests, not
    /// the append hot path.
    pub fn inclusion_proof(&self, leaf_index: u64) -> Result<InclusionProof, MerkleError> {
        let idx = leaf_index as usize;
        if idx >= self.leaves.len() {
            return Err(MerkleError::UnknownLeaf(leaf_index));
        }

        let target_len = self.capacity() as usize;
        let mut level = self.leaves.clone();
        level.resize(target_len, self.zero[0]);

        let mut path = Vec::with_capacity(self.depth);
        let mut pos = idx;
        for h in 0..self.depth {
            let sibling_pos = pos ^ 1;
            let sibling = level[sibling_pos];
            path.push(PathNode {
                sibling: fr_to_bytes(&sibling),
                sibling_is_left: pos & 1 == 1,
            });

            let mut next = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                next.push(hash2_fields(pair[0], pair[1]));
            }
            level = next;
            pos >>= 1;
        }

        Ok(InclusionProof {
            leaf_index,
            path,
        })
    }

    pub fn verify_proof(leaf: &[u8; 32], proof: &InclusionProof, root: &[u8; 32]) -> bool {
        let mut current = bytes_to_fr(leaf);
        for node in &proof.path {
            let sibling = bytes_to_fr(&node.sibling);
            current = if node.sibling_is_left {
                hash2_fields(sibling, current)
            } else {
                hash2_fields(current, sibling)
            };
        }
        fr_to_bytes(&current) == *root
    }
}
