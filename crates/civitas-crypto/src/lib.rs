#![forbid(unsafe_code)]

pub mod circuit;
pub mod groth16;
pub mod identity;
pub mod merkle;
pub mod poseidon;
pub mod seal;
pub mod signer;

pub use identity::Identity;
pub use merkle::{InclusionProof, MerkleError, MerkleTree, PathNode};
