//! C2 wrapper: gives the process-wide [`civitas_crypto::merkle::MerkleTree`]
//! a single-writer lock and a broadcast of new roots, per the ownership
//! design in spec §9 — the Registration Coordinator is the only writer
//! (during approve); the proof API and anything else interested in the
//! current root reads through a [`tokio::sync::watch`] receiver instead
//! of touching shared state directly.

use civitas_crypto::merkle::{InclusionProof, MerkleError, MerkleTree};
use civitas_types::{CoreError, CoreResult};
use tokio::sync::{watch, RwLock};

/// Published whenever the tree gains a new root. A variant type rather
/// than the bare root so future event kinds don't require touching
/// every subscriber's match arm.
#[derive(Clone, Copy, Debug)]
pub enum Update {
    NewRoot([u8; 32]),
}

pub struct TreeHandle {
    tree: RwLock<MerkleTree>,
    updates: watch::Sender<Update>,
}

impl TreeHandle {
    /// Build the tree by replaying stored leaves in order, as
    /// `Storage::open` loaded them.
    pub fn restore(depth: usize, leaves: &[[u8; 32]]) -> CoreResult<Self> {
        let mut tree = MerkleTree::new(depth);
        for leaf in leaves {
            tree.append(*leaf).map_err(map_merkle_error)?;
        }
        let (updates, _) = watch::channel(Update::NewRoot(tree.root()));
        Ok(Self {
            tree: RwLock::new(tree),
            updates,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Update> {
        self.updates.subscribe()
    }

    pub async fn root(&self) -> [u8; 32] {
        self.tree.read().await.root()
    }

    pub async fn leaf_count(&self) -> u64 {
        self.tree.read().await.len() as u64
    }

    pub async fn depth(&self) -> usize {
        self.tree.read().await.depth()
    }

    pub async fn inclusion_proof(&self, leaf_index: u64) -> CoreResult<InclusionProof> {
        self.tree
            .read()
            .await
            .inclusion_proof(leaf_index)
            .map_err(map_merkle_error)
    }

    /// Append a leaf under the exclusive writer lock and publish the
    /// new root. The only call site is the Registration Coordinator's
    /// approve step.
    pub async fn append(&self, leaf: [u8; 32]) -> CoreResult<(u64, [u8; 32])> {
        let mut tree = self.tree.write().await;
        let leaf_index = tree.append(leaf).map_err(map_merkle_error)?;
        let root = tree.root();
        drop(tree);
        let _ = self.updates.send(Update::NewRoot(root));
        Ok((leaf_index, root))
    }
}

fn map_merkle_error(e: MerkleError) -> CoreError {
    match e {
        MerkleError::TreeFull(_) => CoreError::TreeFull,
        MerkleError::UnknownLeaf(_) => CoreError::UnknownCommitment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn restore_replays_leaves_into_the_same_root() {
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
        let mut reference = MerkleTree::new(10);
        for leaf in &leaves {
            reference.append(*leaf).unwrap();
        }
        let handle = TreeHandle::restore(10, &leaves).unwrap();
        assert_eq!(handle.root().await, reference.root());
        assert_eq!(handle.leaf_count().await, 3);
    }

    #[tokio::test]
    async fn append_publishes_new_root() {
        let handle = TreeHandle::restore(10, &[]).unwrap();
        let mut rx = handle.subscribe();
        let (leaf_index, root) = handle.append([7u8; 32]).await.unwrap();
        assert_eq!(leaf_index, 0);
        rx.changed().await.unwrap();
        match *rx.borrow() {
            Update::NewRoot(published) => assert_eq!(published, root),
        }
    }
}
