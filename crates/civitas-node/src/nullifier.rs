//! C6: records `(scope, nullifierHash)` pairs and enforces single use.
//!
//! Generalises the bounded, single-locked nullifier set pattern (one
//! `HashSet` behind one mutex) into a sharded lock keyed by
//! `nullifierHash`, per spec §5: "exclusive per-entry via a sharded
//! lock... The check-then-record must occur inside the same critical
//! section". Unlike a bounded/evicting set, this book is permanent and
//! persisted — there is no capacity limit or FIFO eviction, because
//! the invariant it protects (I4) must hold for the service's entire
//! lifetime, not just a recent window.

use crate::storage::Storage;
use civitas_types::{CoreError, CoreResult, NullifierKey};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

const SHARD_COUNT: usize = 64;

pub struct NullifierBook {
    shards: Vec<Mutex<HashMap<NullifierKey, i64>>>,
    storage: Arc<Storage>,
}

impl NullifierBook {
    /// Build the book from storage's replayed entries, bucketing each
    /// into its shard.
    pub fn restore(storage: Arc<Storage>, entries: Vec<(NullifierKey, i64)>) -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(HashMap::new()));
        }
        let book = Self { shards, storage };
        for (key, first_seen_at) in entries {
            let idx = Self::shard_index(&key);
            book.shards[idx]
                .try_lock()
                .expect("uncontended during restore")
                .insert(key, first_seen_at);
        }
        book
    }

    fn shard_index(key: &NullifierKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }

    pub async fn is_used(&self, key: &NullifierKey) -> bool {
        let idx = Self::shard_index(key);
        self.shards[idx].lock().await.contains_key(key)
    }

    /// The only mutating operation (spec §4.6). Holds the shard's lock
    /// across the durability write so the in-memory check and the
    /// persisted record cannot be split by a concurrent caller with
    /// the same key — this is what makes P3/S6 (no double-spend) hold.
    pub async fn record_once(&self, key: NullifierKey, now: i64) -> CoreResult<()> {
        let idx = Self::shard_index(&key);
        let mut shard = self.shards[idx].lock().await;
        if shard.contains_key(&key) {
            return Err(CoreError::NullifierReused);
        }
        self.storage.record_nullifier(key, now).await?;
        shard.insert(key, now);
        Ok(())
    }
}
