//! C1: durable, crash-safe on-disk state for tree leaves, citizens,
//! requests, and nullifier entries.
//!
//! Each entity is its own log-structured file under `data_dir`:
//! `tree.log` (+ `tree.snapshot` sidecar), `citizens.log`,
//! `requests.log`, `nullifiers.log`. Records are length-prefixed and
//! checksummed ([`log`]); a corrupt or truncated tail is discarded at
//! load rather than treated as fatal. Cross-entity commits (leaf +
//! citizen + request, for one approval) go through [`Storage::commit_approval`],
//! the single transaction queue mentioned in the concurrency model —
//! a crash between the leaf append and the citizen append leaves an
//! orphaned leaf, which `open` trims away on the next load.

mod log;
mod records;

use civitas_types::{CitizenRecord, CoreError, CoreResult, NullifierKey, RequestRecord};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

const TREE_LOG: &str = "tree.log";
const TREE_SNAPSHOT: &str = "tree.snapshot";
const CITIZENS_LOG: &str = "citizens.log";
const REQUESTS_LOG: &str = "requests.log";
const NULLIFIERS_LOG: &str = "nullifiers.log";

fn load_with_recovery(path: &Path) -> CoreResult<Vec<Vec<u8>>> {
    let (records, corrupt_at) =
        log::read_all(path).map_err(|e| CoreError::IoError(format!("{}: {e}", path.display())))?;
    if let Some(offset) = corrupt_at {
        tracing::warn!(
            path = %path.display(),
            offset,
            "discarding truncated or corrupt tail of log file"
        );
        log::truncate_to(path, offset)
            .map_err(|e| CoreError::IoError(format!("{}: {e}", path.display())))?;
    }
    Ok(records)
}

struct RequestIndices {
    by_user: HashMap<String, Uuid>,
    by_attestation_nullifier: HashMap<[u8; 32], Uuid>,
}

impl RequestIndices {
    fn rebuild(requests: &HashMap<Uuid, RequestRecord>) -> Self {
        let mut by_user = HashMap::new();
        let mut by_attestation_nullifier = HashMap::new();
        for request in requests.values() {
            by_user.insert(request.user_account().to_string(), request.id());
            if let RequestRecord::Approved { .. } = request {
                by_attestation_nullifier
                    .insert(request.attestation().attestation_nullifier, request.id());
            }
        }
        Self {
            by_user,
            by_attestation_nullifier,
        }
    }
}

/// Durable state for all four entities, handed to callers at startup
/// so they can build the in-memory structures (Merkle tree, nullifier
/// shards) that mirror it.
pub struct Storage {
    #[allow(dead_code)]
    data_dir: PathBuf,
    commit_lock: Mutex<()>,

    tree_file: Mutex<File>,
    citizens_file: Mutex<File>,
    requests_file: Mutex<File>,
    nullifiers_file: Mutex<File>,

    leaves: RwLock<Vec<[u8; 32]>>,
    commitment_index: RwLock<HashMap<[u8; 32], u64>>,
    citizens: RwLock<Vec<CitizenRecord>>,
    requests: RwLock<HashMap<Uuid, RequestRecord>>,
    indices: RwLock<RequestIndices>,
    nullifiers: RwLock<HashMap<NullifierKey, i64>>,
}

impl Storage {
    /// Open (creating if absent) the log files under `data_dir` and
    /// replay them into memory, discarding any corrupt tail.
    pub async fn open(data_dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| CoreError::IoError(format!("creating data dir: {e}")))?;

        // Tree: snapshot gives a base prefix of leaves; the log holds
        // appends since the last snapshot.
        let snapshot_path = data_dir.join(TREE_SNAPSHOT);
        let mut leaves = if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path)
                .map_err(|e| CoreError::IoError(format!("reading tree.snapshot: {e}")))?;
            let (_, leaves) = records::decode_tree_snapshot(&bytes)?;
            leaves
        } else {
            Vec::new()
        };

        let tree_log_path = data_dir.join(TREE_LOG);
        for payload in load_with_recovery(&tree_log_path)? {
            leaves.push(records::decode_tree_leaf(&payload)?);
        }

        let citizens_log_path = data_dir.join(CITIZENS_LOG);
        let mut citizens = Vec::new();
        for payload in load_with_recovery(&citizens_log_path)? {
            citizens.push(records::decode_citizen(&payload)?);
        }

        // A leaf appended without a matching citizen record means the
        // process crashed between the two writes of one logical
        // commit; drop the orphan (spec §4.4 failure semantics).
        if leaves.len() > citizens.len() {
            tracing::warn!(
                orphaned = leaves.len() - citizens.len(),
                "trimming uncommitted tree leaves with no citizen record"
            );
            leaves.truncate(citizens.len());
        }

        let mut commitment_index = HashMap::with_capacity(leaves.len());
        for (i, leaf) in leaves.iter().enumerate() {
            commitment_index.insert(*leaf, i as u64);
        }

        let requests_log_path = data_dir.join(REQUESTS_LOG);
        let mut requests = HashMap::new();
        for payload in load_with_recovery(&requests_log_path)? {
            let request = records::decode_request(&payload)?;
            requests.insert(request.id(), request);
        }
        let indices = RequestIndices::rebuild(&requests);

        let nullifiers_log_path = data_dir.join(NULLIFIERS_LOG);
        let mut nullifiers = HashMap::new();
        for payload in load_with_recovery(&nullifiers_log_path)? {
            let (key, first_seen_at) = records::decode_nullifier(&payload)?;
            nullifiers.entry(key).or_insert(first_seen_at);
        }

        let mut tree_file = log::open_append(&tree_log_path)
            .map_err(|e| CoreError::IoError(format!("opening tree.log: {e}")))?;
        log::seek_to_end(&mut tree_file).ok();
        let mut citizens_file = log::open_append(&citizens_log_path)
            .map_err(|e| CoreError::IoError(format!("opening citizens.log: {e}")))?;
        log::seek_to_end(&mut citizens_file).ok();
        let mut requests_file = log::open_append(&requests_log_path)
            .map_err(|e| CoreError::IoError(format!("opening requests.log: {e}")))?;
        log::seek_to_end(&mut requests_file).ok();
        let mut nullifiers_file = log::open_append(&nullifiers_log_path)
            .map_err(|e| CoreError::IoError(format!("opening nullifiers.log: {e}")))?;
        log::seek_to_end(&mut nullifiers_file).ok();

        Ok(Self {
            data_dir,
            commit_lock: Mutex::new(()),
            tree_file: Mutex::new(tree_file),
            citizens_file: Mutex::new(citizens_file),
            requests_file: Mutex::new(requests_file),
            nullifiers_file: Mutex::new(nullifiers_file),
            leaves: RwLock::new(leaves),
            commitment_index: RwLock::new(commitment_index),
            citizens: RwLock::new(citizens),
            requests: RwLock::new(requests),
            indices: RwLock::new(indices),
            nullifiers: RwLock::new(nullifiers),
        })
    }

    pub async fn leaves(&self) -> Vec<[u8; 32]> {
        self.leaves.read().await.clone()
    }

    pub async fn citizens(&self) -> Vec<CitizenRecord> {
        self.citizens.read().await.clone()
    }

    pub async fn requests(&self) -> Vec<RequestRecord> {
        self.requests.read().await.values().cloned().collect()
    }

    pub async fn nullifier_entries(&self) -> Vec<(NullifierKey, i64)> {
        self.nullifiers
            .read()
            .await
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect()
    }

    pub async fn leaf_index_of(&self, commitment: &[u8; 32]) -> Option<u64> {
        self.commitment_index.read().await.get(commitment).copied()
    }

    pub async fn request_by_id(&self, id: Uuid) -> Option<RequestRecord> {
        self.requests.read().await.get(&id).cloned()
    }

    pub async fn request_by_user(&self, user_account: &str) -> Option<RequestRecord> {
        let id = *self.indices.read().await.by_user.get(user_account)?;
        self.requests.read().await.get(&id).cloned()
    }

    pub async fn approved_request_for_attestation(
        &self,
        attestation_nullifier: &[u8; 32],
    ) -> Option<RequestRecord> {
        let id = *self
            .indices
            .read()
            .await
            .by_attestation_nullifier
            .get(attestation_nullifier)?;
        self.requests.read().await.get(&id).cloned()
    }

    /// Insert or replace a request by id. Rejects mutation of an
    /// already-terminal stored request (spec §4.1's `putRequest`
    /// contract).
    pub async fn put_request(&self, request: RequestRecord) -> CoreResult<()> {
        let mut requests = self.requests.write().await;
        if let Some(existing) = requests.get(&request.id()) {
            if existing.is_terminal() {
                return Err(CoreError::Internal(
                    "attempted to mutate a terminal request".into(),
                ));
            }
        }

        let payload = records::encode_request(&request)?;
        {
            let mut file = self.requests_file.lock().unwrap();
            log::append_record(&mut file, &payload)
                .map_err(|e| CoreError::IoError(format!("appending requests.log: {e}")))?;
        }

        let mut indices = self.indices.write().await;
        indices.by_user.insert(request.user_account().to_string(), request.id());
        if let RequestRecord::Approved { .. } = &request {
            indices
                .by_attestation_nullifier
                .insert(request.attestation().attestation_nullifier, request.id());
        }
        requests.insert(request.id(), request);
        Ok(())
    }

    /// The combined transaction for an approval: append the leaf,
    /// persist the citizen record, and update the request — in that
    /// order, so a crash between steps leaves at most an orphaned leaf
    /// (trimmed at the next `open`), never a citizen or approved
    /// request record with no backing leaf.
    pub async fn commit_approval(
        &self,
        commitment: [u8; 32],
        citizen: CitizenRecord,
        approved_request: RequestRecord,
    ) -> CoreResult<u64> {
        let _guard = self.commit_lock.lock().unwrap();

        {
            let index = self.commitment_index.read().await;
            if index.contains_key(&commitment) {
                return Err(CoreError::DuplicateCommitment);
            }
        }

        let leaf_index = {
            let mut leaves = self.leaves.write().await;
            let index = leaves.len() as u64;
            {
                let mut file = self.tree_file.lock().unwrap();
                log::append_record(&mut file, &records::encode_tree_leaf(&commitment))
                    .map_err(|e| CoreError::IoError(format!("appending tree.log: {e}")))?;
            }
            leaves.push(commitment);
            self.commitment_index.write().await.insert(commitment, index);
            index
        };

        {
            let mut file = self.citizens_file.lock().unwrap();
            log::append_record(&mut file, &records::encode_citizen(&citizen))
                .map_err(|e| CoreError::IoError(format!("appending citizens.log: {e}")))?;
        }
        self.citizens.write().await.push(citizen);

        self.put_request(approved_request).await?;
        Ok(leaf_index)
    }

    /// Record a `(scope, nullifierHash)` pair. Fails with
    /// `NullifierReused` if already present — the durability half of
    /// C6's single-use guarantee; the in-process linearisation is
    /// [`crate::nullifier::NullifierBook`]'s sharded lock.
    pub async fn record_nullifier(&self, key: NullifierKey, first_seen_at: i64) -> CoreResult<()> {
        {
            let nullifiers = self.nullifiers.read().await;
            if nullifiers.contains_key(&key) {
                return Err(CoreError::NullifierReused);
            }
        }
        {
            let mut file = self.nullifiers_file.lock().unwrap();
            log::append_record(&mut file, &records::encode_nullifier(&key, first_seen_at))
                .map_err(|e| CoreError::IoError(format!("appending nullifiers.log: {e}")))?;
        }
        self.nullifiers.write().await.insert(key, first_seen_at);
        Ok(())
    }

    /// Fsync the tree's current state into a fresh `tree.snapshot` and
    /// truncate `tree.log`, so the next `open` replays a shorter log.
    /// Crash-recovery always finds either the old snapshot+log or the
    /// new snapshot with an empty log, never a half-written one.
    pub async fn snapshot(&self, depth: usize) -> CoreResult<()> {
        let leaves = self.leaves.read().await.clone();
        let bytes = records::encode_tree_snapshot(depth, &leaves);
        let snapshot_path = self.data_dir.join(TREE_SNAPSHOT);
        log::write_atomic(&snapshot_path, &bytes)
            .map_err(|e| CoreError::IoError(format!("writing tree.snapshot: {e}")))?;

        let tree_log_path = self.data_dir.join(TREE_LOG);
        let mut file = self.tree_file.lock().unwrap();
        *file = log::open_append(&tree_log_path)
            .map_err(|e| CoreError::IoError(format!("reopening tree.log: {e}")))?;
        file.set_len(0)
            .map_err(|e| CoreError::IoError(format!("truncating tree.log: {e}")))?;
        log::seek_to_end(&mut file).ok();
        Ok(())
    }
}
