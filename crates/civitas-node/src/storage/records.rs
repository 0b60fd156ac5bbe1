//! Wire layout for each entity's log records (spec §6). All multi-byte
//! integers are little-endian; strings are length-prefixed `u16` byte
//! counts over UTF-8.

use civitas_types::{CitizenRecord, CoreError, NullifierKey, RequestRecord};

const TREE_RECORD_VERSION: u8 = 1;

pub fn encode_tree_leaf(commitment: &[u8; 32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(33);
    buf.push(TREE_RECORD_VERSION);
    buf.extend_from_slice(commitment);
    buf
}

pub fn decode_tree_leaf(payload: &[u8]) -> Result<[u8; 32], CoreError> {
    if payload.len() != 33 {
        return Err(CoreError::BadEncoding("tree.log record must be 33 bytes".into()));
    }
    if payload[0] != TREE_RECORD_VERSION {
        return Err(CoreError::BadEncoding(format!(
            "unsupported tree.log record version {}",
            payload[0]
        )));
    }
    let mut commitment = [0u8; 32];
    commitment.copy_from_slice(&payload[1..33]);
    Ok(commitment)
}

const SNAPSHOT_VERSION: u8 = 1;

pub fn encode_tree_snapshot(depth: usize, leaves: &[[u8; 32]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + 4 + leaves.len() * 32);
    buf.push(SNAPSHOT_VERSION);
    buf.push(depth as u8);
    buf.extend_from_slice(&(leaves.len() as u32).to_le_bytes());
    for leaf in leaves {
        buf.extend_from_slice(leaf);
    }
    buf
}

pub fn decode_tree_snapshot(bytes: &[u8]) -> Result<(usize, Vec<[u8; 32]>), CoreError> {
    if bytes.len() < 6 {
        return Err(CoreError::BadEncoding("tree.snapshot too short".into()));
    }
    if bytes[0] != SNAPSHOT_VERSION {
        return Err(CoreError::BadEncoding(format!(
            "unsupported tree.snapshot version {}",
            bytes[0]
        )));
    }
    let depth = bytes[1] as usize;
    let count = u32::from_le_bytes(bytes[2..6].try_into().unwrap()) as usize;
    let expected_len = 6 + count * 32;
    if bytes.len() != expected_len {
        return Err(CoreError::BadEncoding("tree.snapshot length mismatch".into()));
    }
    let mut leaves = Vec::with_capacity(count);
    for i in 0..count {
        let start = 6 + i * 32;
        let mut leaf = [0u8; 32];
        leaf.copy_from_slice(&bytes[start..start + 32]);
        leaves.push(leaf);
    }
    Ok((depth, leaves))
}

pub fn encode_citizen(record: &CitizenRecord) -> Vec<u8> {
    let user_bytes = record.user_account.as_bytes();
    let tx_bytes = record.onchain_tx_id.as_deref().unwrap_or("").as_bytes();
    let mut buf = Vec::with_capacity(32 + 8 + 2 + user_bytes.len() + 32 + 8 + 1 + 2 + tx_bytes.len());
    buf.extend_from_slice(&record.commitment);
    buf.extend_from_slice(&record.leaf_index.to_le_bytes());
    buf.extend_from_slice(&(user_bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(user_bytes);
    buf.extend_from_slice(&record.attestation_fingerprint);
    buf.extend_from_slice(&record.timestamp.to_le_bytes());
    buf.push(if record.onchain_tx_id.is_some() { 1 } else { 0 });
    buf.extend_from_slice(&(tx_bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(tx_bytes);
    buf
}

pub fn decode_citizen(payload: &[u8]) -> Result<CitizenRecord, CoreError> {
    let bad = || CoreError::BadEncoding("malformed citizens.log record".into());
    let mut pos = 0usize;
    let read = |pos: &mut usize, n: usize| -> Result<std::ops::Range<usize>, CoreError> {
        if *pos + n > payload.len() {
            return Err(bad());
        }
        let r = *pos..*pos + n;
        *pos += n;
        Ok(r)
    };

    let mut commitment = [0u8; 32];
    commitment.copy_from_slice(&payload[read(&mut pos, 32)?]);
    let leaf_index = u64::from_le_bytes(payload[read(&mut pos, 8)?].try_into().unwrap());
    let user_len = u16::from_le_bytes(payload[read(&mut pos, 2)?].try_into().unwrap()) as usize;
    let user_account = String::from_utf8(payload[read(&mut pos, user_len)?].to_vec())
        .map_err(|_| bad())?;
    let mut attestation_fingerprint = [0u8; 32];
    attestation_fingerprint.copy_from_slice(&payload[read(&mut pos, 32)?]);
    let timestamp = i64::from_le_bytes(payload[read(&mut pos, 8)?].try_into().unwrap());
    let has_tx = payload[read(&mut pos, 1)?][0] == 1;
    let tx_len = u16::from_le_bytes(payload[read(&mut pos, 2)?].try_into().unwrap()) as usize;
    let tx_bytes = payload[read(&mut pos, tx_len)?].to_vec();
    let onchain_tx_id = if has_tx {
        Some(String::from_utf8(tx_bytes).map_err(|_| bad())?)
    } else {
        None
    };

    Ok(CitizenRecord {
        commitment,
        leaf_index,
        user_account,
        attestation_fingerprint,
        timestamp,
        onchain_tx_id,
    })
}

/// Requests are self-describing JSON over the internally-tagged
/// `RequestRecord` enum (`#[serde(tag = "status")]`) — the format
/// easily accommodates new variants without a hand-rolled layout.
/// `bincode` cannot be used here: an internally-tagged enum requires
/// peeking the tag via `deserialize_any`, which `bincode` 1.3 does not
/// implement.
pub fn encode_request(record: &RequestRecord) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(record).map_err(|e| CoreError::Internal(format!("request encode failed: {e}")))
}

pub fn decode_request(payload: &[u8]) -> Result<RequestRecord, CoreError> {
    serde_json::from_slice(payload)
        .map_err(|e| CoreError::BadEncoding(format!("malformed requests.log record: {e}")))
}

pub fn encode_nullifier(key: &NullifierKey, first_seen_at: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 32 + 8);
    buf.extend_from_slice(&key.scope.to_le_bytes());
    buf.extend_from_slice(&key.nullifier_hash);
    buf.extend_from_slice(&first_seen_at.to_le_bytes());
    buf
}

pub fn decode_nullifier(payload: &[u8]) -> Result<(NullifierKey, i64), CoreError> {
    if payload.len() != 48 {
        return Err(CoreError::BadEncoding("malformed nullifiers.log record".into()));
    }
    let scope = u64::from_le_bytes(payload[0..8].try_into().unwrap());
    let mut nullifier_hash = [0u8; 32];
    nullifier_hash.copy_from_slice(&payload[8..40]);
    let first_seen_at = i64::from_le_bytes(payload[40..48].try_into().unwrap());
    Ok((
        NullifierKey {
            scope,
            nullifier_hash,
        },
        first_seen_at,
    ))
}
