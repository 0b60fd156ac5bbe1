//! Generic length-prefixed, checksummed append-only record log.
//!
//! Every entity log (`tree.log`, `citizens.log`, `requests.log`,
//! `nullifiers.log`) is a sequence of `[len:u32 LE][payload][crc32:u32
//! LE]` frames. A crash can leave a partial frame at EOF; `read_all`
//! stops at the first truncated or checksum-mismatched frame and
//! reports how many valid bytes preceded it so the caller can truncate
//! the tail away rather than rewrite the file.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Open a log file for append, creating it if absent.
pub fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append one record, flushing and fsyncing before returning so a
/// successful call is durable.
pub fn append_record(file: &mut File, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    let mut frame = Vec::with_capacity(4 + payload.len() + 4);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc.to_le_bytes());
    file.write_all(&frame)?;
    file.sync_data()?;
    Ok(())
}

/// Read every well-formed record from a log file. Returns the records
/// plus the byte offset of the first invalid (truncated or
/// checksum-failing) frame, if any — callers truncate the file to that
/// offset to discard the corrupt tail.
pub fn read_all(path: &Path) -> io::Result<(Vec<Vec<u8>>, Option<u64>)> {
    if !path.exists() {
        return Ok((Vec::new(), None));
    }
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let mut records = Vec::new();
    let mut pos = 0usize;
    loop {
        if pos + 4 > buf.len() {
            break;
        }
        let len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        let payload_start = pos + 4;
        let payload_end = payload_start + len;
        let crc_end = payload_end + 4;
        if crc_end > buf.len() {
            return Ok((records, Some(pos as u64)));
        }
        let payload = &buf[payload_start..payload_end];
        let expected_crc = u32::from_le_bytes(buf[payload_end..crc_end].try_into().unwrap());
        if crc32fast::hash(payload) != expected_crc {
            return Ok((records, Some(pos as u64)));
        }
        records.push(payload.to_vec());
        pos = crc_end;
    }
    Ok((records, None))
}

/// Truncate a log file to `offset`, discarding a corrupt or partially
/// written tail detected by `read_all`.
pub fn truncate_to(path: &Path, offset: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(offset)?;
    file.sync_all()?;
    Ok(())
}

/// Write `bytes` to `path` atomically: write to a sibling temp file,
/// fsync, then rename over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    if let Some(dir) = path.parent() {
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }
    Ok(())
}

/// Seek to end-of-file, used after opening a file we've just replayed
/// so subsequent `append_record` calls land after any truncation.
pub fn seek_to_end(file: &mut File) -> io::Result<()> {
    file.seek(SeekFrom::End(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_reimpl::TempDir;

    mod tempfile_reimpl {
        use std::path::PathBuf;

        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new() -> Self {
                let mut p = std::env::temp_dir();
                p.push(format!("civitas-log-test-{}", std::process::id()));
                let _ = std::fs::remove_dir_all(&p);
                std::fs::create_dir_all(&p).unwrap();
                Self(p)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[test]
    fn round_trips_records() {
        let dir = TempDir::new();
        let path = dir.path().join("test.log");
        let mut file = open_append(&path).unwrap();
        append_record(&mut file, b"hello").unwrap();
        append_record(&mut file, b"world").unwrap();
        drop(file);

        let (records, corrupt_at) = read_all(&path).unwrap();
        assert_eq!(records, vec![b"hello".to_vec(), b"world".to_vec()]);
        assert_eq!(corrupt_at, None);
    }

    #[test]
    fn discards_truncated_tail() {
        let dir = TempDir::new();
        let path = dir.path().join("test.log");
        let mut file = open_append(&path).unwrap();
        append_record(&mut file, b"complete").unwrap();
        drop(file);

        // simulate a crash mid-write: append a partial frame
        let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(&99u32.to_le_bytes()).unwrap();
        raw.write_all(b"short").unwrap();
        drop(raw);

        let (records, corrupt_at) = read_all(&path).unwrap();
        assert_eq!(records, vec![b"complete".to_vec()]);
        assert!(corrupt_at.is_some());

        truncate_to(&path, corrupt_at.unwrap()).unwrap();
        let (records2, corrupt_at2) = read_all(&path).unwrap();
        assert_eq!(records2, vec![b"complete".to_vec()]);
        assert_eq!(corrupt_at2, None);
    }

    #[test]
    fn checksum_mismatch_is_treated_as_corrupt() {
        let dir = TempDir::new();
        let path = dir.path().join("test.log");
        let mut file = open_append(&path).unwrap();
        append_record(&mut file, b"a").unwrap();
        drop(file);

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let (records, corrupt_at) = read_all(&path).unwrap();
        assert!(records.is_empty());
        assert_eq!(corrupt_at, Some(0));
    }
}
