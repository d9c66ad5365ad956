//! Append-only, hash-chained history file
//!
//! Layout:
//!
//! ```text
//! header: b"RTRH" | u16_be version | [u8; 32] anchor
//! frame:  u32_be len | [u8; 32] digest | len bytes of JSON
//! ```
//!
//! Each frame digest is `SHA-256(prev || payload)` where `prev` is the
//! previous frame's digest, or the header anchor for the first frame. When the
//! log is compacted the anchor becomes the digest of the last evicted frame,
//! so retained frames are copied byte for byte.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::hash::SaltedHash;
use super::record::{FailureReason, RecordKind, RotationRecord};
use crate::core::{add_std, sub_std};
use crate::utils::atomic_write;

const MAGIC: &[u8; 4] = b"RTRH";
const VERSION: u16 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 2 + DIGEST_LEN;
const FRAME_HEADER_LEN: usize = 4 + DIGEST_LEN;
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// History store errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Filesystem failure
    #[error("history I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("history record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The file is not a history file or is structurally broken
    #[error("history file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// A frame before the tail fails its chain digest
    #[error("history chain broken at record {index} in {path}")]
    Integrity { path: PathBuf, index: usize },

    /// The store was opened for reading only
    #[error("history store is read-only")]
    ReadOnly,
}

type Digest32 = [u8; DIGEST_LEN];

#[derive(Debug, Clone)]
struct Frame {
    digest: Digest32,
    payload: Vec<u8>,
}

impl Frame {
    fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.digest);
        out.extend_from_slice(&self.payload);
    }
}

fn chain(prev: &Digest32, payload: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(payload);
    hasher.finalize().into()
}

fn encode_file(anchor: &Digest32, frames: &[Frame]) -> Vec<u8> {
    let body: usize = frames.iter().map(Frame::encoded_len).sum();
    let mut out = Vec::with_capacity(HEADER_LEN + body);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_be_bytes());
    out.extend_from_slice(anchor);
    for frame in frames {
        frame.encode_into(&mut out);
    }
    out
}

/// Result of scanning a history file.
#[derive(Debug)]
struct Parsed {
    anchor: Digest32,
    frames: Vec<Frame>,
    records: Vec<RotationRecord>,
    valid_len: u64,
    torn: bool,
}

fn parse(path: &Path, bytes: &[u8]) -> Result<Parsed, HistoryError> {
    let corrupt = |reason: &str| HistoryError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if bytes.len() < HEADER_LEN {
        return Err(corrupt("truncated header"));
    }
    if &bytes[..4] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(corrupt(&format!("unsupported version {version}")));
    }
    let mut anchor = [0u8; DIGEST_LEN];
    anchor.copy_from_slice(&bytes[6..HEADER_LEN]);

    let mut frames = Vec::new();
    let mut records = Vec::new();
    let mut prev = anchor;
    let mut pos = HEADER_LEN;
    let mut torn = false;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() < FRAME_HEADER_LEN {
            torn = true;
            break;
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(corrupt(&format!("frame at offset {pos} claims {len} bytes")));
        }
        if rest.len() < FRAME_HEADER_LEN + len {
            torn = true;
            break;
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&rest[4..FRAME_HEADER_LEN]);
        let payload = &rest[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len];
        let is_last = pos + FRAME_HEADER_LEN + len == bytes.len();

        if chain(&prev, payload) != digest {
            if is_last {
                torn = true;
                break;
            }
            return Err(HistoryError::Integrity {
                path: path.to_path_buf(),
                index: frames.len(),
            });
        }

        let record: RotationRecord = serde_json::from_slice(payload)?;
        records.push(record);
        frames.push(Frame {
            digest,
            payload: payload.to_vec(),
        });
        prev = digest;
        pos += FRAME_HEADER_LEN + len;
    }

    Ok(Parsed {
        anchor,
        frames,
        records,
        valid_len: pos as u64,
        torn,
    })
}

#[derive(Debug)]
struct Writer {
    file: Option<File>,
    anchor: Digest32,
    frames: Vec<Frame>,
    committed_len: u64,
}

impl Writer {
    fn last_digest(&self) -> Digest32 {
        self.frames.last().map_or(self.anchor, |f| f.digest)
    }
}

/// Append-only rotation history.
///
/// A single writer (appends serialize on an internal mutex) and any number of
/// readers. Queries run over an in-memory snapshot that is updated only after
/// a frame is durably on disk.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    max_history: usize,
    read_only: bool,
    snapshot: RwLock<Vec<RotationRecord>>,
    writer: Mutex<Writer>,
}

impl HistoryStore {
    /// Open or create the history at `path`.
    ///
    /// A torn trailing frame is truncated away. A broken chain anywhere before
    /// the last frame is reported as [`HistoryError::Integrity`]. If the file
    /// holds more than `max_history` records it is compacted.
    pub fn open(path: impl Into<PathBuf>, max_history: usize) -> Result<Self, HistoryError> {
        let path = path.into();
        let io_err = |source| HistoryError::Io {
            path: path.clone(),
            source,
        };

        if !path.exists() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(io_err)?;
            }
            atomic_write(&path, &encode_file(&[0u8; DIGEST_LEN], &[])).map_err(io_err)?;
            tracing::info!(path = %path.display(), "Created rotation history");
        }

        let store = Self {
            path: path.clone(),
            max_history: max_history.max(1),
            read_only: false,
            snapshot: RwLock::new(Vec::new()),
            writer: Mutex::new(Writer {
                file: None,
                anchor: [0u8; DIGEST_LEN],
                frames: Vec::new(),
                committed_len: 0,
            }),
        };
        store.reload()?;
        Ok(store)
    }

    /// Open the history without ever writing to it.
    ///
    /// A missing file reads as empty; a torn tail is ignored rather than
    /// truncated.
    pub fn open_read_only(
        path: impl Into<PathBuf>,
        max_history: usize,
    ) -> Result<Self, HistoryError> {
        let path = path.into();
        let store = Self {
            path,
            max_history: max_history.max(1),
            read_only: true,
            snapshot: RwLock::new(Vec::new()),
            writer: Mutex::new(Writer {
                file: None,
                anchor: [0u8; DIGEST_LEN],
                frames: Vec::new(),
                committed_len: 0,
            }),
        };
        if store.path.exists() {
            store.reload()?;
        }
        Ok(store)
    }

    /// Re-read the file, picking up appends made by other processes.
    pub fn reload(&self) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        let mut writer = self.writer.lock();

        let bytes = std::fs::read(&self.path).map_err(io_err)?;
        let parsed = parse(&self.path, &bytes)?;

        let file = if self.read_only {
            None
        } else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .map_err(io_err)?;
            if parsed.torn {
                tracing::warn!(
                    path = %self.path.display(),
                    valid_len = parsed.valid_len,
                    file_len = bytes.len(),
                    "Truncating torn history tail"
                );
                file.set_len(parsed.valid_len).map_err(io_err)?;
                file.sync_all().map_err(io_err)?;
            }
            Some(file)
        };

        writer.file = file;
        writer.anchor = parsed.anchor;
        writer.frames = parsed.frames;
        writer.committed_len = parsed.valid_len;
        *self.snapshot.write() = parsed.records;

        if !self.read_only && writer.frames.len() > self.max_history {
            self.compact(&mut writer)?;
        }
        Ok(())
    }

    /// Durably append one record.
    ///
    /// The frame is written with a single write followed by an fsync. On
    /// failure the file is cut back to its previous length and the snapshot is
    /// untouched.
    pub fn append(&self, record: RotationRecord) -> Result<(), HistoryError> {
        if self.read_only {
            return Err(HistoryError::ReadOnly);
        }
        let payload = serde_json::to_vec(&record)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(HistoryError::Corrupt {
                path: self.path.clone(),
                reason: format!("record of {} bytes exceeds frame limit", payload.len()),
            });
        }

        let mut writer = self.writer.lock();
        let frame = Frame {
            digest: chain(&writer.last_digest(), &payload),
            payload,
        };
        let mut bytes = Vec::with_capacity(frame.encoded_len());
        frame.encode_into(&mut bytes);

        let committed = writer.committed_len;
        let Some(file) = writer.file.as_mut() else {
            return Err(HistoryError::ReadOnly);
        };
        let written = file
            .seek(SeekFrom::Start(committed))
            .and_then(|_| file.write_all(&bytes))
            .and_then(|()| file.sync_data());
        if let Err(source) = written {
            let _ = file.set_len(committed);
            return Err(HistoryError::Io {
                path: self.path.clone(),
                source,
            });
        }

        writer.committed_len += bytes.len() as u64;
        writer.frames.push(frame);
        self.snapshot.write().push(record);

        if writer.frames.len() > self.max_history {
            // The record is already durable; a failed compaction is retried on
            // the next append or open.
            if let Err(e) = self.compact(&mut writer) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "History compaction failed"
                );
            }
        }
        Ok(())
    }

    fn compact(&self, writer: &mut Writer) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        let evict = writer.frames.len() - self.max_history;
        let anchor = writer.frames[evict - 1].digest;
        let retained = writer.frames[evict..].to_vec();
        let bytes = encode_file(&anchor, &retained);

        atomic_write(&self.path, &bytes).map_err(io_err)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(io_err)?;

        writer.file = Some(file);
        writer.anchor = anchor;
        writer.frames = retained;
        writer.committed_len = bytes.len() as u64;
        self.snapshot.write().drain(..evict);

        tracing::debug!(
            path = %self.path.display(),
            evicted = evict,
            retained = self.max_history,
            "Compacted rotation history"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<RotationRecord> {
        self.snapshot.read().clone()
    }

    /// Up to `limit` records, most recent first.
    pub fn list(&self, limit: usize) -> Vec<RotationRecord> {
        self.snapshot.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn last_record(&self) -> Option<RotationRecord> {
        self.snapshot.read().last().cloned()
    }

    /// Most recent record after which the stored password is known good.
    pub fn last_success(&self) -> Option<RotationRecord> {
        self.snapshot
            .read()
            .iter()
            .rev()
            .find(|r| r.is_success())
            .cloned()
    }

    /// Successful rotations currently retained.
    pub fn total_successes(&self) -> usize {
        self.snapshot
            .read()
            .iter()
            .filter(|r| r.kind == RecordKind::Rotation && r.is_success())
            .count()
    }

    /// Rate-limit relevant failures strictly inside `(now - window, now]`.
    pub fn recent_failures(&self, window: Duration, now: DateTime<Utc>) -> usize {
        let since = sub_std(now, window);
        self.snapshot
            .read()
            .iter()
            .filter(|r| r.counts_toward_rate_limit() && r.timestamp > since)
            .count()
    }

    /// Newest `rate_limited` record strictly inside `(now - window, now]`.
    pub fn recent_refusal(&self, window: Duration, now: DateTime<Utc>) -> Option<RotationRecord> {
        let since = sub_std(now, window);
        self.snapshot
            .read()
            .iter()
            .rev()
            .find(|r| r.reason == Some(FailureReason::RateLimited) && r.timestamp > since)
            .cloned()
    }

    /// When the rate-limit guard lifts, if it is engaged at `now`.
    ///
    /// With `n >= max_attempts` failures in the window, the guard lifts when
    /// the `(n - max_attempts)`th oldest of them ages out.
    pub fn rate_limit_clears_at(
        &self,
        window: Duration,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let since = sub_std(now, window);
        let mut failures: Vec<DateTime<Utc>> = self
            .snapshot
            .read()
            .iter()
            .filter(|r| r.counts_toward_rate_limit() && r.timestamp > since)
            .map(|r| r.timestamp)
            .collect();
        let max = max_attempts as usize;
        if max == 0 || failures.len() < max {
            return None;
        }
        failures.sort_unstable();
        Some(add_std(failures[failures.len() - max], window))
    }

    /// The unconfirmed change still awaiting operator resolution, if any.
    pub fn pending_unconfirmed(&self) -> Option<RotationRecord> {
        for record in self.snapshot.read().iter().rev() {
            if record.kind == RecordKind::Resolution || record.is_success() {
                return None;
            }
            if record.reason == Some(FailureReason::UnconfirmedChange) {
                return Some(record.clone());
            }
        }
        None
    }

    /// Password hashes from the newest `depth` records, newest first.
    pub fn recent_password_hashes(&self, depth: usize) -> Vec<SaltedHash> {
        self.snapshot
            .read()
            .iter()
            .rev()
            .take(depth)
            .filter_map(|r| r.password_hash.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SecretString;
    use crate::history::record::Trigger;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    fn failure(at: DateTime<Utc>, reason: FailureReason) -> RotationRecord {
        RotationRecord::failure(Trigger::Scheduled, at, reason, "test", Duration::ZERO)
    }

    fn success(at: DateTime<Utc>) -> RotationRecord {
        RotationRecord::success(
            Trigger::Scheduled,
            at,
            SaltedHash::new(&SecretString::new("pw")),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_open_creates_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.log");
        let store = HistoryStore::open(&path, 10).unwrap();
        assert!(store.is_empty());
        assert_eq!(std::fs::read(&path).unwrap().len(), HEADER_LEN);
    }

    #[test]
    fn test_append_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        {
            let store = HistoryStore::open(&path, 10).unwrap();
            store.append(success(t(0))).unwrap();
            store.append(failure(t(5), FailureReason::AuthRejected)).unwrap();
        }
        let store = HistoryStore::open(&path, 10).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.list(1)[0].reason, Some(FailureReason::AuthRejected));
        assert!(store.last_success().is_some());
    }

    #[test]
    fn test_compaction_keeps_newest_and_chain_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        let store = HistoryStore::open(&path, 3).unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let record = failure(t(i), FailureReason::TransientNetwork);
            ids.push(record.id);
            store.append(record).unwrap();
            assert!(store.len() <= 3);
        }
        let kept: Vec<_> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(kept, ids[2..].to_vec());

        // reopening validates the re-anchored chain
        let reopened = HistoryStore::open(&path, 3).unwrap();
        let kept: Vec<_> = reopened.records().iter().map(|r| r.id).collect();
        assert_eq!(kept, ids[2..].to_vec());
    }

    #[test]
    fn test_open_compacts_when_cap_lowered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        {
            let store = HistoryStore::open(&path, 10).unwrap();
            for i in 0..6 {
                store.append(success(t(i))).unwrap();
            }
        }
        let store = HistoryStore::open(&path, 2).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[1].timestamp, t(5));
    }

    #[test]
    fn test_tampered_middle_frame_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        {
            let store = HistoryStore::open(&path, 10).unwrap();
            store.append(failure(t(0), FailureReason::AuthRejected)).unwrap();
            store.append(failure(t(1), FailureReason::AuthRejected)).unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        // flip a byte inside the first payload
        let first_payload = HEADER_LEN + FRAME_HEADER_LEN + 2;
        bytes[first_payload] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let err = HistoryStore::open(&path, 10).unwrap_err();
        assert!(matches!(err, HistoryError::Integrity { index: 0, .. }), "{err:?}");
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        std::fs::write(&path, vec![0u8; HEADER_LEN]).unwrap();
        let err = HistoryStore::open(&path, 10).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
    }

    #[test]
    fn test_recent_failures_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.log"), 10).unwrap();
        store.append(failure(t(0), FailureReason::AuthRejected)).unwrap();
        store.append(failure(t(30), FailureReason::RemoteRejected)).unwrap();
        store.append(failure(t(40), FailureReason::RateLimited)).unwrap();
        store.append(failure(t(50), FailureReason::TransientNetwork)).unwrap();

        let hour = Duration::from_secs(3600);
        // at t(60) the t(0) failure sits exactly on the boundary and is excluded
        assert_eq!(store.recent_failures(hour, t(60)), 2);
        assert_eq!(store.recent_failures(hour, t(59)), 3);
    }

    #[test]
    fn test_recent_refusal_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.log"), 10).unwrap();
        store.append(failure(t(0), FailureReason::AuthRejected)).unwrap();
        let hour = Duration::from_secs(3600);
        assert!(store.recent_refusal(hour, t(5)).is_none());

        store.append(failure(t(10), FailureReason::RateLimited)).unwrap();
        assert_eq!(store.recent_refusal(hour, t(69)).unwrap().timestamp, t(10));
        assert!(store.recent_refusal(hour, t(70)).is_none());
    }

    #[test]
    fn test_rate_limit_clears_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.log"), 10).unwrap();
        for m in [0, 10, 20, 30] {
            store.append(failure(t(m), FailureReason::AuthRejected)).unwrap();
        }
        let hour = Duration::from_secs(3600);
        // four failures, limit three: lifts when t(10) ages out
        assert_eq!(store.rate_limit_clears_at(hour, 3, t(35)), Some(t(70)));
        assert_eq!(store.rate_limit_clears_at(hour, 5, t(35)), None);
    }

    #[test]
    fn test_pending_unconfirmed_until_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.log"), 10).unwrap();
        store.append(success(t(0))).unwrap();
        assert!(store.pending_unconfirmed().is_none());

        store.append(failure(t(1), FailureReason::UnconfirmedChange)).unwrap();
        store.append(failure(t(2), FailureReason::RateLimited)).unwrap();
        assert_eq!(store.pending_unconfirmed().unwrap().timestamp, t(1));

        store.append(RotationRecord::resolution(t(3), None)).unwrap();
        assert!(store.pending_unconfirmed().is_none());
    }

    #[test]
    fn test_read_only_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.log");
        let store = HistoryStore::open_read_only(&path, 10).unwrap();
        assert!(store.is_empty());
        assert!(!path.exists());
        assert!(matches!(store.append(success(t(0))), Err(HistoryError::ReadOnly)));
    }

    #[test]
    fn test_recent_password_hashes_depth() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.log"), 10).unwrap();
        store.append(success(t(0))).unwrap();
        store.append(failure(t(1), FailureReason::AuthRejected)).unwrap();
        store.append(success(t(2))).unwrap();
        assert_eq!(store.recent_password_hashes(10).len(), 2);
        assert_eq!(store.recent_password_hashes(2).len(), 1);
    }
}
