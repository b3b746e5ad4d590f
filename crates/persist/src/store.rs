//! File-backed world state persistence.
//!
//! Layout inside the store directory:
//! ```text
//! state.meta.json            - metadata and schema versions
//! snapshots/
//!   000001.snapshot.cbor.zst - CBOR+zstd compressed snapshots
//! events/
//!   000001.log.cbor.zst      - CBOR+zstd compressed mutation log segments
//! integrity/
//!   manifest.json            - hash chain manifest
//! ```
//!
//! A file is committed once the manifest naming it has been saved. The
//! counters in `state.meta.json` are written after that, and a store whose
//! counters lag its manifest is caught up on open.

use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shiptrack_state::{MemoryWorldState, StateEvent};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const STATE_SCHEMA_VERSION: u32 = 1;
const EVENT_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "state.meta.json";
const SNAPSHOT_SUFFIX: &str = ".snapshot.cbor.zst";
const SEGMENT_SUFFIX: &str = ".log.cbor.zst";

/// Errors from file-backed persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("{0} is not recorded in the integrity manifest")]
    Unrecorded(String),
    #[error("metadata lists {listed} {kind} files but the manifest records {recorded}")]
    CountMismatch {
        kind: &'static str,
        listed: u32,
        recorded: u32,
    },
}

/// Counters and schema versions kept in `state.meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMeta {
    pub state_schema_version: u32,
    pub event_schema_version: u32,
    pub snapshot_count: u32,
    pub event_segment_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Snapshot,
    Segment,
}

impl FileKind {
    fn dir(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshots",
            Self::Segment => "events",
        }
    }

    fn filename(self, index: u32) -> String {
        match self {
            Self::Snapshot => format!("{index:06}{SNAPSHOT_SUFFIX}"),
            Self::Segment => format!("{index:06}{SEGMENT_SUFFIX}"),
        }
    }

    fn of(filename: &str) -> Self {
        if filename.ends_with(SNAPSHOT_SUFFIX) {
            Self::Snapshot
        } else {
            Self::Segment
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    filename: String,
    sha256: String,
    prev_hash: Option<String>,
}

/// Hash chain over every committed file, in write order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    fn count(&self, kind: FileKind) -> u32 {
        self.entries
            .iter()
            .filter(|e| FileKind::of(&e.filename) == kind)
            .count() as u32
    }

    fn hash_of(&self, filename: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.filename == filename)
            .map(|e| e.sha256.as_str())
    }

    fn tip(&self) -> Option<String> {
        self.entries.last().map(|e| e.sha256.clone())
    }
}

/// File-backed world state store with schema versioning and integrity checking.
pub struct StateStore {
    root: PathBuf,
    meta: StateMeta,
    manifest: Manifest,
}

impl StateStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        for kind in [FileKind::Snapshot, FileKind::Segment] {
            std::fs::create_dir_all(root.join(kind.dir()))?;
        }
        std::fs::create_dir_all(root.join("integrity"))?;

        let meta_path = root.join(META_FILE);
        if !meta_path.exists() {
            let mut store = Self {
                root,
                meta: StateMeta {
                    state_schema_version: STATE_SCHEMA_VERSION,
                    event_schema_version: EVENT_SCHEMA_VERSION,
                    snapshot_count: 0,
                    event_segment_count: 0,
                },
                manifest: Manifest::default(),
            };
            store.save_manifest(&store.manifest)?;
            store.save_meta()?;
            tracing::debug!(root = %store.root.display(), "initialized empty state store");
            return Ok(store);
        }

        let meta: StateMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
        check_version(meta.state_schema_version, STATE_SCHEMA_VERSION)?;
        check_version(meta.event_schema_version, EVENT_SCHEMA_VERSION)?;
        let manifest_path = manifest_path(&root);
        let manifest = if manifest_path.exists() {
            serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
        } else {
            Manifest::default()
        };

        let mut store = Self {
            root,
            meta,
            manifest,
        };
        store.catch_up_meta()?;
        Ok(store)
    }

    /// Reconstruct the world state: latest snapshot, then every mutation log
    /// segment written after it. An empty store yields an empty state.
    pub fn load_latest(&self) -> Result<MemoryWorldState, StoreError> {
        let (mut state, first_segment) = if self.meta.snapshot_count == 0 {
            (MemoryWorldState::new(), 1)
        } else {
            let snap: Snapshot = self.load(FileKind::Snapshot, self.meta.snapshot_count)?;
            if !snap.verify() {
                return Err(StoreError::IntegrityMismatch {
                    expected: format!("{:#x}", snap.hash),
                    actual: format!("{:#x}", snap.restore().state_hash()),
                });
            }
            (snap.restore(), snap.segments_applied + 1)
        };

        for seg_idx in first_segment..=self.meta.event_segment_count {
            let events: Vec<StateEvent> = self.load(FileKind::Segment, seg_idx)?;
            for event in &events {
                state.apply(event);
            }
        }
        tracing::debug!(
            keys = state.len(),
            segments = self.meta.event_segment_count,
            "world state loaded"
        );
        Ok(state)
    }

    /// Append committed mutations as a new log segment.
    ///
    /// On failure the store is left as it was and the call can be retried.
    pub fn append_events(&mut self, events: &[StateEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let segment = self.record(FileKind::Segment, events)?;
        tracing::debug!(segment, events = events.len(), "mutation log appended");
        Ok(())
    }

    /// Snapshot the world state. Later loads skip every segment written so far.
    pub fn take_snapshot(&mut self, state: &MemoryWorldState) -> Result<(), StoreError> {
        let snap = Snapshot::capture(state, self.meta.event_segment_count);
        let snapshot = self.record(FileKind::Snapshot, &snap)?;
        tracing::info!(snapshot, keys = snap.entries.len(), "snapshot written");
        Ok(())
    }

    /// Check that the metadata counters agree with the manifest, that the
    /// hash chain is unbroken, and that every file matches its recorded hash.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        for (kind, listed) in [
            (FileKind::Snapshot, self.meta.snapshot_count),
            (FileKind::Segment, self.meta.event_segment_count),
        ] {
            let recorded = self.manifest.count(kind);
            if listed != recorded {
                return Err(StoreError::CountMismatch {
                    kind: kind.dir(),
                    listed,
                    recorded,
                });
            }
        }

        let mut prev_hash: Option<&str> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash.as_deref() != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or("None").to_string(),
                    actual: entry.prev_hash.as_deref().unwrap_or("None").to_string(),
                });
            }
            let kind = FileKind::of(&entry.filename);
            let data = std::fs::read(self.root.join(kind.dir()).join(&entry.filename))?;
            let actual = sha256_hex(&data);
            if actual != entry.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            prev_hash = Some(&entry.sha256);
        }
        Ok(())
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the metadata.
    pub fn meta(&self) -> &StateMeta {
        &self.meta
    }

    /// Write the next file of `kind` and commit it. Returns its index.
    ///
    /// Order: data file, then manifest (the commit point), then counters.
    /// In-memory state only moves once the manifest is on disk.
    fn record<T: Serialize + ?Sized>(&mut self, kind: FileKind, value: &T) -> Result<u32, StoreError> {
        let committed = match kind {
            FileKind::Snapshot => self.meta.snapshot_count,
            FileKind::Segment => self.meta.event_segment_count,
        };
        let index = committed + 1;
        let filename = kind.filename(index);
        let packed = pack(value)?;

        let mut manifest = self.manifest.clone();
        manifest.entries.push(ManifestEntry {
            filename: filename.clone(),
            sha256: sha256_hex(&packed),
            prev_hash: manifest.tip(),
        });

        std::fs::write(self.root.join(kind.dir()).join(&filename), &packed)?;
        self.save_manifest(&manifest)?;
        self.manifest = manifest;

        match kind {
            FileKind::Snapshot => self.meta.snapshot_count = index,
            FileKind::Segment => self.meta.event_segment_count = index,
        }
        self.save_meta()?;
        Ok(index)
    }

    fn load<T: for<'de> Deserialize<'de>>(&self, kind: FileKind, index: u32) -> Result<T, StoreError> {
        let filename = kind.filename(index);
        let packed = std::fs::read(self.root.join(kind.dir()).join(&filename))?;
        let expected = self
            .manifest
            .hash_of(&filename)
            .ok_or_else(|| StoreError::Unrecorded(filename.clone()))?;
        let actual = sha256_hex(&packed);
        if expected != actual {
            return Err(StoreError::IntegrityMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        unpack(&packed)
    }

    /// Advance counters that lag the manifest, which happens when a write
    /// was interrupted between saving the manifest and saving the metadata.
    fn catch_up_meta(&mut self) -> Result<(), StoreError> {
        let snapshots = self.manifest.count(FileKind::Snapshot);
        let segments = self.manifest.count(FileKind::Segment);
        if self.meta.snapshot_count >= snapshots && self.meta.event_segment_count >= segments {
            return Ok(());
        }
        tracing::warn!(
            snapshots,
            segments,
            "metadata behind manifest, recovering interrupted commit"
        );
        self.meta.snapshot_count = self.meta.snapshot_count.max(snapshots);
        self.meta.event_segment_count = self.meta.event_segment_count.max(segments);
        self.save_meta()
    }

    fn save_meta(&self) -> Result<(), StoreError> {
        let path = self.root.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    /// Replace the manifest via write-then-rename so a reader never sees a
    /// partial file.
    fn save_manifest(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let path = manifest_path(&self.root);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(manifest)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn manifest_path(root: &Path) -> PathBuf {
    root.join("integrity").join("manifest.json")
}

fn check_version(file_version: u32, expected_version: u32) -> Result<(), StoreError> {
    if file_version != expected_version {
        return Err(StoreError::SchemaMismatch {
            file_version,
            expected_version,
        });
    }
    Ok(())
}

/// CBOR-encode then zstd-compress.
fn pack<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut cbor = Vec::new();
    ciborium::into_writer(value, &mut cbor).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(&cbor)?;
    Ok(encoder.finish()?)
}

fn unpack<T: for<'de> Deserialize<'de>>(packed: &[u8]) -> Result<T, StoreError> {
    let mut cbor = Vec::new();
    zstd::Decoder::new(packed)?.read_to_end(&mut cbor)?;
    ciborium::from_reader(cbor.as_slice()).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiptrack_state::WorldState;

    fn put(state: &mut MemoryWorldState, key: &str, value: &[u8]) {
        state.put(key, value.to_vec()).unwrap();
    }

    #[test]
    fn store_open_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(tmp.path().join("ledger")).unwrap();
        assert_eq!(store.meta().snapshot_count, 0);
        assert_eq!(store.meta().event_segment_count, 0);
        assert!(store.root().join("snapshots").is_dir());
        assert!(store.root().join("events").is_dir());
        assert!(store.root().join("integrity").is_dir());
    }

    #[test]
    fn empty_store_loads_empty_state() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::open(tmp.path().join("ledger")).unwrap();
        assert!(store.load_latest().unwrap().is_empty());
    }

    #[test]
    fn events_replay_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut state = MemoryWorldState::new();
        {
            let mut store = StateStore::open(&path).unwrap();
            put(&mut state, "a", b"1");
            put(&mut state, "b", b"2");
            store.append_events(&state.drain_events()).unwrap();
            state.delete("a").unwrap();
            store.append_events(&state.drain_events()).unwrap();
        }

        let loaded = StateStore::open(&path).unwrap().load_latest().unwrap();
        assert_eq!(loaded.entries(), state.entries());
        assert_eq!(loaded.get("a").unwrap(), None);
    }

    #[test]
    fn snapshot_then_later_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = StateStore::open(&path).unwrap();

        let mut state = MemoryWorldState::new();
        put(&mut state, "a", b"1");
        store.append_events(&state.drain_events()).unwrap();
        store.take_snapshot(&state).unwrap();

        put(&mut state, "b", b"2");
        put(&mut state, "a", b"3");
        store.append_events(&state.drain_events()).unwrap();

        let loaded = StateStore::open(&path).unwrap().load_latest().unwrap();
        assert_eq!(loaded.state_hash(), state.state_hash());
        assert_eq!(loaded.get("a").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn empty_event_batch_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = StateStore::open(tmp.path().join("ledger")).unwrap();
        store.append_events(&[]).unwrap();
        assert_eq!(store.meta().event_segment_count, 0);
    }

    #[test]
    fn store_integrity_verification() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = StateStore::open(tmp.path().join("ledger")).unwrap();
        let mut state = MemoryWorldState::new();
        put(&mut state, "a", b"1");
        store.append_events(&state.drain_events()).unwrap();
        store.take_snapshot(&state).unwrap();
        store.verify_integrity().unwrap();
    }

    #[test]
    fn store_integrity_fail_closed_on_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = StateStore::open(&path).unwrap();
        let mut state = MemoryWorldState::new();
        put(&mut state, "a", b"1");
        store.take_snapshot(&state).unwrap();

        let snap_path = path.join("snapshots").join("000001.snapshot.cbor.zst");
        let mut data = std::fs::read(&snap_path).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&snap_path, &data).unwrap();

        let store2 = StateStore::open(&path).unwrap();
        assert!(store2.verify_integrity().is_err());
        assert!(matches!(
            store2.load_latest(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let _store = StateStore::open(&path).unwrap();

        let meta_path = path.join("state.meta.json");
        let mut meta: StateMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.state_schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        match StateStore::open(&path) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, STATE_SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn failed_append_leaves_store_consistent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = StateStore::open(&path).unwrap();
        let mut state = MemoryWorldState::new();

        std::fs::remove_dir_all(path.join("events")).unwrap();
        put(&mut state, "a", b"1");
        assert!(store.append_events(state.events()).is_err());
        assert_eq!(store.meta().event_segment_count, 0);
        store.verify_integrity().unwrap();

        std::fs::create_dir_all(path.join("events")).unwrap();
        store.append_events(&state.drain_events()).unwrap();
        assert_eq!(store.meta().event_segment_count, 1);

        let reopened = StateStore::open(&path).unwrap();
        reopened.verify_integrity().unwrap();
        let loaded = reopened.load_latest().unwrap();
        assert_eq!(loaded.get("a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn failed_snapshot_leaves_store_consistent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = StateStore::open(&path).unwrap();
        let mut state = MemoryWorldState::new();
        put(&mut state, "a", b"1");
        store.append_events(&state.drain_events()).unwrap();

        std::fs::remove_dir_all(path.join("snapshots")).unwrap();
        assert!(store.take_snapshot(&state).is_err());
        assert_eq!(store.meta().snapshot_count, 0);

        let reopened = StateStore::open(&path).unwrap();
        reopened.verify_integrity().unwrap();
        assert_eq!(reopened.load_latest().unwrap().entries(), state.entries());
    }

    #[test]
    fn lagging_meta_caught_up_on_open() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut state = MemoryWorldState::new();
        {
            let mut store = StateStore::open(&path).unwrap();
            put(&mut state, "a", b"1");
            store.append_events(&state.drain_events()).unwrap();
        }

        // Manifest saved, metadata write lost.
        let meta_path = path.join(META_FILE);
        let mut meta: StateMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.event_segment_count = 0;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.meta().event_segment_count, 1);
        store.verify_integrity().unwrap();
        assert_eq!(store.load_latest().unwrap().entries(), state.entries());
    }

    #[test]
    fn meta_ahead_of_manifest_fails_verification() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        {
            let mut store = StateStore::open(&path).unwrap();
            let mut state = MemoryWorldState::new();
            put(&mut state, "a", b"1");
            store.append_events(&state.drain_events()).unwrap();
        }

        let meta_path = path.join(META_FILE);
        let mut meta: StateMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.event_segment_count = 2;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        let store = StateStore::open(&path).unwrap();
        assert!(matches!(
            store.verify_integrity(),
            Err(StoreError::CountMismatch {
                listed: 2,
                recorded: 1,
                ..
            })
        ));
        assert!(store.load_latest().is_err());
    }
}
