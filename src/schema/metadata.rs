//! Metadata store
//!
//! Persisted schema metadata is the single source of truth for column type,
//! index, visibility, tag vocabulary and rule. Writers go through
//! compare-and-swap on a per-database version so that two structural
//! operations racing on the same record cannot both succeed.
//!
//! `FileMetadataStore` serializes CAS within one process. Writers in
//! different processes are not locked against each other: a collision is
//! only detected when both read the same version before either renames its
//! file into place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{SchemaError, SchemaResult};
use super::types::DatabaseMeta;
use crate::observability::Event;
use crate::storage::StorageError;

const RECORD_EXTENSION: &str = "json";

/// A value together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Durable, versioned storage for database metadata records
pub trait MetadataStore: Send + Sync {
    /// Reads one record, `None` when absent.
    fn load(&self, id: &str) -> SchemaResult<Option<Versioned<DatabaseMeta>>>;

    /// Ids of every stored record, sorted.
    fn list(&self) -> SchemaResult<Vec<String>>;

    /// Writes `meta` if the stored version equals `expected`
    /// (`None` = must not exist). Returns the new version.
    fn compare_and_swap(
        &self,
        id: &str,
        expected: Option<u64>,
        meta: &DatabaseMeta,
    ) -> SchemaResult<u64>;

    /// Removes a record if its version equals `expected`.
    fn remove(&self, id: &str, expected: u64) -> SchemaResult<()>;
}

fn check_expected(id: &str, current: Option<u64>, expected: Option<u64>) -> SchemaResult<()> {
    match (current, expected) {
        (None, None) => Ok(()),
        (Some(_), None) => Err(SchemaError::already_exists("database", id)),
        (None, Some(_)) => Err(SchemaError::not_found("database", id)),
        (Some(c), Some(e)) if c == e => Ok(()),
        _ => Err(SchemaError::concurrent_modification(id)),
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, id: &str) -> SchemaResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| SchemaError::invariant(id, "metadata lock poisoned"))
}

/// On-disk envelope around one database record
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u64,
    checksum: u32,
    database: DatabaseMeta,
}

/// One JSON file per database under a metadata directory.
///
/// Files are written to a temp path, fsynced, then renamed into place, so a
/// reader sees either the old record or the new one.
pub struct FileMetadataStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMetadataStore {
    /// Opens (and creates if needed) the metadata directory.
    pub fn open(dir: impl AsRef<Path>) -> SchemaResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error("create metadata directory", e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.tmp", id, RECORD_EXTENSION))
    }

    fn read_record(&self, id: &str) -> SchemaResult<Option<Versioned<DatabaseMeta>>> {
        let path = self.record_path(id);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(format!("read metadata '{}'", id), e)),
        };

        let envelope: Envelope = serde_json::from_slice(&content).map_err(|e| {
            SchemaError::invariant(id, format!("metadata record does not decode: {}", e))
        })?;
        let body = encode_database(id, &envelope.database)?;
        if !verify_checksum(&body, envelope.checksum) {
            return Err(SchemaError::invariant(id, "metadata record checksum mismatch"));
        }

        Ok(Some(Versioned {
            version: envelope.version,
            value: envelope.database,
        }))
    }

    fn write_record(&self, id: &str, version: u64, meta: &DatabaseMeta) -> SchemaResult<()> {
        let body = encode_database(id, meta)?;
        let envelope = Envelope {
            version,
            checksum: compute_checksum(&body),
            database: meta.clone(),
        };
        let content = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| SchemaError::invariant(id, format!("metadata does not encode: {}", e)))?;

        let temp = self.temp_path(id);
        let operation = format!("write metadata '{}'", id);
        let replaced = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .and_then(|mut file| {
                file.write_all(&content)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp, self.record_path(id)));
        if let Err(e) = replaced {
            let _ = fs::remove_file(&temp);
            return Err(io_error(operation, e));
        }

        if let Err(e) = File::open(&self.dir).and_then(|dir| dir.sync_all()) {
            warn!(
                event = %Event::MetadataSyncFailed,
                database = %id,
                error = %e,
                "metadata directory not synced"
            );
        }
        Ok(())
    }
}

impl MetadataStore for FileMetadataStore {
    fn load(&self, id: &str) -> SchemaResult<Option<Versioned<DatabaseMeta>>> {
        self.read_record(id)
    }

    fn list(&self) -> SchemaResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| io_error("list metadata", e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error("list metadata", e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn compare_and_swap(
        &self,
        id: &str,
        expected: Option<u64>,
        meta: &DatabaseMeta,
    ) -> SchemaResult<u64> {
        let _guard = lock(&self.write_lock, id)?;
        let current = self.read_record(id)?.map(|v| v.version);
        check_expected(id, current, expected)?;
        let version = current.map_or(1, |v| v + 1);
        self.write_record(id, version, meta)?;
        Ok(version)
    }

    fn remove(&self, id: &str, expected: u64) -> SchemaResult<()> {
        let _guard = lock(&self.write_lock, id)?;
        let current = self.read_record(id)?.map(|v| v.version);
        check_expected(id, current, Some(expected))?;
        fs::remove_file(self.record_path(id))
            .map_err(|e| io_error(format!("remove metadata '{}'", id), e))
    }
}

fn encode_database(id: &str, meta: &DatabaseMeta) -> SchemaResult<Vec<u8>> {
    serde_json::to_vec(meta)
        .map_err(|e| SchemaError::invariant(id, format!("metadata does not encode: {}", e)))
}

fn io_error(operation: impl Into<String>, e: io::Error) -> SchemaError {
    SchemaError::storage(operation, StorageError::Io(e))
}

/// In-memory metadata store
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<BTreeMap<String, Versioned<DatabaseMeta>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self, id: &str) -> SchemaResult<Option<Versioned<DatabaseMeta>>> {
        Ok(lock(&self.records, id)?.get(id).cloned())
    }

    fn list(&self) -> SchemaResult<Vec<String>> {
        Ok(lock(&self.records, "*")?.keys().cloned().collect())
    }

    fn compare_and_swap(
        &self,
        id: &str,
        expected: Option<u64>,
        meta: &DatabaseMeta,
    ) -> SchemaResult<u64> {
        let mut records = lock(&self.records, id)?;
        let current = records.get(id).map(|v| v.version);
        check_expected(id, current, expected)?;
        let version = current.map_or(1, |v| v + 1);
        records.insert(
            id.to_string(),
            Versioned {
                version,
                value: meta.clone(),
            },
        );
        Ok(version)
    }

    fn remove(&self, id: &str, expected: u64) -> SchemaResult<()> {
        let mut records = lock(&self.records, id)?;
        let current = records.get(id).map(|v| v.version);
        check_expected(id, current, Some(expected))?;
        records.remove(id);
        Ok(())
    }
}
