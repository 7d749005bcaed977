//! Durable identity store backed by a single SQLite database.
//!
//! The whole record set is read once at [`IdentityStore::load`] and cached
//! in memory. Every [`insert`](IdentityStore::insert) commits its own
//! transaction before the cache changes, so the cache never holds a record
//! that is not on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode};
use sha2::{Digest, Sha256};

use crate::error::{DimensionMismatch, StoreError};
use crate::types::{Embedding, EnrollmentRecord};

/// Current on-disk schema version, kept in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS identities (
    user_id     TEXT PRIMARY KEY NOT NULL,
    name        TEXT NOT NULL,
    role        TEXT NOT NULL,
    dimension   INTEGER NOT NULL,
    embedding   BLOB NOT NULL,
    digest      BLOB NOT NULL,
    enrolled_at TEXT NOT NULL
);
";

const SELECT_ALL: &str = "SELECT user_id, name, role, dimension, embedding, digest, enrolled_at
     FROM identities ORDER BY user_id";

const INSERT_ONE: &str = "INSERT INTO identities
     (user_id, name, role, dimension, embedding, digest, enrolled_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Row as it sits on disk, before validation.
struct RawRow {
    user_id: String,
    name: String,
    role: String,
    dimension: i64,
    embedding: Vec<u8>,
    digest: Vec<u8>,
    enrolled_at: String,
}

/// Mapping `user_id → EnrollmentRecord` with synchronous persistence.
pub struct IdentityStore {
    // Only reached through `&mut self`; the mutex makes the store `Sync`.
    conn: Mutex<Connection>,
    path: PathBuf,
    records: BTreeMap<String, EnrollmentRecord>,
    dimension: Option<usize>,
}

impl IdentityStore {
    /// Open the store at `path`, creating an empty, persisted store if absent.
    ///
    /// Fails with [`StoreError::CorruptStore`] if any record disagrees with
    /// the rest of the store or with its own digest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut conn = Connection::open(&path)?;
        let not_a_database = |err: rusqlite::Error| classify_open_error(&path, err);
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(not_a_database)?;

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(not_a_database)?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::CorruptStore {
                path,
                message: format!(
                    "schema version {version} is newer than supported version {SCHEMA_VERSION}"
                ),
            });
        }
        if version < SCHEMA_VERSION {
            tracing::info!(path = %path.display(), "initializing identity store schema");
            let tx = conn.transaction()?;
            tx.execute_batch(CREATE_TABLE)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
        }

        let raw = read_rows(&conn)?;
        let (records, dimension) = validate_rows(&path, raw)?;

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            dimension = ?dimension,
            "identity store loaded"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            records,
            dimension,
        })
    }

    /// Read-only view of every enrolled identity, ordered by `user_id`.
    pub fn get_all(&self) -> &BTreeMap<String, EnrollmentRecord> {
        &self.records
    }

    pub fn get(&self, user_id: &str) -> Option<&EnrollmentRecord> {
        self.records.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.records.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embedding dimension shared by every record; `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a new identity. Never overwrites.
    pub fn insert(&mut self, record: EnrollmentRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&record.user_id) {
            return Err(StoreError::DuplicateIdentity(record.user_id));
        }

        let actual = record.embedding.dimension();
        if let Some(expected) = self.dimension {
            if expected != actual {
                return Err(DimensionMismatch { expected, actual }.into());
            }
        }

        let blob = record.embedding.to_le_bytes();
        let digest = Sha256::digest(&blob).to_vec();
        let enrolled_at = record
            .enrolled_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true);

        let conn = self.conn.get_mut().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            INSERT_ONE,
            params![
                record.user_id,
                record.name,
                record.role,
                actual as i64,
                blob,
                digest,
                enrolled_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::DuplicateIdentity(record.user_id));
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;

        tracing::debug!(user_id = %record.user_id, dimension = actual, "identity persisted");

        self.dimension = Some(actual);
        self.records.insert(record.user_id.clone(), record);
        Ok(())
    }
}

/// A file that SQLite refuses to read as a database is a corrupt store,
/// not an I/O failure.
fn classify_open_error(path: &Path, err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == ErrorCode::NotADatabase =>
        {
            StoreError::CorruptStore {
                path: path.to_path_buf(),
                message: format!("not an identity database: {err}"),
            }
        }
        other => StoreError::Sqlite(other),
    }
}

fn read_rows(conn: &Connection) -> Result<Vec<RawRow>, StoreError> {
    let mut stmt = conn.prepare(SELECT_ALL)?;
    let rows = stmt.query_map([], |row| {
        Ok(RawRow {
            user_id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            dimension: row.get(3)?,
            embedding: row.get(4)?,
            digest: row.get(5)?,
            enrolled_at: row.get(6)?,
        })
    })?;
    let raw = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(raw)
}

fn validate_rows(
    path: &Path,
    rows: Vec<RawRow>,
) -> Result<(BTreeMap<String, EnrollmentRecord>, Option<usize>), StoreError> {
    let corrupt = |message: String| StoreError::CorruptStore {
        path: path.to_path_buf(),
        message,
    };

    let mut records = BTreeMap::new();
    let mut dimension: Option<usize> = None;

    for row in rows {
        let declared = usize::try_from(row.dimension).map_err(|_| {
            corrupt(format!(
                "record '{}' declares invalid dimension {}",
                row.user_id, row.dimension
            ))
        })?;

        if row.embedding.len() != declared * 4 {
            return Err(corrupt(format!(
                "record '{}' declares {declared} values but holds {} bytes",
                row.user_id,
                row.embedding.len()
            )));
        }

        if Sha256::digest(&row.embedding).as_slice() != row.digest.as_slice() {
            return Err(corrupt(format!(
                "record '{}' failed its embedding digest check",
                row.user_id
            )));
        }

        match dimension {
            Some(expected) if expected != declared => {
                return Err(corrupt(format!(
                    "record '{}' has {declared}-dim embedding, store holds {expected}-dim",
                    row.user_id
                )));
            }
            _ => dimension = Some(declared),
        }

        let embedding = Embedding::from_le_bytes(&row.embedding)
            .ok_or_else(|| corrupt(format!("record '{}' has a ragged embedding", row.user_id)))?;

        let enrolled_at = DateTime::parse_from_rfc3339(&row.enrolled_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                corrupt(format!(
                    "record '{}' has unreadable enrolled_at '{}': {e}",
                    row.user_id, row.enrolled_at
                ))
            })?;

        records.insert(
            row.user_id.clone(),
            EnrollmentRecord {
                user_id: row.user_id,
                name: row.name,
                role: row.role,
                embedding,
                enrolled_at,
            },
        );
    }

    Ok((records, dimension))
}
