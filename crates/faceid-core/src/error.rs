//! Error taxonomy for the recognition engine and identity store.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::BoundingBox;

/// Boxed cause reported by an external capability (locator or extractor).
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of an [`EngineError`], used for log severity and
/// for the `error.kind` field of wire results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input from the caller.
    Validation,
    /// The request collides with existing state.
    Conflict,
    /// Store or model inconsistency.
    Integrity,
    /// A collaborator (locator, extractor, storage) failed.
    Infrastructure,
}

/// Two embeddings of different lengths were compared or mixed in one store.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("embedding dimension mismatch: expected {expected}, got {actual}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user id '{0}' already exists")]
    DuplicateIdentity(String),
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error("corrupt identity store {path}: {message}")]
    CorruptStore { path: PathBuf, message: String },
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("user_id must not be empty")]
    EmptyUserId,
    #[error("name must not be empty")]
    EmptyName,
    #[error("multiple faces detected ({count}); enrollment requires exactly one")]
    MultipleFacesDetected { count: usize },
    #[error("image payload could not be decoded: {0}")]
    InvalidImage(String),
    #[error("face region {0:?} does not overlap the image")]
    InvalidFaceRegion(BoundingBox),
    #[error("decision threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),
    #[error("user id '{0}' already exists")]
    DuplicateIdentity(String),
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error("corrupt identity store: {0}")]
    CorruptStore(String),
    #[error("extractor produced an invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("face locator failed: {0}")]
    Locator(#[source] CapabilityError),
    #[error("embedding extractor failed: {0}")]
    Extractor(#[source] CapabilityError),
    #[error("identity store failure: {0}")]
    Storage(#[source] StoreError),
    #[error("identity store lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::EmptyUserId
            | EngineError::EmptyName
            | EngineError::MultipleFacesDetected { .. }
            | EngineError::InvalidImage(_)
            | EngineError::InvalidFaceRegion(_)
            | EngineError::InvalidThreshold(_) => ErrorKind::Validation,
            EngineError::DuplicateIdentity(_) => ErrorKind::Conflict,
            EngineError::DimensionMismatch(_)
            | EngineError::CorruptStore(_)
            | EngineError::InvalidEmbedding(_) => ErrorKind::Integrity,
            EngineError::Locator(_)
            | EngineError::Extractor(_)
            | EngineError::Storage(_)
            | EngineError::LockPoisoned => ErrorKind::Infrastructure,
        }
    }

    /// Emit this error at the severity its kind calls for.
    pub(crate) fn log(&self, operation: &'static str) {
        match self.kind() {
            ErrorKind::Integrity => tracing::error!(operation, error = %self, "integrity failure"),
            ErrorKind::Infrastructure => {
                tracing::warn!(operation, error = %self, "infrastructure failure")
            }
            ErrorKind::Validation | ErrorKind::Conflict => {
                tracing::info!(operation, error = %self, "request rejected")
            }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateIdentity(user_id) => EngineError::DuplicateIdentity(user_id),
            StoreError::DimensionMismatch(mismatch) => EngineError::DimensionMismatch(mismatch),
            StoreError::CorruptStore { path, message } => {
                EngineError::CorruptStore(format!("{}: {message}", path.display()))
            }
            other => EngineError::Storage(other),
        }
    }
}
