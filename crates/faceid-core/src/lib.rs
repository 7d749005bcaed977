//! faceid-core — Face identity recognition engine.
//!
//! Turns a face image into an embedding through pluggable locator and
//! extractor capabilities, keeps enrolled identities in a SQLite-backed
//! store, and decides matches by cosine similarity against a threshold.

pub mod capability;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod preprocess;
pub mod report;
pub mod store;
pub mod types;

pub use capability::{EmbeddingExtractor, FaceLocator, InputSpec};
pub use engine::{
    AuthOutcome, DecisionThreshold, EnrollOutcome, RecognitionEngine, DEFAULT_DECISION_THRESHOLD,
};
pub use error::{CapabilityError, DimensionMismatch, EngineError, ErrorKind, StoreError};
pub use matcher::{BestMatch, CosineMatcher, Matcher};
pub use preprocess::NormalizedCrop;
pub use report::{AuthResult, EngineStatus, EnrollResult, IdentitySummary};
pub use store::IdentityStore;
pub use types::{BoundingBox, Embedding, EnrollmentRecord, DEFAULT_ROLE};
