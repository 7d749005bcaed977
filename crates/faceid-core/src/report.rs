//! Serializable results handed to callers outside the process.
//!
//! Every engine result, including errors, maps to one of these, so a
//! transport never has to invent its own failure shape.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{AuthOutcome, EnrollOutcome};
use crate::error::{EngineError, ErrorKind};
use crate::types::EnrollmentRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Why an authentication did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthReason {
    NoFaceDetected,
    NoEnrolledUsers,
    BelowThreshold,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthResult {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Best similarity seen; 0.0 when no comparison ran.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AuthReason>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl AuthResult {
    pub fn from_result(result: &Result<AuthOutcome, EngineError>) -> Self {
        let base = AuthResult {
            authenticated: false,
            user_id: None,
            name: None,
            role: None,
            confidence: 0.0,
            reason: None,
            message: String::new(),
            timestamp: Utc::now(),
            error: None,
        };

        match result {
            Ok(AuthOutcome::Authenticated {
                user_id,
                name,
                role,
                confidence,
            }) => AuthResult {
                authenticated: true,
                message: format!("Authenticated as {name}"),
                user_id: Some(user_id.clone()),
                name: Some(name.clone()),
                role: Some(role.clone()),
                confidence: *confidence,
                ..base
            },
            Ok(AuthOutcome::Rejected { confidence, .. }) => AuthResult {
                confidence: *confidence,
                reason: Some(AuthReason::BelowThreshold),
                message: "Face not recognized or confidence too low".into(),
                ..base
            },
            Ok(AuthOutcome::NoFaceDetected) => AuthResult {
                reason: Some(AuthReason::NoFaceDetected),
                message: "No face detected in the image".into(),
                ..base
            },
            Ok(AuthOutcome::NoEnrolledUsers) => AuthResult {
                reason: Some(AuthReason::NoEnrolledUsers),
                message: "No users enrolled in the system".into(),
                ..base
            },
            Err(err) => AuthResult {
                reason: Some(AuthReason::Error),
                message: format!("Error during authentication: {err}"),
                error: Some(err.into()),
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl EnrollResult {
    pub fn from_result(result: &Result<EnrollOutcome, EngineError>) -> Self {
        let failed = |message: String, error: Option<ErrorReport>| EnrollResult {
            success: false,
            message,
            user_id: None,
            enrolled_at: None,
            error,
        };

        match result {
            Ok(EnrollOutcome::Enrolled(record)) => EnrollResult {
                success: true,
                message: format!(
                    "User '{}' enrolled successfully with ID '{}'",
                    record.name, record.user_id
                ),
                user_id: Some(record.user_id.clone()),
                enrolled_at: Some(record.enrolled_at),
                error: None,
            },
            Ok(EnrollOutcome::NoFaceDetected) => {
                failed("No face detected in the image".into(), None)
            }
            Err(err @ EngineError::MultipleFacesDetected { .. }) => failed(
                "Multiple faces detected. Please provide an image with only one face.".into(),
                Some(err.into()),
            ),
            Err(err @ EngineError::DuplicateIdentity(user_id)) => failed(
                format!("User ID '{user_id}' already exists. Please choose a different ID."),
                Some(err.into()),
            ),
            Err(err) => failed(format!("Error during enrollment: {err}"), Some(err.into())),
        }
    }
}

/// Enrolled identity without its embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySummary {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub enrolled_at: DateTime<Utc>,
}

impl From<&EnrollmentRecord> for IdentitySummary {
    fn from(record: &EnrollmentRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            name: record.name.clone(),
            role: record.role.clone(),
            enrolled_at: record.enrolled_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub enrolled: usize,
    pub dimension: usize,
    pub threshold: f32,
    pub model_version: String,
    pub store_path: String,
}
