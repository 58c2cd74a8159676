//! Errors surfaced by attendance operations and their HTTP mapping.
//!
//! Every failure leaves the API as `{status:false, message, error?}`; 5xx
//! responses never carry internal detail.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::photo::{IngestError, StorageError};
use crate::store::StoreError;

/// Field name -> messages, in the shape clients already render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), AttendanceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AttendanceError::Validation(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Validation failed")]
    Validation(ValidationErrors),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Forbidden: You do not have access")]
    Forbidden,

    #[error("Already checked in today")]
    AlreadyCheckedIn,

    #[error("Already checked out today")]
    AlreadyCheckedOut,

    #[error("No check-in found for today")]
    NotCheckedIn,

    #[error("Failed to store attendance photo")]
    PhotoPersistFailure(#[source] IngestError),

    #[error("Photo not found")]
    PhotoNotFound,

    #[error("Photo storage unavailable")]
    PhotoUnavailable(#[source] StorageError),

    #[error("Attendance store unavailable")]
    Store(#[from] StoreError),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Validation(_) => "validation_failed",
            AttendanceError::Unauthorized(_) => "unauthorized",
            AttendanceError::Forbidden => "forbidden",
            AttendanceError::AlreadyCheckedIn => "already_checked_in",
            AttendanceError::AlreadyCheckedOut => "already_checked_out",
            AttendanceError::NotCheckedIn => "not_checked_in",
            AttendanceError::PhotoPersistFailure(_) => "photo_persist_failure",
            AttendanceError::PhotoNotFound => "photo_not_found",
            AttendanceError::PhotoUnavailable(_) => "photo_unavailable",
            AttendanceError::Store(_) => "store_failure",
        }
    }
}

impl From<IngestError> for AttendanceError {
    fn from(e: IngestError) -> Self {
        AttendanceError::PhotoPersistFailure(e)
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AttendanceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AttendanceError::Forbidden => StatusCode::FORBIDDEN,
            AttendanceError::AlreadyCheckedIn | AttendanceError::AlreadyCheckedOut => {
                StatusCode::BAD_REQUEST
            }
            AttendanceError::NotCheckedIn | AttendanceError::PhotoNotFound => {
                StatusCode::NOT_FOUND
            }
            AttendanceError::PhotoPersistFailure(_)
            | AttendanceError::PhotoUnavailable(_)
            | AttendanceError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AttendanceError::Validation(fields) => json!({
                "status": false,
                "message": self.to_string(),
                "error": fields,
            }),
            AttendanceError::PhotoUnavailable(source) => {
                error!(error = %source, "Photo read failure");
                json!({
                    "status": false,
                    "message": self.to_string(),
                    "error": self.code(),
                })
            }
            AttendanceError::PhotoPersistFailure(source) => {
                error!(error = %source, "Photo persist failure");
                json!({
                    "status": false,
                    "message": self.to_string(),
                    "error": self.code(),
                })
            }
            AttendanceError::Store(source) => {
                error!(error = %source, "Store failure");
                json!({
                    "status": false,
                    "message": "Internal Server Error",
                    "error": self.code(),
                })
            }
            _ => json!({
                "status": false,
                "message": self.to_string(),
                "error": self.code(),
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
