use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Dataset not found")]
    DatasetNotFound { dataset_id: String },

    #[error("No datasets uploaded yet")]
    NoDatasets,

    #[error("{message}")]
    InvalidUpload { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("Invalid registration data")]
    FieldErrors { errors: BTreeMap<String, Vec<String>> },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication credentials were not provided.")]
    Unauthenticated,

    #[error("Error analyzing CSV: {message}")]
    Analysis { message: String },

    #[error("Error generating report: {message}")]
    Report { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DatasetNotFound { .. } | ServiceError::NoDatasets => {
                StatusCode::NOT_FOUND
            }
            ServiceError::InvalidUpload { .. }
            | ServiceError::Validation { .. }
            | ServiceError::BadRequest { .. }
            | ServiceError::FieldErrors { .. } => StatusCode::BAD_REQUEST,
            ServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServiceError::Unauthenticated => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<diesel::result::Error> for ServiceError {
    fn from(err: diesel::result::Error) -> Self {
        ServiceError::Database {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = match self {
            ServiceError::FieldErrors { errors } => json!({ "errors": errors }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(
            ServiceError::Validation {
                message: "Missing required columns: Type".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Unauthenticated.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::DatasetNotFound {
                dataset_id: "7".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Analysis {
                message: "empty".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn analysis_message_carries_prefix() {
        let err = ServiceError::Analysis {
            message: "no rows".into(),
        };
        assert_eq!(err.to_string(), "Error analyzing CSV: no rows");
    }
}
