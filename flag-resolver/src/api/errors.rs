use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::persistence::PersistenceError;

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("failed to persist flags: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("flag {0} is not defined")]
    UnknownFlag(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}

impl FlagError {
    fn error_metadata(&self) -> (&'static str, StatusCode) {
        match self {
            FlagError::Persistence(_) => ("persistence_unavailable", StatusCode::SERVICE_UNAVAILABLE),
            FlagError::UnknownFlag(_) => ("unknown_flag", StatusCode::NOT_FOUND),
        }
    }
}

impl IntoResponse for FlagError {
    fn into_response(self) -> Response {
        let (code, status) = self.error_metadata();
        if status.is_server_error() {
            tracing::error!("failed to handle flag request: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                code,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_errors_are_unavailable() {
        let error = FlagError::from(PersistenceError::Unavailable("down".to_string()));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unknown_flag_is_not_found() {
        let response = FlagError::UnknownFlag("ghost".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
