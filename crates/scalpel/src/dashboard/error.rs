use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crate::dedupe::DedupeError;
use crate::inventory::{ReconcileError, ScanError};
use scalpel_db::DbError;
use serde_json::json;
use tracing::error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    ResourceNotFound(String),
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg) | AppError::ResourceNotFound(msg) | AppError::Conflict(msg) => {
                msg
            }
            AppError::InternalServerError(err) => {
                error!(error = ?err, "Request failed");
                err.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        if err.is_constraint_violation() {
            return AppError::Conflict(err.to_string());
        }
        match err {
            DbError::NotFound(_) => AppError::ResourceNotFound(err.to_string()),
            DbError::InvalidInput(_) | DbError::ReadOnlyViolation(_) => {
                AppError::BadRequest(err.to_string())
            }
            other => AppError::InternalServerError(other.into()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Db(e) => e.into(),
            ReconcileError::Scan(
                e @ (ScanError::RootNotFound(_) | ScanError::RootNotADirectory(_)),
            ) => AppError::ResourceNotFound(e.to_string()),
            other => AppError::InternalServerError(other.into()),
        }
    }
}

impl From<DedupeError> for AppError {
    fn from(err: DedupeError) -> Self {
        AppError::ResourceNotFound(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalServerError(err.into())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::InternalServerError(err.into())
    }
}
