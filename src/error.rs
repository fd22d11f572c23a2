use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::fmt::Display;

use crate::publishing::workflow::WorkflowError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", "resource not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn dependency<E: Display>(error: E) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "dependency_error", error.to_string())
    }

    pub fn timeout() -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "timeout",
            "request deadline exceeded",
        )
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            error.to_string(),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        // Server-side failures are logged in full inside the request span and
        // answered with a generic message.
        let message = if status.is_server_error() {
            tracing::error!(%status, code = self.code, error = %self.message, "request failed");
            match status {
                StatusCode::GATEWAY_TIMEOUT => self.message,
                StatusCode::BAD_GATEWAY => "database unavailable".to_string(),
                _ => "internal server error".to_string(),
            }
        } else {
            self.message
        };
        let body = Json(ErrorResponse {
            error: message,
            code: self.code,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

/// Maps a unique violation to a conflict carrying `message`; everything else
/// goes through the generic conversion.
pub fn unique_conflict(message: &'static str) -> impl Fn(DieselError) -> AppError {
    move |err| match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::conflict(message)
        }
        other => AppError::from(other),
    }
}

impl From<DieselError> for AppError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::NotFound => AppError::not_found(),
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => {
                    AppError::conflict(format!("duplicate record: {}", info.message()))
                }
                DatabaseErrorKind::ForeignKeyViolation => {
                    AppError::conflict(format!("referential conflict: {}", info.message()))
                }
                DatabaseErrorKind::CheckViolation | DatabaseErrorKind::NotNullViolation => {
                    AppError::validation(info.message().to_string())
                }
                _ if info.message().contains("statement timeout") => AppError::timeout(),
                _ => AppError::dependency(info.message()),
            },
            DieselError::BrokenTransactionManager => {
                AppError::dependency("database transaction state is broken")
            }
            other => AppError::internal(other),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::IllegalTransition { .. } => AppError::conflict(value.to_string()),
            WorkflowError::NotEditable(_) => AppError::conflict(value.to_string()),
            WorkflowError::Precondition(_) => AppError::validation(value.to_string()),
            WorkflowError::SelfApproval => AppError::forbidden(value.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}
