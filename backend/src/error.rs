use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::json;
use thiserror::Error;

pub type MarketResult<T> = std::result::Result<T, MarketError>;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("cannot purchase your own advertisement")]
    SelfPurchase,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::InvalidState(_) => StatusCode::BAD_REQUEST,
            MarketError::SelfPurchase => StatusCode::BAD_REQUEST,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MarketError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MarketError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            MarketError::NotFound(_) => "not_found",
            MarketError::InvalidState(_) => "invalid_state",
            MarketError::SelfPurchase | MarketError::Forbidden(_) => "forbidden",
            MarketError::Conflict(_) => "conflict",
            MarketError::Unauthorized(_) => "unauthorized",
            MarketError::Validation(_) => "validation_error",
            MarketError::Database(_) => "database_error",
            MarketError::Pool(_) => "database_error",
            MarketError::Internal(_) => "internal_error",
        }
    }

    /// Maps a unique-constraint violation to `Conflict`, passing other errors through.
    pub fn unique_violation(err: DieselError, message: &str) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                MarketError::Conflict(message.to_string())
            }
            other => MarketError::Database(other),
        }
    }
}

impl From<validator::ValidationErrors> for MarketError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        MarketError::Validation(messages.join("; "))
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            MarketError::Database(_) | MarketError::Pool(_) | MarketError::Internal(_) => {
                log::error!("Request failed: {}", self);
            }
            _ => log::warn!("Request rejected: {}", self),
        }

        let body = Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        }));
        (status, body).into_response()
    }
}
