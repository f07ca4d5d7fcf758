use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error raised by the ticketing core.
///
/// Each variant carries one of the five wire kinds reported to callers;
/// `Database` and `Internal` both surface as `InternalError`.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl TicketError {
    /// Stable kind string used in RPC error maps and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TicketError::Validation(_) => "ValidationError",
            TicketError::NotFound(_) => "NotFound",
            TicketError::InvalidTransition(_) => "InvalidTransition",
            TicketError::Conflict(_) => "Conflict",
            TicketError::Database(_) | TicketError::Internal(_) => "InternalError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            TicketError::Validation(_) => StatusCode::BAD_REQUEST,
            TicketError::NotFound(_) => StatusCode::NOT_FOUND,
            TicketError::InvalidTransition(_) | TicketError::Conflict(_) => StatusCode::CONFLICT,
            TicketError::Database(_) | TicketError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        (self.status_code(), axum::Json(body)).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for TicketError {
    fn from(rej: axum::extract::rejection::JsonRejection) -> Self {
        TicketError::Validation(rej.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TicketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(TicketError::Validation("x".into()).kind(), "ValidationError");
        assert_eq!(TicketError::NotFound("x".into()).kind(), "NotFound");
        assert_eq!(
            TicketError::InvalidTransition("x".into()).kind(),
            "InvalidTransition"
        );
        assert_eq!(TicketError::Conflict("x".into()).kind(), "Conflict");
        assert_eq!(
            TicketError::Internal(anyhow::anyhow!("boom")).kind(),
            "InternalError"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            TicketError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TicketError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            TicketError::InvalidTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            TicketError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            TicketError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
