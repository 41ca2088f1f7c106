use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors surfaced by the account controllers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("invalid refresh token")]
    InvalidToken,
    #[error("refresh token is expired or used")]
    TokenExpiredOrReused,
    #[error("{0}")]
    Upload(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Upload(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) | Self::InvalidToken | Self::TokenExpiredOrReused => {
                StatusCode::UNAUTHORIZED
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(e).context("database"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    message: String,
    success: bool,
    errors: Vec<String>,
    data: Option<()>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Internal(ref e) = self {
            tracing::error!(error = ?e, "internal error");
        }
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.to_string(),
            success: false,
            errors: Vec::new(),
            data: None,
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error(error: AppError, expected_status: StatusCode, expected_message: &str) {
        let resp = error.into_response();
        assert_eq!(resp.status(), expected_status);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["statusCode"], expected_status.as_u16());
        assert_eq!(json["message"], expected_message);
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"], serde_json::json!([]));
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn validation_is_bad_request() {
        assert_error(
            AppError::Validation("All fields are required".into()),
            StatusCode::BAD_REQUEST,
            "All fields are required",
        )
        .await;
    }

    #[tokio::test]
    async fn conflict_and_not_found() {
        assert_error(
            AppError::Conflict("User already exists".into()),
            StatusCode::CONFLICT,
            "User already exists",
        )
        .await;
        assert_error(
            AppError::NotFound("User not found".into()),
            StatusCode::NOT_FOUND,
            "User not found",
        )
        .await;
    }

    #[tokio::test]
    async fn token_errors_are_unauthorized() {
        assert_error(
            AppError::InvalidToken,
            StatusCode::UNAUTHORIZED,
            "invalid refresh token",
        )
        .await;
        assert_error(
            AppError::TokenExpiredOrReused,
            StatusCode::UNAUTHORIZED,
            "refresh token is expired or used",
        )
        .await;
    }

    #[tokio::test]
    async fn internal_hides_detail() {
        assert_error(
            AppError::Internal(anyhow::anyhow!("connection reset by peer")),
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error",
        )
        .await;
    }
}
