use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use crate::config::AppConfig;

/// Error taxonomy for the whole API. Handlers propagate these with `?`;
/// the `IntoResponse` impl is the single boundary that turns any failure
/// into a JSON body.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("user already exists")]
    AlreadyExists,
    #[error("invalid email/phone number or password")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("not authorized as admin")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("internal server error")]
    Internal {
        #[source]
        source: anyhow::Error,
        redact: bool,
    },
}

impl AppError {
    /// Wrap an infrastructure failure. The diagnostic chain is exposed in
    /// the response body only outside production.
    pub fn internal(err: impl Into<anyhow::Error>, config: &AppConfig) -> Self {
        Self::Internal {
            source: err.into(),
            redact: config.production,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = match self {
            AppError::Internal { source, redact } => {
                error!(error = ?source, "internal error");
                ErrorBody {
                    message: "internal server error".into(),
                    stack: Some(if redact {
                        "☃️".into()
                    } else {
                        format!("{source:?}")
                    }),
                }
            }
            other => ErrorBody {
                message: other.to_string(),
                stack: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Whether an error from the store is a Postgres unique-constraint
/// violation (code 23505). The constraint is the authoritative duplicate
/// check; callers translate this into `AlreadyExists`.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| match e {
            sqlx::Error::Database(db) => db.code().map(|c| c == "23505"),
            _ => None,
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn test_config(production: bool) -> AppConfig {
        AppConfig {
            port: 0,
            database_url: "postgres://localhost/test".into(),
            jwt_secret: "test".into(),
            production,
            upload_dir: "uploads".into(),
        }
    }

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_codes_follow_taxonomy() {
        let (s, _) = body_json(AppError::validation("bad input")).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        let (s, _) = body_json(AppError::AlreadyExists).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        let (s, _) = body_json(AppError::InvalidCredentials).await;
        assert_eq!(s, StatusCode::UNAUTHORIZED);
        let (s, _) = body_json(AppError::Unauthenticated("not authorized, no token")).await;
        assert_eq!(s, StatusCode::UNAUTHORIZED);
        let (s, _) = body_json(AppError::Forbidden).await;
        assert_eq!(s, StatusCode::FORBIDDEN);
        let (s, _) = body_json(AppError::NotFound("user not found".into())).await;
        assert_eq!(s, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_error_redacted_in_production() {
        let err = AppError::internal(anyhow::anyhow!("db exploded"), &test_config(true));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["stack"], "☃️");
        assert!(!body["message"].as_str().unwrap().contains("db exploded"));
    }

    #[tokio::test]
    async fn internal_error_carries_trace_in_development() {
        let err = AppError::internal(anyhow::anyhow!("db exploded"), &test_config(false));
        let (_, body) = body_json(err).await;
        assert!(body["stack"].as_str().unwrap().contains("db exploded"));
    }

    #[tokio::test]
    async fn taxonomy_errors_omit_stack() {
        let (_, body) = body_json(AppError::AlreadyExists).await;
        assert!(body.get("stack").is_none());
        assert_eq!(body["message"], "user already exists");
    }

    #[test]
    fn login_failures_are_indistinguishable() {
        // Unknown identifier and wrong password share one variant, so the
        // message and status can never diverge between the two causes.
        assert_eq!(
            AppError::InvalidCredentials.to_string(),
            "invalid email/phone number or password"
        );
    }
}
