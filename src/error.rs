use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// One offending input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("upload failed: {0}")]
    Upload(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self::Validation {
            message: message.into(),
            errors,
        }
    }

    pub fn invalid_field(field: &str, message: &str) -> Self {
        Self::validation(
            format!("{field} {message}"),
            vec![FieldError::new(field, message)],
        )
    }

    pub fn duplicate(field: &str) -> Self {
        Self::invalid_field(field, "is already taken")
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upload(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub errors: Vec<FieldError>,
    pub data: Option<()>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, errors) = match self {
            AppError::Validation { message, errors } => (message, errors),
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                ("Something went wrong".to_string(), Vec::new())
            }
            AppError::Upload(reason) => {
                error!(%reason, "upload failed");
                (format!("upload failed: {reason}"), Vec::new())
            }
            other => (other.to_string(), Vec::new()),
        };

        let body = ErrorEnvelope {
            success: false,
            status_code: status.as_u16(),
            message,
            errors,
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation(rejection.body_text(), Vec::new())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation(rejection.body_text(), Vec::new())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::validation(rejection.body_text(), Vec::new())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::validation(err.body_text(), Vec::new())
        }
    }
}

fn field_from_constraint(constraint: &str) -> &str {
    constraint
        .strip_prefix("users_")
        .or_else(|| constraint.strip_prefix("videos_"))
        .unwrap_or(constraint)
        .trim_end_matches("_key")
        .trim_end_matches("_fkey")
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    let field = db_err
                        .constraint()
                        .map(field_from_constraint)
                        .unwrap_or("record");
                    return AppError::duplicate(field);
                }
                // foreign_key_violation
                Some("23503") => {
                    return AppError::invalid_field("owner", "must reference an existing user");
                }
                _ => {}
            }
        }
        AppError::Internal(anyhow::Error::new(err).context("database"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_error_renders_envelope_with_field_list() {
        let (status, json) = body_json(AppError::duplicate("username")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["status_code"], 400);
        assert_eq!(json["errors"][0]["field"], "username");
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let (status, json) =
            body_json(AppError::Internal(anyhow::anyhow!("pool exploded"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "Something went wrong");
    }

    #[test]
    fn constraint_names_map_to_fields() {
        assert_eq!(field_from_constraint("users_email_key"), "email");
        assert_eq!(field_from_constraint("users_username_key"), "username");
        assert_eq!(field_from_constraint("videos_owner_id_fkey"), "owner_id");
    }
}
