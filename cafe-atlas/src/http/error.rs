use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::{PasswordError, TokenError};
use crate::db::RepositoryError;
use crate::uploads::UploadError;
use crate::validation::ValidationReport;

pub const CAFE_NOT_FOUND: &str = "Sorry, a cafe with that id was not found in the database.";
pub const RATE_LIMITED: &str = "Rate limit exceeded! Please try again later.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("validation failed")]
    Validation(ValidationReport),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("cafe not found")]
    CafeNotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnsupportedMediaType(&'static str),
    #[error("Upload is too large.")]
    PayloadTooLarge,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::CafeNotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(report) => json!({
                "message": "Validation failed. Check the submitted fields.",
                "errors": report,
            }),
            ApiError::CafeNotFound => json!({ "error": { "Not Found": CAFE_NOT_FOUND } }),
            ApiError::RateLimited => json!({ "message": RATE_LIMITED }),
            ApiError::Internal => json!({ "message": "Internal server error." }),
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Failure of a server-rendered page: either a bounce to the login form or an API-style error.
#[derive(Debug)]
pub enum PageError {
    LoginRequired { next: String },
    Api(ApiError),
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::LoginRequired { next } => {
                let target = utf8_percent_encode(&next, NON_ALPHANUMERIC);
                Redirect::to(&format!("/login?next={target}")).into_response()
            }
            PageError::Api(err) => err.into_response(),
        }
    }
}

impl From<ApiError> for PageError {
    fn from(err: ApiError) -> Self {
        PageError::Api(err)
    }
}

impl From<RepositoryError> for PageError {
    fn from(err: RepositoryError) -> Self {
        PageError::Api(err.into())
    }
}

impl From<PasswordError> for PageError {
    fn from(err: PasswordError) -> Self {
        PageError::Api(err.into())
    }
}

impl From<UploadError> for PageError {
    fn from(err: UploadError) -> Self {
        PageError::Api(err.into())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(value) => {
                ApiError::Conflict(format!("'{value}' already exists in the database."))
            }
            other => {
                error!(error = %other, "database operation failed");
                ApiError::Internal
            }
        }
    }
}

/// Maps a cafe name collision to its 409 message; other failures as usual.
pub fn cafe_conflict(err: RepositoryError) -> ApiError {
    match err {
        RepositoryError::Conflict(name) => {
            ApiError::Conflict(format!("Cafe '{name}' already exists in the database."))
        }
        other => other.into(),
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        error!(error = %err, "password hashing failed");
        ApiError::Internal
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        error!(error = %err, "storing upload failed");
        ApiError::Internal
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::Unauthorized("Token has expired! Please login again."),
            TokenError::Invalid => ApiError::Unauthorized("Token is invalid!"),
            TokenError::Signing => {
                error!("token signing failed");
                ApiError::Internal
            }
        }
    }
}
