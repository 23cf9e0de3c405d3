use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pickperfect_auth::{ExchangeError, GateError};
use pickperfect_core::InvalidDocumentIdError;
use pickperfect_db::DbError;
use pickperfect_util_error::FmtCompact as _;
use serde::Serialize;
use snafu::Snafu;
use tracing::{debug, info, warn};

use super::routes::AppJson;
use crate::LOG_TARGET;

/// Error by the user
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum UserRequestError {
    #[snafu(display("Not Found"))]
    NotFound,
    #[snafu(display("Invalid id"))]
    InvalidId { source: InvalidDocumentIdError },
    #[snafu(display("Too many requests, please try again later."))]
    TooManyRequests,
}

impl IntoResponse for &UserRequestError {
    fn into_response(self) -> Response {
        let status_code = match self {
            UserRequestError::NotFound => StatusCode::NOT_FOUND,
            UserRequestError::InvalidId { .. } => StatusCode::BAD_REQUEST,
            UserRequestError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        };
        (
            status_code,
            AppJson(UserErrorResponse {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

// How we want user errors responses to be serialized
#[derive(Serialize)]
pub struct UserErrorResponse {
    pub message: String,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RequestError {
    #[snafu(transparent)]
    Gate { source: GateError },
    #[snafu(transparent)]
    Exchange { source: ExchangeError },
    #[snafu(transparent)]
    Db { source: DbError },
    #[snafu(transparent)]
    Json { source: JsonRejection },
    #[snafu(transparent)]
    User { source: UserRequestError },
    #[snafu(display("InternalServerError: {msg}"))]
    InternalServerError { msg: &'static str },
}
pub type RequestResult<T> = std::result::Result<T, RequestError>;

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        debug!(
            target: LOG_TARGET,
            err = %self.fmt_compact(),
            "Request Error"
        );

        let (status_code, message) = match self {
            RequestError::User { source } => return (&source).into_response(),
            RequestError::Gate {
                source: GateError::Unauthenticated,
            } => (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned()),
            RequestError::Gate {
                source: GateError::Forbidden { .. },
            } => (StatusCode::FORBIDDEN, "Forbidden".to_owned()),
            RequestError::Exchange { source } => {
                info!(
                    target: LOG_TARGET,
                    err = %source.fmt_compact(),
                    "Token exchange failed"
                );
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned())
            }
            RequestError::Json { source } => {
                let status_code = match source {
                    JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status_code, source.body_text())
            }
            RequestError::Db { source } if source.is_user_error() => {
                (StatusCode::BAD_REQUEST, source.to_string())
            }
            err => {
                warn!(
                    target: LOG_TARGET,
                    err = %err.fmt_compact(),
                    "Unexpected Request Error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Service Error".to_owned(),
                )
            }
        };

        (status_code, AppJson(UserErrorResponse { message })).into_response()
    }
}
