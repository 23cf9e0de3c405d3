mod auth;
mod queries;
mod recommendations;
mod session;

use axum::Router;
use axum::extract::FromRequest;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use pickperfect_core::DocumentId;
use serde::Serialize;
use snafu::ResultExt as _;

pub use self::session::AuthenticatedUser;
use super::SharedState;
use super::error::{InvalidIdSnafu, RequestError, RequestResult, UserRequestError};

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(RequestError))]
pub struct AppJson<T>(pub T);

impl<T> IntoResponse for AppJson<T>
where
    axum::Json<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub(crate) fn parse_id(id: &str) -> RequestResult<DocumentId> {
    Ok(id.parse::<DocumentId>().context(InvalidIdSnafu)?)
}

pub async fn not_found() -> Response {
    (&UserRequestError::NotFound).into_response()
}

pub fn route_handler(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/jwt", post(auth::post_jwt))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/allqueries", get(queries::list).post(queries::create))
        .route(
            "/allqueries/{id}",
            put(queries::update)
                .patch(queries::recommend)
                .delete(queries::delete),
        )
        .route("/allqueries/{id}/decrement", patch(queries::unrecommend))
        .route(
            "/recommendation",
            get(recommendations::list).post(recommendations::create),
        )
        .route("/recommendation/{id}", delete(recommendations::delete))
        .fallback(not_found)
        .with_state(state)
}

async fn root() -> &'static str {
    "Backend is running"
}
