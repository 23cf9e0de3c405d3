use axum::extract::FromRequestParts;
use axum::http::request;
use pickperfect_auth::gate;
use tower_cookies::Cookies;

use crate::SharedState;
use crate::error::{InternalServerSnafu, RequestError};

/// Identity of a request that passed the session gate
///
/// Extracting it runs the gate, so a handler taking it as its first argument
/// never runs for requests without a valid session.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub email: String,
}

impl FromRequestParts<SharedState> for AuthenticatedUser {
    type Rejection = RequestError;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(req, state)
            .await
            .map_err(|(_, msg)| InternalServerSnafu { msg }.build())?;

        let claims = gate::verify(&cookies, &state.session_keys, state.clock.as_ref())?;

        Ok(Self {
            email: claims.email,
        })
    }
}
