use axum::extract::State;
use pickperfect_auth::exchange;
use pickperfect_util_error::FmtCompact as _;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use tracing::debug;

use super::{AppJson, AuthenticatedUser, MessageResponse, SuccessResponse};
use crate::error::{RequestError, RequestResult};
use crate::{LOG_TARGET, SharedState};

#[derive(Deserialize)]
pub struct JwtInput {
    /// Identity token from the external provider; anything but a string
    /// counts as no token
    #[serde(default)]
    token: serde_json::Value,
}

/// Token exchange
///
/// A body that isn't usable JSON is treated like a missing token, so every
/// failure here is a plain 401.
pub async fn post_jwt(
    state: State<SharedState>,
    cookies: Cookies,
    input: Result<AppJson<JwtInput>, RequestError>,
) -> RequestResult<AppJson<SuccessResponse>> {
    let input = match input {
        Ok(AppJson(input)) => Some(input),
        Err(err) => {
            debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Unusable token exchange body");
            None
        }
    };
    let identity_token = input
        .as_ref()
        .and_then(|input| input.token.as_str())
        .unwrap_or_default();

    let issued = exchange(
        state.identity_verifier.as_ref(),
        &state.session_keys,
        state.clock.as_ref(),
        identity_token,
    )
    .await?;

    cookies.add(state.cookie_policy.session_cookie(&issued.token));

    Ok(AppJson(SuccessResponse { success: true }))
}

/// Drops the session cookie on the client
///
/// The token itself stays valid until it expires.
pub async fn logout(state: State<SharedState>, cookies: Cookies) -> AppJson<MessageResponse> {
    cookies.add(state.cookie_policy.removal_cookie());
    debug!(target: LOG_TARGET, "Session cookie cleared");

    AppJson(MessageResponse {
        message: "Logged out successfully.",
    })
}

#[derive(Serialize)]
pub struct MeResponse {
    email: String,
}

pub async fn me(user: AuthenticatedUser) -> AppJson<MeResponse> {
    AppJson(MeResponse { email: user.email })
}
