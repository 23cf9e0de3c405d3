//! The check run in front of every protected route.
//!
//! Independent of the web framework: anything implementing [`CookieLookup`]
//! can be verified.

use pickperfect_util_error::FmtCompact as _;
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tracing::debug;

use crate::LOG_TARGET;
use crate::clock::Clock;
use crate::cookie::{CookieLookup, SESSION_COOKIE_NAME};
use crate::session::{SessionClaims, SessionKeys, SessionTokenError};

#[derive(Debug, Snafu)]
pub enum GateError {
    /// No session cookie: the client needs to log in
    #[snafu(display("No session cookie"))]
    Unauthenticated,
    /// Session cookie present but not acceptable: the client needs to log in again
    #[snafu(display("Invalid session token"))]
    Forbidden { source: SessionTokenError },
}
pub type GateResult<T> = std::result::Result<T, GateError>;

pub fn verify(
    cookies: &impl CookieLookup,
    keys: &SessionKeys,
    clock: &dyn Clock,
) -> GateResult<SessionClaims> {
    let token = cookies
        .cookie_value(SESSION_COOKIE_NAME)
        .filter(|value| !value.is_empty())
        .context(UnauthenticatedSnafu)?;

    keys.verify(&token, clock.now())
        .inspect_err(|err| {
            debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Rejected session token");
        })
        .context(ForbiddenSnafu)
}
