use pickperfect_util_error::FmtCompact as _;
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use tracing::{debug, info};

use crate::LOG_TARGET;
use crate::clock::Clock;
use crate::identity::{IdentityError, IdentityVerifier};
use crate::session::{SessionClaims, SessionKeys, SessionToken, SessionTokenError};

#[derive(Debug, Snafu)]
pub enum ExchangeError {
    #[snafu(display("Identity token is empty"))]
    EmptyToken,
    #[snafu(display("Identity token not accepted"))]
    Identity { source: IdentityError },
    #[snafu(display("Identity {uid} has no email"))]
    MissingEmail { uid: String },
    #[snafu(display("Could not sign session token"))]
    Sign { source: SessionTokenError },
}
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// A freshly minted session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SessionToken,
    pub claims: SessionClaims,
}

/// Trade an identity token from the external provider for a session token
pub async fn exchange(
    verifier: &dyn IdentityVerifier,
    keys: &SessionKeys,
    clock: &dyn Clock,
    identity_token: &str,
) -> ExchangeResult<IssuedSession> {
    ensure!(!identity_token.trim().is_empty(), EmptyTokenSnafu);

    let identity = verifier
        .verify_identity_token(identity_token)
        .await
        .inspect_err(|err| {
            debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Identity token rejected");
        })
        .context(IdentitySnafu)?;

    let email = identity
        .email
        .filter(|email| !email.is_empty())
        .context(MissingEmailSnafu {
            uid: identity.uid.clone(),
        })?;

    let (token, claims) = keys.issue(&email, clock.now()).context(SignSnafu)?;
    info!(target: LOG_TARGET, uid = %identity.uid, email = %claims.email, "Issued session");

    Ok(IssuedSession { token, claims })
}
