use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu, ensure};
use time::{Duration, OffsetDateTime};

/// Lifetime of a session token (and of the cookie carrying it)
pub const SESSION_TTL: Duration = Duration::hours(1);

/// Secret used to sign and verify session tokens
#[derive(Clone)]
pub struct SessionSecret(Vec<u8>);

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("Session secret must not be empty"))]
pub struct SessionSecretError;

impl SessionSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SessionSecretError> {
        let bytes = bytes.into();
        ensure!(!bytes.is_empty(), SessionSecretSnafu);
        Ok(Self(bytes))
    }
}

impl FromStr for SessionSecret {
    type Err = SessionSecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.as_bytes())
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    /// Issued at, unix seconds
    pub iat: i64,
    /// Expires at, unix seconds
    pub exp: i64,
}

/// A signed session token (compact JWT)
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

#[derive(Debug, Snafu)]
pub enum SessionTokenError {
    #[snafu(display("Failed to sign session token"))]
    Sign { source: jsonwebtoken::errors::Error },
    #[snafu(display("Session token is invalid"))]
    Invalid { source: jsonwebtoken::errors::Error },
    #[snafu(display("Session token expired at {exp}"))]
    Expired { exp: i64 },
}
pub type SessionTokenResult<T> = std::result::Result<T, SessionTokenError>;

/// HS256 keys derived from the [`SessionSecret`]
///
/// Built once at startup and shared read-only by all requests.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

impl SessionKeys {
    pub fn new(secret: &SessionSecret) -> Self {
        Self {
            encoding: EncodingKey::from_secret(&secret.0),
            decoding: DecodingKey::from_secret(&secret.0),
        }
    }

    /// Sign a token for `email`, valid for [`SESSION_TTL`] from `now`
    pub fn issue(
        &self,
        email: &str,
        now: OffsetDateTime,
    ) -> SessionTokenResult<(SessionToken, SessionClaims)> {
        let iat = now.unix_timestamp();
        let claims = SessionClaims {
            email: email.to_owned(),
            iat,
            exp: iat + SESSION_TTL.whole_seconds(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context(SignSnafu)?;

        Ok((SessionToken(token), claims))
    }

    /// Check the signature and expiry of `token` as of `now`
    pub fn verify(&self, token: &str, now: OffsetDateTime) -> SessionTokenResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against `now`, not the system time.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_owned()]);

        let claims = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .context(InvalidSnafu)?
            .claims;

        ensure!(
            now.unix_timestamp() < claims.exp,
            ExpiredSnafu { exp: claims.exp }
        );

        Ok(claims)
    }
}
