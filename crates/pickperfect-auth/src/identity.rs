use async_trait::async_trait;
use snafu::Snafu;

/// Identity established by the external provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IdentityError {
    #[snafu(display("Malformed identity token"))]
    Malformed { source: jsonwebtoken::errors::Error },
    #[snafu(display("Unsupported signing algorithm {alg:?}"))]
    UnsupportedAlgorithm { alg: jsonwebtoken::Algorithm },
    #[snafu(display("Identity token has no key id"))]
    MissingKeyId,
    #[snafu(display("Unknown signing key {kid}"))]
    UnknownKey { kid: String },
    #[snafu(display("Invalid signing key {kid}"))]
    InvalidKey {
        kid: String,
        source: jsonwebtoken::errors::Error,
    },
    #[snafu(display("Identity token rejected"))]
    Rejected { source: jsonwebtoken::errors::Error },
    #[snafu(display("Identity token has wrong issuer {iss}"))]
    WrongIssuer { iss: String },
    #[snafu(display("Identity token expired"))]
    Expired,
    #[snafu(display("Identity token issued in the future"))]
    IssuedInFuture,
    #[snafu(display("Identity token has an invalid subject"))]
    InvalidSubject,
    #[snafu(display("Fetching provider keys failed"))]
    FetchKeys { source: reqwest::Error },
}
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// Verifies identity tokens issued by the external provider
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_identity_token(&self, token: &str) -> IdentityResult<VerifiedIdentity>;
}
