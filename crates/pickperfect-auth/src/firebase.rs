//! Verification of Firebase ID tokens.
//!
//! ID tokens are RS256 JWTs signed with one of Google's rotating
//! `securetoken` keys. The public keys are published as a JWKS document whose
//! `Cache-Control: max-age` says how long they may be cached.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::header::{CACHE_CONTROL, HeaderMap};
use serde::Deserialize;
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::LOG_TARGET;
use crate::clock::{Clock, SystemClock};
use crate::identity::{
    ExpiredSnafu, FetchKeysSnafu, IdentityResult, IdentityVerifier, InvalidKeySnafu,
    InvalidSubjectSnafu, IssuedInFutureSnafu, MalformedSnafu, MissingKeyIdSnafu, RejectedSnafu,
    UnknownKeySnafu, UnsupportedAlgorithmSnafu, VerifiedIdentity, WrongIssuerSnafu,
};

pub const GOOGLE_SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// How long to keep keys when the response does not say
const DEFAULT_KEYS_TTL: Duration = Duration::hours(1);

/// Minimum time between refetches triggered by an unknown `kid`
const UNKNOWN_KID_REFETCH_INTERVAL: Duration = Duration::minutes(5);

const MAX_SUBJECT_LEN: usize = 128;

/// The fields of a service account key file this backend cares about
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
}

#[derive(Debug, Snafu)]
pub enum ServiceAccountError {
    #[snafu(display("Service account key is not valid JSON"))]
    Json { source: serde_json::Error },
    #[snafu(display("Service account key has an empty project_id"))]
    EmptyProjectId,
}

impl ServiceAccount {
    pub fn from_json(json: &str) -> Result<Self, ServiceAccountError> {
        let account: Self = serde_json::from_str(json).context(JsonSnafu)?;
        ensure!(!account.project_id.is_empty(), EmptyProjectIdSnafu);
        Ok(account)
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    sub: String,
    exp: i64,
    iat: i64,
    auth_time: i64,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug)]
struct CachedKeys {
    keys: JwkSet,
    fetched_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl CachedKeys {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }

    /// Whether a lookup of `kid` should be answered from this set without
    /// refetching. Unknown keys only trigger a refetch once the last fetch is
    /// [`UNKNOWN_KID_REFETCH_INTERVAL`] old.
    fn answers(&self, kid: &str, now: OffsetDateTime) -> bool {
        self.is_fresh(now)
            && (self.keys.find(kid).is_some()
                || now < self.fetched_at + UNKNOWN_KID_REFETCH_INTERVAL)
    }
}

/// [`IdentityVerifier`] for Firebase Authentication ID tokens
#[derive(Debug)]
pub struct FirebaseVerifier {
    project_id: String,
    issuer: String,
    jwks_url: String,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
}

#[bon::bon]
impl FirebaseVerifier {
    #[builder(finish_fn(name = "build"))]
    pub fn new(
        #[builder(into)] project_id: String,
        #[builder(into, default = GOOGLE_SECURETOKEN_JWKS_URL.to_owned())] jwks_url: String,
        clock: Option<Arc<dyn Clock>>,
        http: Option<reqwest::Client>,
    ) -> Self {
        Self {
            issuer: format!("{ISSUER_PREFIX}{project_id}"),
            project_id,
            jwks_url,
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
            http: http.unwrap_or_default(),
            keys: RwLock::new(None),
        }
    }
}

impl FirebaseVerifier {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn decoding_key(&self, kid: &str) -> IdentityResult<DecodingKey> {
        let now = self.clock.now();

        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.answers(kid, now) {
                    return key_from_set(&cached.keys, kid);
                }
            }
        }

        let mut cache = self.keys.write().await;
        // Someone else might have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.answers(kid, now) {
                return key_from_set(&cached.keys, kid);
            }
        }

        let fetched = self.fetch_keys(now).await?;
        let key = key_from_set(&fetched.keys, kid);
        *cache = Some(fetched);
        key
    }

    async fn fetch_keys(&self, now: OffsetDateTime) -> IdentityResult<CachedKeys> {
        debug!(target: LOG_TARGET, url = %self.jwks_url, "Fetching identity provider keys");
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context(FetchKeysSnafu)?;

        let ttl = max_age(response.headers()).unwrap_or(DEFAULT_KEYS_TTL);
        let keys: JwkSet = response.json().await.context(FetchKeysSnafu)?;
        info!(
            target: LOG_TARGET,
            num_keys = keys.keys.len(),
            ttl_secs = ttl.whole_seconds(),
            "Fetched identity provider keys"
        );

        Ok(CachedKeys {
            keys,
            fetched_at: now,
            expires_at: now + ttl,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        // Time claims are checked against our own clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_audience(&[&self.project_id]);
        validation.required_spec_claims =
            HashSet::from(["exp", "aud", "iss", "sub"].map(str::to_owned));
        validation
    }

    fn check_claims(&self, claims: &IdTokenClaims) -> IdentityResult<()> {
        let now = self.clock.now().unix_timestamp();

        ensure!(
            claims.iss == self.issuer,
            WrongIssuerSnafu {
                iss: claims.iss.clone()
            }
        );
        ensure!(now < claims.exp, ExpiredSnafu);
        ensure!(claims.iat <= now, IssuedInFutureSnafu);
        ensure!(claims.auth_time <= now, IssuedInFutureSnafu);
        ensure!(
            !claims.sub.is_empty() && claims.sub.len() <= MAX_SUBJECT_LEN,
            InvalidSubjectSnafu
        );
        Ok(())
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify_identity_token(&self, token: &str) -> IdentityResult<VerifiedIdentity> {
        let header = jsonwebtoken::decode_header(token).context(MalformedSnafu)?;
        ensure!(
            header.alg == Algorithm::RS256,
            UnsupportedAlgorithmSnafu { alg: header.alg }
        );
        let kid = header.kid.context(MissingKeyIdSnafu)?;

        let key = self.decoding_key(&kid).await?;
        let claims = jsonwebtoken::decode::<IdTokenClaims>(token, &key, &self.validation())
            .context(RejectedSnafu)?
            .claims;
        self.check_claims(&claims)?;

        Ok(VerifiedIdentity {
            uid: claims.sub,
            email: claims.email,
        })
    }
}

fn key_from_set(keys: &JwkSet, kid: &str) -> IdentityResult<DecodingKey> {
    let jwk = keys.find(kid).context(UnknownKeySnafu { kid })?;
    DecodingKey::from_jwk(jwk).context(InvalidKeySnafu { kid })
}

fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(CACHE_CONTROL)?
        .to_str()
        .ok()?
        .split(',')
        .find_map(|directive| directive.trim().strip_prefix("max-age=")?.parse().ok())
        .map(Duration::seconds)
}
