#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use pickperfect_auth::{
    FixedClock, IdentityError, IdentityResult, IdentityVerifier, SessionCookiePolicy,
    SessionKeys, VerifiedIdentity,
};
use pickperfect_db::Database;
use pickperfect_web::{Opts, RateLimitOpts, Server, ServerHandle};
use tempfile::TempDir;
use time::OffsetDateTime;

/// Identity provider double: accepts tokens of the form `<uid>:<email>`
#[derive(Debug)]
pub struct StubVerifier;

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify_identity_token(&self, token: &str) -> IdentityResult<VerifiedIdentity> {
        match token.split_once(':') {
            Some((uid, email)) if !uid.is_empty() => Ok(VerifiedIdentity {
                uid: uid.to_owned(),
                email: (!email.is_empty()).then(|| email.to_owned()),
            }),
            _ => Err(IdentityError::MissingKeyId),
        }
    }
}

/// A test server running on a random port with ephemeral storage.
pub struct TestServer {
    server: ServerHandle,
    _temp_dir: TempDir,
    base_url: String,
    pub clock: Arc<FixedClock>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(
            SessionCookiePolicy::development(),
            RateLimitOpts {
                max: 10_000,
                ..RateLimitOpts::default()
            },
        )
        .await
    }

    pub async fn start_with(cookie_policy: SessionCookiePolicy, rate_limit: RateLimitOpts) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open(
            Database::mk_db_path(temp_dir.path())
                .await
                .expect("Failed to create data dir"),
        )
        .await
        .expect("Failed to open database");

        let opts = Opts::new(
            "127.0.0.1:0".to_owned(),
            None,  // cors_origin
            false, // reuseport
            cookie_policy,
            rate_limit,
        );
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));

        let server = Server::builder()
            .opts(opts)
            .db(db)
            .session_keys(SessionKeys::new(
                &"test-secret".parse().expect("Non-empty"),
            ))
            .identity_verifier(Arc::new(StubVerifier))
            .clock(clock.clone())
            .build()
            .await
            .expect("Failed to start test server")
            .spawn()
            .expect("Failed to spawn test server");

        let base_url = format!("http://{}", server.local_addr());

        Self {
            server,
            _temp_dir: temp_dir,
            base_url,
            clock,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new `ApiDriver` with its own cookie jar (independent session).
    pub fn driver(&self) -> ApiDriver {
        ApiDriver::new(self.base_url.clone())
    }

    /// Shut down the server cleanly.
    pub async fn shutdown(self) {
        self.server
            .shutdown()
            .await
            .expect("Server shutdown failed");
    }
}

/// HTTP client driver for interacting with the API in tests.
///
/// Each `ApiDriver` maintains its own cookie jar, so it represents
/// an independent browser session.
pub struct ApiDriver {
    client: reqwest::Client,
    base_url: String,
}

impl ApiDriver {
    fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to build HTTP client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange a stub identity token for `email` and return the response.
    pub async fn exchange(&self, identity_token: &str) -> reqwest::Response {
        self.post_json("/jwt", &serde_json::json!({ "token": identity_token }))
            .await
    }

    /// Log in as `email`, asserting success.
    ///
    /// Returns the session token set in the cookie.
    pub async fn login(&self, email: &str) -> String {
        let resp = self.exchange(&format!("uid-{email}:{email}")).await;
        assert_eq!(resp.status(), 200, "Login should succeed");

        let token = session_cookie_token(&resp).expect("Missing session cookie");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "success": true }));
        token
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// Send a GET request carrying the given session token, bypassing the jar.
    pub async fn get_with_session(&self, path: &str, token: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(self.url(path))
            .header("Cookie", format!("access-token={token}"))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .send()
            .await
            .expect("POST request failed")
    }

    /// POST a raw body with the given content type
    pub async fn post_text(&self, path: &str, content_type: &str, body: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("Content-Type", content_type)
            .body(body.to_owned())
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn put_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    pub async fn patch(&self, path: &str) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .send()
            .await
            .expect("PATCH request failed")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }
}

/// Value of the `access-token` cookie set by the response, if any
pub fn session_cookie_token(resp: &reqwest::Response) -> Option<String> {
    session_set_cookie(resp).and_then(|header| {
        header
            .split(';')
            .next()?
            .strip_prefix("access-token=")
            .map(ToOwned::to_owned)
    })
}

/// The raw `Set-Cookie` header for the session cookie, if any
pub fn session_set_cookie(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("access-token="))
        .map(ToOwned::to_owned)
}

/// Read the `{ message }` body of an error response
pub async fn error_message(resp: reqwest::Response) -> String {
    let body: serde_json::Value = resp.json().await.expect("JSON error body");
    body["message"]
        .as_str()
        .expect("Error body has a message")
        .to_owned()
}
