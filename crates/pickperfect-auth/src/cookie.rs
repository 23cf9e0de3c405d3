use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use pickperfect_util_error::FmtCompact as _;
use time::{Duration, OffsetDateTime};
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};
use tracing::debug;

use crate::LOG_TARGET;
use crate::session::{SESSION_TTL, SessionToken};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE_NAME: &str = "access-token";

/// Read access to the cookies of an incoming request
pub trait CookieLookup {
    fn cookie_value(&self, name: &str) -> Option<String>;
}

impl CookieLookup for Cookies {
    fn cookie_value(&self, name: &str) -> Option<String> {
        self.get(name).map(|c| c.value().to_owned())
    }
}

impl CookieLookup for HeaderMap {
    fn cookie_value(&self, name: &str) -> Option<String> {
        for header in self.get_all(COOKIE) {
            let Ok(header) = header.to_str() else {
                debug!(target: LOG_TARGET, "Ignoring non-ascii cookie header");
                continue;
            };
            for cookie in Cookie::split_parse(header) {
                match cookie {
                    Ok(cookie) if cookie.name() == name => {
                        return Some(cookie.value().to_owned());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Invalid cookie");
                    }
                }
            }
        }
        None
    }
}

/// Transport attributes of the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl SessionCookiePolicy {
    /// Client and server on different origins, over https
    pub fn production() -> Self {
        Self {
            secure: true,
            same_site: SameSite::None,
        }
    }

    /// Plain http on localhost
    pub fn development() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    pub fn session_cookie(&self, token: &SessionToken) -> Cookie<'static> {
        let mut cookie = self.base_cookie(token.as_str().to_owned());
        cookie.set_max_age(SESSION_TTL);
        cookie
    }

    /// Cookie that makes the browser drop the session cookie
    ///
    /// Carries the same attributes as [`Self::session_cookie`], otherwise
    /// browsers may refuse to overwrite it.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.base_cookie(String::new());
        cookie.set_max_age(Duration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        cookie
    }

    fn base_cookie(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(SESSION_COOKIE_NAME, value);
        cookie.set_http_only(true);
        cookie.set_secure(self.secure);
        cookie.set_same_site(self.same_site);
        cookie.set_path("/");
        cookie
    }
}

impl Default for SessionCookiePolicy {
    fn default() -> Self {
        Self::production()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn production_cookie_attributes() {
        let token = SessionToken::from("abc.def.ghi".to_owned());
        let rendered = SessionCookiePolicy::production()
            .session_cookie(&token)
            .to_string();

        assert!(rendered.starts_with("access-token=abc.def.ghi"));
        for attr in ["HttpOnly", "Secure", "SameSite=None", "Path=/", "Max-Age=3600"] {
            assert!(rendered.contains(attr), "{rendered} lacks {attr}");
        }
    }

    #[test]
    fn development_cookie_is_not_secure() {
        let token = SessionToken::from("t".to_owned());
        let rendered = SessionCookiePolicy::development()
            .session_cookie(&token)
            .to_string();

        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(!rendered.contains("Secure"));
    }

    #[test]
    fn removal_cookie_matches_session_cookie() {
        let policy = SessionCookiePolicy::production();
        let removal = policy.removal_cookie();

        assert_eq!(removal.name(), SESSION_COOKIE_NAME);
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(Duration::ZERO));
        assert_eq!(removal.path(), Some("/"));
        assert_eq!(removal.secure(), Some(true));
        assert_eq!(removal.same_site(), Some(SameSite::None));
        assert_eq!(removal.http_only(), Some(true));
    }

    #[test]
    fn header_map_lookup() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; other=1"));
        headers.append(COOKIE, HeaderValue::from_static("access-token=xyz"));

        assert_eq!(
            headers.cookie_value(SESSION_COOKIE_NAME).as_deref(),
            Some("xyz")
        );
        assert_eq!(headers.cookie_value("theme").as_deref(), Some("dark"));
        assert_eq!(headers.cookie_value("missing"), None);
        assert_eq!(HeaderMap::new().cookie_value(SESSION_COOKIE_NAME), None);
    }
}
