//! Fixed-window request limit per client IP.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse as _, Response};
use tracing::debug;

use crate::error::UserRequestError;
use crate::{LOG_TARGET, SharedState};

/// Above this many tracked clients, expired windows are dropped
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOpts {
    /// Requests allowed per window
    pub max: u32,
    pub window: Duration,
}

impl Default for RateLimitOpts {
    fn default() -> Self {
        Self {
            max: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset_after: Duration },
    Limited { reset_after: Duration },
}

#[derive(Debug)]
pub struct RateLimiter {
    opts: RateLimitOpts,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(opts: RateLimitOpts) -> Self {
        Self {
            opts,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut windows = self.windows.lock().expect("Locking failed");

        if PRUNE_THRESHOLD <= windows.len() {
            windows.retain(|_, w| now.duration_since(w.started) < self.opts.window);
        }

        let window = windows.entry(ip).or_insert(Window {
            started: now,
            hits: 0,
        });
        if self.opts.window <= now.duration_since(window.started) {
            *window = Window {
                started: now,
                hits: 0,
            };
        }

        let reset_after = self.opts.window - now.duration_since(window.started);
        if self.opts.max <= window.hits {
            return Decision::Limited { reset_after };
        }
        window.hits += 1;

        Decision::Allowed {
            remaining: self.opts.max - window.hits,
            reset_after,
        }
    }

    fn limit(&self) -> u32 {
        self.opts.max
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.lock().expect("Locking failed").len()
    }
}

pub async fn enforce(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;

    match limiter.check(addr.ip(), Instant::now()) {
        Decision::Allowed {
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(
                HeaderName::from_static("ratelimit-limit"),
                HeaderValue::from(limiter.limit()),
            );
            headers.insert(
                HeaderName::from_static("ratelimit-remaining"),
                HeaderValue::from(remaining),
            );
            headers.insert(
                HeaderName::from_static("ratelimit-reset"),
                HeaderValue::from(ceil_secs(reset_after)),
            );
            response
        }
        Decision::Limited { reset_after } => {
            debug!(target: LOG_TARGET, ip = %addr.ip(), "Rate limit exceeded");
            let mut response = (&UserRequestError::TooManyRequests).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(ceil_secs(reset_after)));
            response
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() != 0)
}
