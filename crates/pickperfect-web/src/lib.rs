//! HTTP surface of the backend.

mod error;
pub mod rate_limit;
mod routes;
mod security_headers;

use std::future::Future;
use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::str::FromStr as _;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderValue, Method};
use axum::middleware;
use pickperfect_auth::{Clock, IdentityVerifier, SessionCookiePolicy, SessionKeys, SystemClock};
use pickperfect_db::Database;
use snafu::{ResultExt as _, Snafu};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tower_cookies::CookieManagerLayer;
use tower_http::CompressionLevel;
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::SizeAbove;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use self::error::{RequestError, RequestResult, UserErrorResponse, UserRequestError};
pub use self::rate_limit::{RateLimitOpts, RateLimiter};
pub use self::routes::AuthenticatedUser;

const LOG_TARGET: &str = "pickperfect::web";

#[derive(Clone, Debug)]
pub struct Opts {
    pub listen: String,
    pub cors_origin: Option<String>,
    pub reuseport: bool,
    pub cookie_policy: SessionCookiePolicy,
    pub rate_limit: RateLimitOpts,
}

impl Opts {
    pub fn new(
        listen: String,
        cors_origin: Option<String>,
        reuseport: bool,
        cookie_policy: SessionCookiePolicy,
        rate_limit: RateLimitOpts,
    ) -> Self {
        Self {
            listen,
            cors_origin,
            reuseport,
            cookie_policy,
            rate_limit,
        }
    }
}

/// Everything the request handlers share
///
/// Constructed once at startup and never mutated afterwards, except for the
/// rate limiter counters.
pub struct AppState {
    pub db: Database,
    pub session_keys: SessionKeys,
    pub identity_verifier: Arc<dyn IdentityVerifier>,
    pub clock: Arc<dyn Clock>,
    pub cookie_policy: SessionCookiePolicy,
    pub rate_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;

pub struct Server {
    listener: TcpListener,

    state: SharedState,
    opts: Opts,
}

#[derive(Debug, Snafu)]
pub enum WebServerError {
    #[snafu(transparent)]
    IO {
        source: io::Error,
    },

    ListenAddr {
        source: AddrParseError,
    },

    #[snafu(display("Invalid CORS origin {origin}"))]
    Cors {
        origin: String,
        source: InvalidHeaderValue,
    },

    Join {
        source: JoinError,
    },
}

pub type ServerResult<T> = std::result::Result<T, WebServerError>;

#[bon::bon]
impl Server {
    #[builder(finish_fn(name = "build"))]
    pub async fn new(
        opts: Opts,
        db: Database,
        session_keys: SessionKeys,
        identity_verifier: Arc<dyn IdentityVerifier>,
        clock: Option<Arc<dyn Clock>>,
    ) -> ServerResult<Server> {
        let listener = Self::get_listener(&opts).await?;

        let state = Arc::new(AppState {
            db,
            session_keys,
            identity_verifier,
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
            cookie_policy: opts.cookie_policy,
            rate_limiter: RateLimiter::new(opts.rate_limit),
        });

        info!(target: LOG_TARGET, addr = %listener.local_addr()?, "Listening");
        Ok(Self {
            listener,
            state,
            opts,
        })
    }
}

impl Server {
    pub async fn get_listener(opts: &Opts) -> ServerResult<TcpListener> {
        let socket = {
            let addr = SocketAddr::from_str(&opts.listen).context(ListenAddrSnafu)?;

            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            if opts.reuseport {
                #[cfg(unix)]
                socket.set_reuseport(true)?;
            }
            socket.set_nodelay(true)?;

            socket.bind(addr)?;

            socket
        };

        Ok(socket.listen(1024)?)
    }

    pub fn addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> ServerResult<()> {
        self.serve(shutdown_signal()).await
    }

    /// Serve in a background task, until [`ServerHandle::shutdown`]
    pub fn spawn(self) -> ServerResult<ServerHandle> {
        let local_addr = self.addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(self.serve(async move {
            let _ = shutdown_rx.await;
        }));

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> ServerResult<()> {
        let listen = self.addr()?;
        let router = routes::route_handler(self.state.clone())
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                rate_limit::enforce,
            ))
            .layer(CookieManagerLayer::new());
        let router = security_headers::apply(router);

        info!(target: LOG_TARGET, "Starting server");
        axum::serve(
            self.listener,
            router
                .layer(cors_layer(&self.opts, listen)?)
                .layer(compression_layer())
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!(target: LOG_TARGET, "Server stopped");
        Ok(())
    }
}

/// A server running in a background task
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<ServerResult<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(self) -> ServerResult<()> {
        let _ = self.shutdown_tx.send(());
        self.task.await.context(JoinSnafu)?
    }
}

fn compression_layer() -> CompressionLayer<SizeAbove> {
    CompressionLayer::new()
        .quality(CompressionLevel::Precise(4))
        .compress_when(SizeAbove::new(512))
}

fn cors_layer(opts: &Opts, listen: SocketAddr) -> ServerResult<CorsLayer> {
    Ok(CorsLayer::new()
        .allow_credentials(true)
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400))
        .allow_origin(opts.cors_origin(listen)?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ]))
}

impl Opts {
    pub fn cors_origin(&self, listen: SocketAddr) -> ServerResult<HeaderValue> {
        let origin = self
            .cors_origin
            .clone()
            .unwrap_or_else(|| format!("http://{listen}"));
        HeaderValue::from_str(&origin).context(CorsSnafu { origin })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    fn opts(cors_origin: Option<&str>) -> Opts {
        Opts::new(
            "127.0.0.1:0".to_owned(),
            cors_origin.map(ToOwned::to_owned),
            false,
            SessionCookiePolicy::development(),
            RateLimitOpts::default(),
        )
    }

    #[test]
    fn server_errors_can_cross_tasks() {
        let listen = SocketAddr::from(([127, 0, 0, 1], 3000));
        let res = opts(Some("https://bad\norigin")).cors_origin(listen);
        assert_send(&res);

        let err = res.unwrap_err();
        assert!(matches!(err, WebServerError::Cors { .. }));
        assert_send(&err);
    }

    #[test]
    fn cors_origin_defaults_to_listen_address() {
        let listen = SocketAddr::from(([127, 0, 0, 1], 3000));
        assert_eq!(
            opts(None).cors_origin(listen).unwrap(),
            "http://127.0.0.1:3000"
        );
        assert_eq!(
            opts(Some("https://pick.example")).cors_origin(listen).unwrap(),
            "https://pick.example"
        );
    }
}
