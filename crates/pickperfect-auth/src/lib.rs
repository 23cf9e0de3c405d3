//! Authentication core of the backend.
//!
//! An identity token issued by the external identity provider is exchanged
//! ([`exchange()`]) for a locally signed, short-lived session token, which
//! travels in an HTTP-only cookie ([`SessionCookiePolicy`]). Every protected
//! request passes through the gate ([`gate::verify`]) which checks the
//! signature and expiry of that token.
//!
//! Session tokens are stateless: there is no server-side session store, so a
//! token stays valid until it expires, even after the client logs out.

mod clock;
mod cookie;
mod exchange;
pub mod firebase;
pub mod gate;
mod identity;
mod session;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cookie::{CookieLookup, SESSION_COOKIE_NAME, SessionCookiePolicy};
pub use self::exchange::{ExchangeError, ExchangeResult, IssuedSession, exchange};
pub use self::firebase::FirebaseVerifier;
pub use self::gate::{GateError, GateResult};
pub use self::identity::{IdentityError, IdentityResult, IdentityVerifier, VerifiedIdentity};
pub use self::session::{
    SESSION_TTL, SessionClaims, SessionKeys, SessionSecret, SessionSecretError, SessionToken,
    SessionTokenError, SessionTokenResult,
};

const LOG_TARGET: &str = "pickperfect::auth";
