use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pickperfect_auth::firebase::{GOOGLE_SECURETOKEN_JWKS_URL, ServiceAccount};
use pickperfect_auth::{SessionCookiePolicy, SessionSecret};
use pickperfect_core::Collection;
use pickperfect_web::RateLimitOpts;
use snafu::ResultExt as _;

use crate::{CliResult, MissingFirebaseProjectSnafu, ServiceAccountSnafu};

pub const DEFAULT_CORS_ORIGIN: &str = "https://pick-perfect-1f90f.web.app";

/// Backend of the Pick Perfect recommendation board
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    /// Global options that apply to all commands
    #[command(flatten)]
    pub global: GlobalOpts,

    /// The specific command to execute
    #[command(subcommand)]
    pub cmd: OptsCmd,
}

/// Global options that apply across all commands
#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Directory holding the database
    #[arg(env = "PICKPERFECT_DATA_DIR", long)]
    pub data_dir: Option<PathBuf>,
}

static PROJECTS_DIR: LazyLock<directories::ProjectDirs> = LazyLock::new(|| {
    directories::ProjectDirs::from("app", "PickPerfect", "pickperfect")
        .expect("Unable to determine project's dir")
});

impl GlobalOpts {
    pub fn data_dir(&self) -> &Path {
        self.data_dir.as_deref().unwrap_or_else(|| {
            PROJECTS_DIR
                .state_dir()
                .unwrap_or_else(|| PROJECTS_DIR.data_local_dir())
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Start the HTTP server
    Serve(ServeOpts),

    /// Generate a random session signing secret
    GenSecret,

    /// Development and debugging commands
    #[command(subcommand)]
    Dev(DevCmd),
}

#[derive(Debug, Clone, Args)]
pub struct SecretOpts {
    /// Secret used to sign session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: SessionSecret,
}

#[derive(Debug, Args)]
pub struct ServeOpts {
    /// Listen address
    #[arg(long, short, default_value = "0.0.0.0:3000", env = "PICKPERFECT_LISTEN")]
    pub listen: String,

    /// Set SO_REUSEPORT
    #[arg(long, env = "PICKPERFECT_REUSEPORT")]
    pub reuseport: bool,

    /// Origin of the frontend allowed to make credentialed requests
    #[arg(long, env = "PICKPERFECT_CORS_ORIGIN", default_value = DEFAULT_CORS_ORIGIN)]
    pub cors_origin: String,

    #[command(flatten)]
    pub secret: SecretOpts,

    /// Firebase project whose ID tokens are accepted
    #[arg(long, env = "FIREBASE_PROJECT_ID")]
    pub firebase_project_id: Option<String>,

    /// Firebase service account key (JSON), used for its `project_id`
    #[arg(long, env = "FIREBASE_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
    pub firebase_service_account: Option<String>,

    /// Where to fetch the ID token signing keys from
    #[arg(long, env = "FIREBASE_JWKS_URL", default_value = GOOGLE_SECURETOKEN_JWKS_URL)]
    pub firebase_jwks_url: String,

    /// Plain-http friendly cookies (no `Secure`, `SameSite=Lax`)
    #[arg(long, env = "PICKPERFECT_DEV_MODE")]
    pub dev_mode: bool,

    /// Requests allowed per client IP per window
    #[arg(long, env = "PICKPERFECT_RATE_LIMIT_MAX", default_value = "100")]
    pub rate_limit_max: u32,

    /// Length of the rate limit window
    #[arg(long, env = "PICKPERFECT_RATE_LIMIT_WINDOW_SECS", default_value = "900")]
    pub rate_limit_window_secs: u64,
}

impl ServeOpts {
    pub fn firebase_project_id(&self) -> CliResult<String> {
        if let Some(project_id) = &self.firebase_project_id {
            return Ok(project_id.clone());
        }
        let Some(json) = &self.firebase_service_account else {
            return MissingFirebaseProjectSnafu.fail();
        };
        Ok(ServiceAccount::from_json(json)
            .context(ServiceAccountSnafu)?
            .project_id)
    }

    pub fn cookie_policy(&self) -> SessionCookiePolicy {
        if self.dev_mode {
            SessionCookiePolicy::development()
        } else {
            SessionCookiePolicy::production()
        }
    }
}

pub fn make_web_opts(opts: &ServeOpts) -> pickperfect_web::Opts {
    pickperfect_web::Opts::new(
        opts.listen.clone(),
        Some(opts.cors_origin.clone()),
        opts.reuseport,
        opts.cookie_policy(),
        RateLimitOpts {
            max: opts.rate_limit_max,
            window: Duration::from_secs(opts.rate_limit_window_secs),
        },
    )
}

fn parse_collection(name: &str) -> Result<Collection, String> {
    Collection::from_name(name).ok_or_else(|| {
        let known: Vec<_> = Collection::ALL.iter().map(|c| c.name()).collect();
        format!("unknown collection, expected one of: {}", known.join(", "))
    })
}

/// Development and debugging commands
#[derive(Debug, Subcommand)]
pub enum DevCmd {
    /// Mint a session token without going through the identity provider
    IssueToken {
        #[arg(long)]
        email: String,
        #[command(flatten)]
        secret: SecretOpts,
    },
    /// Check a session token and print its claims
    VerifyToken {
        token: String,
        #[command(flatten)]
        secret: SecretOpts,
    },
    /// Print all documents of a collection
    DbDump {
        #[arg(long, value_parser = parse_collection)]
        collection: Collection,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Opts::command().debug_assert();
    }

    #[test]
    fn serve_defaults() {
        let opts = Opts::try_parse_from([
            "pickperfect",
            "serve",
            "--jwt-secret",
            "s3cr3t",
            "--firebase-project-id",
            "proj",
        ])
        .unwrap();
        let OptsCmd::Serve(serve) = opts.cmd else {
            panic!("Expected serve");
        };

        assert_eq!(serve.listen, "0.0.0.0:3000");
        assert_eq!(serve.cors_origin, DEFAULT_CORS_ORIGIN);
        assert_eq!(serve.cookie_policy(), SessionCookiePolicy::production());
        assert_eq!(serve.firebase_project_id().unwrap(), "proj");

        let web = make_web_opts(&serve);
        assert_eq!(web.rate_limit, RateLimitOpts::default());
    }

    #[test]
    fn project_id_falls_back_to_service_account() {
        let opts = Opts::try_parse_from([
            "pickperfect",
            "serve",
            "--jwt-secret",
            "s3cr3t",
            "--firebase-service-account",
            r#"{"type":"service_account","project_id":"from-key"}"#,
        ])
        .unwrap();
        let OptsCmd::Serve(serve) = opts.cmd else {
            panic!("Expected serve");
        };

        assert_eq!(serve.firebase_project_id().unwrap(), "from-key");
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(
            Opts::try_parse_from(["pickperfect", "dev", "verify-token", "x", "--jwt-secret", ""])
                .is_err()
        );
    }

    #[test]
    fn collection_names() {
        assert_eq!(
            parse_collection("users_queries").unwrap(),
            Collection::Queries
        );
        assert!(parse_collection("users").is_err());
    }
}
