mod cli;

use std::io;
use std::sync::Arc;

use clap::Parser;
use cli::{DevCmd, GlobalOpts, Opts, OptsCmd, make_web_opts};
use pickperfect_auth::firebase::ServiceAccountError;
use pickperfect_auth::{
    Clock as _, FirebaseVerifier, SessionKeys, SessionTokenError, SystemClock,
};
use pickperfect_db::{Database, DbError};
use pickperfect_util_error::WhateverResult;
use pickperfect_web::{Server, WebServerError};
use rand::RngCore as _;
use snafu::{FromString, ResultExt, Snafu, Whatever};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub const LOG_TARGET: &str = "pickperfect::cli";

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Web server error: {source}"))]
    WebServer { source: WebServerError },
    #[snafu(display("Miscellaneous error: {source}"))]
    Whatever { source: Whatever },
    #[snafu(display("Data dir error: {source:?}"))]
    DataDir { source: io::Error },
    #[snafu(display("Database error: {source}"))]
    Database { source: DbError },
    #[snafu(display("Invalid Firebase service account key: {source}"))]
    ServiceAccount { source: ServiceAccountError },
    #[snafu(display(
        "Firebase project unknown: set FIREBASE_PROJECT_ID or FIREBASE_SERVICE_ACCOUNT_KEY"
    ))]
    MissingFirebaseProject,
    #[snafu(display("Session token error: {source}"))]
    SessionToken { source: SessionTokenError },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging().context(WhateverSnafu)?;

    let opts = Opts::parse();
    match handle_cmd(opts).await {
        Ok(v) => {
            if !v.is_null() {
                println!("{}", serde_json::to_string_pretty(&v).expect("Can't fail"));
            }
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn open_db(global: &GlobalOpts) -> CliResult<Database> {
    let db_path = Database::mk_db_path(global.data_dir())
        .await
        .context(DataDirSnafu)?;

    Database::open(db_path).await.context(DatabaseSnafu)
}

async fn handle_cmd(Opts { global, cmd }: Opts) -> CliResult<serde_json::Value> {
    Ok(match cmd {
        OptsCmd::Serve(serve_opts) => {
            let db = open_db(&global).await?;
            db.ping().await.context(DatabaseSnafu)?;
            info!(target: LOG_TARGET, data_dir = %global.data_dir().display(), "Database ready");

            let project_id = serve_opts.firebase_project_id()?;
            info!(target: LOG_TARGET, %project_id, "Verifying Firebase ID tokens");
            let identity_verifier = FirebaseVerifier::builder()
                .project_id(project_id)
                .jwks_url(serve_opts.firebase_jwks_url.clone())
                .build();

            if serve_opts.dev_mode {
                warn!(target: LOG_TARGET, "Development mode: session cookies are not marked Secure");
            }

            let server = Server::builder()
                .opts(make_web_opts(&serve_opts))
                .db(db)
                .session_keys(SessionKeys::new(&serve_opts.secret.jwt_secret))
                .identity_verifier(Arc::new(identity_verifier))
                .build()
                .await
                .context(WebServerSnafu)?;

            info!(
                target: LOG_TARGET,
                addr = %server.addr().context(WebServerSnafu)?,
                "Server is running"
            );
            server.run().await.context(WebServerSnafu)?;

            serde_json::Value::Null
        }
        OptsCmd::GenSecret => {
            let mut secret = [0u8; 64];
            rand::rng().fill_bytes(&mut secret);

            serde_json::json!({
                "secret": data_encoding::HEXLOWER.encode(&secret),
            })
        }
        OptsCmd::Dev(cmd) => match cmd {
            DevCmd::IssueToken { email, secret } => {
                let (token, claims) = SessionKeys::new(&secret.jwt_secret)
                    .issue(&email, SystemClock.now())
                    .context(SessionTokenSnafu)?;

                serde_json::json!({
                    "token": token.as_str(),
                    "claims": claims,
                })
            }
            DevCmd::VerifyToken { token, secret } => {
                let claims = SessionKeys::new(&secret.jwt_secret)
                    .verify(&token, SystemClock.now())
                    .context(SessionTokenSnafu)?;

                serde_json::to_value(claims).expect("Can't fail")
            }
            DevCmd::DbDump { collection } => {
                let db = open_db(&global).await?;
                let docs = db.find_all(collection).await.context(DatabaseSnafu)?;

                serde_json::to_value(docs).expect("Can't fail")
            }
        },
    })
}

pub fn init_logging() -> WhateverResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| Whatever::without_source("Failed to initialize logging".to_string()))?;

    Ok(())
}
