use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};
use url::Url;

use gambit::auth::{AuthConfig, AuthServer};
use gambit::bridge::Analyser;
use gambit::consts::{
    self, API_BASE, AUTHORIZE_URL, ENGINE_BASE, ENGINE_ID_PREFIX, STATE_TTL, TOKEN_URL,
};
use gambit::dispatch::Dispatcher;
use gambit::registry::Registry;
use gambit::secret::ensure_secret;
use gambit::store::Store;

#[derive(Parser)]
#[command(
    name = "gambit",
    version,
    about = "Bridge a local UCI chess engine to the lichess analysis board."
)]
struct Cli {
    /// Path to the UCI engine executable
    #[arg(long, default_value = "stockfish")]
    engine: PathBuf,

    /// Engine name shown on the analysis board
    #[arg(long, default_value = "Gambit")]
    name: String,

    /// Hostname the OAuth server binds to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the OAuth server (default: 80, or 443 with TLS)
    #[arg(long)]
    port: Option<u16>,

    /// PEM certificate file for TLS
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key file for TLS
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Public URL of the OAuth callback (default: http://localhost:<port>/oauth)
    #[arg(long)]
    oauth_url: Option<Url>,

    /// SQLite database path (default: ~/.gambit/gambit.db)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let tls = match (cli.cert, cli.key) {
        (Some(cert), Some(key)) => Some((cert, key)),
        _ => None,
    };
    let port = cli.port.unwrap_or(if tls.is_some() { 443 } else { 80 });
    let scheme = if tls.is_some() { "https" } else { "http" };
    let redirect_url = match cli.oauth_url {
        Some(url) => url,
        None => Url::parse(&format!("{scheme}://localhost:{port}/oauth"))
            .context("invalid default oauth url")?,
    };

    let db = cli.db.unwrap_or_else(consts::default_db_path);
    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let store = Arc::new(Store::open(&db)?);
    let secret = ensure_secret(&store)?;

    let http = reqwest::Client::new();
    let registry = Arc::new(Registry::new(
        store.clone(),
        http.clone(),
        API_BASE.to_string(),
        secret.clone(),
        cli.name,
    ));

    // refresh the registration of every previously authorized token
    for (key, _) in store.list(ENGINE_ID_PREFIX)? {
        let token = key[ENGINE_ID_PREFIX.len()..].to_string();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(error) = registry.handle_token(&token).await {
                warn!(%error, "startup engine registration failed");
            }
        });
    }

    let auth = AuthServer::new(
        AuthConfig {
            host: cli.host,
            port,
            tls,
            redirect_url,
            authorize_url: Url::parse(AUTHORIZE_URL)?,
            token_url: Url::parse(TOKEN_URL)?,
            state_ttl: STATE_TTL,
        },
        registry.clone(),
        http.clone(),
    );

    let analyser = Arc::new(Analyser::new(
        cli.engine,
        ENGINE_BASE.to_string(),
        http.clone(),
    ));
    let dispatcher = Dispatcher::new(http, ENGINE_BASE.to_string(), secret, analyser);

    // supervisory loops: log and restart, never exit
    let auth_loop = async {
        loop {
            match auth.serve().await {
                Ok(()) => error!("oauth server exited, restarting"),
                Err(error) => error!(%error, "oauth server stopped, restarting"),
            }
        }
    };
    let dispatch_loop = async {
        loop {
            match dispatcher.run().await {
                Ok(()) => error!("dispatcher exited, restarting"),
                Err(error) => error!(%error, "dispatcher stopped, restarting"),
            }
        }
    };
    tokio::join!(auth_loop, dispatch_loop);

    Ok(())
}
