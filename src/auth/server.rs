//! OAuth authorization server.
//!
//! A tiny HTTP front door: `POST /` starts an Authorization-Code + PKCE
//! flow against lichess, `GET /oauth` is the redirect-back leg that
//! exchanges the code and hands the resulting bearer token to the
//! [`Registry`]. Anything that goes wrong on either leg yields the same
//! fixed redirect to the help page — the browser never sees an error
//! status or any detail of what failed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{RawQuery, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum_server::tls_rustls::RustlsConfig;
use tracing::{info, warn};
use url::Url;

use crate::auth::pkce;
use crate::consts::{CLIENT_ID, COMPLETED_URL, HELP_URL};
use crate::registry::Registry;

/// Listener and endpoint configuration for the authorization server.
pub struct AuthConfig {
    /// Hostname or address to bind.
    pub host: String,
    pub port: u16,
    /// PEM certificate and private key files; serves HTTPS when set.
    pub tls: Option<(PathBuf, PathBuf)>,
    /// Public URL of the `GET /oauth` callback, as lichess will see it.
    pub redirect_url: Url,
    /// Platform authorization endpoint.
    pub authorize_url: Url,
    /// Platform token exchange endpoint.
    pub token_url: Url,
    /// How long an issued `state` stays redeemable.
    pub state_ttl: Duration,
}

/// State shared by all in-flight requests. The verifier map lives here
/// and nowhere else.
struct Shared {
    verifiers: Mutex<HashMap<String, String>>,
    http: reqwest::Client,
    registry: Arc<Registry>,
    redirect_url: Url,
    authorize_url: Url,
    token_url: Url,
    state_ttl: Duration,
}

pub struct AuthServer {
    host: String,
    port: u16,
    tls: Option<(PathBuf, PathBuf)>,
    shared: Arc<Shared>,
}

impl AuthServer {
    pub fn new(config: AuthConfig, registry: Arc<Registry>, http: reqwest::Client) -> Self {
        Self {
            host: config.host,
            port: config.port,
            tls: config.tls,
            shared: Arc::new(Shared {
                verifiers: Mutex::new(HashMap::new()),
                http,
                registry,
                redirect_url: config.redirect_url,
                authorize_url: config.authorize_url,
                token_url: config.token_url,
                state_ttl: config.state_ttl,
            }),
        }
    }

    /// The request router, separated out so tests can serve it on an
    /// ephemeral port.
    pub fn router(&self) -> Router {
        // both fallbacks: a wrong method on a known path declines the
        // same way an unknown path does, never a 405
        Router::new()
            .route("/", post(begin))
            .route("/oauth", get(complete))
            .fallback(fallback)
            .method_not_allowed_fallback(fallback)
            .with_state(self.shared.clone())
    }

    /// Bind and serve until the listener fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .context("failed to resolve listen address")?
            .next()
            .context("listen address resolved to nothing")?;

        info!(%addr, "waiting for oauth requests");
        let app = self.router();

        match &self.tls {
            Some((cert, key)) => {
                let tls = RustlsConfig::from_pem_file(cert, key)
                    .await
                    .context("failed to load TLS certificate or key")?;
                axum_server::bind_rustls(addr, tls)
                    .serve(app.into_make_service())
                    .await?;
            }
            None => {
                axum_server::bind(addr)
                    .serve(app.into_make_service())
                    .await?;
            }
        }
        Ok(())
    }
}

/// The uniform failure response: a 303 to the help page.
fn decline() -> Redirect {
    Redirect::to(HELP_URL)
}

async fn fallback() -> Redirect {
    decline()
}

/// `POST /` — mint a `state`/`verifier` pair and send the browser to the
/// platform's authorize endpoint.
async fn begin(State(shared): State<Arc<Shared>>, RawQuery(query): RawQuery) -> Redirect {
    // a begin request carries no query parameters at all
    if query.is_some() {
        return decline();
    }

    let verifier = pkce::random_token();
    let state = pkce::random_token();
    let challenge = pkce::challenge(&verifier);

    let mut url = shared.authorize_url.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", CLIENT_ID)
        .append_pair("redirect_uri", shared.redirect_url.as_str())
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", &challenge)
        .append_pair("scope", "engine:write")
        .append_pair("state", &state);

    shared
        .verifiers
        .lock()
        .unwrap()
        .insert(state.clone(), verifier);

    // expiry task; removing an already-consumed state is a no-op
    let expiry = shared.clone();
    tokio::spawn(async move {
        tokio::time::sleep(expiry.state_ttl).await;
        expiry.verifiers.lock().unwrap().remove(&state);
    });

    Redirect::to(url.as_str())
}

/// `GET /oauth` — redeem the `state`, exchange the code, hand the bearer
/// token off to the registry.
async fn complete(State(shared): State<Arc<Shared>>, RawQuery(query): RawQuery) -> Redirect {
    let params: HashMap<String, String> =
        url::form_urlencoded::parse(query.as_deref().unwrap_or("").as_bytes())
            .into_owned()
            .collect();

    let Some(state) = params.get("state") else {
        return decline();
    };
    // lookup-and-remove under one lock: each state is redeemable at most once
    let Some(verifier) = shared.verifiers.lock().unwrap().remove(state) else {
        return decline();
    };
    let Some(code) = params.get("code") else {
        return decline();
    };

    let body = serde_json::json!({
        "code": code,
        "grant_type": "authorization_code",
        "code_verifier": verifier,
        "redirect_uri": shared.redirect_url.as_str(),
        "client_id": CLIENT_ID,
    });

    let response = match shared
        .http
        .post(shared.token_url.clone())
        .json(&body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(error) => {
            warn!(%error, "token exchange unreachable");
            return decline();
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), "token exchange rejected");
        return decline();
    }

    let json: serde_json::Value = match response.json().await {
        Ok(json) => json,
        Err(error) => {
            warn!(%error, "token exchange returned invalid JSON");
            return decline();
        }
    };

    let (Some(token_type), Some(access_token)) =
        (json["token_type"].as_str(), json["access_token"].as_str())
    else {
        return decline();
    };

    // registration happens off the request path; its failure is logged
    // and never reaches the browser
    let token = format!("{token_type} {access_token}");
    let registry = shared.registry.clone();
    tokio::spawn(async move {
        if let Err(error) = registry.handle_token(&token).await {
            warn!(%error, "engine registration failed");
        }
    });

    Redirect::to(COMPLETED_URL)
}
