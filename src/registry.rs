//! Engine registration against the platform.
//!
//! Each bearer token obtained through the OAuth flow maps to at most one
//! provider-assigned engine id. `handle_token` creates that mapping on
//! first sight and refreshes the registration on every later call, so it
//! doubles as the startup heartbeat for previously-authorized tokens.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tracing::info;

use crate::consts::{DEFAULT_DEPTH, ENGINE_ID_PREFIX, MAX_HASH};
use crate::store::Store;

/// Capabilities advertised to the platform on register and update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EngineDescriptor<'a> {
    name: &'a str,
    max_threads: u32,
    max_hash: u32,
    default_depth: u32,
    variants: &'a [&'a str],
    provider_secret: &'a str,
}

pub struct Registry {
    store: Arc<Store>,
    http: reqwest::Client,
    api_base: String,
    secret: String,
    name: String,
}

impl Registry {
    pub fn new(
        store: Arc<Store>,
        http: reqwest::Client,
        api_base: String,
        secret: String,
        name: String,
    ) -> Self {
        Self {
            store,
            http,
            api_base,
            secret,
            name,
        }
    }

    /// Register the engine under `token`, or refresh an existing
    /// registration. Idempotent; a failure is reported once and never
    /// retried here.
    pub async fn handle_token(&self, token: &str) -> Result<()> {
        let key = format!("{ENGINE_ID_PREFIX}{token}");
        match self.store.get(&key)? {
            Some(id) => self.update(token, &key, &id).await,
            None => self.register(token, &key).await,
        }
    }

    fn descriptor(&self) -> EngineDescriptor<'_> {
        EngineDescriptor {
            name: &self.name,
            max_threads: std::thread::available_parallelism().map_or(1, |n| n.get()) as u32,
            max_hash: MAX_HASH,
            default_depth: DEFAULT_DEPTH,
            variants: &["chess"],
            provider_secret: &self.secret,
        }
    }

    async fn update(&self, token: &str, key: &str, id: &str) -> Result<()> {
        let response = self
            .http
            .put(format!("{}/external-engine/{id}", self.api_base))
            .header(AUTHORIZATION, token)
            .json(&self.descriptor())
            .send()
            .await
            .context("could not reach the engine update endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            if body["error"] == "No such token" {
                // the bearer token itself is dead; forget the mapping
                self.store.delete(key)?;
                info!("purged stale engine registration");
                return Ok(());
            }
            bail!("could not update engine: {status} {body}");
        }

        info!(id, "engine registration refreshed");
        Ok(())
    }

    async fn register(&self, token: &str, key: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/external-engine", self.api_base))
            .header(AUTHORIZATION, token)
            .json(&self.descriptor())
            .send()
            .await
            .context("could not reach the engine registration endpoint")?;

        if !response.status().is_success() {
            bail!("could not register engine: {}", response.status());
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("engine registration returned invalid JSON")?;
        let Some(id) = json["id"].as_str() else {
            bail!("engine registration response is missing an id");
        };

        self.store.set(key, id)?;
        info!(id, "engine registered");
        Ok(())
    }
}
