//! Long-polling work dispatcher.
//!
//! Asks the platform for analysis jobs in a tight loop and hands each
//! valid item to the [`Analyser`] on its own task. The loop itself never
//! waits on an analysis and never backs off: the platform paces the
//! responses, and anything that is not a valid item simply means "ask
//! again".

use std::sync::Arc;

use anyhow::Result;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::bridge::{Analyser, WorkItem};

pub struct Dispatcher {
    http: reqwest::Client,
    engine_base: String,
    secret: String,
    analyser: Arc<Analyser>,
}

impl Dispatcher {
    pub fn new(
        http: reqwest::Client,
        engine_base: String,
        secret: String,
        analyser: Arc<Analyser>,
    ) -> Self {
        Self {
            http,
            engine_base,
            secret,
            analyser,
        }
    }

    /// Poll for work forever. Network errors, non-2xx responses, 204
    /// "no work", and malformed bodies all lead straight to the next
    /// poll; a valid item is spawned off without being awaited.
    pub async fn run(&self) -> Result<()> {
        info!("waiting for analysis requests");
        let url = format!("{}/external-engine/work", self.engine_base);
        let body = serde_json::json!({ "providerSecret": self.secret });

        loop {
            let response = match self.http.post(&url).json(&body).send().await {
                Ok(response) => response,
                Err(error) => {
                    debug!(%error, "work request failed");
                    continue;
                }
            };

            if response.status() == StatusCode::NO_CONTENT || !response.status().is_success() {
                continue;
            }

            let item: WorkItem = match response.json().await {
                Ok(item) => item,
                Err(error) => {
                    debug!(%error, "discarding malformed work item");
                    continue;
                }
            };

            let analyser = self.analyser.clone();
            tokio::spawn(async move {
                let id = item.id.clone();
                if let Err(error) = analyser.analyze(item).await {
                    warn!(id, %error, "analysis abandoned");
                }
            });
        }
    }
}
