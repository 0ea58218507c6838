//! One analysis job, end to end: UCI script in, raw engine output out.
//!
//! The bridge owns the engine subprocess completely. Whatever happens —
//! clean completion, a write failure, a rejected submission — the process
//! is killed before `analyze` returns, so no engine outlives its job.

use std::fmt::Display;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::consts::DEFAULT_DEPTH;

/// One analysis request from the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub work: Work,
}

/// Position and search parameters for one job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Work {
    pub threads: u32,
    pub multi_pv: u32,
    pub initial_fen: String,
    #[serde(default)]
    pub moves: Vec<String>,
    #[serde(default)]
    pub infinite: bool,
}

fn setoption(script: &mut String, name: &str, value: impl Display) {
    script.push_str(&format!("setoption name {name} value {value}\n"));
}

/// Build the full UCI command script for a job. Depth is the bridge's
/// fixed default, never taken from the work item.
pub fn uci_script(work: &Work, depth: u32) -> String {
    let mut script = String::new();
    setoption(&mut script, "UCI_Chess960", "true");
    setoption(&mut script, "Threads", work.threads);
    setoption(&mut script, "MultiPV", work.multi_pv);
    script.push_str(&format!(
        "position fen {} moves {}\n",
        work.initial_fen,
        work.moves.join(" ")
    ));
    if work.infinite {
        script.push_str("go infinite\n");
    } else {
        script.push_str(&format!("go depth {depth}\n"));
    }
    script
}

/// Runs one engine subprocess per work item and streams its output to
/// the platform.
pub struct Analyser {
    engine_path: PathBuf,
    engine_base: String,
    http: reqwest::Client,
}

impl Analyser {
    pub fn new(engine_path: PathBuf, engine_base: String, http: reqwest::Client) -> Self {
        Self {
            engine_path,
            engine_base,
            http,
        }
    }

    /// Drive one job: spawn, script, stream, and always kill. A single
    /// attempt — the platform reissues work it never got an answer for.
    pub async fn analyze(&self, item: WorkItem) -> Result<()> {
        info!(id = %item.id, "starting analysis");
        let script = uci_script(&item.work, DEFAULT_DEPTH);

        let mut child = Command::new(&self.engine_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("could not start engine")?;

        let result = self.drive(&mut child, &item.id, &script).await;
        // the single kill point, reached on every exit path
        let _ = child.kill().await;

        if result.is_ok() {
            info!(id = %item.id, "analysis completed");
        }
        result
    }

    async fn drive(&self, child: &mut Child, id: &str, script: &str) -> Result<()> {
        let mut stdin = child.stdin.take().context("engine stdin unavailable")?;
        let stdout = child.stdout.take().context("engine stdout unavailable")?;

        // the whole script in one write; stdin then stays open so the
        // engine keeps searching until it is killed
        stdin
            .write_all(script.as_bytes())
            .await
            .context("could not write to engine")?;
        stdin.flush().await.context("could not write to engine")?;

        let body = reqwest::Body::wrap_stream(ReaderStream::new(stdout));
        let response = self
            .http
            .post(format!("{}/external-engine/work/{id}", self.engine_base))
            .body(body)
            .send()
            .await
            .context("could not submit analysis")?;

        if !response.status().is_success() {
            bail!("analysis submission rejected: {}", response.status());
        }

        info!(id, "analysis started");

        // the platform closing its response stream is the sole stop signal;
        // the content itself is ignored
        let mut stream = response.bytes_stream();
        while let Some(Ok(_)) = stream.next().await {}

        Ok(())
    }
}
