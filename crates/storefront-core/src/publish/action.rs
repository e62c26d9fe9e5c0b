use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::clock::capped_sleep;
use crate::config::{CachePurgeConfig, PublishConfig};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    Failed(String),
    Skipped,
}

/// What happened to each step of one firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub hook: StepOutcome,
    pub purge: StepOutcome,
}

// ---------------------------------------------------------------------------
// ExternalAction
// ---------------------------------------------------------------------------

/// The side effect a scheduler coalesces. Must tolerate running more than
/// once for the same burst of changes.
#[async_trait]
pub trait ExternalAction: Send + Sync {
    async fn execute(&self) -> Result<ActionReport>;
}

// ---------------------------------------------------------------------------
// HttpPublishAction
// ---------------------------------------------------------------------------

/// POSTs the deploy hook, then (optionally after a delay) purges the CDN zone.
pub struct HttpPublishAction {
    client: reqwest::Client,
    hook_url: String,
    purge: CachePurgeConfig,
    max_single_sleep: Duration,
    debug: bool,
}

impl HttpPublishAction {
    /// `None` when no deploy hook is configured.
    pub fn from_config(cfg: &PublishConfig) -> Result<Option<Self>> {
        let Some(hook_url) = cfg.hook_url() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(cfg.http_timeout())
            .build()?;
        Ok(Some(Self {
            client,
            hook_url: hook_url.to_string(),
            purge: cfg.cache_purge.clone(),
            max_single_sleep: cfg.max_single_sleep(),
            debug: cfg.debug,
        }))
    }

    async fn call_hook(&self) -> StepOutcome {
        step!(self.debug, url = %self.hook_url, "calling deploy hook");
        let sent = self
            .client
            .post(&self.hook_url)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match sent {
            Ok(resp) => {
                step!(self.debug, status = %resp.status(), "deploy hook accepted");
                StepOutcome::Done
            }
            Err(e) => {
                tracing::warn!(error = %e, "deploy hook call failed");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn purge_cache(&self) -> StepOutcome {
        let Some((token, zone)) = self.purge.credentials() else {
            step!(self.debug, "cache purge disabled or not configured, skipping");
            return StepOutcome::Skipped;
        };

        let delay = self.purge.delay();
        if !delay.is_zero() {
            step!(self.debug, delay_ms = delay.as_millis() as u64, "waiting before cache purge");
            capped_sleep(delay, self.max_single_sleep).await;
        }

        let url = format!(
            "{}/zones/{}/purge_cache",
            self.purge.api_base.trim_end_matches('/'),
            zone
        );
        step!(self.debug, zone = %zone, "purging CDN cache");
        let sent = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "purge_everything": true }))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match sent {
            Ok(_) => {
                step!(self.debug, zone = %zone, "cache purge accepted");
                StepOutcome::Done
            }
            Err(e) => {
                tracing::warn!(zone = %zone, error = %e, "cache purge failed");
                StepOutcome::Failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl ExternalAction for HttpPublishAction {
    /// Both steps run regardless of each other's result; failures are
    /// reported, never returned as errors.
    async fn execute(&self) -> Result<ActionReport> {
        let hook = self.call_hook().await;
        let purge = self.purge_cache().await;
        Ok(ActionReport { hook, purge })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
