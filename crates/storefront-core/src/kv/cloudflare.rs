//! Cloudflare Workers KV namespace accessed over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use super::KvStore;
use crate::error::{Result, StorefrontError};

/// Shortest expiry the KV API accepts.
const MIN_TTL_SECS: u64 = 60;

pub struct CloudflareKv {
    client: reqwest::Client,
    values_url: Url,
    api_token: String,
}

impl CloudflareKv {
    pub fn new(api_base: &str, account_id: &str, namespace_id: &str, api_token: &str) -> Result<Self> {
        if account_id.is_empty() || namespace_id.is_empty() || api_token.is_empty() {
            return Err(StorefrontError::Config(
                "cloudflare store needs an account id, namespace id and API token".into(),
            ));
        }
        let mut values_url = Url::parse(api_base.trim_end_matches('/'))
            .map_err(|e| StorefrontError::Config(format!("bad api base '{api_base}': {e}")))?;
        values_url
            .path_segments_mut()
            .map_err(|_| StorefrontError::Config(format!("api base '{api_base}' cannot be a base")))?
            .pop_if_empty()
            .extend([
                "accounts",
                account_id,
                "storage",
                "kv",
                "namespaces",
                namespace_id,
                "values",
            ]);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            values_url,
            api_token: api_token.to_string(),
        })
    }

    /// URL of a single value; the key is percent-encoded as one path segment.
    fn value_url(&self, key: &str) -> Url {
        let mut url = self.values_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(key);
        }
        url
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(StorefrontError::Remote { status, body })
    }
}

/// TTL in whole seconds, rounded up and clamped to the API minimum.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.max(MIN_TTL_SECS)
}

#[async_trait]
impl KvStore for CloudflareKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .get(self.value_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check(resp).await?;
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut req = self
            .client
            .put(self.value_url(key))
            .bearer_auth(&self.api_token)
            .body(value.to_vec());
        if let Some(ttl) = ttl {
            req = req.query(&[("expiration_ttl", ttl_secs(ttl))]);
        }
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.value_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp).await?;
        Ok(())
    }
}
