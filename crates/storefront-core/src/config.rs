use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared bearer token required by the admin API. Unset means every admin
    /// request is refused.
    #[serde(default)]
    pub admin_token: Option<String>,
    /// Exposed to the client through `/api/public/get-debug-flags`.
    #[serde(default)]
    pub debug_errors: bool,
}

fn default_port() -> u16 {
    8788
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            admin_token: None,
            debug_errors: false,
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    Redb {
        #[serde(default = "default_db_path")]
        path: PathBuf,
    },
    Cloudflare {
        account_id: String,
        namespace_id: String,
        api_token: String,
        #[serde(default = "default_cf_api_base")]
        api_base: String,
    },
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/storefront.redb")
}

fn default_cf_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Redb {
            path: default_db_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// PublishConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePurgeConfig {
    #[serde(default = "default_purge_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default = "default_cf_api_base")]
    pub api_base: String,
}

fn default_purge_enabled() -> bool {
    true
}

impl Default for CachePurgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_purge_enabled(),
            delay_ms: 0,
            api_token: None,
            zone_id: None,
            api_base: default_cf_api_base(),
        }
    }
}

impl CachePurgeConfig {
    /// Credential and zone, only when the purge step is enabled and both are
    /// present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if !self.enabled {
            return None;
        }
        let token = self.api_token.as_deref().filter(|t| !t.is_empty())?;
        let zone = self.zone_id.as_deref().filter(|z| !z.is_empty())?;
        Some((token, zone))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Deploy/rebuild hook. Unset disables the scheduler entirely.
    #[serde(default)]
    pub deploy_hook_url: Option<String>,
    /// Coalescing window. `0` fires on every content change.
    #[serde(default)]
    pub debounce_ms: u64,
    /// Longest single suspension a runner may take before re-reading state.
    #[serde(default = "default_max_single_sleep_ms")]
    pub max_single_sleep_ms: u64,
    /// Timeout applied to each outbound publish/purge request.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub cache_purge: CachePurgeConfig,
}

/// Windows above this are accepted but flagged by [`Config::validate`].
const MAX_REASONABLE_DEBOUNCE_MS: u64 = 24 * 60 * 60 * 1000;

fn default_max_single_sleep_ms() -> u64 {
    25_000
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            deploy_hook_url: None,
            debounce_ms: 0,
            max_single_sleep_ms: default_max_single_sleep_ms(),
            http_timeout_ms: default_http_timeout_ms(),
            debug: false,
            cache_purge: CachePurgeConfig::default(),
        }
    }
}

impl PublishConfig {
    pub fn hook_url(&self) -> Option<&str> {
        self.deploy_hook_url.as_deref().filter(|u| !u.is_empty())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_single_sleep(&self) -> Duration {
        Duration::from_millis(self.max_single_sleep_ms.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Config {
    /// Load the YAML file at `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Override fields from environment-style variables resolved by `lookup`.
    ///
    /// Values that fail to parse keep the current setting and log a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|&k| get(k));

        // Server
        if let Some(v) = get("STOREFRONT_PORT") {
            set_parsed(&mut self.server.port, "STOREFRONT_PORT", &v);
        }
        if let Some(v) = get("ADMIN_TOKEN") {
            self.server.admin_token = Some(v);
        }
        let debug_errors = get("DEBUG_ERRORS").map(|v| v == "true");
        let development = get("APP_ENV").map(|v| v == "development");
        if debug_errors.is_some() || development.is_some() {
            self.server.debug_errors =
                debug_errors.unwrap_or(false) || development.unwrap_or(false);
        }

        // Store
        match get("KV_BACKEND").as_deref() {
            Some("memory") => self.store = StoreConfig::Memory,
            Some("redb") => {
                self.store = StoreConfig::Redb {
                    path: get("STOREFRONT_DB")
                        .map(PathBuf::from)
                        .unwrap_or_else(default_db_path),
                }
            }
            Some("cloudflare") => {
                self.store = StoreConfig::Cloudflare {
                    account_id: get("CF_ACCOUNT_ID").unwrap_or_default(),
                    namespace_id: get("CF_KV_NAMESPACE_ID").unwrap_or_default(),
                    api_token: first(&["CF_API_TOKEN", "CLOUDFLARE_API_TOKEN"])
                        .unwrap_or_default(),
                    api_base: get("CF_API_BASE").unwrap_or_else(default_cf_api_base),
                }
            }
            Some(other) => {
                tracing::warn!(backend = %other, "unknown KV_BACKEND, keeping configured store");
            }
            None => {
                if let (Some(p), StoreConfig::Redb { path }) =
                    (get("STOREFRONT_DB"), &mut self.store)
                {
                    *path = PathBuf::from(p);
                }
            }
        }

        // Publish
        if let Some(v) = get("PAGES_DEPLOY_HOOK_URL") {
            self.publish.deploy_hook_url = Some(v);
        }
        if let Some(v) = get("DEPLOY_DEBOUNCE_MS") {
            set_parsed(&mut self.publish.debounce_ms, "DEPLOY_DEBOUNCE_MS", &v);
        }
        if let Some(v) = get("DEPLOY_MAX_SLEEP_MS") {
            set_parsed(
                &mut self.publish.max_single_sleep_ms,
                "DEPLOY_MAX_SLEEP_MS",
                &v,
            );
        }
        if let Some(v) = get("DEPLOY_DEBUG") {
            self.publish.debug = parse_flag(&v);
        }

        let purge = &mut self.publish.cache_purge;
        if let Some(v) = get("CACHE_PURGE_ENABLED") {
            purge.enabled = parse_flag(&v);
        }
        if let Some(v) = get("CACHE_PURGE_DELAY_MS") {
            set_parsed(&mut purge.delay_ms, "CACHE_PURGE_DELAY_MS", &v);
        }
        if let Some(v) = first(&["CLOUDFLARE_API_TOKEN", "CF_API_TOKEN"]) {
            purge.api_token = Some(v);
        }
        if let Some(v) = first(&["CLOUDFLARE_ZONE_ID", "CF_ZONE_ID"]) {
            purge.zone_id = Some(v);
        }
        if let Some(v) = get("CF_API_BASE") {
            purge.api_base = v;
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.server.admin_token.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "ADMIN_TOKEN is not set: admin API requests will be refused".into(),
            });
        }

        if let StoreConfig::Cloudflare {
            account_id,
            namespace_id,
            api_token,
            ..
        } = &self.store
        {
            if account_id.is_empty() || namespace_id.is_empty() || api_token.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "cloudflare store needs CF_ACCOUNT_ID, CF_KV_NAMESPACE_ID and CF_API_TOKEN"
                        .into(),
                });
            }
        }

        if self.publish.hook_url().is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "PAGES_DEPLOY_HOOK_URL is not set: content changes will not be published"
                    .into(),
            });
        } else if self.publish.cache_purge.enabled
            && self.publish.cache_purge.credentials().is_none()
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "cache purge is enabled but the API token or zone id is missing; purge will be skipped"
                    .into(),
            });
        }

        if self.publish.debounce_ms > MAX_REASONABLE_DEBOUNCE_MS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "DEPLOY_DEBOUNCE_MS is {} (over one day): content changes will publish very late",
                    self.publish.debounce_ms
                ),
            });
        }

        warnings
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable config value"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
