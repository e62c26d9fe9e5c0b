use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::kv::{self, KvStore};

/// Slack added on top of the longest expected runner lifetime.
const LEASE_MARGIN: Duration = Duration::from_secs(30);

/// Shortest lease TTL; also the minimum expiry some KV providers accept.
const MIN_LEASE_TTL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Well-known store keys for one action kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKeys {
    pub debounce: String,
    pub lease: String,
}

impl StateKeys {
    pub fn for_kind(kind: &str) -> Self {
        Self {
            debounce: format!("publish/{kind}/debounce"),
            lease: format!("publish/{kind}/lease"),
        }
    }
}

// ---------------------------------------------------------------------------
// DebounceState
// ---------------------------------------------------------------------------

/// Next desired execution time. `0` means nothing is pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebounceState {
    #[serde(default)]
    pub scheduled_at_millis: i64,
}

impl DebounceState {
    pub fn at(scheduled_at_millis: i64) -> Self {
        Self {
            scheduled_at_millis,
        }
    }

    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.scheduled_at_millis > 0
    }

    /// Absent reads as cleared.
    pub async fn load(store: &dyn KvStore, keys: &StateKeys) -> Result<Self> {
        Ok(kv::get_json(store, &keys.debounce).await?.unwrap_or_default())
    }

    pub async fn save(&self, store: &dyn KvStore, keys: &StateKeys) -> Result<()> {
        kv::put_json(store, &keys.debounce, self, None).await
    }
}

// ---------------------------------------------------------------------------
// RunnerLease
// ---------------------------------------------------------------------------

/// Presence marker for a live runner. Only its existence is coordinated on;
/// the fields are there for logs and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerLease {
    pub runner_id: Uuid,
    pub acquired_at_millis: i64,
}

impl RunnerLease {
    pub fn new(acquired_at_millis: i64) -> Self {
        Self {
            runner_id: Uuid::new_v4(),
            acquired_at_millis,
        }
    }

    /// Presence check. Any stored value, even an unreadable one, counts.
    pub async fn exists(store: &dyn KvStore, keys: &StateKeys) -> Result<bool> {
        Ok(store.get(&keys.lease).await?.is_some())
    }

    pub async fn load(store: &dyn KvStore, keys: &StateKeys) -> Result<Option<Self>> {
        kv::get_json(store, &keys.lease).await
    }

    pub async fn write(&self, store: &dyn KvStore, keys: &StateKeys, ttl: Duration) -> Result<()> {
        kv::put_json(store, &keys.lease, self, Some(ttl)).await
    }

    pub async fn release(store: &dyn KvStore, keys: &StateKeys) -> Result<()> {
        store.delete(&keys.lease).await
    }
}

/// Lease TTL for a window: strictly longer than the window plus one extra
/// capped sleep plus the action's own budget.
pub fn lease_ttl(window: Duration, max_single_sleep: Duration, action_budget: Duration) -> Duration {
    window
        .saturating_add(max_single_sleep)
        .saturating_add(action_budget)
        .saturating_add(LEASE_MARGIN)
        .max(MIN_LEASE_TTL)
}

// ---------------------------------------------------------------------------
// PublishStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStatus {
    pub kind: String,
    pub debounce: DebounceState,
    pub lease: Option<RunnerLease>,
}

impl PublishStatus {
    pub async fn read(store: &dyn KvStore, kind: &str) -> Result<Self> {
        let keys = StateKeys::for_kind(kind);
        Ok(Self {
            kind: kind.to_string(),
            debounce: DebounceState::load(store, &keys).await?,
            lease: RunnerLease::load(store, &keys).await?,
        })
    }
}
