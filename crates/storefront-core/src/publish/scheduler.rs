use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use super::action::{ExternalAction, HttpPublishAction};
use super::clock::{Clock, SystemClock};
use super::runner::Runner;
use super::state::{lease_ttl, DebounceState, RunnerLease, StateKeys};
use super::tasks::BackgroundTasks;
use super::CONTENT_PUBLISH;
use crate::config::PublishConfig;
use crate::error::Result;
use crate::kv::KvStore;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Action kind used by [`Scheduler::notify_content_changed`].
    pub kind: String,
    pub debounce: Duration,
    pub max_single_sleep: Duration,
    /// Upper bound on one firing of the action, folded into the lease TTL.
    pub action_budget: Duration,
    pub debug: bool,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &PublishConfig) -> Self {
        Self {
            kind: CONTENT_PUBLISH.to_string(),
            debounce: cfg.debounce(),
            max_single_sleep: cfg.max_single_sleep(),
            // hook call + purge call + purge delay
            action_budget: cfg.http_timeout() * 2 + cfg.cache_purge.delay(),
            debug: cfg.debug,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&PublishConfig::default())
    }
}

// ---------------------------------------------------------------------------
// TriggerOutcome
// ---------------------------------------------------------------------------

/// What a [`Scheduler::trigger`] call did. Informational only; callers are
/// free to ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// No action configured.
    Disabled,
    /// Zero window: the action was started detached, without debouncing.
    FiredImmediately,
    /// Deadline written; `runner_started` is false when a lease was found.
    Scheduled {
        scheduled_at_millis: i64,
        runner_started: bool,
    },
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn KvStore>,
    action: Option<Arc<dyn ExternalAction>>,
    clock: Arc<dyn Clock>,
    tasks: BackgroundTasks,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn KvStore>,
        action: Option<Arc<dyn ExternalAction>>,
        clock: Arc<dyn Clock>,
        tasks: BackgroundTasks,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            action,
            clock,
            tasks,
            settings,
        }
    }

    /// Scheduler backed by [`HttpPublishAction`] and wall-clock time.
    pub fn from_config(
        store: Arc<dyn KvStore>,
        cfg: &PublishConfig,
        tasks: BackgroundTasks,
    ) -> Result<Self> {
        let action = HttpPublishAction::from_config(cfg)?
            .map(|a| Arc::new(a) as Arc<dyn ExternalAction>);
        Ok(Self::new(
            store,
            action,
            Arc::new(SystemClock),
            tasks,
            SchedulerSettings::from_config(cfg),
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.action.is_some()
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Trigger the content publish kind with the configured window.
    pub async fn notify_content_changed(&self) -> TriggerOutcome {
        self.trigger(&self.settings.kind, self.settings.debounce)
            .await
    }

    /// Record a change for `kind` and make sure a runner will act on it.
    ///
    /// Never fails: store errors are logged and the call degrades to "may
    /// fire late or twice".
    pub async fn trigger(&self, kind: &str, window: Duration) -> TriggerOutcome {
        let debug = self.settings.debug;
        let Some(action) = self.action.clone() else {
            step!(debug, kind = %kind, "publish disabled, ignoring trigger");
            return TriggerOutcome::Disabled;
        };

        if window.is_zero() {
            step!(debug, kind = %kind, "no debounce window, firing immediately");
            let kind = kind.to_string();
            self.tasks
                .spawn(async move { fire_detached(action, &kind, debug).await });
            return TriggerOutcome::FiredImmediately;
        }

        let keys = StateKeys::for_kind(kind);
        let now = self.clock.now_millis();
        let scheduled_at = now.saturating_add(i64::try_from(window.as_millis()).unwrap_or(i64::MAX));

        if let Err(e) = DebounceState::at(scheduled_at)
            .save(self.store.as_ref(), &keys)
            .await
        {
            tracing::warn!(kind = %kind, error = %e, "could not write debounce state");
        }
        step!(debug, kind = %kind, scheduled_at, "debounce deadline moved");

        let leased = match RunnerLease::exists(self.store.as_ref(), &keys).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "could not read runner lease, starting a runner");
                false
            }
        };
        if leased {
            step!(debug, kind = %kind, "runner already active");
            return TriggerOutcome::Scheduled {
                scheduled_at_millis: scheduled_at,
                runner_started: false,
            };
        }

        let ttl = lease_ttl(
            window,
            self.settings.max_single_sleep,
            self.settings.action_budget,
        );
        let lease = RunnerLease::new(now);
        if let Err(e) = lease.write(self.store.as_ref(), &keys, ttl).await {
            tracing::warn!(kind = %kind, error = %e, "could not write runner lease");
        }
        step!(
            debug,
            kind = %kind,
            runner = %lease.runner_id,
            ttl_secs = ttl.as_secs(),
            "starting runner"
        );

        let runner = Runner::new(
            self.store.clone(),
            action,
            self.clock.clone(),
            keys,
            lease,
            ttl,
            self.settings.max_single_sleep,
            debug,
        );
        self.tasks.spawn(async move {
            runner.run().await;
        });

        TriggerOutcome::Scheduled {
            scheduled_at_millis: scheduled_at,
            runner_started: true,
        }
    }
}

async fn fire_detached(action: Arc<dyn ExternalAction>, kind: &str, debug: bool) {
    match AssertUnwindSafe(action.execute()).catch_unwind().await {
        Ok(Ok(report)) => step!(debug, kind = %kind, report = ?report, "immediate publish finished"),
        Ok(Err(e)) => tracing::warn!(kind = %kind, error = %e, "immediate publish failed"),
        Err(_) => tracing::error!(kind = %kind, "immediate publish panicked"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
