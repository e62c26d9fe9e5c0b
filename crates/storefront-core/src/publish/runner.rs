//! Background runner: wait out the debounce window, fire once, clean up.
//!
//! ```text
//! Waiting ──(deadline cleared)──────────────────────────────▶ Done
//!    │  ▲
//!    │  └─(deadline in future: sleep min(delay, cap), re-read)
//!    ▼
//! Firing ──(deadline unchanged: clear to 0)─────────────────▶ Done
//!    │
//!    └─(deadline bumped while firing)──────────────▶ Waiting
//! ```
//!
//! `Done` always deletes the lease, whether the loop ended normally, on a
//! store error, or by panicking. A deadline written between the final clear
//! and the lease delete found a live lease and started no runner, so after a
//! clean exit the runner checks once more and resumes if it is orphaned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use uuid::Uuid;

use super::action::{ActionReport, ExternalAction};
use super::clock::Clock;
use super::state::{DebounceState, RunnerLease, StateKeys};
use crate::error::Result;
use crate::kv::KvStore;

/// How a runner finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerExit {
    /// The action ran `firings` times (more than once only when the deadline
    /// was pushed forward while an earlier firing was in progress).
    Fired { firings: u32 },
    /// The deadline was already cleared, by another runner or never set.
    AlreadySatisfied,
    /// Store I/O failed; the lease was still released.
    StoreFailed(String),
    /// Something in the loop panicked; the lease was still released.
    Panicked,
}

enum Phase {
    Waiting,
    Firing { deadline: i64 },
}

pub struct Runner {
    store: Arc<dyn KvStore>,
    action: Arc<dyn ExternalAction>,
    clock: Arc<dyn Clock>,
    keys: StateKeys,
    lease: RunnerLease,
    lease_ttl: Duration,
    max_single_sleep: Duration,
    debug: bool,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn KvStore>,
        action: Arc<dyn ExternalAction>,
        clock: Arc<dyn Clock>,
        keys: StateKeys,
        lease: RunnerLease,
        lease_ttl: Duration,
        max_single_sleep: Duration,
        debug: bool,
    ) -> Self {
        Self {
            store,
            action,
            clock,
            keys,
            lease,
            lease_ttl,
            max_single_sleep: max_single_sleep.max(Duration::from_millis(1)),
            debug,
        }
    }

    pub fn id(&self) -> Uuid {
        self.lease.runner_id
    }

    /// Drive the runner to completion and release the lease.
    pub async fn run(self) -> RunnerExit {
        let id = self.id();
        step!(self.debug, runner = %id, key = %self.keys.debounce, "runner started");

        let mut total = 0u32;
        loop {
            let exit = self.run_once().await;
            let clean = match exit {
                RunnerExit::Fired { firings } => {
                    total += firings;
                    true
                }
                RunnerExit::AlreadySatisfied => true,
                _ => false,
            };
            if clean && self.orphaned_deadline().await {
                step!(self.debug, runner = %id, "deadline set while releasing, resuming");
                self.refresh_lease().await;
                continue;
            }

            let exit = match exit {
                RunnerExit::AlreadySatisfied if total > 0 => RunnerExit::Fired { firings: total },
                RunnerExit::Fired { .. } => RunnerExit::Fired { firings: total },
                other => other,
            };
            step!(self.debug, runner = %id, exit = ?exit, "runner finished");
            return exit;
        }
    }

    /// One pass of the state machine followed by the lease delete.
    async fn run_once(&self) -> RunnerExit {
        let id = self.id();
        let exit = match AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(Ok(exit)) => exit,
            Ok(Err(e)) => {
                tracing::warn!(runner = %id, error = %e, "runner stopped on store error");
                RunnerExit::StoreFailed(e.to_string())
            }
            Err(_) => {
                tracing::error!(runner = %id, "runner panicked");
                RunnerExit::Panicked
            }
        };

        match RunnerLease::release(self.store.as_ref(), &self.keys).await {
            Ok(()) => step!(self.debug, runner = %id, "lease released"),
            Err(e) => {
                tracing::warn!(runner = %id, error = %e, "lease release failed, waiting for TTL")
            }
        }
        exit
    }

    /// A pending deadline with no lease holder: nobody else will act on it.
    async fn orphaned_deadline(&self) -> bool {
        let pending = match DebounceState::load(self.store.as_ref(), &self.keys).await {
            Ok(state) => state.is_pending(),
            Err(e) => {
                tracing::warn!(runner = %self.id(), error = %e, "could not re-read deadline after release");
                return false;
            }
        };
        pending && !RunnerLease::exists(self.store.as_ref(), &self.keys).await.unwrap_or(true)
    }

    async fn drive(&self) -> Result<RunnerExit> {
        let mut phase = Phase::Waiting;
        let mut firings = 0u32;

        loop {
            match phase {
                Phase::Waiting => {
                    let state = DebounceState::load(self.store.as_ref(), &self.keys).await?;
                    if !state.is_pending() {
                        step!(self.debug, runner = %self.id(), "deadline cleared, nothing to fire");
                        return Ok(if firings > 0 {
                            RunnerExit::Fired { firings }
                        } else {
                            RunnerExit::AlreadySatisfied
                        });
                    }

                    let delay = state.scheduled_at_millis - self.clock.now_millis();
                    if delay > 0 {
                        let nap = Duration::from_millis(delay as u64).min(self.max_single_sleep);
                        step!(
                            self.debug,
                            runner = %self.id(),
                            delay_ms = delay,
                            sleep_ms = nap.as_millis() as u64,
                            "waiting for quiet period"
                        );
                        self.refresh_lease().await;
                        tokio::time::sleep(nap).await;
                        continue;
                    }
                    phase = Phase::Firing {
                        deadline: state.scheduled_at_millis,
                    };
                }
                Phase::Firing { deadline } => {
                    self.fire().await;
                    firings += 1;
                    if self.settle(deadline).await {
                        return Ok(RunnerExit::Fired { firings });
                    }
                    phase = Phase::Waiting;
                }
            }
        }
    }

    /// Run the action once. Errors and panics are logged and swallowed.
    async fn fire(&self) -> Option<ActionReport> {
        step!(self.debug, runner = %self.id(), "firing external action");
        match AssertUnwindSafe(self.action.execute()).catch_unwind().await {
            Ok(Ok(report)) => {
                step!(self.debug, runner = %self.id(), report = ?report, "external action finished");
                Some(report)
            }
            Ok(Err(e)) => {
                tracing::warn!(runner = %self.id(), error = %e, "external action failed");
                None
            }
            Err(_) => {
                tracing::error!(runner = %self.id(), "external action panicked");
                None
            }
        }
    }

    /// Clear the deadline after a firing. Returns `false` when a trigger moved
    /// the deadline past the one just fired, in which case the state is left
    /// alone and the runner goes back to waiting.
    async fn settle(&self, fired_deadline: i64) -> bool {
        match DebounceState::load(self.store.as_ref(), &self.keys).await {
            Ok(current) if current.scheduled_at_millis > fired_deadline => {
                step!(
                    self.debug,
                    runner = %self.id(),
                    next = current.scheduled_at_millis,
                    "deadline moved during firing, waiting again"
                );
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(runner = %self.id(), error = %e, "could not re-read deadline after firing");
            }
        }
        if let Err(e) = DebounceState::cleared()
            .save(self.store.as_ref(), &self.keys)
            .await
        {
            tracing::warn!(runner = %self.id(), error = %e, "could not clear deadline");
        }
        true
    }

    /// Keep the lease alive while waiting; a long run of bumps can otherwise
    /// outlast the TTL written at trigger time.
    async fn refresh_lease(&self) {
        if let Err(e) = self
            .lease
            .write(self.store.as_ref(), &self.keys, self.lease_ttl)
            .await
        {
            tracing::debug!(runner = %self.id(), error = %e, "lease refresh failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
