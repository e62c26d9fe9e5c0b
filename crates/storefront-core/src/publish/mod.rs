//! Debounced publish scheduling.
//!
//! Content writes call [`Scheduler::trigger`]. Every call pushes the shared
//! debounce deadline to `now + window`; the first call that finds no runner
//! lease starts a background [`Runner`] which sleeps (in capped increments)
//! until the deadline stops moving, then runs the [`ExternalAction`] once.
//!
//! # Coordination
//!
//! ```text
//! publish/<kind>/debounce   {"scheduledAtMillis": <epoch ms | 0>}
//! publish/<kind>/lease      {"runnerId": .., "acquiredAtMillis": ..}   (TTL)
//! ```
//!
//! The store may be eventually consistent and has no compare-and-swap, so
//! every step tolerates lost updates and duplicate writers: runners re-read
//! the deadline on every wake, a cleared deadline means "already fired", and a
//! leaked lease expires on its own. Two runners for the same window can both
//! fire; the action must tolerate that.

/// Step-by-step trace of the scheduler. Raised to `info` when the publish
/// debug flag is on so it shows under the default filter.
macro_rules! step {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod action;
pub mod clock;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod tasks;

pub use action::{ActionReport, ExternalAction, HttpPublishAction, StepOutcome};
pub use clock::{capped_sleep, Clock, SystemClock, TokioClock};
pub use runner::{Runner, RunnerExit};
pub use scheduler::{Scheduler, SchedulerSettings, TriggerOutcome};
pub use state::{DebounceState, PublishStatus, RunnerLease, StateKeys};
pub use tasks::BackgroundTasks;

/// Action kind used for catalog content changes.
pub const CONTENT_PUBLISH: &str = "deploy";
