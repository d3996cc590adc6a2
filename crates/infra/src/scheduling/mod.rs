//! Background maintenance schedulers
//!
//! - Sweep scheduler: periodic removal of expired entries from both tiers
//! - Replay scheduler: drains the background request queue on an interval
//!   and whenever connectivity returns
//!
//! Both follow the same runtime rules:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on shutdown

pub mod error;
pub mod replay_scheduler;
pub mod sweep_scheduler;
mod task;

pub use error::{SchedulerError, SchedulerResult};
pub use replay_scheduler::{ReplayScheduler, ReplaySchedulerConfig};
pub use sweep_scheduler::{SweepScheduler, SweepSchedulerConfig};
