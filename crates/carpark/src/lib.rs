//! carpark: a bounded parking lot shared by parker and picker threads.
//!
//! One mutex guards a fixed ring of spaces; parkers wait on a `space_available`
//! condition while the lot is full, pickers wait on `item_available` while it
//! is empty. Every thread meets at a start barrier before acting, and a
//! monitor periodically checks `produced == consumed + occupied`.

mod barrier;
mod ring;
mod shutdown;

pub mod config;
pub mod error;
pub mod lot;
pub mod monitor;
pub mod pool;
pub mod worker;

pub use barrier::{BarrierAborted, BarrierRelease, StartBarrier};
pub use config::{LotConfig, Pacing};
pub use error::{ConfigError, LotError, PoolError};
pub use lot::{Lot, LotHandle, LotSummary};
pub use monitor::{ConsistencyMonitor, ConsistencyReport, MonitorStats, ReportSink, TracingSink};
pub use pool::{PoolSnapshot, SlotPool};
pub use ring::Car;
pub use shutdown::Shutdown;
pub use worker::{Role, StopReason, WorkerContext, WorkerState, WorkerStats, run_worker};
