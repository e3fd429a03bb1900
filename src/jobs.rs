//! Background job tracking: the durable registry, status classification, staleness advisories,
//! and the per-job polling orchestrator.

pub mod job;
pub mod poller;
pub mod registry;
pub mod staleness;
pub mod status;
pub mod task;

pub use job::*;
pub use poller::*;
pub use registry::*;
pub use staleness::*;
pub use status::*;
pub use task::*;
