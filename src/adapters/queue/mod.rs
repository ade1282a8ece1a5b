//! Queue adapters - Delivery of outbox jobs.

mod job_dispatcher;

pub use job_dispatcher::{JobDispatcher, JobDispatcherConfig};
