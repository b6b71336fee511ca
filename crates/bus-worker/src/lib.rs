//! Worker runtime: handler registry, dispatch, retry/backoff, dead-lettering,
//! and task-record bookkeeping for long-running actions.

pub mod error;
pub mod handler;
pub mod registry;
pub mod task_record;
pub mod task_store;
pub mod worker;

pub use error::WorkerError;
pub use handler::{parse_action_data, ActionHandler, FnHandler};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use task_record::{TaskCounters, TaskRecord, TaskStatus};
pub use task_store::TaskStore;
pub use worker::{Worker, WorkerConfig};
