//! Shared envelope model, queue-name resolver, tier policy, and error
//! taxonomy for the action bus.

pub mod envelope;
pub mod error;
pub mod policy;
pub mod queue;
pub mod tier;

pub use envelope::{Action, ActionResponse};
pub use error::{EnvelopeError, ErrorCode, ErrorDetail, QueueNameError};
pub use policy::{Feature, TierLimits, TierPolicy};
pub use queue::QueueNameResolver;
pub use tier::Tier;
