//! Client for originating actions on the bus: the three send modes and the
//! list-backend abstraction they're built on.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::{InMemoryBackend, ListBackend};
pub use client::{BusClient, SendOptions};
pub use error::ClientError;
