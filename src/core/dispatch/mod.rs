//! Message dispatch
//!
//! - [`processor`] - End-to-end pipeline for one message
//! - [`dispatcher`] - Per-channel lock and backlog loop
//! - [`supervisor`] - Starts and stops the dispatchers of an instance
//! - [`summary`] - Run summaries

pub mod dispatcher;
pub mod processor;
pub mod summary;
pub mod supervisor;

pub use dispatcher::{ChannelDispatcher, DispatcherSettings};
pub use processor::MessageProcessor;
pub use summary::{DispatchSummary, SupervisorSummary};
pub use supervisor::Supervisor;
