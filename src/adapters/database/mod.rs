//! Storage abstraction layer
//!
//! This module provides a trait-based abstraction for storage operations,
//! allowing HL7 Relay to run against PostgreSQL or a process-local store.

pub mod factory;
pub mod traits;

pub use factory::{create_storage, Storage};
pub use traits::{
    ChannelStatus, ChannelStorage, DatabaseClient, LockStorage, MappingStorage, ProcessingStorage,
};
