//! PostgreSQL storage integration
//!
//! This module provides the production storage backend: channels, messages,
//! processing attempts, channel locks and resource identity mappings.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
