// Processing state and retry policy

pub mod manager;
pub mod retry;

pub use manager::ProcessingStateManager;
pub use retry::RetryPolicy;
