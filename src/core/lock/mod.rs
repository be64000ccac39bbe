// Channel lock coordination

pub mod coordinator;

pub use coordinator::{ChannelLockCoordinator, LockOutcome, LockTransition};
