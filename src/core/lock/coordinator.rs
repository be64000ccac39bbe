//! Channel lock coordination
//!
//! One instance at a time works a channel. The lock is a lease: the holder
//! renews it by re-acquiring, and any instance may take it over once the
//! holder has been silent for longer than the break threshold. The lock is
//! advisory; idempotent downstream processing covers the window in which two
//! instances may briefly both believe they hold it.

use crate::adapters::database::traits::LockStorage;
use crate::domain::{ChannelId, InstanceId, Result};
use crate::{log_error_with_context, log_lock_transition};
use std::fmt;
use std::sync::Arc;

/// Change in lock ownership observed by one acquire call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTransition {
    /// Not held before, held now
    Acquired,
    /// Held before, not held now
    Lost,
    /// Held before and now
    StillHeld,
    /// Not held before or now
    StillNotHeld,
}

impl LockTransition {
    /// Derive the transition from the previous and current holding state
    ///
    /// With no previous observation the lock counts as not held before.
    pub fn between(previously_held: Option<bool>, held: bool) -> Self {
        match (previously_held.unwrap_or(false), held) {
            (false, true) => LockTransition::Acquired,
            (true, false) => LockTransition::Lost,
            (true, true) => LockTransition::StillHeld,
            (false, false) => LockTransition::StillNotHeld,
        }
    }

    /// Whether the lock is held after this transition
    pub fn is_held(&self) -> bool {
        matches!(self, LockTransition::Acquired | LockTransition::StillHeld)
    }

    /// Human readable description for log lines
    pub fn describe(&self) -> &'static str {
        match self {
            LockTransition::Acquired => "acquired",
            LockTransition::Lost => "lost",
            LockTransition::StillHeld => "still held",
            LockTransition::StillNotHeld => "held by another instance",
        }
    }
}

impl fmt::Display for LockTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockTransition::Acquired => "ACQUIRED",
            LockTransition::Lost => "LOST",
            LockTransition::StillHeld => "STILL_HELD",
            LockTransition::StillNotHeld => "STILL_NOT_HELD",
        };
        f.write_str(name)
    }
}

/// Result of one acquire call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOutcome {
    /// Observed transition
    pub transition: LockTransition,

    /// True on the first acquire and whenever ownership changed
    pub should_report: bool,
}

impl LockOutcome {
    /// Whether the caller holds the lock
    pub fn is_held(&self) -> bool {
        self.transition.is_held()
    }
}

/// Lease-based lock on a single channel for a single instance
pub struct ChannelLockCoordinator {
    storage: Arc<dyn LockStorage + Send + Sync>,
    channel_id: ChannelId,
    instance_id: InstanceId,
    break_after_seconds: u64,
    previously_held: Option<bool>,
}

impl ChannelLockCoordinator {
    /// Create a coordinator for one channel
    ///
    /// # Arguments
    ///
    /// * `storage` - Lock storage implementation
    /// * `channel_id` - Channel to coordinate
    /// * `instance_id` - This worker instance
    /// * `break_after_seconds` - Silence after which another holder's lock may be taken
    pub fn new(
        storage: Arc<dyn LockStorage + Send + Sync>,
        channel_id: ChannelId,
        instance_id: InstanceId,
        break_after_seconds: u64,
    ) -> Self {
        Self {
            storage,
            channel_id,
            instance_id,
            break_after_seconds,
            previously_held: None,
        }
    }

    /// Whether the last acquire left the lock held
    pub fn is_held(&self) -> bool {
        self.previously_held.unwrap_or(false)
    }

    /// Acquire or renew the lock
    ///
    /// A storage error is logged and counts as not holding the lock.
    /// Reportable transitions are logged here.
    pub async fn acquire(&mut self) -> LockOutcome {
        let held = match self
            .storage
            .get_channel_lock(self.channel_id, self.instance_id, self.break_after_seconds)
            .await
        {
            Ok(held) => held,
            Err(e) => {
                log_error_with_context!(&e, "Failed to acquire channel lock");
                false
            }
        };

        let outcome = self.record(held);
        if outcome.should_report {
            log_lock_transition!(self.channel_id, self.instance_id, outcome.transition);
        }
        outcome
    }

    /// Release the lock if this instance holds it
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn release(&mut self) -> Result<()> {
        if !self.is_held() {
            return Ok(());
        }

        self.storage
            .release_channel_lock(self.channel_id, self.instance_id)
            .await?;
        self.previously_held = Some(false);

        tracing::info!(
            channel_id = %self.channel_id,
            instance_id = %self.instance_id,
            "Channel lock released"
        );
        Ok(())
    }

    fn record(&mut self, held: bool) -> LockOutcome {
        let transition = LockTransition::between(self.previously_held, held);
        let should_report = self.previously_held.map_or(true, |previous| previous != held);
        self.previously_held = Some(held);
        LockOutcome {
            transition,
            should_report,
        }
    }
}
