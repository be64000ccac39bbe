//! Per-channel dispatcher loop
//!
//! Each active channel gets one dispatcher. The loop alternates between
//! claiming the channel lock and, while holding it, draining the backlog in
//! arrival order:
//!
//! 1. acquire or renew the lock (storage errors count as not held)
//! 2. until the renewal interval elapses: fetch the next due message and
//!    process it end to end, or sleep the poll interval when there is none
//! 3. go back to 1
//!
//! A stop signal ends the loop between messages. The in-flight message is
//! always finished and recorded, then the lock is released.

use super::processor::MessageProcessor;
use super::summary::DispatchSummary;
use crate::adapters::database::LockStorage;
use crate::config::ProcessingConfig;
use crate::core::lock::{ChannelLockCoordinator, LockTransition};
use crate::core::state::ProcessingStateManager;
use crate::domain::{Channel, InstanceId, PendingMessage, ProcessingStatus};
use crate::{log_attempt_outcome, log_error_with_context};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Timing of the dispatcher loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// How long the lock is worked before being renewed
    pub lock_renewal_interval: Duration,

    /// Silence after which another instance's lock may be broken
    pub lock_break_after_seconds: u64,

    /// Sleep between polls of an empty backlog
    pub poll_interval: Duration,
}

impl DispatcherSettings {
    /// Settings from the `[processing]` section
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            lock_renewal_interval: Duration::from_secs(config.lock_renewal_interval_seconds),
            lock_break_after_seconds: config.lock_break_after_seconds,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

/// Drives one channel's backlog through the processor
pub struct ChannelDispatcher {
    channel: Channel,
    instance_id: InstanceId,
    lock: ChannelLockCoordinator,
    state: ProcessingStateManager,
    processor: Arc<MessageProcessor>,
    settings: DispatcherSettings,
    shutdown: watch::Receiver<bool>,
}

impl ChannelDispatcher {
    /// Create a dispatcher for a channel
    ///
    /// # Arguments
    ///
    /// * `channel` - Channel whose backlog is drained
    /// * `instance_id` - This worker instance
    /// * `locks` - Lock storage shared by all dispatchers
    /// * `state` - Attempt bookkeeping
    /// * `processor` - Shared message pipeline
    /// * `settings` - Loop timing
    /// * `shutdown` - Stop signal; `true` ends the loop
    pub fn new(
        channel: Channel,
        instance_id: InstanceId,
        locks: Arc<dyn LockStorage + Send + Sync>,
        state: ProcessingStateManager,
        processor: Arc<MessageProcessor>,
        settings: DispatcherSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let lock = ChannelLockCoordinator::new(
            locks,
            channel.id,
            instance_id,
            settings.lock_break_after_seconds,
        );
        Self {
            channel,
            instance_id,
            lock,
            state,
            processor,
            settings,
            shutdown,
        }
    }

    /// Run until the stop signal is raised
    pub async fn run(mut self) -> DispatchSummary {
        let started = Instant::now();
        let mut summary = DispatchSummary::new(self.channel.id, self.channel.name.clone());

        tracing::info!(
            channel_id = %self.channel.id,
            channel = %self.channel.name,
            instance_id = %self.instance_id,
            "Channel dispatcher started"
        );

        while !self.stop_requested() {
            let outcome = self.lock.acquire().await;
            match outcome.transition {
                LockTransition::Acquired => summary.lock_acquisitions += 1,
                LockTransition::Lost => summary.lock_losses += 1,
                LockTransition::StillHeld | LockTransition::StillNotHeld => {}
            }

            let window_started = Instant::now();
            while !self.stop_requested()
                && window_started.elapsed() < self.settings.lock_renewal_interval
            {
                if !outcome.is_held() {
                    self.pause(self.settings.poll_interval).await;
                    continue;
                }

                match self
                    .state
                    .next_unprocessed(self.channel.id, self.instance_id)
                    .await
                {
                    Ok(Some(pending)) => self.process(pending, &mut summary).await,
                    Ok(None) => self.pause(self.settings.poll_interval).await,
                    Err(e) => {
                        log_error_with_context!(&e, "Failed to fetch next unprocessed message");
                        summary.storage_errors += 1;
                        self.pause(self.settings.poll_interval).await;
                    }
                }
            }
        }

        summary.held_lock_at_stop = self.lock.is_held();
        if let Err(e) = self.lock.release().await {
            log_error_with_context!(&e, "Failed to release channel lock");
        }

        let summary = summary.with_duration(started.elapsed());
        summary.log_summary();
        summary
    }

    /// One attempt: open it, run the pipeline, record the outcome
    ///
    /// Storage errors are logged and leave the attempt open; an open attempt
    /// is retried without delay on the next fetch.
    async fn process(&self, pending: PendingMessage, summary: &mut DispatchSummary) {
        let message = pending.message;
        let attempt_id = match self.state.start_attempt(message.id, self.instance_id).await {
            Ok(attempt_id) => attempt_id,
            Err(e) => {
                log_error_with_context!(&e, "Failed to start processing attempt");
                summary.storage_errors += 1;
                self.pause(self.settings.poll_interval).await;
                return;
            }
        };

        let recorded = match self.processor.process(&self.channel, &message).await {
            Ok(()) => {
                log_attempt_outcome!(message.id, attempt_id, ProcessingStatus::Success, None::<&str>);
                self.state
                    .complete_attempt(message.id, attempt_id)
                    .await
                    .map(|()| ProcessingStatus::Success)
            }
            Err(failure) => {
                log_attempt_outcome!(message.id, attempt_id, failure.status, Some(&failure.cause));
                self.state
                    .fail_attempt(
                        message.id,
                        attempt_id,
                        failure.status,
                        failure.formatted_cause().as_deref(),
                    )
                    .await
                    .map(|()| failure.status)
            }
        };

        match recorded {
            Ok(status) => summary.record(status),
            Err(e) => {
                log_error_with_context!(&e, "Failed to record processing outcome");
                summary.storage_errors += 1;
            }
        }
    }

    /// A dropped sender counts as a stop request
    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Sleep, waking early on the stop signal
    async fn pause(&self, duration: Duration) {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown.wait_for(|stop| *stop) => {}
        }
    }
}
