//! Dispatcher summaries and reporting

use crate::domain::{ChannelId, ProcessingStatus};
use std::collections::BTreeMap;
use std::time::Duration;

/// What one channel dispatcher did before it stopped
#[derive(Debug, Clone)]
pub struct DispatchSummary {
    /// Channel identifier
    pub channel_id: ChannelId,

    /// Channel name
    pub channel_name: String,

    /// Messages processed successfully
    pub succeeded: usize,

    /// Failed attempts by status
    pub failed: BTreeMap<ProcessingStatus, usize>,

    /// Times the channel lock was gained
    pub lock_acquisitions: usize,

    /// Times the channel lock was lost to another instance
    pub lock_losses: usize,

    /// Storage errors survived by the loop
    pub storage_errors: usize,

    /// Whether the lock was still held when the dispatcher stopped
    pub held_lock_at_stop: bool,

    /// Time between start and stop
    pub duration: Duration,
}

impl DispatchSummary {
    /// Create an empty summary for a channel
    pub fn new(channel_id: ChannelId, channel_name: impl Into<String>) -> Self {
        Self {
            channel_id,
            channel_name: channel_name.into(),
            succeeded: 0,
            failed: BTreeMap::new(),
            lock_acquisitions: 0,
            lock_losses: 0,
            storage_errors: 0,
            held_lock_at_stop: false,
            duration: Duration::ZERO,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Count one attempt outcome
    pub fn record(&mut self, status: ProcessingStatus) {
        if status == ProcessingStatus::Success {
            self.succeeded += 1;
        } else {
            *self.failed.entry(status).or_default() += 1;
        }
    }

    /// Total failed attempts
    pub fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }

    /// Total attempts recorded
    pub fn total_attempts(&self) -> usize {
        self.succeeded + self.total_failed()
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            channel_id = %self.channel_id,
            channel = %self.channel_name,
            succeeded = self.succeeded,
            failed = self.total_failed(),
            lock_acquisitions = self.lock_acquisitions,
            lock_losses = self.lock_losses,
            storage_errors = self.storage_errors,
            duration_secs = self.duration.as_secs(),
            "Channel dispatcher stopped"
        );

        for (status, count) in &self.failed {
            tracing::warn!(
                channel_id = %self.channel_id,
                status = %status,
                count = count,
                "Failed attempts"
            );
        }
    }
}

/// What the supervisor saw across all channels
#[derive(Debug, Clone, Default)]
pub struct SupervisorSummary {
    /// Summaries of dispatchers that stopped in time
    pub channels: Vec<DispatchSummary>,

    /// Channels whose dispatcher was aborted after the shutdown timeout
    pub aborted: Vec<String>,

    /// Whether the run ended because of a stop signal
    pub interrupted: bool,
}

impl SupervisorSummary {
    /// Total successful messages
    pub fn succeeded(&self) -> usize {
        self.channels.iter().map(|c| c.succeeded).sum()
    }

    /// Total failed attempts
    pub fn failed(&self) -> usize {
        self.channels.iter().map(DispatchSummary::total_failed).sum()
    }

    /// Whether every dispatcher stopped cleanly
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_by_status() {
        let mut summary = DispatchSummary::new(ChannelId::new(1), "pas");
        summary.record(ProcessingStatus::Success);
        summary.record(ProcessingStatus::SendFailure);
        summary.record(ProcessingStatus::SendFailure);
        summary.record(ProcessingStatus::TransformFailure);

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.total_failed(), 3);
        assert_eq!(summary.failed[&ProcessingStatus::SendFailure], 2);
        assert_eq!(summary.total_attempts(), 4);
    }

    #[test]
    fn test_supervisor_totals() {
        let mut first = DispatchSummary::new(ChannelId::new(1), "pas");
        first.record(ProcessingStatus::Success);
        let mut second = DispatchSummary::new(ChannelId::new(2), "ed");
        second.record(ProcessingStatus::UnexpectedError);

        let summary = SupervisorSummary {
            channels: vec![first, second],
            aborted: vec![],
            interrupted: true,
        };
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(summary.is_clean());
    }
}
