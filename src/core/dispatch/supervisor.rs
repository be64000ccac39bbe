//! Dispatcher supervisor
//!
//! Registers this worker instance, starts one dispatcher task per active
//! channel and, once the stop signal is raised, waits a bounded time for the
//! dispatchers to finish their in-flight message before aborting the rest.

use super::dispatcher::{ChannelDispatcher, DispatcherSettings};
use super::processor::MessageProcessor;
use super::summary::{DispatchSummary, SupervisorSummary};
use crate::adapters::database::{create_storage, Storage};
use crate::adapters::delivery::HttpEnvelopeSender;
use crate::config::{ProcessingConfig, RelayConfig};
use crate::core::mapping::IdentityMapper;
use crate::core::state::{ProcessingStateManager, RetryPolicy};
use crate::domain::{Channel, RelayError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Instance name used when neither configuration nor the host provides one
pub const FALLBACK_INSTANCE_NAME: &str = "hl7relay";

/// Owns the dispatchers of one worker instance
pub struct Supervisor {
    storage: Storage,
    processor: Arc<MessageProcessor>,
    state: ProcessingStateManager,
    settings: DispatcherSettings,
    channel_filter: Vec<String>,
    shutdown_timeout: Duration,
    instance_name: String,
}

impl Supervisor {
    /// Build storage, delivery and the processor from configuration
    ///
    /// Applies the storage schema before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be reached or the sender cannot be built.
    pub async fn from_config(config: &RelayConfig) -> Result<Self> {
        let storage = create_storage(config).await?;
        storage.database.ensure_schema().await?;

        let sender = Arc::new(HttpEnvelopeSender::new(&config.downstream)?);
        let processor = Arc::new(MessageProcessor::new(
            IdentityMapper::new(storage.mappings.clone()),
            sender,
            &config.downstream,
        ));

        let instance_name = config
            .application
            .instance_name
            .clone()
            .unwrap_or_else(host_name);

        Ok(Self::new(storage, processor, &config.processing, instance_name))
    }

    /// Create a supervisor over existing storage and processor
    pub fn new(
        storage: Storage,
        processor: Arc<MessageProcessor>,
        config: &ProcessingConfig,
        instance_name: impl Into<String>,
    ) -> Self {
        let state = ProcessingStateManager::new(
            storage.processing.clone(),
            RetryPolicy::from_config(config),
        );
        Self {
            storage,
            processor,
            state,
            settings: DispatcherSettings::from_config(config),
            channel_filter: config.channels.clone(),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            instance_name: instance_name.into(),
        }
    }

    /// Name this instance registers under
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Storage used by the dispatchers
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Active channels selected by the `processing.channels` filter
    ///
    /// # Errors
    ///
    /// Returns an error if channels cannot be loaded.
    pub async fn selected_channels(&self) -> Result<Vec<Channel>> {
        let channels = self.storage.channels.load_channels().await?;

        for name in &self.channel_filter {
            if !channels.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
                tracing::warn!(channel = %name, "Configured channel not found");
            }
        }

        Ok(channels
            .into_iter()
            .filter(|c| c.is_active)
            .filter(|c| {
                self.channel_filter.is_empty()
                    || self
                        .channel_filter
                        .iter()
                        .any(|name| c.name.eq_ignore_ascii_case(name))
            })
            .collect())
    }

    /// Run dispatchers until the stop signal is raised
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot be registered, channels cannot
    /// be loaded, or no active channel is selected.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<SupervisorSummary> {
        let instance_id = self
            .storage
            .channels
            .register_instance(&self.instance_name)
            .await?;
        tracing::info!(
            instance_id = %instance_id,
            instance = %self.instance_name,
            "Instance registered"
        );

        let channels = self.selected_channels().await?;
        if channels.is_empty() {
            return Err(RelayError::Configuration(
                "No active channels to dispatch".to_string(),
            ));
        }

        let handles: Vec<(String, JoinHandle<DispatchSummary>)> = channels
            .into_iter()
            .map(|channel| {
                let name = channel.name.clone();
                let dispatcher = ChannelDispatcher::new(
                    channel,
                    instance_id,
                    self.storage.locks.clone(),
                    self.state.clone(),
                    self.processor.clone(),
                    self.settings,
                    shutdown.clone(),
                );
                (name, tokio::spawn(dispatcher.run()))
            })
            .collect();
        tracing::info!(channels = handles.len(), "Dispatchers started");

        // A dropped sender counts as a stop request
        let _ = shutdown.wait_for(|stop| *stop).await;
        tracing::info!(
            timeout_secs = self.shutdown_timeout.as_secs(),
            "Stop requested; waiting for dispatchers"
        );

        let mut summary = SupervisorSummary {
            interrupted: true,
            ..Default::default()
        };
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;

        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(channel_summary)) => summary.channels.push(channel_summary),
                Ok(Err(e)) => {
                    tracing::error!(channel = %name, error = %e, "Dispatcher task failed");
                    summary.aborted.push(name);
                }
                Err(_) => {
                    tracing::warn!(channel = %name, "Dispatcher did not stop in time; aborting");
                    handle.abort();
                    summary.aborted.push(name);
                }
            }
        }

        Ok(summary)
    }
}

/// Host name from the environment, falling back to a fixed name
pub fn host_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_INSTANCE_NAME.to_string())
}
