//! Relay runtime.
//!
//! Wires the listener, the dispatch scheduler and the access reconciler
//! together and runs them as tasks on the ambient tokio runtime. The tasks
//! only talk through the two wake signals, the access command queue and
//! their own health sections. A `current_thread` runtime is enough; nothing
//! here blocks.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use crate::access::{AccessHandle, AccessReconciler};
use crate::channel::ChannelApi;
use crate::config::RelayConfig;
use crate::decision::{DecisionApi, DecisionGateway};
use crate::dispatch::DispatchScheduler;
use crate::error::RelayResult;
use crate::health::{health_state, HealthMonitor};
use crate::notify::NotificationListener;
use crate::observability::task_span;
use crate::signal::{Shutdown, WakeSignal};
use crate::storage::{NotificationSource, ReviewStore};

/// A running relay.
///
/// Dropping it requests a stop without waiting; prefer [`ReviewRelay::shutdown`].
pub struct ReviewRelay {
    config: RelayConfig,
    store: Arc<dyn ReviewStore>,
    shutdown: Shutdown,
    dispatch_signal: Arc<WakeSignal>,
    access_signal: Arc<WakeSignal>,
    health: HealthMonitor,
    access: AccessHandle,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ReviewRelay {
    /// Validates `config`, runs one access pass, then spawns the loops.
    ///
    /// A failing initial access pass is logged and does not prevent startup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub async fn start(
        config: RelayConfig,
        store: Arc<dyn ReviewStore>,
        notifications: Arc<dyn NotificationSource>,
        channel: Arc<dyn ChannelApi>,
    ) -> RelayResult<Self> {
        config.validate()?;

        let (health, writers) = health_state(&config.notify_channel);
        let shutdown = Shutdown::new();
        let dispatch_signal = Arc::new(WakeSignal::new());
        let access_signal = Arc::new(WakeSignal::new());

        let mut reconciler = AccessReconciler::new(
            Arc::clone(&store),
            Arc::clone(&channel),
            config.super_reviewer,
            writers.access,
        );
        if let Err(err) = reconciler.tick().await {
            warn!(error = %err, "Initial review access sync failed");
        }

        let scheduler = DispatchScheduler::new(
            Arc::clone(&store),
            channel,
            config.effective_batch_limit(),
            config.fallback_interval(),
            writers.dispatch,
        );
        let listener = NotificationListener::new(
            notifications,
            config.notify_channel.clone(),
            config.listener_retry_interval(),
            Arc::clone(&dispatch_signal),
            Arc::clone(&access_signal),
            writers.listener,
        );
        let (access, commands) = AccessHandle::channel();

        let channel_name = config.notify_channel.as_str();
        let tasks = vec![
            (
                "listener",
                tokio::spawn(
                    listener
                        .run(shutdown.signal())
                        .instrument(task_span("listener", channel_name)),
                ),
            ),
            (
                "dispatch",
                tokio::spawn(
                    scheduler
                        .run(shutdown.signal(), Arc::clone(&dispatch_signal))
                        .instrument(task_span("dispatch", channel_name)),
                ),
            ),
            (
                "access",
                tokio::spawn(
                    reconciler
                        .run(shutdown.signal(), Arc::clone(&access_signal), commands)
                        .instrument(task_span("access", channel_name)),
                ),
            ),
        ];

        info!(channel = channel_name, "Review relay started");
        Ok(Self {
            config,
            store,
            shutdown,
            dispatch_signal,
            access_signal,
            health,
            access,
            tasks,
        })
    }

    /// Read-only health projection.
    #[must_use]
    pub fn health(&self) -> HealthMonitor {
        self.health.clone()
    }

    /// Handle for join requests and on-demand syncs.
    #[must_use]
    pub fn access(&self) -> AccessHandle {
        self.access.clone()
    }

    /// Configuration the relay was started with.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Builds a decision gateway sharing this relay's store and settings.
    #[must_use]
    pub fn decision_gateway(&self, api: Arc<dyn DecisionApi>) -> DecisionGateway {
        DecisionGateway::new(
            Arc::clone(&self.store),
            api,
            self.config.super_reviewer,
            self.config.decision_timeout(),
        )
    }

    /// Wakes the dispatch loop as if a notification had arrived.
    pub fn wake_dispatch(&self) {
        self.dispatch_signal.raise();
    }

    /// Wakes the access loop as if an access-sync notification had arrived.
    pub fn wake_access(&self) {
        self.access_signal.raise();
    }

    /// Requests a stop and waits for every task to finish its current step.
    pub async fn shutdown(mut self) {
        self.shutdown.trigger();
        for (name, task) in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                error!(task = name, error = %err, "Review relay task ended abnormally");
            }
        }
        info!("Review relay stopped");
    }
}

impl Drop for ReviewRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
