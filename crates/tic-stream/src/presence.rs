//! Device presence polling.
//!
//! [`PresencePoller`] enumerates ports at a fixed period and turns the
//! difference between two snapshots into [`PresenceEvent`]s. The first poll
//! reports every attached port as appeared.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{StreamError, StreamResult};
use crate::ports::{PortDescriptor, PortDiscovery};

/// Capacity of the event channel between the poller and its consumer.
pub const PRESENCE_CHANNEL_CAPACITY: usize = 64;

/// Presence change of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A port was attached.
    Appeared(PortDescriptor),
    /// A port was detached.
    Disappeared(PortDescriptor),
}

impl PresenceEvent {
    /// Port the event is about.
    #[must_use]
    pub fn port(&self) -> &PortDescriptor {
        match self {
            PresenceEvent::Appeared(port) | PresenceEvent::Disappeared(port) => port,
        }
    }
}

/// Events turning `previous` into `current`: removals first, then additions.
#[must_use]
pub fn diff_ports(previous: &[PortDescriptor], current: &[PortDescriptor]) -> Vec<PresenceEvent> {
    let removed = previous
        .iter()
        .filter(|port| !current.contains(port))
        .cloned()
        .map(PresenceEvent::Disappeared);
    let added = current
        .iter()
        .filter(|port| !previous.contains(port))
        .cloned()
        .map(PresenceEvent::Appeared);
    removed.chain(added).collect()
}

/// Handle to a running poller. Dropping it stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop polling.
    pub fn stop(&self) {
        self.task.abort();
    }

    /// Whether the polling task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Periodic port enumerator.
#[derive(Debug, Clone, Copy)]
pub struct PresencePoller;

impl PresencePoller {
    /// Start polling on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NoRuntime`] outside a tokio runtime.
    pub fn watch(
        discovery: Arc<dyn PortDiscovery>,
        period: Duration,
    ) -> StreamResult<(PollerHandle, mpsc::Receiver<PresenceEvent>)> {
        let runtime = Handle::try_current().map_err(|e| StreamError::NoRuntime(e.to_string()))?;
        Ok(Self::watch_on(&runtime, discovery, period))
    }

    /// Start polling on `runtime`.
    #[must_use]
    pub fn watch_on(
        runtime: &Handle,
        discovery: Arc<dyn PortDiscovery>,
        period: Duration,
    ) -> (PollerHandle, mpsc::Receiver<PresenceEvent>) {
        let (sender, receiver) = mpsc::channel(PRESENCE_CHANNEL_CAPACITY);
        let task = runtime.spawn(poll_loop(discovery, period, sender));
        info!(period = ?period, "Presence poller started");
        (PollerHandle { task }, receiver)
    }
}

async fn poll_loop(
    discovery: Arc<dyn PortDiscovery>,
    period: Duration,
    sender: mpsc::Sender<PresenceEvent>,
) {
    let mut known: Vec<PortDescriptor> = Vec::new();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // Platform enumeration blocks; keep it off the runtime workers.
        let lister = Arc::clone(&discovery);
        let current = match tokio::task::spawn_blocking(move || lister.list_ports()).await {
            Ok(Ok(ports)) => ports,
            Ok(Err(e)) => {
                warn!(error = %e, "Port enumeration failed, retrying next poll");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Port enumeration task failed, retrying next poll");
                continue;
            }
        };

        for event in diff_ports(&known, &current) {
            debug!(event = ?event, "Presence change");
            // Backpressure here delays the next poll rather than losing events.
            if sender.send(event).await.is_err() {
                debug!("Presence consumer gone, poller exiting");
                return;
            }
        }
        known = current;
    }
}
