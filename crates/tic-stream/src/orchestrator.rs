//! Stream orchestrator.
//!
//! [`TicOrchestrator`] owns the live sessions, the subscriber registry, the
//! delivery lanes and the presence poller. Sessions are opened on plug
//! events, on first subscription or on a one-shot read, and closed as soon
//! as nobody is interested in them anymore, unless their port is
//! configured as native.
//!
//! Lock order is sessions, then registry, then delivery lanes. No lock is
//! held across an `.await`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::dispatch::{Delivery, DispatchStats, Dispatcher};
use crate::error::{StreamError, StreamResult};
use crate::frame::{StreamFault, StreamFrame};
use crate::identifier::TicIdentifier;
use crate::ports::{FrameSourceFactory, PortDescriptor, PortDiscovery, StreamListener};
use crate::presence::{PollerHandle, PresenceEvent, PresencePoller};
use crate::registry::FilteredRegistry;
use crate::session::{SessionRequest, TicSession};

type Subscribers = FilteredRegistry<dyn StreamListener, TicIdentifier>;

/// Fans TIC streams out to subscribers while devices come and go.
///
/// Cheap to clone; clones share the same state.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tic_stream::prelude::*;
///
/// # async fn run(
/// #     discovery: Arc<dyn PortDiscovery>,
/// #     sources: Arc<dyn FrameSourceFactory>,
/// # ) -> StreamResult<()> {
/// let orchestrator = TicOrchestrator::builder()
///     .discovery(discovery)
///     .source_factory(sources)
///     .build()?;
/// orchestrator.start()?;
///
/// let meter = TicIdentifier::from_port_name("/dev/ttyUSB0");
/// let frame = orchestrator
///     .read_next_frame(&meter, Some(Duration::from_secs(5)))
///     .await?;
/// println!("{} sent {:?}", frame.identifier(), frame.frame());
///
/// orchestrator.stop();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TicOrchestrator {
    inner: Arc<Inner>,
}

struct PollerTasks {
    poller: PollerHandle,
    consumer: JoinHandle<()>,
}

struct Inner {
    config: StreamConfig,
    discovery: Arc<dyn PortDiscovery>,
    factory: Arc<dyn FrameSourceFactory>,
    runtime: Handle,
    sessions: Mutex<Vec<Arc<TicSession>>>,
    registry: RwLock<Subscribers>,
    dispatcher: Dispatcher,
    poller: Mutex<Option<PollerTasks>>,
    running: AtomicBool,
}

impl TicOrchestrator {
    /// Create an orchestrator builder.
    #[must_use]
    pub fn builder() -> TicOrchestratorBuilder {
        TicOrchestratorBuilder::default()
    }

    /// Create an orchestrator on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no runtime is
    /// available.
    pub fn new(
        config: StreamConfig,
        discovery: Arc<dyn PortDiscovery>,
        factory: Arc<dyn FrameSourceFactory>,
    ) -> StreamResult<Self> {
        Self::builder()
            .config(config)
            .discovery(discovery)
            .source_factory(factory)
            .build()
    }

    /// Start the presence poller and the native ports.
    ///
    /// Calling `start` on a running orchestrator does nothing. A native port
    /// that cannot be opened is logged and skipped.
    ///
    /// # Errors
    ///
    /// Currently infallible; reserved for pollers that fail to start.
    pub fn start(&self) -> StreamResult<()> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            debug!("Orchestrator already running");
            return Ok(());
        }

        self.inner.start_native_ports();

        let (poller, mut events) = PresencePoller::watch_on(
            &self.inner.runtime,
            Arc::clone(&self.inner.discovery),
            self.inner.config.poll_interval,
        );
        let weak = Arc::downgrade(&self.inner);
        let consumer = self.inner.runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.handle_presence(event);
            }
        });
        *self.inner.poller.lock() = Some(PollerTasks { poller, consumer });

        info!(
            native_ports = self.inner.config.native_ports.len(),
            poll_interval = ?self.inner.config.poll_interval,
            "TIC orchestrator started"
        );
        Ok(())
    }

    /// Stop polling, close every session and drop every subscriber.
    ///
    /// Calling `stop` on a stopped orchestrator does nothing.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(tasks) = self.inner.poller.lock().take() {
            tasks.poller.stop();
            tasks.consumer.abort();
        }

        let sessions: Vec<Arc<TicSession>> = self.inner.sessions.lock().drain(..).collect();
        for session in &sessions {
            session.stop();
        }
        let dropped = self.inner.registry.write().clear();
        self.inner.dispatcher.close_all();

        info!(
            sessions = sessions.len(),
            subscribers = dropped.len(),
            "TIC orchestrator stopped"
        );
    }

    /// Whether [`start`](Self::start) has been called without a matching
    /// [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Identifiers of the live sessions.
    #[must_use]
    pub fn get_available_identifiers(&self) -> Vec<TicIdentifier> {
        let sessions = self.inner.sessions.lock();
        let mut identifiers: Vec<TicIdentifier> = Vec::with_capacity(sessions.len());
        for session in sessions.iter() {
            let identifier = session.identifier();
            if !identifiers.contains(&identifier) {
                identifiers.push(identifier);
            }
        }
        identifiers
    }

    /// Receive frames and faults of every session.
    pub fn subscribe(&self, subscriber: Arc<dyn StreamListener>) {
        if self.inner.registry.write().subscribe(subscriber) {
            debug!("Unfiltered subscriber added");
        }
    }

    /// Remove every subscription of `subscriber`, filtered or not.
    ///
    /// Sessions nobody needs anymore are closed.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn StreamListener>) {
        let keys = {
            let mut registry = self.inner.registry.write();
            let keys = registry.filter_keys_for(subscriber);
            registry.unsubscribe(subscriber);
            keys
        };
        for key in &keys {
            self.inner.release_unused(key, false);
        }
        self.inner.dispatcher.close(subscriber);
        debug!(filters = keys.len(), "Subscriber removed");
    }

    /// Receive frames and faults of the sessions matching `identifier`.
    ///
    /// Opens a session if no live one matches and the device is attached.
    ///
    /// # Errors
    ///
    /// - [`StreamError::IdentifierNotFound`] if no live session matches and
    ///   the identifier does not resolve to an attached port
    /// - [`StreamError::ModeNotDefined`] if a session must be opened and no
    ///   mode is configured
    /// - the source error if the port cannot be opened
    pub fn subscribe_to(
        &self,
        identifier: &TicIdentifier,
        subscriber: Arc<dyn StreamListener>,
    ) -> StreamResult<()> {
        self.inner.attach(identifier, subscriber).map(|_| ())
    }

    /// Remove the subscription of `subscriber` to `identifier`.
    ///
    /// Closes the matching sessions when nobody else needs them and they are
    /// not native.
    pub fn unsubscribe_from(&self, identifier: &TicIdentifier, subscriber: &Arc<dyn StreamListener>) {
        let still_subscribed = {
            let mut registry = self.inner.registry.write();
            if !registry.unsubscribe_filtered(identifier, subscriber) {
                debug!(identifier = %identifier, "No such subscription");
            }
            registry.contains(subscriber)
        };
        self.inner.release_unused(identifier, false);
        if !still_subscribed {
            self.inner.dispatcher.close(subscriber);
        }
    }

    /// Wait for the next frame of `identifier`.
    ///
    /// Opens a session if needed. A session opened by a read is closed by
    /// the last overlapping read to finish, unless someone else needs it.
    /// `timeout` defaults to the configured read timeout.
    ///
    /// # Errors
    ///
    /// - the errors of [`subscribe_to`](Self::subscribe_to)
    /// - [`StreamError::Fault`] if the stream reports a fault first,
    ///   including the unplug of the device
    /// - [`StreamError::ReadTimeout`] if nothing arrives in time
    pub async fn read_next_frame(
        &self,
        identifier: &TicIdentifier,
        timeout: Option<Duration>,
    ) -> StreamResult<StreamFrame> {
        let timeout = timeout.unwrap_or(self.inner.config.read_timeout);
        let (sender, receiver) = oneshot::channel();
        let listener: Arc<dyn StreamListener> = Arc::new(OneShotListener {
            sender: Mutex::new(Some(sender)),
        });

        if let Some(session) = self.inner.attach(identifier, Arc::clone(&listener))? {
            session.mark_ephemeral();
        }
        let outcome = tokio::time::timeout(timeout, receiver).await;

        self.inner
            .registry
            .write()
            .unsubscribe_filtered(identifier, &listener);
        self.inner.dispatcher.close(&listener);
        self.inner.release_unused(identifier, true);

        match outcome {
            Ok(Ok(Ok(frame))) => Ok(frame),
            Ok(Ok(Err(fault))) => Err(StreamError::Fault(fault)),
            Ok(Err(_closed)) => Err(StreamError::IdentifierNotFound(identifier.clone())),
            Err(_elapsed) => {
                debug!(identifier = %identifier, timeout = ?timeout, "Read timed out");
                Err(StreamError::read_timeout(identifier.clone(), timeout))
            }
        }
    }

    /// Handle a device plug event.
    ///
    /// Opens a session unless one already holds the port.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened.
    pub fn on_device_appeared(&self, port: &PortDescriptor) -> StreamResult<()> {
        self.inner.device_appeared(port, false)
    }

    /// Handle a device unplug event.
    ///
    /// Closes the sessions on the port, then on a separate task sends an
    /// unplug fault to every interested subscriber and drops its unfiltered
    /// entry and its filters on this device.
    pub fn on_device_disappeared(&self, port: &PortDescriptor) {
        self.inner.device_disappeared(port);
    }

    /// Identifiers `subscriber` is subscribed to.
    #[must_use]
    pub fn identifiers_for(&self, subscriber: &Arc<dyn StreamListener>) -> Vec<TicIdentifier> {
        self.inner.registry.read().filter_keys_for(subscriber)
    }

    /// Whether `subscriber` holds any subscription.
    #[must_use]
    pub fn is_subscribed(&self, subscriber: &Arc<dyn StreamListener>) -> bool {
        self.inner.registry.read().contains(subscriber)
    }

    /// Number of distinct subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.read().subscribers().len()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Delivery counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.inner.dispatcher.stats()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for TicOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicOrchestrator")
            .field("running", &self.is_running())
            .field("sessions", &self.session_count())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn handle_presence(self: &Arc<Self>, event: PresenceEvent) {
        match event {
            PresenceEvent::Appeared(port) => {
                if let Err(e) = self.device_appeared(&port, true) {
                    warn!(port = %port.port_name, error = %e, "Could not open session for new device");
                }
            }
            PresenceEvent::Disappeared(port) => self.device_disappeared(&port),
        }
    }

    fn start_native_ports(self: &Arc<Self>) {
        for name in &self.config.native_ports {
            let Some(port) = self.discovery.find_native_port(name) else {
                warn!(port = %name, "Native port not found");
                continue;
            };
            let mut sessions = self.sessions.lock();
            match self.open_locked(&mut sessions, port) {
                Ok((session, _)) => session.mark_native(),
                Err(e) => warn!(port = %name, error = %e, "Could not open native port"),
            }
        }
    }

    fn device_appeared(self: &Arc<Self>, port: &PortDescriptor, polled: bool) -> StreamResult<()> {
        let mut sessions = self.sessions.lock();
        // Checked under the sessions lock so a concurrent stop drains
        // whatever gets opened here.
        if polled && !self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        let (_, opened) = self.open_locked(&mut sessions, port.clone())?;
        if opened {
            info!(port = %port.port_name, "TIC device appeared");
        } else {
            debug!(port = %port.port_name, "Device already acquired");
        }
        Ok(())
    }

    fn device_disappeared(self: &Arc<Self>, port: &PortDescriptor) {
        let removed: Vec<Arc<TicSession>> = {
            let mut sessions = self.sessions.lock();
            let (gone, kept): (Vec<_>, Vec<_>) = sessions
                .drain(..)
                .partition(|session| session.port().same_port(port));
            *sessions = kept;
            for session in &gone {
                session.stop();
            }
            gone
        };

        for session in removed {
            let identifier = session.identifier();
            info!(identifier = %identifier, "TIC device disappeared");
            let inner = Arc::clone(self);
            drop(self.runtime.spawn(async move {
                inner.notify_unplugged(&identifier);
            }));
        }
    }

    fn notify_unplugged(&self, identifier: &TicIdentifier) {
        let subscribers = self.registry.read().matching_subscribers(identifier, true);
        if subscribers.is_empty() {
            return;
        }

        let fault = StreamFault::unplugged(identifier.clone());
        let mut released: Vec<TicIdentifier> = Vec::new();
        let mut detached: Vec<Arc<dyn StreamListener>> = Vec::new();
        {
            // Filters on other devices survive the unplug.
            let mut registry = self.registry.write();
            for subscriber in &subscribers {
                self.dispatcher
                    .deliver(subscriber, Delivery::Fault(fault.clone()));
                registry.unsubscribe_unfiltered(subscriber);
                released.extend(registry.unsubscribe_matching(identifier, subscriber));
                if !registry.contains(subscriber) {
                    detached.push(Arc::clone(subscriber));
                }
            }
        }
        for subscriber in &detached {
            self.dispatcher.close(subscriber);
        }
        for key in &released {
            self.release_unused(key, false);
        }
        debug!(
            identifier = %identifier,
            subscribers = subscribers.len(),
            "Unplug notified"
        );
    }

    /// Register `subscriber` under `identifier` and make sure a session
    /// serves it. Returns the session if this call opened it.
    fn attach(
        self: &Arc<Self>,
        identifier: &TicIdentifier,
        subscriber: Arc<dyn StreamListener>,
    ) -> StreamResult<Option<Arc<TicSession>>> {
        // Registered first so a concurrent release sees the interest.
        let added = self
            .registry
            .write()
            .subscribe_filtered(identifier.clone(), Arc::clone(&subscriber));

        match self.ensure_session(identifier) {
            Ok((session, opened)) => {
                debug!(identifier = %identifier, session = %session.identifier(), "Filtered subscriber added");
                Ok(opened.then_some(session))
            }
            Err(e) => {
                if added {
                    let still_subscribed = {
                        let mut registry = self.registry.write();
                        registry.unsubscribe_filtered(identifier, &subscriber);
                        registry.contains(&subscriber)
                    };
                    if !still_subscribed {
                        self.dispatcher.close(&subscriber);
                    }
                }
                Err(e)
            }
        }
    }

    fn ensure_session(
        self: &Arc<Self>,
        identifier: &TicIdentifier,
    ) -> StreamResult<(Arc<TicSession>, bool)> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions
            .iter()
            .find(|session| identifier.matches(&session.identifier()))
        {
            return Ok((Arc::clone(session), false));
        }

        let request = SessionRequest::for_identifier(identifier, self.config.default_mode);
        let port = request
            .resolve(self.discovery.as_ref())
            .map_err(|e| {
                if e.code().is_resolution_failure() {
                    StreamError::IdentifierNotFound(identifier.clone())
                } else {
                    e
                }
            })?;
        self.open_locked(&mut sessions, port)
    }

    /// Open and start a session on `port` unless one already holds it.
    /// The flag tells whether the session was opened by this call.
    fn open_locked(
        self: &Arc<Self>,
        sessions: &mut Vec<Arc<TicSession>>,
        port: PortDescriptor,
    ) -> StreamResult<(Arc<TicSession>, bool)> {
        if let Some(existing) = sessions.iter().find(|s| s.port().same_port(&port)) {
            return Ok((Arc::clone(existing), false));
        }

        let session = TicSession::for_port(port, self.config.default_mode, self.factory.as_ref())?;
        if self.config.is_native_port(&session.port().port_name) {
            session.mark_native();
        }
        session.add_listener(Arc::new(SessionRelay {
            inner: Arc::downgrade(self),
        }));
        if let Err(e) = session.start() {
            session.stop();
            return Err(e);
        }
        sessions.push(Arc::clone(&session));
        Ok((session, true))
    }

    /// Close the sessions matching `key` that nobody needs anymore.
    ///
    /// With `ephemeral_only`, only sessions opened by a read are considered.
    fn release_unused(&self, key: &TicIdentifier, ephemeral_only: bool) {
        let mut sessions = self.sessions.lock();
        let unused: Vec<Arc<TicSession>> = {
            let registry = self.registry.read();
            sessions
                .iter()
                .filter(|session| {
                    let identifier = session.identifier();
                    !session.is_native()
                        && (!ephemeral_only || session.is_ephemeral())
                        && key.matches(&identifier)
                        && registry.matching_subscribers(&identifier, true).is_empty()
                })
                .cloned()
                .collect()
        };
        // Stopped without the registry lock: a source may wait for its
        // reader, which routes through the registry.
        sessions.retain(|session| !unused.iter().any(|u| Arc::ptr_eq(u, session)));
        for session in unused {
            session.stop();
            debug!(identifier = %session.identifier(), "Session released");
        }
    }

    fn route(&self, identifier: &TicIdentifier, delivery: &Delivery) {
        // Enqueued under the read lock: a removal, and the lane close that
        // follows it, cannot slip in between lookup and delivery.
        let registry = self.registry.read();
        for subscriber in &registry.matching_subscribers(identifier, true) {
            self.dispatcher.deliver(subscriber, delivery.clone());
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for session in self.sessions.get_mut().drain(..) {
            session.stop();
        }
    }
}

/// Listener attached to every session, forwarding to the registry.
struct SessionRelay {
    inner: Weak<Inner>,
}

impl StreamListener for SessionRelay {
    fn on_data(&self, frame: &StreamFrame) {
        if let Some(inner) = self.inner.upgrade() {
            inner.route(frame.identifier(), &Delivery::Frame(frame.clone()));
        }
    }

    fn on_error(&self, fault: &StreamFault) {
        if let Some(inner) = self.inner.upgrade() {
            inner.route(fault.identifier(), &Delivery::Fault(fault.clone()));
        }
    }
}

type ReadOutcome = Result<StreamFrame, StreamFault>;

/// Throwaway listener completing a pending read.
struct OneShotListener {
    sender: Mutex<Option<oneshot::Sender<ReadOutcome>>>,
}

impl OneShotListener {
    fn complete(&self, outcome: ReadOutcome) {
        if let Some(sender) = self.sender.lock().take() {
            // The reader may have timed out already.
            drop(sender.send(outcome));
        }
    }
}

impl StreamListener for OneShotListener {
    fn on_data(&self, frame: &StreamFrame) {
        self.complete(Ok(frame.clone()));
    }

    fn on_error(&self, fault: &StreamFault) {
        self.complete(Err(fault.clone()));
    }
}

/// Builder for [`TicOrchestrator`].
#[derive(Default)]
pub struct TicOrchestratorBuilder {
    config: StreamConfig,
    discovery: Option<Arc<dyn PortDiscovery>>,
    factory: Option<Arc<dyn FrameSourceFactory>>,
    runtime: Option<Handle>,
}

impl TicOrchestratorBuilder {
    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the device discovery.
    #[must_use]
    pub fn discovery(mut self, discovery: Arc<dyn PortDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Set the factory opening transports for discovered ports.
    #[must_use]
    pub fn source_factory(mut self, factory: Arc<dyn FrameSourceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Run background work on `runtime` instead of the current one.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// - [`StreamError::InvalidConfiguration`] if the configuration is invalid
    ///   or the discovery or source factory is missing
    /// - [`StreamError::NoRuntime`] if no runtime was given and none is current
    pub fn build(self) -> StreamResult<TicOrchestrator> {
        self.config.validate()?;
        let discovery = self
            .discovery
            .ok_or_else(|| StreamError::invalid_configuration("a port discovery is required"))?;
        let factory = self
            .factory
            .ok_or_else(|| StreamError::invalid_configuration("a frame source factory is required"))?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| StreamError::NoRuntime(e.to_string()))?,
        };

        Ok(TicOrchestrator {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(runtime.clone()),
                config: self.config,
                discovery,
                factory,
                runtime,
                sessions: Mutex::new(Vec::new()),
                registry: RwLock::new(FilteredRegistry::new(TicIdentifier::matches)),
                poller: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        })
    }
}

impl std::fmt::Debug for TicOrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicOrchestratorBuilder")
            .field("config", &self.config)
            .field("discovery", &self.discovery.is_some())
            .field("source_factory", &self.factory.is_some())
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::frame::TicMode;
    use crate::ports::FrameSource;

    struct NoPorts;

    impl PortDiscovery for NoPorts {
        fn list_ports(&self) -> StreamResult<Vec<PortDescriptor>> {
            Ok(Vec::new())
        }
    }

    struct NoSources;

    impl FrameSourceFactory for NoSources {
        fn open(&self, port: &PortDescriptor, _mode: TicMode) -> StreamResult<Box<dyn FrameSource>> {
            Err(StreamError::transport(port.port_name.clone(), "no transport"))
        }
    }

    #[test]
    fn test_build_requires_runtime() {
        let result = TicOrchestrator::builder()
            .discovery(Arc::new(NoPorts))
            .source_factory(Arc::new(NoSources))
            .build();
        assert!(matches!(result, Err(StreamError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_build_requires_collaborators() {
        let missing_discovery = TicOrchestrator::builder()
            .source_factory(Arc::new(NoSources))
            .build();
        assert!(matches!(
            missing_discovery,
            Err(ref e) if e.code() == ErrorCode::InvalidConfiguration
        ));

        let missing_factory = TicOrchestrator::builder().discovery(Arc::new(NoPorts)).build();
        assert!(matches!(missing_factory, Err(StreamError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_unknown_identifier_leaves_no_subscription() -> Result<(), StreamError> {
        let orchestrator =
            TicOrchestrator::new(StreamConfig::default(), Arc::new(NoPorts), Arc::new(NoSources))?;
        let listener: Arc<dyn StreamListener> = Arc::new(OneShotListener {
            sender: Mutex::new(None),
        });

        let result = orchestrator.subscribe_to(&TicIdentifier::from_port_name("COM1"), Arc::clone(&listener));
        assert!(matches!(result, Err(StreamError::IdentifierNotFound(_))));
        assert!(!orchestrator.is_subscribed(&listener));

        let read = orchestrator
            .read_next_frame(&TicIdentifier::from_serial_number("S1"), None)
            .await;
        assert!(matches!(read, Err(ref e) if e.code() == ErrorCode::IdentifierNotFound));
        assert_eq!(orchestrator.subscriber_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() -> Result<(), StreamError> {
        let orchestrator =
            TicOrchestrator::new(StreamConfig::default(), Arc::new(NoPorts), Arc::new(NoSources))?;
        orchestrator.stop();
        orchestrator.start()?;
        orchestrator.start()?;
        assert!(orchestrator.is_running());
        orchestrator.stop();
        orchestrator.stop();
        assert!(!orchestrator.is_running());
        Ok(())
    }
}
