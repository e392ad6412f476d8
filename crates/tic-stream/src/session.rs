//! Per-device acquisition session.
//!
//! A [`TicSession`] owns one [`FrameSource`] (transport plus decoder) for one
//! physical port. It learns the meter serial number from the first decoded
//! frame, stamps every frame with its current identifier and republishes
//! frames and faults to its own listener set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, StreamError, StreamResult};
use crate::frame::{SharedFrame, StreamFault, StreamFrame, TicMode};
use crate::identifier::TicIdentifier;
use crate::ports::{
    FrameSink, FrameSource, FrameSourceFactory, PortDescriptor, PortDiscovery, StreamListener,
};

/// What a caller asks a session to be opened on.
///
/// The port id takes precedence over the port name when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRequest {
    /// Port id to resolve through discovery.
    pub port_id: Option<String>,
    /// Port name to resolve through discovery.
    pub port_name: Option<String>,
    /// Acquisition mode.
    pub mode: Option<TicMode>,
}

impl SessionRequest {
    /// Request resolving the port from an identifier.
    ///
    /// The serial number is ignored; it cannot be resolved to a port.
    #[must_use]
    pub fn for_identifier(identifier: &TicIdentifier, mode: Option<TicMode>) -> Self {
        Self {
            port_id: identifier.port_id().map(str::to_owned),
            port_name: identifier.port_name().map(str::to_owned),
            mode,
        }
    }

    /// Resolve the port this request designates.
    ///
    /// # Errors
    ///
    /// - [`StreamError::PortIdNotFound`] if a port id was given and is not attached
    /// - [`StreamError::PortNameNotFound`] if only a port name was given and is not attached
    /// - [`StreamError::PortDescriptorEmpty`] if neither was given
    pub fn resolve(&self, discovery: &dyn PortDiscovery) -> StreamResult<PortDescriptor> {
        if let Some(port_id) = &self.port_id {
            return discovery
                .find_by_port_id(port_id)
                .ok_or_else(|| StreamError::PortIdNotFound(port_id.clone()));
        }
        if let Some(port_name) = &self.port_name {
            return discovery
                .find_by_port_name(port_name)
                .ok_or_else(|| StreamError::PortNameNotFound(port_name.clone()));
        }
        Err(StreamError::PortDescriptorEmpty)
    }
}

/// Acquisition unit for one device.
pub struct TicSession {
    port: PortDescriptor,
    mode: TicMode,
    identifier: RwLock<TicIdentifier>,
    source: Box<dyn FrameSource>,
    listeners: RwLock<Vec<Arc<dyn StreamListener>>>,
    last_frame: Mutex<Option<SharedFrame>>,
    native: AtomicBool,
    ephemeral: AtomicBool,
}

impl TicSession {
    /// Resolve `request` through discovery and create a stopped session.
    ///
    /// # Errors
    ///
    /// Returns the resolution error of [`SessionRequest::resolve`],
    /// [`StreamError::ModeNotDefined`] if the request carries no mode, or the
    /// factory error if no source can be created.
    pub fn open(
        request: &SessionRequest,
        discovery: &dyn PortDiscovery,
        factory: &dyn FrameSourceFactory,
    ) -> StreamResult<Arc<Self>> {
        let port = request.resolve(discovery)?;
        Self::for_port(port, request.mode, factory)
    }

    /// Create a stopped session on an already-resolved port.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ModeNotDefined`] if `mode` is `None`, or the
    /// factory error if no source can be created.
    pub fn for_port(
        port: PortDescriptor,
        mode: Option<TicMode>,
        factory: &dyn FrameSourceFactory,
    ) -> StreamResult<Arc<Self>> {
        let mode = mode.ok_or(StreamError::ModeNotDefined)?;
        let source = factory.open(&port, mode)?;
        Ok(Arc::new(Self {
            identifier: RwLock::new(port.identifier()),
            port,
            mode,
            source,
            listeners: RwLock::new(Vec::new()),
            last_frame: Mutex::new(None),
            native: AtomicBool::new(false),
            ephemeral: AtomicBool::new(false),
        }))
    }

    /// Start acquisition.
    ///
    /// Starting a running session is not supported; the orchestrator never
    /// does it.
    ///
    /// # Errors
    ///
    /// Returns the source error if the port cannot be opened.
    pub fn start(self: &Arc<Self>) -> StreamResult<()> {
        let sink: Arc<dyn FrameSink> = Arc::new(SessionSink {
            session: Arc::downgrade(self),
        });
        self.source.start(sink)?;
        info!(
            port = %self.port.port_name,
            mode = %self.mode,
            "TIC session started"
        );
        Ok(())
    }

    /// Stop acquisition and release the port.
    ///
    /// Safe to call on a session that never received a frame, or twice.
    pub fn stop(&self) {
        self.source.stop();
        self.listeners.write().clear();
        info!(identifier = %self.identifier(), "TIC session stopped");
    }

    /// Whether the underlying source is reading.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    /// Current identifier, including the serial number once learned.
    #[must_use]
    pub fn identifier(&self) -> TicIdentifier {
        self.identifier.read().clone()
    }

    /// Port this session acquires from.
    #[must_use]
    pub fn port(&self) -> &PortDescriptor {
        &self.port
    }

    /// Acquisition mode.
    #[must_use]
    pub fn mode(&self) -> TicMode {
        self.mode
    }

    /// Last decoded frame, if any.
    #[must_use]
    pub fn last_frame(&self) -> Option<SharedFrame> {
        self.last_frame.lock().clone()
    }

    /// Whether the session is kept alive regardless of subscribers.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.native.load(Ordering::Acquire)
    }

    /// Keep the session alive regardless of subscribers.
    pub fn mark_native(&self) {
        self.native.store(true, Ordering::Release);
    }

    /// Whether the session was opened for a one-shot read.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral.load(Ordering::Acquire)
    }

    /// Record that the session was opened for a one-shot read, so the last
    /// read to finish closes it once nobody else needs it.
    pub fn mark_ephemeral(&self) {
        self.ephemeral.store(true, Ordering::Release);
    }

    /// Add a listener. Adding the same listener twice has no effect.
    pub fn add_listener(&self, listener: Arc<dyn StreamListener>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }


    fn handle_frame(&self, frame: SharedFrame) {
        let mode = frame.mode();
        let identifier = match frame.field(mode.serial_number_label()) {
            Some(serial) => self.learn_serial_number(serial),
            None => self.identifier(),
        };

        *self.last_frame.lock() = Some(Arc::clone(&frame));
        let data = StreamFrame::new(identifier, mode, Utc::now(), frame);
        for listener in self.listeners_snapshot() {
            listener.on_data(&data);
        }
    }

    fn learn_serial_number(&self, serial: &str) -> TicIdentifier {
        {
            let current = self.identifier.read();
            if current.serial_number().is_some() {
                return current.clone();
            }
        }
        let mut current = self.identifier.write();
        // Another frame may have won the race between the two locks.
        if current.serial_number().is_some() {
            return current.clone();
        }
        let learned = current.with_serial_number(serial);
        *current = learned.clone();
        drop(current);
        info!(identifier = %learned, "Meter serial number learned");
        learned
    }

    fn handle_error(&self, message: &str) {
        let identifier = self.identifier();
        let code = classify_error(message);
        let mut fault = StreamFault::new(identifier, code, message);
        if code == ErrorCode::ReadTimeout {
            if let Some(frame) = self.last_frame() {
                fault = fault.with_frame(frame);
            }
        }
        warn!(
            identifier = %fault.identifier(),
            code = %code,
            error = message,
            "TIC source reported an error"
        );
        for listener in self.listeners_snapshot() {
            listener.on_error(&fault);
        }
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn StreamListener>> {
        self.listeners.read().clone()
    }
}

impl std::fmt::Debug for TicSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicSession")
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("identifier", &*self.identifier.read())
            .field("native", &self.is_native())
            .field("ephemeral", &self.is_ephemeral())
            .finish_non_exhaustive()
    }
}

/// Map a source error message onto an error code.
///
/// Any message mentioning a timeout, in any case, is a read timeout;
/// everything else is unclassified.
#[must_use]
pub fn classify_error(message: &str) -> ErrorCode {
    if message.to_ascii_lowercase().contains("timeout") {
        ErrorCode::ReadTimeout
    } else {
        ErrorCode::OtherReason
    }
}

/// Sink handed to the source; holds the session weakly so a forgotten
/// source cannot keep a stopped session alive.
struct SessionSink {
    session: Weak<TicSession>,
}

impl FrameSink for SessionSink {
    fn on_frame(&self, frame: SharedFrame) {
        match self.session.upgrade() {
            Some(session) => session.handle_frame(frame),
            None => debug!("Frame dropped: session already released"),
        }
    }

    fn on_error(&self, message: &str) {
        if let Some(session) = self.session.upgrade() {
            session.handle_error(message);
        }
    }
}
