//! Port traits for the collaborator boundaries
//!
//! This module defines the contracts between the orchestrator and the
//! components it does not own: device discovery, the byte transport with
//! its TIC decoder, and the consumers receiving frames. Implementations are
//! injected at construction so tests can drive the orchestrator with fakes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StreamResult;
use crate::frame::{SharedFrame, StreamFault, StreamFrame, TicMode};
use crate::identifier::TicIdentifier;

/// A serial device as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Stable device id (USB location, serial adapter id), when the platform has one
    pub port_id: Option<String>,
    /// OS port name (`/dev/ttyUSB0`, `COM3`)
    pub port_name: String,
}

impl PortDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(port_id: Option<String>, port_name: impl Into<String>) -> Self {
        Self {
            port_id,
            port_name: port_name.into(),
        }
    }

    /// Identifier of the device before any frame has been decoded.
    #[must_use]
    pub fn identifier(&self) -> TicIdentifier {
        TicIdentifier::for_port(self.port_id.clone(), self.port_name.clone())
    }

    /// Whether both descriptors designate the same physical port.
    #[must_use]
    pub fn same_port(&self, other: &PortDescriptor) -> bool {
        match (&self.port_id, &other.port_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.port_name == other.port_name,
        }
    }
}

/// Device discovery abstraction
///
/// Abstracts platform-specific serial enumeration. Only
/// [`list_ports`](Self::list_ports) is required; the lookups default to a
/// scan of the enumeration.
pub trait PortDiscovery: Send + Sync {
    /// List the TIC-capable ports currently attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform enumeration fails.
    fn list_ports(&self) -> StreamResult<Vec<PortDescriptor>>;

    /// Find an attached port by id.
    fn find_by_port_id(&self, port_id: &str) -> Option<PortDescriptor> {
        self.list_ports()
            .ok()?
            .into_iter()
            .find(|port| port.port_id.as_deref() == Some(port_id))
    }

    /// Find an attached port by name.
    fn find_by_port_name(&self, port_name: &str) -> Option<PortDescriptor> {
        self.list_ports()
            .ok()?
            .into_iter()
            .find(|port| port.port_name == port_name)
    }

    /// Find a native (always-on) port by name.
    ///
    /// Platforms where built-in UARTs are not enumerated override this.
    fn find_native_port(&self, port_name: &str) -> Option<PortDescriptor> {
        self.find_by_port_name(port_name)
    }
}

/// Receiver of transport output.
///
/// Called from the transport's own read context; implementations must not
/// block.
pub trait FrameSink: Send + Sync {
    /// A frame was decoded.
    fn on_frame(&self, frame: SharedFrame);

    /// The transport or decoder reported a failure.
    fn on_error(&self, message: &str);
}

/// Transport plus decoder for one port.
pub trait FrameSource: Send + Sync {
    /// Open the port and start delivering to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened.
    fn start(&self, sink: Arc<dyn FrameSink>) -> StreamResult<()>;

    /// Stop delivering, drop the sink and close the port.
    fn stop(&self);

    /// Whether the port is open and reading.
    fn is_running(&self) -> bool;
}

impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    fn start(&self, sink: Arc<dyn FrameSink>) -> StreamResult<()> {
        (**self).start(sink)
    }

    fn stop(&self) {
        (**self).stop();
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}

/// Opens frame sources for discovered ports.
pub trait FrameSourceFactory: Send + Sync {
    /// Create a (stopped) frame source bound to `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if no transport can be created for the port.
    fn open(&self, port: &PortDescriptor, mode: TicMode) -> StreamResult<Box<dyn FrameSource>>;
}

/// Consumer of stream output.
///
/// Callbacks run on a delivery worker owned by the orchestrator, never on
/// the session read loop. A panicking callback is contained and logged.
pub trait StreamListener: Send + Sync {
    /// A frame was received.
    fn on_data(&self, frame: &StreamFrame);

    /// A failure was reported.
    fn on_error(&self, fault: &StreamFault);
}
