//! # tic-stream
//!
//! Hot-plug aware stream orchestration for TIC utility-meter serial modems.
//!
//! Meters emitting the French TIC telemetry protocol are read through serial
//! modems that may be plugged and unplugged at any time. This crate keeps
//! one acquisition session per attached modem, opens it only while someone
//! is interested, and fans decoded frames and faults out to any number of
//! subscribers filtered by device identity.
//!
//! Decoding the wire format, enumerating serial ports and driving the
//! serial line are left to collaborators injected through the traits of
//! [`ports`].
//!
//! ## Architecture
//!
//! - [`identifier`] - Partially-known device identity and its tiered matching rule
//! - [`frame`] - Frame and fault envelopes, TIC modes
//! - [`ports`] - Collaborator traits (discovery, transport, listeners)
//! - [`registry`] - Generic filtered subscriber registry
//! - [`session`] - Per-device acquisition session
//! - [`presence`] - Periodic plug/unplug detection
//! - [`dispatch`] - Per-subscriber delivery lanes
//! - [`orchestrator`] - The orchestrator tying it all together
//! - [`config`] - Orchestrator configuration
//! - [`error`] - Error types and stable error codes
//!
//! ## Identity
//!
//! A meter is known by its port id, its port name and, once the first
//! frame has been decoded, its serial number. Subscribers may filter on
//! any subset; routing uses [`TicIdentifier::matches`]:
//!
//! ```rust
//! use tic_stream::TicIdentifier;
//!
//! let filter = TicIdentifier::from_port_name("COM1");
//! let discovered = TicIdentifier::builder().port_id("1").port_name("COM1").build()?;
//! let learned = discovered.with_serial_number("021728123456");
//!
//! assert!(filter.matches(&learned));
//! assert!(!TicIdentifier::from_port_id("2").matches(&learned));
//! # Ok::<(), tic_stream::StreamError>(())
//! ```
//!
//! ## Threading
//!
//! Sessions call back from their transport's read context. Delivery to
//! subscribers happens on a per-subscriber worker of the tokio blocking
//! pool, so listener callbacks may block without stalling acquisition.

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod identifier;
pub mod orchestrator;
pub mod ports;
pub mod presence;
pub mod registry;
pub mod session;

pub mod prelude;

pub use config::{DEFAULT_POLL_INTERVAL, DEFAULT_READ_TIMEOUT, StreamConfig, StreamConfigBuilder};
pub use dispatch::DispatchStats;
pub use error::{ErrorCode, ErrorSeverity, StreamError, StreamResult};
pub use frame::{DataGroup, DecodedFrame, SharedFrame, StreamFault, StreamFrame, TicFrame, TicMode};
pub use identifier::{TicIdentifier, TicIdentifierBuilder};
pub use orchestrator::{TicOrchestrator, TicOrchestratorBuilder};
pub use ports::{
    FrameSink, FrameSource, FrameSourceFactory, PortDescriptor, PortDiscovery, StreamListener,
};
pub use presence::{PollerHandle, PresenceEvent, PresencePoller};
pub use registry::FilteredRegistry;
pub use session::{SessionRequest, TicSession};
