//! Prelude for tic-stream.
//!
//! ```rust
//! use tic_stream::prelude::*;
//!
//! let config = StreamConfig::builder().native_port("/dev/ttyAMA0").build()?;
//! assert_eq!(config.default_mode, Some(TicMode::Historic));
//! # Ok::<(), StreamError>(())
//! ```

pub use crate::config::{StreamConfig, StreamConfigBuilder};
pub use crate::dispatch::DispatchStats;
pub use crate::error::{ErrorCode, ErrorSeverity, StreamError, StreamResult};
pub use crate::frame::{DecodedFrame, SharedFrame, StreamFault, StreamFrame, TicFrame, TicMode};
pub use crate::identifier::TicIdentifier;
pub use crate::orchestrator::{TicOrchestrator, TicOrchestratorBuilder};
pub use crate::ports::{
    FrameSink, FrameSource, FrameSourceFactory, PortDescriptor, PortDiscovery, StreamListener,
};
pub use crate::presence::{PresenceEvent, PresencePoller};
