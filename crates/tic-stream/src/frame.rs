//! Frame values flowing through the orchestrator.
//!
//! Decoding the TIC wire format happens outside this crate. Decoders hand
//! over values implementing [`DecodedFrame`]; sessions wrap them into
//! [`StreamFrame`] envelopes stamped with the source identifier and the
//! capture time. Failures travel as [`StreamFault`] envelopes.

use core::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, StreamError};
use crate::identifier::TicIdentifier;

/// TIC wire mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicMode {
    /// Historic mode (1200 baud, legacy meters)
    Historic,
    /// Standard mode (9600 baud, Linky meters)
    Standard,
}

impl TicMode {
    /// Label of the group carrying the meter serial number in this mode.
    ///
    /// ```
    /// use tic_stream::TicMode;
    ///
    /// assert_eq!(TicMode::Historic.serial_number_label(), "ADCO");
    /// assert_eq!(TicMode::Standard.serial_number_label(), "ADSC");
    /// ```
    #[must_use]
    pub fn serial_number_label(self) -> &'static str {
        match self {
            TicMode::Historic => "ADCO",
            TicMode::Standard => "ADSC",
        }
    }
}

impl fmt::Display for TicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicMode::Historic => write!(f, "historic"),
            TicMode::Standard => write!(f, "standard"),
        }
    }
}

/// A frame produced by an external TIC decoder.
///
/// Only inspected by this crate, never mutated.
pub trait DecodedFrame: fmt::Debug + Send + Sync {
    /// Mode the frame was decoded in.
    fn mode(&self) -> TicMode;

    /// Value of the group with the given label, if present.
    fn field(&self, label: &str) -> Option<&str>;
}

/// Shared handle to a decoded frame.
pub type SharedFrame = Arc<dyn DecodedFrame>;

/// One label/value group of a TIC frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGroup {
    /// Group label (e.g. `ADCO`, `PAPP`)
    pub label: String,
    /// Group value as transmitted
    pub value: String,
}

/// Plain decoded frame: a mode plus ordered label/value groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicFrame {
    mode: TicMode,
    groups: Vec<DataGroup>,
}

impl TicFrame {
    /// Create an empty frame in the given mode.
    #[must_use]
    pub fn new(mode: TicMode) -> Self {
        Self {
            mode,
            groups: Vec::new(),
        }
    }

    /// Append a group.
    #[must_use]
    pub fn with_group(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_group(label, value);
        self
    }

    /// Append a group in place.
    pub fn push_group(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.groups.push(DataGroup {
            label: label.into(),
            value: value.into(),
        });
    }

    /// Groups in transmission order.
    #[must_use]
    pub fn groups(&self) -> &[DataGroup] {
        &self.groups
    }

    /// Wrap into a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedFrame {
        Arc::new(self)
    }
}

impl DecodedFrame for TicFrame {
    fn mode(&self) -> TicMode {
        self.mode
    }

    fn field(&self, label: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|group| group.label == label)
            .map(|group| group.value.as_str())
    }
}

/// A decoded frame stamped with its source and capture time.
#[derive(Debug, Clone)]
pub struct StreamFrame {
    identifier: TicIdentifier,
    mode: TicMode,
    capture_time: DateTime<Utc>,
    frame: SharedFrame,
}

impl StreamFrame {
    /// Create a frame envelope.
    #[must_use]
    pub fn new(
        identifier: TicIdentifier,
        mode: TicMode,
        capture_time: DateTime<Utc>,
        frame: SharedFrame,
    ) -> Self {
        Self {
            identifier,
            mode,
            capture_time,
            frame,
        }
    }

    /// Identifier of the source at decode time.
    #[must_use]
    pub fn identifier(&self) -> &TicIdentifier {
        &self.identifier
    }

    /// Mode the frame was decoded in.
    #[must_use]
    pub fn mode(&self) -> TicMode {
        self.mode
    }

    /// Decode time (host clock, not meter clock).
    #[must_use]
    pub fn capture_time(&self) -> DateTime<Utc> {
        self.capture_time
    }

    /// The decoded frame.
    #[must_use]
    pub fn frame(&self) -> &SharedFrame {
        &self.frame
    }
}

/// A failure attributed to a source.
#[derive(Debug, Clone)]
pub struct StreamFault {
    identifier: TicIdentifier,
    code: ErrorCode,
    message: String,
    frame: Option<SharedFrame>,
}

impl StreamFault {
    /// Create a fault envelope.
    #[must_use]
    pub fn new(identifier: TicIdentifier, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            identifier,
            code,
            message: message.into(),
            frame: None,
        }
    }

    /// Attach the last frame seen before the failure.
    #[must_use]
    pub fn with_frame(mut self, frame: SharedFrame) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Fault sent to subscribers of a device that disappeared.
    #[must_use]
    pub fn unplugged(identifier: TicIdentifier) -> Self {
        let message = format!("Stream unplugged: {identifier}");
        Self::new(identifier, ErrorCode::StreamUnplugged, message)
    }

    /// Fault built from an orchestration error.
    #[must_use]
    pub fn from_error(identifier: TicIdentifier, error: &StreamError) -> Self {
        Self::new(identifier, error.code(), error.to_string())
    }

    /// Identifier of the failing source.
    #[must_use]
    pub fn identifier(&self) -> &TicIdentifier {
        &self.identifier
    }

    /// Error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Frame context, if any.
    #[must_use]
    pub fn frame(&self) -> Option<&SharedFrame> {
        self.frame.as_ref()
    }
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: {}", self.code, self.identifier, self.message)
    }
}
