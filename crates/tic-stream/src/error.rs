//! Error types for stream orchestration.
//!
//! Every failure in this crate maps onto a stable numeric [`ErrorCode`].
//! Construction failures (unknown identifier, unresolved port, undefined
//! mode) are returned synchronously as [`StreamError`]. Runtime transport
//! failures never surface as `Err`; they travel to listeners as
//! [`StreamFault`](crate::frame::StreamFault) values carrying the same codes.

use core::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::frame::StreamFault;
use crate::identifier::TicIdentifier;

/// Stable error codes shared by [`StreamError`] and delivered faults.
///
/// # Examples
///
/// ```
/// use tic_stream::ErrorCode;
///
/// assert_eq!(ErrorCode::StreamUnplugged.code(), 6);
/// assert_eq!(ErrorCode::from_code(7), Some(ErrorCode::ReadTimeout));
/// assert_eq!(ErrorCode::from_code(42), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// No attached device carries the requested port id
    PortIdNotFound = 1,
    /// No attached device carries the requested port name
    PortNameNotFound = 2,
    /// Neither a port id nor a port name was supplied
    PortDescriptorEmpty = 3,
    /// No TIC mode configured for acquisition
    ModeNotDefined = 4,
    /// Identifier does not resolve to a live session or attached device
    IdentifierNotFound = 5,
    /// Device was unplugged while subscribers were attached
    StreamUnplugged = 6,
    /// No frame received before the deadline
    ReadTimeout = 7,
    /// Identifier with no attribute set
    InvalidIdentifier = 8,
    /// Configuration rejected by validation or parsing
    InvalidConfiguration = 9,
    /// Unclassified transport or runtime failure
    OtherReason = 255,
}

impl ErrorCode {
    /// Get the numeric error code.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Create an error code from its numeric value.
    ///
    /// Returns `None` if the value does not correspond to a known code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::PortIdNotFound),
            2 => Some(Self::PortNameNotFound),
            3 => Some(Self::PortDescriptorEmpty),
            4 => Some(Self::ModeNotDefined),
            5 => Some(Self::IdentifierNotFound),
            6 => Some(Self::StreamUnplugged),
            7 => Some(Self::ReadTimeout),
            8 => Some(Self::InvalidIdentifier),
            9 => Some(Self::InvalidConfiguration),
            255 => Some(Self::OtherReason),
            _ => None,
        }
    }

    /// Get the error severity.
    #[must_use]
    pub fn severity(self) -> ErrorSeverity {
        match self {
            Self::StreamUnplugged => ErrorSeverity::Critical,
            Self::ReadTimeout => ErrorSeverity::Warning,
            Self::PortIdNotFound
            | Self::PortNameNotFound
            | Self::PortDescriptorEmpty
            | Self::ModeNotDefined
            | Self::IdentifierNotFound
            | Self::InvalidIdentifier
            | Self::InvalidConfiguration
            | Self::OtherReason => ErrorSeverity::Error,
        }
    }

    /// Check if the failure concerns device resolution rather than data flow.
    #[must_use]
    pub fn is_resolution_failure(self) -> bool {
        matches!(
            self,
            Self::PortIdNotFound
                | Self::PortNameNotFound
                | Self::PortDescriptorEmpty
                | Self::IdentifierNotFound
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PortIdNotFound => "PORT_ID_NOT_FOUND",
            Self::PortNameNotFound => "PORT_NAME_NOT_FOUND",
            Self::PortDescriptorEmpty => "PORT_DESCRIPTOR_EMPTY",
            Self::ModeNotDefined => "MODE_NOT_DEFINED",
            Self::IdentifierNotFound => "IDENTIFIER_NOT_FOUND",
            Self::StreamUnplugged => "STREAM_UNPLUGGED",
            Self::ReadTimeout => "READ_TIMEOUT",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::OtherReason => "OTHER_REASON",
        };
        write!(f, "{name}({})", self.code())
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, may require attention
    Warning = 1,
    /// Error, operation failed
    Error = 2,
    /// Critical, the stream is gone
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Errors returned by stream orchestration operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Identifier built with every attribute unset.
    #[error("Invalid identifier: a port id, port name or serial number is required")]
    InvalidIdentifier,

    /// Port id not attached.
    #[error("Port id not found: {0}")]
    PortIdNotFound(String),

    /// Port name not attached.
    #[error("Port name not found: {0}")]
    PortNameNotFound(String),

    /// Session requested without a port id or port name.
    #[error("Port descriptor is empty: a port id or port name is required")]
    PortDescriptorEmpty,

    /// Session requested without a TIC mode.
    #[error("TIC mode is not defined")]
    ModeNotDefined,

    /// Identifier resolves to neither a live session nor an attached device.
    #[error("Identifier not found: {0}")]
    IdentifierNotFound(TicIdentifier),

    /// No frame arrived before the deadline.
    #[error("No frame read from {identifier} within {timeout:?}")]
    ReadTimeout {
        /// The identifier being read.
        identifier: TicIdentifier,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// A fault delivered by the stream while a caller was waiting on it.
    #[error("{0}")]
    Fault(StreamFault),

    /// Transport failed to open or start.
    #[error("Transport error on {port}: {message}")]
    Transport {
        /// Port the transport was bound to.
        port: String,
        /// Transport failure message.
        message: String,
    },

    /// No async runtime to drive background work.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration could not be parsed or serialized.
    #[error("Configuration format error: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    /// I/O errors while loading or saving configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Map this error onto the stable code taxonomy.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidIdentifier => ErrorCode::InvalidIdentifier,
            Self::PortIdNotFound(_) => ErrorCode::PortIdNotFound,
            Self::PortNameNotFound(_) => ErrorCode::PortNameNotFound,
            Self::PortDescriptorEmpty => ErrorCode::PortDescriptorEmpty,
            Self::ModeNotDefined => ErrorCode::ModeNotDefined,
            Self::IdentifierNotFound(_) => ErrorCode::IdentifierNotFound,
            Self::ReadTimeout { .. } => ErrorCode::ReadTimeout,
            Self::Fault(fault) => fault.code(),
            Self::InvalidConfiguration(_) | Self::ConfigFormat(_) | Self::Io(_) => {
                ErrorCode::InvalidConfiguration
            }
            Self::Transport { .. } | Self::NoRuntime(_) => ErrorCode::OtherReason,
        }
    }

    /// Get the error severity.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        self.code().severity()
    }

    /// Create a read timeout error.
    #[must_use]
    pub fn read_timeout(identifier: TicIdentifier, timeout: Duration) -> Self {
        Self::ReadTimeout {
            identifier,
            timeout,
        }
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}

/// A specialized `Result` type for stream operations.
pub type StreamResult<T> = std::result::Result<T, StreamError>;
