//! Identification of TIC sources.
//!
//! A [`TicIdentifier`] addresses a meter stream through up to three
//! attributes: the port id reported by discovery, the port name, and the
//! meter serial number. The serial number is only learned once a frame has
//! been decoded, so identifiers are routinely compared while partially
//! known. Routing therefore uses [`TicIdentifier::matches`], a tiered
//! relation distinct from structural equality.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Partially-known address of a TIC source.
///
/// Invariant: at least one attribute is set. Values are immutable; learning
/// the serial number produces a new identifier via
/// [`with_serial_number`](Self::with_serial_number).
///
/// # Examples
///
/// ```
/// use tic_stream::TicIdentifier;
///
/// let by_name = TicIdentifier::from_port_name("COM1");
/// let learned = TicIdentifier::builder()
///     .port_id("1")
///     .port_name("COM1")
///     .serial_number("021728123456")
///     .build()?;
///
/// assert!(by_name.matches(&learned));
/// assert_ne!(by_name, learned);
/// # Ok::<(), tic_stream::StreamError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIdentifier", into = "RawIdentifier")]
pub struct TicIdentifier {
    port_id: Option<String>,
    port_name: Option<String>,
    serial_number: Option<String>,
}

impl TicIdentifier {
    /// Create an identifier from its three optional attributes.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidIdentifier`] when every attribute is `None`.
    pub fn new(
        port_id: Option<String>,
        port_name: Option<String>,
        serial_number: Option<String>,
    ) -> StreamResult<Self> {
        if port_id.is_none() && port_name.is_none() && serial_number.is_none() {
            return Err(StreamError::InvalidIdentifier);
        }
        Ok(Self {
            port_id,
            port_name,
            serial_number,
        })
    }

    /// Identifier known only by its port id.
    #[must_use]
    pub fn from_port_id(port_id: impl Into<String>) -> Self {
        Self {
            port_id: Some(port_id.into()),
            port_name: None,
            serial_number: None,
        }
    }

    /// Identifier known only by its port name.
    #[must_use]
    pub fn from_port_name(port_name: impl Into<String>) -> Self {
        Self {
            port_id: None,
            port_name: Some(port_name.into()),
            serial_number: None,
        }
    }

    /// Identifier known only by its meter serial number.
    #[must_use]
    pub fn from_serial_number(serial_number: impl Into<String>) -> Self {
        Self {
            port_id: None,
            port_name: None,
            serial_number: Some(serial_number.into()),
        }
    }

    /// Identifier of a discovered port; the name is always known.
    pub(crate) fn for_port(port_id: Option<String>, port_name: String) -> Self {
        Self {
            port_id,
            port_name: Some(port_name),
            serial_number: None,
        }
    }

    /// Create an identifier builder.
    #[must_use]
    pub fn builder() -> TicIdentifierBuilder {
        TicIdentifierBuilder::default()
    }

    /// Port id, if known.
    #[must_use]
    pub fn port_id(&self) -> Option<&str> {
        self.port_id.as_deref()
    }

    /// Port name, if known.
    #[must_use]
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Meter serial number, if known.
    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Copy of this identifier carrying the given serial number.
    #[must_use]
    pub fn with_serial_number(&self, serial_number: impl Into<String>) -> Self {
        Self {
            port_id: self.port_id.clone(),
            port_name: self.port_name.clone(),
            serial_number: Some(serial_number.into()),
        }
    }

    /// Tiered routing match.
    ///
    /// 1. Both serial numbers known: they decide, nothing else is consulted.
    /// 2. Otherwise both port ids known: they decide.
    /// 3. Otherwise both port names known: they decide.
    /// 4. No attribute known on both sides: no match.
    #[must_use]
    pub fn matches(&self, other: &TicIdentifier) -> bool {
        if let (Some(a), Some(b)) = (&self.serial_number, &other.serial_number) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.port_id, &other.port_id) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.port_name, &other.port_name) {
            return a == b;
        }
        false
    }
}

impl fmt::Display for TicIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let parts = [
            ("portId", &self.port_id),
            ("portName", &self.port_name),
            ("serialNumber", &self.serial_number),
        ];
        write!(f, "[")?;
        for (label, value) in parts {
            if let Some(value) = value {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{label}={value}")?;
                first = false;
            }
        }
        write!(f, "]")
    }
}

/// Builder for [`TicIdentifier`].
#[derive(Debug, Default, Clone)]
pub struct TicIdentifierBuilder {
    port_id: Option<String>,
    port_name: Option<String>,
    serial_number: Option<String>,
}

impl TicIdentifierBuilder {
    /// Set the port id.
    #[must_use]
    pub fn port_id(mut self, port_id: impl Into<String>) -> Self {
        self.port_id = Some(port_id.into());
        self
    }

    /// Set the port name.
    #[must_use]
    pub fn port_name(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = Some(port_name.into());
        self
    }

    /// Set the meter serial number.
    #[must_use]
    pub fn serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Build the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidIdentifier`] if no attribute was set.
    pub fn build(self) -> StreamResult<TicIdentifier> {
        TicIdentifier::new(self.port_id, self.port_name, self.serial_number)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdentifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    serial_number: Option<String>,
}

impl TryFrom<RawIdentifier> for TicIdentifier {
    type Error = StreamError;

    fn try_from(raw: RawIdentifier) -> StreamResult<Self> {
        TicIdentifier::new(raw.port_id, raw.port_name, raw.serial_number)
    }
}

impl From<TicIdentifier> for RawIdentifier {
    fn from(id: TicIdentifier) -> Self {
        Self {
            port_id: id.port_id,
            port_name: id.port_name,
            serial_number: id.serial_number,
        }
    }
}
