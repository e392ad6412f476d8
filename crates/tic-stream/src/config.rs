//! Orchestrator configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StreamError, StreamResult};
use crate::frame::TicMode;

/// Default deadline of [`read_next_frame`](crate::TicOrchestrator::read_next_frame).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default presence poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Mode of sessions started by the orchestrator. `None` makes every
    /// session start fail with `ModeNotDefined`.
    pub default_mode: Option<TicMode>,
    /// Port names acquired at start and kept open without subscribers.
    pub native_ports: Vec<String>,
    /// Presence poll period.
    pub poll_interval: Duration,
    /// Default `read_next_frame` deadline.
    pub read_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_mode: Some(TicMode::Historic),
            native_ports: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl StreamConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration is zero or a native port name is empty
    /// or duplicated.
    pub fn validate(&self) -> StreamResult<()> {
        if self.poll_interval.is_zero() {
            return Err(StreamError::invalid_configuration(
                "poll_interval must be greater than 0",
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(StreamError::invalid_configuration(
                "read_timeout must be greater than 0",
            ));
        }
        for (index, name) in self.native_ports.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(StreamError::invalid_configuration(
                    "native_ports must not contain empty names",
                ));
            }
            if self.native_ports.iter().skip(index + 1).any(|other| other == name) {
                return Err(StreamError::invalid_configuration(format!(
                    "native port {name} listed twice"
                )));
            }
        }
        Ok(())
    }

    /// Whether `port_name` is configured as always-on.
    #[must_use]
    pub fn is_native_port(&self, port_name: &str) -> bool {
        self.native_ports.iter().any(|name| name == port_name)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Parse and validate a JSON configuration.
    ///
    /// Missing fields take their default value.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result is invalid.
    pub fn from_json_str(json: &str) -> StreamResult<Self> {
        let config: StreamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, writing the default configuration
    /// there if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, or its
    /// content is not a valid configuration.
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> StreamResult<Self> {
        let path = path.as_ref();

        if !tokio::fs::try_exists(path).await? {
            info!(path = %path.display(), "Stream config not found, creating default");
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_json_str(&content)?;
        debug!(path = %path.display(), "Loaded stream config");
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or cannot be written.
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> StreamResult<()> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        debug!(path = %path.display(), "Saved stream config");
        Ok(())
    }
}

/// Builder for [`StreamConfig`].
#[derive(Debug, Default)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    /// Set the acquisition mode of orchestrator-started sessions.
    #[must_use]
    pub fn default_mode(mut self, mode: Option<TicMode>) -> Self {
        self.config.default_mode = mode;
        self
    }

    /// Add an always-on port name.
    #[must_use]
    pub fn native_port(mut self, port_name: impl Into<String>) -> Self {
        self.config.native_ports.push(port_name.into());
        self
    }

    /// Replace the always-on port names.
    #[must_use]
    pub fn native_ports<I, S>(mut self, port_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.native_ports = port_names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the presence poll period.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the default read deadline.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> StreamResult<StreamConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
