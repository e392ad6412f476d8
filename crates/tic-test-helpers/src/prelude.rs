//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use tic_test_helpers::prelude::*;
//! ```

pub use crate::fixtures::{
    HISTORIC_SERIAL, STANDARD_SERIAL, anonymous_frame, historic_frame, standard_frame, uart_port,
    usb_port,
};
pub use crate::mock::{
    FakeDiscovery, FakeFrameSource, FakeSourceFactory, PanickingListener, RecordingListener,
    as_listener,
};
pub use crate::must::{must, must_err, must_some, must_with};
pub use crate::wait::{eventually, settle, wait_until};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
