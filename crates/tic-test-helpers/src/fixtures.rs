//! TIC frames and port descriptors for tests.

use tic_stream::{PortDescriptor, TicFrame, TicMode};

/// Serial number used by the default historic fixture.
pub const HISTORIC_SERIAL: &str = "021728123456";

/// Serial number used by the default standard fixture.
pub const STANDARD_SERIAL: &str = "041876543210";

/// Historic-mode frame of a single-phase base-tariff meter.
#[must_use]
pub fn historic_frame(adco: &str) -> TicFrame {
    TicFrame::new(TicMode::Historic)
        .with_group("ADCO", adco)
        .with_group("OPTARIF", "BASE")
        .with_group("ISOUSC", "30")
        .with_group("BASE", "012345678")
        .with_group("PTEC", "TH..")
        .with_group("IINST", "003")
        .with_group("IMAX", "090")
        .with_group("PAPP", "00750")
        .with_group("MOTDETAT", "000000")
}

/// Standard-mode frame of a Linky meter.
#[must_use]
pub fn standard_frame(adsc: &str) -> TicFrame {
    TicFrame::new(TicMode::Standard)
        .with_group("ADSC", adsc)
        .with_group("VTIC", "02")
        .with_group("NGTF", "      BASE      ")
        .with_group("LTARF", "      BASE      ")
        .with_group("EAST", "012345678")
        .with_group("IRMS1", "003")
        .with_group("URMS1", "231")
        .with_group("PREF", "06")
        .with_group("SINSTS", "00750")
}

/// Frame without any serial number group.
#[must_use]
pub fn anonymous_frame(mode: TicMode) -> TicFrame {
    TicFrame::new(mode).with_group("PAPP", "00420")
}

/// USB modem descriptor with a stable id.
#[must_use]
pub fn usb_port(port_id: &str, port_name: &str) -> PortDescriptor {
    PortDescriptor::new(Some(port_id.to_string()), port_name)
}

/// Built-in UART descriptor without an id.
#[must_use]
pub fn uart_port(port_name: &str) -> PortDescriptor {
    PortDescriptor::new(None, port_name)
}
