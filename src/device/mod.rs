//! # Device Layer
//!
//! The native bridge to the board (port discovery, serial stream, upload) and
//! the session that arbitrates exclusive use of the serial port.

mod arduino_cli;
mod buffer;
mod session;

pub use arduino_cli::ArduinoCliBridge;
pub use buffer::{SerialFeed, MONITOR_BUFFER_LINES};
pub use session::{DeviceSession, PortListing, SessionEvent, SessionState, UploadOutcome};

use crate::board::BoardDescriptor;
use crate::error::DeviceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Serial port identifier as reported by the host (`/dev/ttyUSB0`, `COM3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub String);

impl PortId {
    pub fn new(port: impl Into<String>) -> Self {
        PortId(port.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lines received from an open serial port, one message per line.
pub type SerialLines = mpsc::Receiver<String>;

/// Capability implemented by the native host layer.
#[async_trait]
pub trait DeviceBridge: Send + Sync + 'static {
    async fn list_ports(&self) -> Result<Vec<PortId>, DeviceError>;

    /// Open the port and start delivering received lines.
    async fn start_serial(&self, port: &PortId) -> Result<SerialLines, DeviceError>;

    /// Close the port opened by [`DeviceBridge::start_serial`]; no-op when closed.
    async fn stop_serial(&self) -> Result<(), DeviceError>;

    /// Compile `source` for `board` and flash it through `port`.
    async fn upload_code(
        &self,
        source: &str,
        board: &BoardDescriptor,
        port: &PortId,
    ) -> Result<(), DeviceError>;
}
