//! [`DeviceBridge`] backed by the `arduino-cli` executable.

use super::{DeviceBridge, PortId, SerialLines};
use crate::board::BoardDescriptor;
use crate::config::IdeConfig;
use crate::error::DeviceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

const SERIAL_CHANNEL_CAPACITY: usize = 256;

pub struct ArduinoCliBridge {
    config: IdeConfig,
    monitor: Mutex<Option<Child>>,
}

impl ArduinoCliBridge {
    pub fn new(config: IdeConfig) -> Self {
        Self {
            config,
            monitor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &IdeConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.arduino_cli);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Output, DeviceError> {
        tracing::debug!("[ARDUINO-CLI] {} {}", self.config.arduino_cli, args.join(" "));
        self.command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DeviceError::Bridge(format!("failed to run {}: {}", self.config.arduino_cli, e))
            })
    }

    async fn write_sketch(&self, source: &str) -> Result<String, DeviceError> {
        let dir = self.config.sketch_dir();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(self.config.sketch_file(), source).await?;
        Ok(dir.display().to_string())
    }

    async fn kill_monitor(child: &mut Child) {
        if let Err(e) = child.kill().await {
            tracing::warn!("[ARDUINO-CLI] Failed to stop monitor process: {}", e);
        }
    }
}

#[async_trait]
impl DeviceBridge for ArduinoCliBridge {
    async fn list_ports(&self) -> Result<Vec<PortId>, DeviceError> {
        let output = self.run(&["board", "list", "--format", "json"]).await?;
        if !output.status.success() {
            return Err(DeviceError::Bridge(lossy(&output.stderr)));
        }
        parse_port_list(&output.stdout)
    }

    async fn start_serial(&self, port: &PortId) -> Result<SerialLines, DeviceError> {
        let mut guard = self.monitor.lock().await;
        if let Some(mut previous) = guard.take() {
            Self::kill_monitor(&mut previous).await;
        }

        let baud = format!("baudrate={}", self.config.monitor_baud_rate);
        let mut child = self
            .command()
            .args(["monitor", "-p", port.as_str(), "--config", baud.as_str(), "--quiet"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeviceError::Monitor {
                port: port.to_string(),
                details: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| DeviceError::Monitor {
            port: port.to_string(),
            details: "stdout not captured".to_string(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            let port = port.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!("[ARDUINO-CLI] monitor {}: {}", port, line);
                }
            });
        }

        let (tx, rx) = mpsc::channel(SERIAL_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("[ARDUINO-CLI] Serial read failed: {}", e);
                        break;
                    }
                }
            }
        });

        *guard = Some(child);
        tracing::info!("[ARDUINO-CLI] Monitor started on {}", port);
        Ok(rx)
    }

    async fn stop_serial(&self) -> Result<(), DeviceError> {
        if let Some(mut child) = self.monitor.lock().await.take() {
            Self::kill_monitor(&mut child).await;
            tracing::info!("[ARDUINO-CLI] Monitor stopped");
        }
        Ok(())
    }

    async fn upload_code(
        &self,
        source: &str,
        board: &BoardDescriptor,
        port: &PortId,
    ) -> Result<(), DeviceError> {
        let sketch_dir = self.write_sketch(source).await?;

        let compiled = self.run(&["compile", "-b", board.fqbn, sketch_dir.as_str()]).await?;
        if !compiled.status.success() {
            return Err(DeviceError::Compile(lossy(&compiled.stderr)));
        }

        let uploaded = self
            .run(&["upload", "-b", board.fqbn, "-p", port.as_str(), sketch_dir.as_str()])
            .await?;
        if !uploaded.status.success() {
            return Err(upload_failure(port, lossy(&uploaded.stderr)));
        }
        Ok(())
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Uploader messages meaning the port itself could not be opened.
const PORT_MISSING_MARKERS: &[&str] = &[
    "can't open device",
    "could not open port",
    "port not found",
    "no device found on",
    "port is busy",
];

fn upload_failure(port: &PortId, details: String) -> DeviceError {
    let lower = details.to_lowercase();
    if PORT_MISSING_MARKERS.iter().any(|m| lower.contains(m)) {
        tracing::warn!("[ARDUINO-CLI] Port {} unavailable: {}", port, details);
        return DeviceError::PortUnavailable(port.to_string());
    }
    DeviceError::Upload {
        port: port.to_string(),
        details,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoardList {
    Detected { detected_ports: Vec<DetectedPort> },
    Legacy(Vec<DetectedPort>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectedPort {
    Nested { port: PortAddress },
    Flat(PortAddress),
}

#[derive(Deserialize)]
struct PortAddress {
    address: String,
}

/// Parse `board list --format json` output from current and older releases.
fn parse_port_list(stdout: &[u8]) -> Result<Vec<PortId>, DeviceError> {
    let list: BoardList = serde_json::from_slice(stdout)
        .map_err(|e| DeviceError::Bridge(format!("unexpected board list output: {}", e)))?;
    let entries = match list {
        BoardList::Detected { detected_ports } => detected_ports,
        BoardList::Legacy(entries) => entries,
    };
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            DetectedPort::Nested { port } => PortId(port.address),
            DetectedPort::Flat(port) => PortId(port.address),
        })
        .collect())
}
