//! # Device Session
//!
//! Owns the serial port on behalf of the IDE. Upload and live monitoring are
//! mutually exclusive: starting an upload tears the monitor down first, and a
//! second upload while one is running is ignored rather than queued.

use super::{DeviceBridge, PortId, SerialFeed, SerialLines};
use crate::board::BoardRegistry;
use crate::error::DeviceError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listing,
    Uploading,
    Monitoring,
}

impl SessionState {
    fn busy_reason(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listing => "listing ports",
            SessionState::Uploading => "upload in progress",
            SessionState::Monitoring => "serial monitor is running",
        }
    }
}

/// Lifecycle notifications. Serial lines go through [`SerialFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MonitorStarted(PortId),
    /// Closed on request
    MonitorStopped(PortId),
    /// The device side ended the stream
    MonitorClosed(PortId),
    UploadStarted(PortId),
    UploadSucceeded(PortId),
    UploadFailed(DeviceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Another upload was running; this request had no effect
    AlreadyUploading,
}

/// Result of a port scan. Failures still yield a (empty) list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortListing {
    pub ports: Vec<PortId>,
    pub error: Option<DeviceError>,
}

impl PortListing {
    fn failed(error: DeviceError) -> Self {
        Self {
            ports: Vec::new(),
            error: Some(error),
        }
    }
}

struct MonitorHandle {
    port: PortId,
    epoch: u64,
    task: JoinHandle<()>,
}

struct Shared {
    state: SessionState,
    monitor: Option<MonitorHandle>,
    epoch: u64,
}

/// Puts the session back to `Idle` when an operation ends, however it ends.
struct ReturnToIdle<'a>(&'a Mutex<Shared>);

impl Drop for ReturnToIdle<'_> {
    fn drop(&mut self) {
        self.0.lock().state = SessionState::Idle;
    }
}

struct ClearOnDrop<'a>(&'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DeviceSession<B: DeviceBridge> {
    bridge: Arc<B>,
    boards: BoardRegistry,
    shared: Arc<Mutex<Shared>>,
    /// Held by whichever operation is touching the port
    port: tokio::sync::Mutex<()>,
    uploading: AtomicBool,
    feed: Arc<SerialFeed>,
    events: broadcast::Sender<SessionEvent>,
}

impl<B: DeviceBridge> DeviceSession<B> {
    pub fn new(bridge: B, boards: BoardRegistry) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bridge: Arc::new(bridge),
            boards,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Idle,
                monitor: None,
                epoch: 0,
            })),
            port: tokio::sync::Mutex::new(()),
            uploading: AtomicBool::new(false),
            feed: Arc::new(SerialFeed::new()),
            events,
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Port the monitor is attached to, if running.
    pub fn monitored_port(&self) -> Option<PortId> {
        self.shared.lock().monitor.as_ref().map(|m| m.port.clone())
    }

    /// Serial lines: replay buffer plus live subscription.
    pub fn feed(&self) -> &SerialFeed {
        &self.feed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Enumerate ports. Only runs from `Idle`; failures come back as an
    /// empty list with the error attached.
    pub async fn list_ports(&self) -> PortListing {
        if self.uploading.load(Ordering::Acquire) {
            return PortListing::failed(DeviceError::Busy(SessionState::Uploading.busy_reason()));
        }
        let _port = self.port.lock().await;
        {
            let mut shared = self.shared.lock();
            if shared.state != SessionState::Idle {
                return PortListing::failed(DeviceError::Busy(shared.state.busy_reason()));
            }
            shared.state = SessionState::Listing;
        }
        let _idle = ReturnToIdle(&self.shared);

        match self.bridge.list_ports().await {
            Ok(ports) => {
                tracing::debug!("[DEVICE] Found {} ports", ports.len());
                PortListing { ports, error: None }
            }
            Err(e) => {
                tracing::warn!("[DEVICE] Port listing failed: {}", e);
                PortListing::failed(e)
            }
        }
    }

    /// Compile and flash `source`. A running monitor is stopped (and the port
    /// released) before the upload touches the port.
    pub async fn start_upload(
        &self,
        source: &str,
        board_id: &str,
        port: &PortId,
    ) -> Result<UploadOutcome, DeviceError> {
        let board = self.boards.resolve(board_id)?.clone();

        if self
            .uploading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("[DEVICE] Upload already in progress, ignoring request for {}", port);
            return Ok(UploadOutcome::AlreadyUploading);
        }
        let _flag = ClearOnDrop(&self.uploading);
        let _port = self.port.lock().await;

        let monitor = {
            let mut shared = self.shared.lock();
            shared.state = SessionState::Uploading;
            shared.monitor.take()
        };
        let _idle = ReturnToIdle(&self.shared);

        if let Some(handle) = monitor {
            tracing::info!("[DEVICE] Stopping monitor on {} before upload", handle.port);
            if let Err(e) = self.teardown(handle).await {
                self.emit(SessionEvent::UploadFailed(e.clone()));
                return Err(e);
            }
        }

        tracing::info!("[DEVICE] Uploading {} bytes to {} ({})", source.len(), port, board.fqbn);
        self.emit(SessionEvent::UploadStarted(port.clone()));

        match self.bridge.upload_code(source, &board, port).await {
            Ok(()) => {
                tracing::info!("[DEVICE] Upload to {} succeeded", port);
                self.emit(SessionEvent::UploadSucceeded(port.clone()));
                Ok(UploadOutcome::Uploaded)
            }
            Err(e) => {
                tracing::warn!("[DEVICE] Upload to {} failed: {}", port, e);
                self.emit(SessionEvent::UploadFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// Open `port` and stream its lines into the feed.
    pub async fn start_monitor(&self, port: &PortId) -> Result<(), DeviceError> {
        if self.uploading.load(Ordering::Acquire) {
            return Err(DeviceError::Busy(SessionState::Uploading.busy_reason()));
        }
        let _port = self.port.lock().await;
        {
            let shared = self.shared.lock();
            if shared.state != SessionState::Idle {
                return Err(DeviceError::Busy(shared.state.busy_reason()));
            }
        }

        let lines = self.bridge.start_serial(port).await.map_err(|e| {
            tracing::warn!("[DEVICE] Could not open monitor on {}: {}", port, e);
            e
        })?;
        self.feed.clear();

        {
            let mut shared = self.shared.lock();
            shared.epoch += 1;
            let epoch = shared.epoch;
            let task = tokio::spawn(forward_lines(
                lines,
                self.feed.clone(),
                self.shared.clone(),
                self.events.clone(),
                port.clone(),
                epoch,
            ));
            shared.monitor = Some(MonitorHandle {
                port: port.clone(),
                epoch,
                task,
            });
            shared.state = SessionState::Monitoring;
        }

        tracing::info!("[DEVICE] Monitoring {}", port);
        self.emit(SessionEvent::MonitorStarted(port.clone()));
        Ok(())
    }

    /// Close the monitor. Once this returns no further lines are delivered.
    pub async fn stop_monitor(&self) -> Result<(), DeviceError> {
        let _port = self.port.lock().await;
        let handle = self.shared.lock().monitor.take();
        let Some(handle) = handle else {
            return Ok(());
        };
        let _idle = ReturnToIdle(&self.shared);
        self.teardown(handle).await
    }

    async fn teardown(&self, handle: MonitorHandle) -> Result<(), DeviceError> {
        handle.task.abort();
        // Cancelled is the expected outcome
        let _ = handle.task.await;
        self.bridge.stop_serial().await?;
        tracing::info!("[DEVICE] Monitor on {} stopped", handle.port);
        self.emit(SessionEvent::MonitorStopped(handle.port));
        Ok(())
    }
}

impl<B: DeviceBridge> Drop for DeviceSession<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.lock().monitor.take() {
            handle.task.abort();
        }
    }
}

async fn forward_lines(
    mut lines: SerialLines,
    feed: Arc<SerialFeed>,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<SessionEvent>,
    port: PortId,
    epoch: u64,
) {
    while let Some(line) = lines.recv().await {
        tracing::trace!("[DEVICE] {}: {}", port, line);
        feed.publish(line);
    }

    // Stream ended without stop_monitor: the device went away.
    let ended_here = {
        let mut shared = shared.lock();
        if shared.monitor.as_ref().map(|m| m.epoch) == Some(epoch) {
            shared.monitor = None;
            shared.state = SessionState::Idle;
            true
        } else {
            false
        }
    };
    if ended_here {
        tracing::warn!("[DEVICE] Serial stream on {} ended", port);
        let _ = events.send(SessionEvent::MonitorClosed(port));
    }
}
