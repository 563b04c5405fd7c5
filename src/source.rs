use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::types::{
    CameraId, Capabilities, FramePair, Permission, PoseSample, SensorEvent, SourceConfig,
};
use crate::{OverlayError, Result};

/// Capability surface of a motion-tracking/depth service.
///
/// The overlay only needs these operations; camera connection, permission
/// prompts and event delivery are owned by the implementation.
pub trait SensorSource: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Largest point cloud the source will ever deliver.
    fn max_point_cloud_elements(&self) -> usize;

    /// Ask the user (or platform) for a permission. `Err(PermissionDenied)` on refusal.
    fn request_permission(&self, permission: Permission) -> Result<()>;

    fn connect_camera(&self, camera: CameraId) -> Result<()>;

    fn connect(&self, config: &SourceConfig) -> Result<()>;

    /// Start delivering events for the given frame pairs.
    fn subscribe(&self, frame_pairs: &[FramePair]) -> Result<EventStream>;

    /// Pose of `pair.target` in `pair.base` at `timestamp`. `0.0` asks for the
    /// most recent pose, which for fixed extrinsics is the calibration.
    fn pose_at_time(&self, timestamp: f64, pair: FramePair) -> Result<PoseSample>;

    fn disconnect(&self);
}

/// Handle to a subscription's event channel.
///
/// Events from one producer arrive in order. When the consumer falls behind
/// and the channel fills, the producer drops new events.
pub struct EventStream {
    receiver: Receiver<SensorEvent>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl EventStream {
    /// Wrap a receiver fed by a producer thread that watches `stop_flag`.
    pub fn new(
        receiver: Receiver<SensorEvent>,
        stop_flag: Arc<AtomicBool>,
        thread: Option<std::thread::JoinHandle<()>>,
    ) -> Self {
        Self {
            receiver,
            stop_flag,
            thread,
        }
    }

    /// Stream fed directly by the caller, with no producer thread to manage.
    pub fn from_receiver(receiver: Receiver<SensorEvent>) -> Self {
        Self::new(receiver, Arc::new(AtomicBool::new(false)), None)
    }

    /// Receive the next event (blocks until available).
    pub fn recv(&self) -> Result<SensorEvent> {
        self.receiver
            .recv()
            .map_err(|_| OverlayError::StreamStopped)
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<SensorEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive an event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SensorEvent> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => OverlayError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => OverlayError::StreamStopped,
        })
    }

    /// Check if the stream is still active.
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the stream and wait for the producer thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
