//! Synthetic sensor source.
//!
//! Moves a virtual device around a circle in the start-of-service XY plane
//! and produces a rippled wall of depth points in front of it. Useful for
//! demos and for exercising the full pipeline without hardware.

use crossbeam_channel::Sender;
use glam::{Quat, Vec3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::SimConfig;
use crate::source::{EventStream, SensorSource};
use crate::types::{
    CameraId, Capabilities, DepthSample, DeviceEvent, FramePair, Permission, PoseSample,
    SensorEvent, SourceConfig,
};
use crate::{OverlayError, Result};

/// Angular speed of the device along its circle, rad/s.
const ANGULAR_SPEED: f32 = 0.5;
/// Distance of the synthetic wall from the camera, meters.
const WALL_DEPTH: f32 = 2.0;
/// Queries further than this into the future are refused.
const MAX_LOOKAHEAD_S: f64 = 0.5;

pub struct SimulatedSource {
    config: SimConfig,
    channel_capacity: usize,
    epoch: Instant,
    connected: Arc<AtomicBool>,
    depth_enabled: Arc<AtomicBool>,
    cameras: Mutex<Vec<CameraId>>,
    imu_from_device: PoseSample,
    imu_from_color: PoseSample,
}

impl SimulatedSource {
    pub fn new(config: SimConfig, channel_capacity: usize) -> Self {
        Self {
            config,
            channel_capacity: channel_capacity.max(1),
            epoch: Instant::now(),
            connected: Arc::new(AtomicBool::new(false)),
            depth_enabled: Arc::new(AtomicBool::new(false)),
            cameras: Mutex::new(Vec::new()),
            imu_from_device: PoseSample::new(
                FramePair::imu_to_device(),
                Vec3::new(0.0, 0.0, -0.01),
                Quat::IDENTITY,
                0.0,
            ),
            // Color camera looks out of the back of the device.
            imu_from_color: PoseSample::new(
                FramePair::imu_to_color_camera(),
                Vec3::new(0.06, 0.0, 0.0),
                Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
                0.0,
            ),
        }
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(OverlayError::NotConnected)
        }
    }
}

/// Device pose along the circular trajectory at `t` seconds.
pub fn trajectory_pose(radius: f32, t: f64) -> PoseSample {
    let angle = ANGULAR_SPEED * t as f32;
    let translation = Vec3::new(
        radius * (angle.cos() - 1.0),
        radius * angle.sin(),
        0.0,
    );
    PoseSample::new(
        FramePair::device_motion(),
        translation,
        Quat::from_rotation_z(angle),
        t,
    )
}

/// Flat xyz of a rippled wall in the camera frame.
pub fn synthetic_wall(points: usize, t: f64) -> Vec<f32> {
    if points == 0 {
        return Vec::new();
    }
    let side = (points as f32).sqrt().ceil() as usize;
    let phase = t as f32;
    let mut xyz = Vec::with_capacity(points * 3);
    for i in 0..points {
        let u = (i % side) as f32 / side as f32;
        let v = (i / side) as f32 / side as f32;
        let x = (u - 0.5) * 2.0;
        let y = (v - 0.5) * 1.5;
        let z = WALL_DEPTH + 0.1 * (4.0 * x + phase).sin() * (3.0 * y).cos();
        xyz.extend_from_slice(&[x, y, z]);
    }
    xyz
}

impl SensorSource for SimulatedSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities::MOTION_TRACKING | Capabilities::DEPTH | Capabilities::COLOR_CAMERA
    }

    fn max_point_cloud_elements(&self) -> usize {
        self.config.max_points
    }

    fn request_permission(&self, permission: Permission) -> Result<()> {
        if self.config.grant_permission {
            log::info!("Permission {:?} granted", permission);
            Ok(())
        } else {
            log::warn!("Permission {:?} denied", permission);
            Err(OverlayError::PermissionDenied)
        }
    }

    fn connect_camera(&self, camera: CameraId) -> Result<()> {
        if let Ok(mut cameras) = self.cameras.lock() {
            if !cameras.contains(&camera) {
                cameras.push(camera);
            }
        }
        log::info!("Camera {:?} connected", camera);
        Ok(())
    }

    fn connect(&self, config: &SourceConfig) -> Result<()> {
        self.depth_enabled
            .store(config.enable_depth, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        log::info!(
            "Simulated source connected (depth={}, pose {} Hz, depth {} Hz, {} points)",
            config.enable_depth,
            self.config.pose_hz,
            self.config.depth_hz,
            self.config.points
        );
        Ok(())
    }

    fn subscribe(&self, frame_pairs: &[FramePair]) -> Result<EventStream> {
        self.ensure_connected()?;

        let (sender, receiver) = crossbeam_channel::bounded(self.channel_capacity);
        let stop_flag = Arc::new(AtomicBool::new(false));

        let producer = Producer {
            config: self.config,
            epoch: self.epoch,
            emit_poses: frame_pairs.contains(&FramePair::device_motion()),
            emit_depth: self.depth_enabled.load(Ordering::Relaxed),
            cameras: self
                .cameras
                .lock()
                .map(|c| c.clone())
                .unwrap_or_default(),
            connected: self.connected.clone(),
            stop_flag: stop_flag.clone(),
        };

        let thread = std::thread::Builder::new()
            .name("pcoverlay-sim".into())
            .spawn(move || producer.run(sender))?;

        Ok(EventStream::new(receiver, stop_flag, Some(thread)))
    }

    fn pose_at_time(&self, timestamp: f64, pair: FramePair) -> Result<PoseSample> {
        self.ensure_connected()?;

        if pair == FramePair::imu_to_device() {
            return Ok(self.imu_from_device);
        }
        if pair == FramePair::imu_to_color_camera() {
            return Ok(self.imu_from_color);
        }
        if pair != FramePair::device_motion() {
            return Err(OverlayError::PoseQuery {
                pair,
                timestamp,
                reason: "frame pair not tracked".into(),
            });
        }

        let now = self.now();
        let t = if timestamp <= 0.0 { now } else { timestamp };
        if t > now + MAX_LOOKAHEAD_S {
            return Err(OverlayError::PoseQuery {
                pair,
                timestamp,
                reason: format!("timestamp is ahead of the service clock ({:.3})", now),
            });
        }
        Ok(trajectory_pose(self.config.radius, t))
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::Relaxed) {
            log::info!("Simulated source disconnected");
        }
    }
}

struct Producer {
    config: SimConfig,
    epoch: Instant,
    emit_poses: bool,
    emit_depth: bool,
    cameras: Vec<CameraId>,
    connected: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
}

/// Rates below one emission per hour are clamped to hourly.
const MAX_PERIOD: Duration = Duration::from_secs(3600);

fn period(hz: f32) -> Option<Duration> {
    if !(hz > 0.0 && hz.is_finite()) {
        return None;
    }
    let period = Duration::try_from_secs_f32(1.0 / hz).map_or(MAX_PERIOD, |d| d.min(MAX_PERIOD));
    if period == MAX_PERIOD {
        log::warn!("Simulated rate {} Hz too low, emitting hourly", hz);
    }
    Some(period)
}

impl Producer {
    fn run(self, sender: Sender<SensorEvent>) {
        log::info!("Simulated producer started");

        let pose_period = period(self.config.pose_hz);
        let frame_period = period(self.config.frame_hz);
        let depth_period = period(self.config.depth_hz);
        let tick = [pose_period, frame_period, depth_period]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(Duration::from_millis(100));

        let start = Instant::now();
        let mut next_pose = start;
        let mut next_frame = start;
        let mut next_depth = start;

        let _ = sender.try_send(SensorEvent::Device(DeviceEvent {
            timestamp: self.epoch.elapsed().as_secs_f64(),
            key: "ServiceStarted".into(),
            value: "simulated".into(),
        }));

        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                log::info!("Simulated producer stopping (stop flag set)");
                break;
            }
            if !self.connected.load(Ordering::Relaxed) {
                log::info!("Simulated producer stopping (source disconnected)");
                break;
            }

            let now = Instant::now();
            let t = self.epoch.elapsed().as_secs_f64();
            let mut events = Vec::with_capacity(3);

            if let Some(p) = pose_period.filter(|_| self.emit_poses) {
                if now >= next_pose {
                    events.push(SensorEvent::Pose(trajectory_pose(self.config.radius, t)));
                    next_pose += p;
                }
            }
            if let Some(p) = frame_period {
                if now >= next_frame {
                    for &camera in &self.cameras {
                        events.push(SensorEvent::FrameAvailable(camera));
                    }
                    next_frame += p;
                }
            }
            if let Some(p) = depth_period.filter(|_| self.emit_depth) {
                if now >= next_depth {
                    events.push(SensorEvent::PointCloud(DepthSample {
                        xyz: synthetic_wall(self.config.points, t),
                        timestamp: t,
                        ij_rows: 0,
                        ij_cols: 0,
                    }));
                    next_depth += p;
                }
            }

            for event in events {
                if let Err(e) = sender.try_send(event) {
                    match e {
                        crossbeam_channel::TrySendError::Full(_) => {
                            log::trace!("Event channel full, dropping event");
                        }
                        crossbeam_channel::TrySendError::Disconnected(_) => {
                            log::info!("Event channel disconnected, stopping producer");
                            return;
                        }
                    }
                }
            }

            std::thread::sleep(tick.min(Duration::from_millis(100)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoordinateFrame;

    fn fast_config() -> SimConfig {
        SimConfig {
            pose_hz: 500.0,
            depth_hz: 100.0,
            frame_hz: 100.0,
            points: 16,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_trajectory_starts_at_origin() {
        let p = trajectory_pose(1.0, 0.0);
        assert!(p.translation.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert_eq!(p.rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_synthetic_wall_count_and_depth() {
        let xyz = synthetic_wall(100, 0.0);
        assert_eq!(xyz.len(), 300);
        assert!(xyz
            .chunks_exact(3)
            .all(|p| (p[2] - WALL_DEPTH).abs() <= 0.1 + 1e-6));
        assert!(synthetic_wall(0, 1.0).is_empty());
    }

    #[test]
    fn test_queries_require_connection() {
        let source = SimulatedSource::new(fast_config(), 16);
        assert!(matches!(
            source.pose_at_time(0.0, FramePair::imu_to_device()),
            Err(OverlayError::NotConnected)
        ));
        assert!(matches!(
            source.subscribe(&[FramePair::device_motion()]),
            Err(OverlayError::NotConnected)
        ));
    }

    #[test]
    fn test_pose_queries() {
        let source = SimulatedSource::new(fast_config(), 16);
        source.connect(&SourceConfig::default()).unwrap();

        let extr = source
            .pose_at_time(0.0, FramePair::imu_to_color_camera())
            .unwrap();
        assert_eq!(extr.frame_pair, FramePair::imu_to_color_camera());

        assert!(matches!(
            source.pose_at_time(1e6, FramePair::device_motion()),
            Err(OverlayError::PoseQuery { .. })
        ));
        assert!(matches!(
            source.pose_at_time(0.0, FramePair::new(CoordinateFrame::Device, CoordinateFrame::Imu)),
            Err(OverlayError::PoseQuery { .. })
        ));
    }

    #[test]
    fn test_period_bounds() {
        assert_eq!(period(0.0), None);
        assert_eq!(period(-5.0), None);
        assert_eq!(period(f32::NAN), None);
        assert_eq!(period(4.0), Some(Duration::from_millis(250)));
        assert_eq!(period(1e-20), Some(MAX_PERIOD));
        assert_eq!(period(f32::MIN_POSITIVE), Some(MAX_PERIOD));
    }

    #[test]
    fn test_tiny_pose_rate_keeps_stream_alive() {
        let source = SimulatedSource::new(
            SimConfig {
                pose_hz: 1e-20,
                ..fast_config()
            },
            64,
        );
        source.connect(&SourceConfig::default()).unwrap();
        let stream = source.subscribe(&[FramePair::device_motion()]).unwrap();

        let mut depth = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while depth < 3 && Instant::now() < deadline {
            match stream.recv_timeout(Duration::from_millis(500)) {
                Ok(SensorEvent::PointCloud(_)) => depth += 1,
                Ok(_) | Err(OverlayError::Timeout) => {}
                Err(e) => panic!("stream ended: {}", e),
            }
        }
        assert_eq!(depth, 3);
        assert!(stream.is_active());

        source.disconnect();
        stream.stop();
    }

    #[test]
    fn test_permission_denied() {
        let source = SimulatedSource::new(
            SimConfig {
                grant_permission: false,
                ..fast_config()
            },
            16,
        );
        assert!(matches!(
            source.request_permission(Permission::MotionTracking),
            Err(OverlayError::PermissionDenied)
        ));
    }

    #[test]
    fn test_stream_delivers_all_event_kinds() {
        let source = SimulatedSource::new(fast_config(), 64);
        source.connect_camera(CameraId::Color).unwrap();
        source.connect(&SourceConfig::default()).unwrap();
        let stream = source.subscribe(&[FramePair::device_motion()]).unwrap();

        let (mut pose, mut frame, mut depth) = (false, false, false);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !(pose && frame && depth) && Instant::now() < deadline {
            match stream.recv_timeout(Duration::from_millis(500)) {
                Ok(SensorEvent::Pose(_)) => pose = true,
                Ok(SensorEvent::FrameAvailable(CameraId::Color)) => frame = true,
                Ok(SensorEvent::PointCloud(d)) => {
                    assert_eq!(d.xyz_count(), 16);
                    depth = true;
                }
                _ => {}
            }
        }
        assert!(pose && frame && depth);

        source.disconnect();
        stream.stop();
    }
}
