//! Dispatch of sensor events into the shared scene.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::scene::SharedScene;
use crate::source::{EventStream, SensorSource};
use crate::types::{CameraId, DepthSample, FramePair, PoseSample, PoseStatus, SensorEvent};
use crate::{OverlayError, Result};

pub const POSE_QUERY_FAILED: &str = "Pose query failed";

/// User-facing output: transient notifications and the point cloud info view.
pub trait UiSink: Send + Sync {
    /// Short-lived message, e.g. a toast.
    fn notify(&self, message: &str);

    fn show_info(&self, text: &str);
}

/// Surface showing the live camera image.
pub trait CameraPreview: Send + Sync {
    /// A new frame from `camera` is ready to be latched into the preview texture.
    fn on_frame_available(&self, camera: CameraId);
}

/// `UiSink` that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl UiSink for LogSink {
    fn notify(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn show_info(&self, text: &str) {
        log::debug!("{}", text.replace('\n', " "));
    }
}

pub struct EventListener {
    source: Arc<dyn SensorSource>,
    scene: SharedScene,
    ui: Arc<dyn UiSink>,
    preview: Option<Arc<dyn CameraPreview>>,
    preview_camera: CameraId,
    /// The first pair places the device and the point cloud.
    frame_pairs: Vec<FramePair>,
}

impl EventListener {
    pub fn new(
        source: Arc<dyn SensorSource>,
        scene: SharedScene,
        ui: Arc<dyn UiSink>,
        preview: Option<Arc<dyn CameraPreview>>,
        preview_camera: CameraId,
        frame_pairs: Vec<FramePair>,
    ) -> Self {
        Self {
            source,
            scene,
            ui,
            preview,
            preview_camera,
            frame_pairs,
        }
    }

    fn motion_pair(&self) -> FramePair {
        self.frame_pairs
            .first()
            .copied()
            .unwrap_or_else(FramePair::device_motion)
    }

    pub fn handle(&self, event: SensorEvent) {
        match event {
            SensorEvent::Pose(pose) => self.on_pose(&pose),
            SensorEvent::FrameAvailable(camera) => self.on_frame_available(camera),
            SensorEvent::PointCloud(depth) => self.on_point_cloud(&depth),
            SensorEvent::Device(event) => {
                log::debug!("Device event ignored: {}={}", event.key, event.value);
            }
        }
    }

    fn on_pose(&self, pose: &PoseSample) {
        if pose.frame_pair != self.motion_pair() {
            log::trace!("Ignoring pose for {}", pose.frame_pair);
            return;
        }
        if pose.status != PoseStatus::Valid {
            log::trace!("Ignoring {:?} pose at t={}", pose.status, pose.timestamp);
            return;
        }

        let result = self.scene.with(|state| state.apply_pose(pose));
        if let Err(e) = result {
            log::warn!("Dropping pose: {}", e);
        }
    }

    fn on_frame_available(&self, camera: CameraId) {
        if camera != self.preview_camera {
            return;
        }
        if let Some(preview) = &self.preview {
            preview.on_frame_available(camera);
        }
    }

    fn on_point_cloud(&self, depth: &DepthSample) {
        let info = depth.info_text();
        self.scene.with(|state| state.info_text = info.clone());
        self.ui.show_info(&info);

        let pair = self.motion_pair();
        // The cloud is placed with the pose at its own capture time, not the latest pose.
        let result = self.scene.with(|state| -> Result<()> {
            let pose = self.source.pose_at_time(depth.timestamp, pair)?;
            state.apply_point_cloud(depth, &pose)
        });

        match result {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                log::warn!("Point cloud update failed: {}", e);
                self.ui.notify(POSE_QUERY_FAILED);
            }
            Err(e) => log::error!("Point cloud update failed: {}", e),
        }
    }

    /// Drain `stream` into `handle` until it stops or `stop` is set.
    pub fn run(&self, stream: &EventStream, stop: &AtomicBool) {
        log::info!("Event dispatcher started");
        while !stop.load(Ordering::Relaxed) {
            match stream.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => self.handle(event),
                Err(OverlayError::Timeout) => continue,
                Err(e) => {
                    log::info!("Event dispatcher stopping: {}", e);
                    break;
                }
            }
        }
        log::info!("Event dispatcher stopped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::point_cloud::PointCloud;
    use crate::types::{Capabilities, DeviceEvent, Permission, SourceConfig};
    use glam::{Mat4, Quat, Vec3};
    use std::sync::Mutex;

    /// Source whose pose queries are answered from a fixed script.
    pub(crate) struct ScriptedSource {
        /// Answer for any pair without an entry in `extrinsics`.
        pub pose: Mutex<Option<PoseSample>>,
        pub extrinsics: Mutex<Vec<(FramePair, PoseSample)>>,
        pub connected: AtomicBool,
        pub queries: Mutex<Vec<(f64, FramePair)>>,
    }

    impl ScriptedSource {
        pub fn new(pose: Option<PoseSample>) -> Self {
            Self {
                pose: Mutex::new(pose),
                extrinsics: Mutex::new(Vec::new()),
                connected: AtomicBool::new(true),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl SensorSource for ScriptedSource {
        fn capabilities(&self) -> Capabilities {
            Capabilities::all()
        }

        fn max_point_cloud_elements(&self) -> usize {
            1000
        }

        fn request_permission(&self, _permission: Permission) -> Result<()> {
            Ok(())
        }

        fn connect_camera(&self, _camera: CameraId) -> Result<()> {
            Ok(())
        }

        fn connect(&self, _config: &SourceConfig) -> Result<()> {
            Ok(())
        }

        fn subscribe(&self, _frame_pairs: &[FramePair]) -> Result<EventStream> {
            Err(OverlayError::NotConnected)
        }

        fn pose_at_time(&self, timestamp: f64, pair: FramePair) -> Result<PoseSample> {
            self.queries.lock().unwrap().push((timestamp, pair));
            if !self.connected.load(Ordering::Relaxed) {
                return Err(OverlayError::NotConnected);
            }
            let extrinsic = self
                .extrinsics
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| *p == pair)
                .map(|(_, pose)| *pose);
            if let Some(pose) = extrinsic {
                return Ok(pose);
            }
            self.pose
                .lock()
                .unwrap()
                .ok_or_else(|| OverlayError::PoseQuery {
                    pair,
                    timestamp,
                    reason: "scripted failure".into(),
                })
        }

        fn disconnect(&self) {}
    }

    #[derive(Default)]
    pub(crate) struct RecordingUi {
        pub notifications: Mutex<Vec<String>>,
        pub info: Mutex<Vec<String>>,
    }

    impl UiSink for RecordingUi {
        fn notify(&self, message: &str) {
            self.notifications.lock().unwrap().push(message.to_string());
        }

        fn show_info(&self, text: &str) {
            self.info.lock().unwrap().push(text.to_string());
        }
    }

    #[derive(Default)]
    struct CountingPreview {
        frames: Mutex<Vec<CameraId>>,
    }

    impl CameraPreview for CountingPreview {
        fn on_frame_available(&self, camera: CameraId) {
            self.frames.lock().unwrap().push(camera);
        }
    }

    fn setup(
        pose: Option<PoseSample>,
    ) -> (EventListener, Arc<ScriptedSource>, Arc<RecordingUi>, SharedScene) {
        let source = Arc::new(ScriptedSource::new(pose));
        let ui = Arc::new(RecordingUi::default());
        let scene = SharedScene::new(&OverlayConfig::default());
        scene.with(|s| s.point_cloud = Some(PointCloud::new(1000)));
        let listener = EventListener::new(
            source.clone(),
            scene.clone(),
            ui.clone(),
            None,
            CameraId::Color,
            vec![FramePair::device_motion()],
        );
        (listener, source, ui, scene)
    }

    fn cloud(n: usize, timestamp: f64) -> DepthSample {
        DepthSample {
            xyz: (0..n).flat_map(|i| [i as f32, 0.0, 1.0]).collect(),
            timestamp,
            ij_rows: 0,
            ij_cols: 0,
        }
    }

    fn pose_at(t: Vec3) -> PoseSample {
        PoseSample::new(FramePair::device_motion(), t, Quat::IDENTITY, 0.0)
    }

    #[test]
    fn test_pose_event_updates_device_model() {
        let (listener, _, _, scene) = setup(None);
        listener.handle(SensorEvent::Pose(pose_at(Vec3::X)));
        let snap = scene.snapshot();
        assert!(snap
            .device_model
            .abs_diff_eq(Mat4::from_translation(Vec3::X), 1e-6));
    }

    #[test]
    fn test_pose_for_other_pair_ignored() {
        let (listener, _, _, scene) = setup(None);
        let mut pose = pose_at(Vec3::X);
        pose.frame_pair = FramePair::imu_to_device();
        listener.handle(SensorEvent::Pose(pose));
        assert_eq!(scene.snapshot().device_model, Mat4::IDENTITY);
    }

    #[test]
    fn test_point_cloud_uses_pose_at_capture_time() {
        let (listener, source, ui, scene) = setup(Some(pose_at(Vec3::new(0.0, 2.0, 0.0))));
        listener.handle(SensorEvent::Pose(pose_at(Vec3::X)));
        listener.handle(SensorEvent::PointCloud(cloud(500, 3.25)));

        assert_eq!(
            source.queries.lock().unwrap().as_slice(),
            &[(3.25, FramePair::device_motion())]
        );
        let snap = scene.snapshot();
        assert_eq!(snap.points.len(), 500);
        assert!(snap
            .point_cloud_model
            .abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)), 1e-6));
        assert!(ui.info.lock().unwrap()[0].contains("count: 500"));
        assert!(scene.info_text().contains("time: 3.250000"));
    }

    #[test]
    fn test_second_cloud_replaces_first() {
        let (listener, _, _, scene) = setup(Some(pose_at(Vec3::ZERO)));
        listener.handle(SensorEvent::PointCloud(cloud(500, 1.0)));
        listener.handle(SensorEvent::PointCloud(cloud(10, 2.0)));
        assert_eq!(scene.snapshot().points.len(), 10);
    }

    #[test]
    fn test_pose_query_failure_keeps_state_and_notifies_once() {
        let (listener, source, ui, scene) = setup(Some(pose_at(Vec3::Y)));
        listener.handle(SensorEvent::PointCloud(cloud(20, 1.0)));
        let before = scene.snapshot();

        *source.pose.lock().unwrap() = None;
        listener.handle(SensorEvent::PointCloud(cloud(5, 2.0)));

        let after = scene.snapshot();
        assert_eq!(after.point_cloud_model, before.point_cloud_model);
        assert_eq!(after.points, before.points);
        assert_eq!(
            ui.notifications.lock().unwrap().as_slice(),
            &[POSE_QUERY_FAILED.to_string()]
        );
    }

    #[test]
    fn test_lost_connection_logged_without_notification() {
        let (listener, source, ui, scene) = setup(Some(pose_at(Vec3::Y)));
        listener.handle(SensorEvent::PointCloud(cloud(20, 1.0)));
        let before = scene.snapshot();

        source.connected.store(false, Ordering::Relaxed);
        listener.handle(SensorEvent::PointCloud(cloud(5, 2.0)));

        assert_eq!(scene.snapshot().points, before.points);
        assert!(ui.notifications.lock().unwrap().is_empty());
    }

    #[test]
    fn test_frame_events_filtered_by_camera() {
        let source = Arc::new(ScriptedSource::new(None));
        let preview = Arc::new(CountingPreview::default());
        let listener = EventListener::new(
            source,
            SharedScene::new(&OverlayConfig::default()),
            Arc::new(RecordingUi::default()),
            Some(preview.clone()),
            CameraId::Color,
            vec![FramePair::device_motion()],
        );
        listener.handle(SensorEvent::FrameAvailable(CameraId::Fisheye));
        listener.handle(SensorEvent::FrameAvailable(CameraId::Color));
        listener.handle(SensorEvent::Device(DeviceEvent {
            timestamp: 0.0,
            key: "FisheyeOverExposed".into(),
            value: String::new(),
        }));
        assert_eq!(preview.frames.lock().unwrap().as_slice(), &[CameraId::Color]);
    }

    #[test]
    fn test_concurrent_pose_and_draw_never_tear() {
        use crate::renderer::tests::RecordingCanvas;
        use crate::renderer::Renderer;

        let (listener, _, _, scene) = setup(None);
        scene.set_camera_mode(crate::config::CameraMode::FirstPerson);
        let listener = Arc::new(listener);
        let writer = {
            let listener = listener.clone();
            std::thread::spawn(move || {
                for i in 1..=2000 {
                    let v = i as f32;
                    listener.handle(SensorEvent::Pose(pose_at(Vec3::new(v, v, v))));
                }
            })
        };

        let mut renderer = Renderer::new(scene.clone(), 10, &OverlayConfig::default());
        let mut canvas = RecordingCanvas::default();
        renderer.on_surface_created(&mut canvas);
        for _ in 0..2000 {
            renderer.on_draw_frame(&mut canvas).unwrap();
            let snap = scene.snapshot();
            let t = snap.device_model.w_axis;
            // Every observed model is one whole pose: all components equal.
            assert_eq!(t.x, t.y);
            assert_eq!(t.y, t.z);
            // And the view is the inverse of that same model.
            assert!((snap.view * snap.device_model).abs_diff_eq(Mat4::IDENTITY, 1e-3));
        }
        writer.join().unwrap();
    }
}
