use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::OverlayConfig;
use crate::listener::{CameraPreview, EventListener, UiSink, POSE_QUERY_FAILED};
use crate::renderer::Renderer;
use crate::scene::SharedScene;
use crate::source::SensorSource;
use crate::types::{Capabilities, FramePair, Permission, SourceConfig};
use crate::{OverlayError, Result};

pub const PERMISSION_REQUIRED: &str = "Motion Tracking Permissions Required!";

/// A connected source feeding the shared scene from a dispatcher thread.
pub struct Session {
    source: Arc<dyn SensorSource>,
    scene: SharedScene,
    config: OverlayConfig,
    max_points: usize,
    stop_flag: Arc<AtomicBool>,
    dispatcher: Option<std::thread::JoinHandle<()>>,
}

impl Session {
    /// Request permission, connect, capture calibration and start dispatching.
    ///
    /// Permission refusal is fatal: the user is notified and
    /// `PermissionDenied` returned. Calibration failures are reported and
    /// the identity calibration kept.
    pub fn start(
        source: Arc<dyn SensorSource>,
        ui: Arc<dyn UiSink>,
        preview: Option<Arc<dyn CameraPreview>>,
        config: OverlayConfig,
    ) -> Result<Session> {
        match source.request_permission(Permission::MotionTracking) {
            Ok(()) => {}
            Err(OverlayError::PermissionDenied) => {
                ui.notify(PERMISSION_REQUIRED);
                return Err(OverlayError::PermissionDenied);
            }
            Err(e) => return Err(e),
        }

        let caps = source.capabilities();
        if !caps.contains(Capabilities::DEPTH) {
            log::warn!("Source reports no depth capability ({:?})", caps);
        }

        source.connect_camera(config.preview_camera)?;
        source.connect(&SourceConfig {
            enable_depth: true,
            enable_color_camera: true,
        })?;

        let scene = SharedScene::new(&config);
        capture_calibration(source.as_ref(), &scene, ui.as_ref());

        let frame_pairs = vec![FramePair::device_motion()];
        let stream = match source.subscribe(&frame_pairs) {
            Ok(s) => s,
            Err(e) => {
                source.disconnect();
                return Err(e);
            }
        };

        let listener = EventListener::new(
            source.clone(),
            scene.clone(),
            ui,
            preview,
            config.preview_camera,
            frame_pairs,
        );

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let dispatcher = std::thread::Builder::new()
            .name("pcoverlay-dispatch".into())
            .spawn(move || {
                listener.run(&stream, &stop_clone);
                stream.stop();
            });
        let dispatcher = match dispatcher {
            Ok(d) => d,
            Err(e) => {
                source.disconnect();
                return Err(e.into());
            }
        };

        let max_points = source.max_point_cloud_elements();
        log::info!("Session started (max {} points)", max_points);

        Ok(Session {
            source,
            scene,
            config,
            max_points,
            stop_flag,
            dispatcher: Some(dispatcher),
        })
    }

    pub fn scene(&self) -> SharedScene {
        self.scene.clone()
    }

    /// A renderer bound to this session's scene, sized for the source's largest cloud.
    pub fn renderer(&self) -> Renderer {
        Renderer::new(self.scene.clone(), self.max_points, &self.config)
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Stop dispatching and disconnect the source. Safe to call twice.
    pub fn pause(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.dispatcher.take() {
            let _ = thread.join();
            self.source.disconnect();
            log::info!("Session paused");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pause();
    }
}

/// Query the fixed extrinsics at t = 0 and store them in the calculator.
fn capture_calibration(source: &dyn SensorSource, scene: &SharedScene, ui: &dyn UiSink) {
    for pair in [FramePair::imu_to_device(), FramePair::imu_to_color_camera()] {
        let pose = match source.pose_at_time(0.0, pair) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Calibration query failed: {}", e);
                ui.notify(POSE_QUERY_FAILED);
                continue;
            }
        };

        let result = scene.with(|state| {
            if pair == FramePair::imu_to_device() {
                state.calculator.set_device_to_imu(&pose)
            } else {
                state.calculator.set_color_camera_to_imu(&pose)
            }
        });
        if let Err(e) = result {
            log::warn!("Rejected calibration for {}: {}", pair, e);
            ui.notify(POSE_QUERY_FAILED);
        }
    }
}
