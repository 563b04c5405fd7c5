//! State shared between the sensor dispatcher and the render thread.
//!
//! All matrices and the point cloud live behind one mutex. Writers apply a
//! whole update inside a single critical section, so a reader holding the
//! lock never observes half of one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::{Mat4, Vec3};

use crate::config::{CameraMode, OverlayConfig};
use crate::point_cloud::PointCloud;
use crate::renderer::{fixed_view_matrix, view_matrix_for};
use crate::transform::ModelMatrixCalculator;
use crate::types::{DepthSample, PoseSample};
use crate::Result;

pub struct SceneState {
    pub calculator: ModelMatrixCalculator,
    /// Allocated when the render surface is created.
    pub point_cloud: Option<PointCloud>,
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_mode: CameraMode,
    /// Summary of the most recent depth delivery.
    pub info_text: String,
}

impl SceneState {
    fn new(config: &OverlayConfig) -> Self {
        Self {
            calculator: ModelMatrixCalculator::new(config.frame_convention),
            point_cloud: None,
            view: fixed_view_matrix(),
            projection: Mat4::IDENTITY,
            camera_mode: config.camera_mode,
            info_text: String::new(),
        }
    }

    /// Recompute the view matrix from the camera mode and the device model.
    pub fn update_view_matrix(&mut self) {
        self.view = view_matrix_for(self.camera_mode, &self.calculator);
    }

    /// Apply a device pose: device model first, then the view that follows it.
    pub fn apply_pose(&mut self, pose: &PoseSample) -> Result<()> {
        self.calculator.update_device_model(pose)?;
        self.update_view_matrix();
        Ok(())
    }

    /// Replace the point cloud and place it with `pose`, the device pose at
    /// the cloud's capture time. Nothing changes when the pose is rejected.
    pub fn apply_point_cloud(&mut self, depth: &DepthSample, pose: &PoseSample) -> Result<()> {
        self.calculator.update_point_cloud_model(pose)?;
        let model = self.calculator.point_cloud_model();
        match self.point_cloud.as_mut() {
            Some(pc) => {
                pc.update_points(&depth.xyz);
                pc.set_model_matrix(model);
            }
            None => log::debug!("Point cloud received before surface creation, skipping"),
        }
        Ok(())
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        let (points, point_cloud_model) = match &self.point_cloud {
            Some(pc) => (pc.points().to_vec(), pc.model_matrix()),
            None => (Vec::new(), Mat4::IDENTITY),
        };
        FrameSnapshot {
            view: self.view,
            projection: self.projection,
            device_model: self.calculator.device_model(),
            point_cloud_model,
            points,
        }
    }
}

/// Copy of everything one frame needs, taken under a single lock.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub view: Mat4,
    pub projection: Mat4,
    pub device_model: Mat4,
    pub point_cloud_model: Mat4,
    pub points: Vec<Vec3>,
}

/// Cloneable handle to the shared scene.
#[derive(Clone)]
pub struct SharedScene {
    inner: Arc<Mutex<SceneState>>,
}

impl SharedScene {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SceneState::new(config))),
        }
    }

    /// Lock the scene. A panic on another thread does not leave the state
    /// half-written, so a poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, SceneState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside the critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut SceneState) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        self.lock().snapshot()
    }

    pub fn info_text(&self) -> String {
        self.lock().info_text.clone()
    }

    pub fn set_camera_mode(&self, mode: CameraMode) {
        self.with(|state| {
            state.camera_mode = mode;
            state.update_view_matrix();
        });
        log::info!("Camera mode set to {:?}", mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FramePair;
    use glam::Quat;

    #[test]
    fn test_snapshot_without_point_cloud() {
        let scene = SharedScene::new(&OverlayConfig::default());
        let snap = scene.snapshot();
        assert!(snap.points.is_empty());
        assert_eq!(snap.view, fixed_view_matrix());
        assert_eq!(snap.point_cloud_model, Mat4::IDENTITY);
    }

    #[test]
    fn test_first_person_view_follows_device() {
        let scene = SharedScene::new(&OverlayConfig::default());
        scene.set_camera_mode(CameraMode::FirstPerson);
        scene.with(|s| {
            let pose = PoseSample::new(FramePair::device_motion(), Vec3::Z, Quat::IDENTITY, 1.0);
            s.apply_pose(&pose).unwrap();
        });
        let snap = scene.snapshot();
        assert!(snap
            .view
            .abs_diff_eq(Mat4::from_translation(Vec3::NEG_Z), 1e-6));
    }

    #[test]
    fn test_clones_share_state() {
        let scene = SharedScene::new(&OverlayConfig::default());
        let other = scene.clone();
        other.with(|s| s.point_cloud = Some(PointCloud::new(8)));
        scene.with(|s| s.point_cloud.as_mut().unwrap().update_points(&[0.0, 0.0, 1.0]));
        assert_eq!(other.snapshot().points, vec![Vec3::Z]);
    }

    #[test]
    fn test_rejected_pose_leaves_cloud_untouched() {
        let scene = SharedScene::new(&OverlayConfig::default());
        scene.with(|s| s.point_cloud = Some(PointCloud::new(16)));
        let good = PoseSample::new(FramePair::device_motion(), Vec3::X, Quat::IDENTITY, 1.0);
        let depth = DepthSample {
            xyz: vec![0.0, 0.0, 1.0],
            timestamp: 1.0,
            ij_rows: 0,
            ij_cols: 0,
        };
        scene.with(|s| s.apply_point_cloud(&depth, &good)).unwrap();

        let bad = PoseSample::new(
            FramePair::device_motion(),
            Vec3::splat(f32::INFINITY),
            Quat::IDENTITY,
            2.0,
        );
        let other = DepthSample {
            xyz: vec![5.0; 30],
            ..depth
        };
        assert!(scene.with(|s| s.apply_point_cloud(&other, &bad)).is_err());

        let snap = scene.snapshot();
        assert_eq!(snap.points, vec![Vec3::Z]);
        assert!(snap
            .point_cloud_model
            .abs_diff_eq(Mat4::from_translation(Vec3::X), 1e-6));
    }
}
