//! Model matrix composition.
//!
//! Calibration is captured once as two rigid transforms expressed in the
//! IMU frame. Every pose update is then a pure function of the calibration
//! and the newest sample:
//!
//! ```text
//! color_camera = W · P    · inv(imu_from_device) · imu_from_color
//! device       = color_camera · G
//! point_cloud  = W · P_pc · inv(imu_from_device) · imu_from_color
//! ```
//!
//! `W` maps the source world into render world axes and `G` flips a camera
//! optical frame into a GL camera frame. Both are identity under
//! [`FrameConvention::Native`].

use glam::{Mat4, Vec3, Vec4};

use crate::config::FrameConvention;
use crate::types::PoseSample;
use crate::{OverlayError, Result};

/// Z-up start-of-service world to Y-up GL world: (x, y, z) -> (x, z, -y).
const SOS_TO_GL: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Camera optical frame (y down, z forward) to GL camera frame (y up, z back).
const OPTICAL_TO_GL: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, -1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

#[derive(Debug, Clone)]
pub struct ModelMatrixCalculator {
    convention: FrameConvention,
    imu_from_device: Mat4,
    imu_from_color: Mat4,
    device_calibrated: bool,
    color_calibrated: bool,
    device_model: Mat4,
    color_camera_model: Mat4,
    point_cloud_model: Mat4,
}

impl Default for ModelMatrixCalculator {
    fn default() -> Self {
        Self::new(FrameConvention::Native)
    }
}

impl ModelMatrixCalculator {
    pub fn new(convention: FrameConvention) -> Self {
        Self {
            convention,
            imu_from_device: Mat4::IDENTITY,
            imu_from_color: Mat4::IDENTITY,
            device_calibrated: false,
            color_calibrated: false,
            device_model: Mat4::IDENTITY,
            color_camera_model: Mat4::IDENTITY,
            point_cloud_model: Mat4::IDENTITY,
        }
    }

    pub fn convention(&self) -> FrameConvention {
        self.convention
    }

    fn world(&self) -> Mat4 {
        match self.convention {
            FrameConvention::Native => Mat4::IDENTITY,
            FrameConvention::OpenGl => SOS_TO_GL,
        }
    }

    fn camera_flip(&self) -> Mat4 {
        match self.convention {
            FrameConvention::Native => Mat4::IDENTITY,
            FrameConvention::OpenGl => OPTICAL_TO_GL,
        }
    }

    /// device_from_color, the fixed part of every composition.
    fn extrinsic(&self) -> Mat4 {
        self.imu_from_device.inverse() * self.imu_from_color
    }

    /// Set the IMU→device calibration. Only the first call takes effect.
    pub fn set_device_to_imu(&mut self, pose: &PoseSample) -> Result<()> {
        if self.device_calibrated {
            log::warn!("Device->IMU calibration already set, ignoring update");
            return Ok(());
        }
        self.imu_from_device = checked_matrix(pose)?;
        self.device_calibrated = true;
        log::info!(
            "Device->IMU calibration: t={:?} q={:?}",
            pose.translation,
            pose.rotation
        );
        Ok(())
    }

    /// Set the IMU→color camera calibration. Only the first call takes effect.
    pub fn set_color_camera_to_imu(&mut self, pose: &PoseSample) -> Result<()> {
        if self.color_calibrated {
            log::warn!("ColorCamera->IMU calibration already set, ignoring update");
            return Ok(());
        }
        self.imu_from_color = checked_matrix(pose)?;
        self.color_calibrated = true;
        log::info!(
            "ColorCamera->IMU calibration: t={:?} q={:?}",
            pose.translation,
            pose.rotation
        );
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.device_calibrated && self.color_calibrated
    }

    /// Recompute the device and color camera model matrices from a device pose.
    ///
    /// On error the previous matrices are kept.
    pub fn update_device_model(&mut self, pose: &PoseSample) -> Result<()> {
        let p = checked_matrix(pose)?;
        self.color_camera_model = self.world() * p * self.extrinsic();
        self.device_model = self.color_camera_model * self.camera_flip();
        Ok(())
    }

    /// Recompute the point cloud model matrix from the pose at the cloud's capture time.
    pub fn update_point_cloud_model(&mut self, pose: &PoseSample) -> Result<()> {
        let p = checked_matrix(pose)?;
        self.point_cloud_model = self.world() * p * self.extrinsic();
        Ok(())
    }

    pub fn device_model(&self) -> Mat4 {
        self.device_model
    }

    pub fn color_camera_model(&self) -> Mat4 {
        self.color_camera_model
    }

    pub fn point_cloud_model(&self) -> Mat4 {
        self.point_cloud_model
    }

    /// Translation part of the device model matrix.
    pub fn device_position(&self) -> Vec3 {
        self.device_model.w_axis.truncate()
    }
}

fn checked_matrix(pose: &PoseSample) -> Result<Mat4> {
    if !pose.is_finite() {
        return Err(OverlayError::InvalidPose(format!(
            "non-finite sample for {} at t={}",
            pose.frame_pair, pose.timestamp
        )));
    }
    Ok(pose.to_matrix())
}
