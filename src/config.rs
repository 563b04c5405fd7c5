//! Runtime configuration.
//!
//! Every field has a built-in default; `OverlayConfig::from_env()` lets the
//! host override them through `PCOVERLAY_*` environment variables.

use crate::types::CameraId;

/// Vertical field of view of the virtual camera, in degrees.
pub const CAMERA_FOV_DEG: f32 = 37.8;
pub const CAMERA_NEAR: f32 = 0.01;
pub const CAMERA_FAR: f32 = 200.0;

/// How the view matrix follows the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    /// Static look-at from (5, 5, 5) towards the origin.
    #[default]
    Fixed,
    FirstPerson,
    ThirdPerson,
    TopDown,
}

impl CameraMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "static" => Some(CameraMode::Fixed),
            "first" | "first_person" | "firstperson" => Some(CameraMode::FirstPerson),
            "third" | "third_person" | "thirdperson" => Some(CameraMode::ThirdPerson),
            "top" | "top_down" | "topdown" => Some(CameraMode::TopDown),
            _ => None,
        }
    }
}

/// Axis convention for the matrices handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameConvention {
    /// Poses are used as delivered.
    #[default]
    Native,
    /// Z-up start-of-service world mapped to a Y-up GL world, camera looks down -Z.
    OpenGl,
}

impl FrameConvention {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Some(FrameConvention::Native),
            "opengl" | "gl" => Some(FrameConvention::OpenGl),
            _ => None,
        }
    }
}

/// Settings for the synthetic source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    pub pose_hz: f32,
    pub depth_hz: f32,
    pub frame_hz: f32,
    /// Points per synthetic depth frame.
    pub points: usize,
    /// Upper bound the source advertises for a single point cloud.
    pub max_points: usize,
    /// Radius of the circular trajectory in meters.
    pub radius: f32,
    pub grant_permission: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pose_hz: 100.0,
            depth_hz: 5.0,
            frame_hz: 30.0,
            points: 2_000,
            max_points: 60_000,
            radius: 1.0,
            grant_permission: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayConfig {
    pub camera_mode: CameraMode,
    pub frame_convention: FrameConvention,
    /// Camera whose frame notifications are forwarded to the preview.
    pub preview_camera: CameraId,
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    /// Capacity of the event channel between source and dispatcher.
    pub channel_capacity: usize,
    pub sim: SimConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            camera_mode: CameraMode::Fixed,
            frame_convention: FrameConvention::Native,
            preview_camera: CameraId::Color,
            fov_deg: CAMERA_FOV_DEG,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            channel_capacity: 256,
            sim: SimConfig::default(),
        }
    }
}

impl OverlayConfig {
    /// Defaults overridden by `PCOVERLAY_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let d = Self::default();

        let mode = read_env_string("PCOVERLAY_CAMERA_MODE", "fixed");
        config.camera_mode = CameraMode::parse(&mode).unwrap_or_else(|| {
            log::warn!(
                "Unknown PCOVERLAY_CAMERA_MODE='{}', using fixed (supported: fixed|first|third|top)",
                mode
            );
            CameraMode::Fixed
        });

        let convention = read_env_string("PCOVERLAY_FRAME_CONVENTION", "native");
        config.frame_convention = FrameConvention::parse(&convention).unwrap_or_else(|| {
            log::warn!(
                "Unknown PCOVERLAY_FRAME_CONVENTION='{}', using native (supported: native|opengl)",
                convention
            );
            FrameConvention::Native
        });

        config.fov_deg = read_env_f32("PCOVERLAY_FOV_DEG", d.fov_deg);
        config.near = read_env_f32("PCOVERLAY_NEAR", d.near);
        config.far = read_env_f32("PCOVERLAY_FAR", d.far);
        config.channel_capacity =
            read_env_usize("PCOVERLAY_CHANNEL_CAPACITY", d.channel_capacity).max(1);

        config.sim.pose_hz = read_env_f32("PCOVERLAY_SIM_POSE_HZ", d.sim.pose_hz);
        config.sim.depth_hz = read_env_f32("PCOVERLAY_SIM_DEPTH_HZ", d.sim.depth_hz);
        config.sim.points = read_env_usize("PCOVERLAY_SIM_POINTS", d.sim.points);
        config.sim.grant_permission =
            read_env_bool("PCOVERLAY_SIM_GRANT_PERMISSION", d.sim.grant_permission);

        let config = config.validated();
        log::debug!("Overlay config: {:?}", config);
        config
    }

    /// Replace projection parameters that cannot form a finite projection
    /// with the defaults.
    pub(crate) fn validated(mut self) -> Self {
        let d = Self::default();
        if !(self.fov_deg > 0.0 && self.fov_deg < 180.0) {
            log::warn!("Invalid field of view {} deg, using {}", self.fov_deg, d.fov_deg);
            self.fov_deg = d.fov_deg;
        }
        if self.near <= 0.0 || self.far <= self.near {
            log::warn!(
                "Invalid clip planes near={} far={}, using defaults",
                self.near,
                self.far
            );
            self.near = d.near;
            self.far = d.far;
        }
        self
    }
}

pub(crate) fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn read_env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

pub(crate) fn read_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_camera_mode_parse() {
        assert_eq!(CameraMode::parse("First_Person"), Some(CameraMode::FirstPerson));
        assert_eq!(CameraMode::parse("top"), Some(CameraMode::TopDown));
        assert_eq!(CameraMode::parse("orbit"), None);
    }

    #[test]
    fn test_env_override_and_fallback() {
        std::env::set_var("PCOVERLAY_TEST_F32", "12.5");
        std::env::set_var("PCOVERLAY_TEST_BAD_F32", "NaN");
        assert_eq!(read_env_f32("PCOVERLAY_TEST_F32", 1.0), 12.5);
        assert_eq!(read_env_f32("PCOVERLAY_TEST_BAD_F32", 1.0), 1.0);
        assert_eq!(read_env_usize("PCOVERLAY_TEST_UNSET", 7), 7);
    }

    #[test]
    fn test_invalid_projection_falls_back_to_defaults() {
        for fov in [0.0, -10.0, 180.0, 400.0] {
            let c = OverlayConfig {
                fov_deg: fov,
                ..OverlayConfig::default()
            }
            .validated();
            assert_eq!(c.fov_deg, CAMERA_FOV_DEG);
        }

        let c = OverlayConfig {
            fov_deg: 60.0,
            near: 5.0,
            far: 1.0,
            ..OverlayConfig::default()
        }
        .validated();
        assert_eq!(c.fov_deg, 60.0);
        assert_eq!((c.near, c.far), (CAMERA_NEAR, CAMERA_FAR));
    }

    #[test]
    fn test_defaults_match_renderer_constants() {
        let c = OverlayConfig::default();
        assert_eq!(c.fov_deg, CAMERA_FOV_DEG);
        assert_eq!(c.camera_mode, CameraMode::Fixed);
        assert_eq!(c.preview_camera, CameraId::Color);
    }
}
