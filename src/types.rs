use glam::{Mat4, Quat, Vec3};
use std::fmt;

/// Reference frames a pose can relate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateFrame {
    StartOfService = 0,
    AreaDescription = 1,
    Device = 2,
    Imu = 3,
    Display = 4,
    CameraColor = 5,
    CameraDepth = 6,
    CameraFisheye = 7,
}

/// A (base, target) naming of which two frames a pose relates.
///
/// The pose for a pair expresses `target` in `base` coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramePair {
    pub base: CoordinateFrame,
    pub target: CoordinateFrame,
}

impl FramePair {
    pub const fn new(base: CoordinateFrame, target: CoordinateFrame) -> Self {
        Self { base, target }
    }

    /// Device motion relative to where tracking started.
    pub const fn device_motion() -> Self {
        Self::new(CoordinateFrame::StartOfService, CoordinateFrame::Device)
    }

    /// IMU to device extrinsic.
    pub const fn imu_to_device() -> Self {
        Self::new(CoordinateFrame::Imu, CoordinateFrame::Device)
    }

    /// IMU to color camera extrinsic.
    pub const fn imu_to_color_camera() -> Self {
        Self::new(CoordinateFrame::Imu, CoordinateFrame::CameraColor)
    }
}

impl fmt::Display for FramePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}->{:?}", self.base, self.target)
    }
}

/// Tracking status attached to each pose.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseStatus {
    Initializing = 0,
    Valid = 1,
    Invalid = 2,
    Unknown = 3,
}

/// A rigid transform sample delivered by the sensor source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Translation in meters.
    pub translation: Vec3,
    /// Unit rotation quaternion.
    pub rotation: Quat,
    /// Source timestamp in seconds.
    pub timestamp: f64,
    pub frame_pair: FramePair,
    pub status: PoseStatus,
}

impl PoseSample {
    pub fn new(frame_pair: FramePair, translation: Vec3, rotation: Quat, timestamp: f64) -> Self {
        Self {
            translation,
            rotation,
            timestamp,
            frame_pair,
            status: PoseStatus::Valid,
        }
    }

    /// Build a sample from the SDK-style flat arrays.
    /// `rotation` is `[x, y, z, w]`.
    pub fn from_arrays(
        frame_pair: FramePair,
        translation: [f32; 3],
        rotation: [f32; 4],
        timestamp: f64,
    ) -> Self {
        Self::new(
            frame_pair,
            Vec3::from_array(translation),
            Quat::from_array(rotation),
            timestamp,
        )
    }

    pub fn identity(frame_pair: FramePair) -> Self {
        Self::new(frame_pair, Vec3::ZERO, Quat::IDENTITY, 0.0)
    }

    /// True when every component is finite and the quaternion has non-zero length.
    pub fn is_finite(&self) -> bool {
        self.translation.is_finite()
            && self.rotation.is_finite()
            && self.rotation.length_squared() > f32::EPSILON
    }

    /// The rigid transform `T · R` of this sample. The rotation is normalized.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation.normalize(), self.translation)
    }
}

/// Camera identifiers reported with frame-available notifications.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraId {
    Color = 0,
    Fisheye = 1,
    Depth = 2,
}

/// One depth delivery: flat xyz triples in the depth camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSample {
    pub xyz: Vec<f32>,
    pub timestamp: f64,
    pub ij_rows: u32,
    pub ij_cols: u32,
}

impl DepthSample {
    pub fn xyz_count(&self) -> usize {
        self.xyz.len() / 3
    }

    /// Multi-line summary shown next to the visualization.
    pub fn info_text(&self) -> String {
        format!(
            "rows: {}\ncols: {}\ncount: {}\ntime: {:.6}\n",
            self.ij_rows,
            self.ij_cols,
            self.xyz_count(),
            self.timestamp
        )
    }
}

/// Generic status event from the source. Not interpreted by the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub timestamp: f64,
    pub key: String,
    pub value: String,
}

/// Everything a sensor source can deliver to a subscriber.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    Pose(PoseSample),
    FrameAvailable(CameraId),
    PointCloud(DepthSample),
    Device(DeviceEvent),
}

/// Permissions a source may need granted before it connects.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    MotionTracking = 0,
    AreaLearning = 1,
}

bitflags::bitflags! {
    /// Capabilities reported by a sensor source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct Capabilities: u32 {
        const MOTION_TRACKING = 1 << 0;
        const DEPTH           = 1 << 1;
        const COLOR_CAMERA    = 1 << 2;
        const FISHEYE_CAMERA  = 1 << 3;
    }
}

/// Options passed to `SensorSource::connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceConfig {
    pub enable_depth: bool,
    pub enable_color_camera: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enable_depth: true,
            enable_color_camera: true,
        }
    }
}
