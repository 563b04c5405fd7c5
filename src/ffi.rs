//! C FFI layer for pcoverlay.
//!
//! Lets a native host that owns the sensor service and the GL context push
//! pose/depth samples from its callback thread and pull per-frame matrices
//! and points from its render thread. The generated C header is written to
//! `include/pcoverlay.h` by cbindgen.

use glam::{Mat4, Vec3};
use std::ffi::{c_char, c_int};
use std::sync::{Mutex, PoisonError};

use crate::config::{CameraMode, OverlayConfig};
use crate::error::LastError;
use crate::renderer::{Canvas, Renderer};
use crate::scene::SharedScene;
use crate::types::{DepthSample, FramePair, PoseSample};
use crate::OverlayError;

static LAST_ERROR: LastError = LastError::new();

/// Opaque scene handle for C consumers.
pub struct OvScene {
    scene: SharedScene,
    renderer: Mutex<Renderer>,
}

/// Pose in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OvPose {
    /// Translation [x, y, z] in meters.
    pub translation: [f32; 3],
    /// Quaternion [qx, qy, qz, qw].
    pub rotation: [f32; 4],
    /// Source timestamp in seconds.
    pub timestamp: f64,
}

impl OvPose {
    fn to_sample(self, pair: FramePair) -> PoseSample {
        PoseSample::from_arrays(pair, self.translation, self.rotation, self.timestamp)
    }
}

/// Matrices for the current frame, column-major.
#[repr(C)]
pub struct OvMatrices {
    pub view: [f32; 16],
    pub projection: [f32; 16],
    pub device_model: [f32; 16],
    pub point_cloud_model: [f32; 16],
}

/// Result of one draw: the MVP to render the returned points with.
#[repr(C)]
pub struct OvFrame {
    /// projection · view · point cloud model, column-major.
    pub mvp: [f32; 16],
    pub point_count: u32,
    pub average_depth: f32,
}

/// Canvas that captures the draw call so the host can replay it in its own GL context.
#[derive(Default)]
struct CaptureCanvas {
    mvp: Option<Mat4>,
    points: Vec<Vec3>,
}

impl Canvas for CaptureCanvas {
    fn set_clear_color(&mut self, _rgba: [f32; 4]) {}

    fn enable_depth_test(&mut self) {}

    fn set_viewport(&mut self, _width: u32, _height: u32) {}

    fn clear(&mut self) {
        self.mvp = None;
        self.points.clear();
    }

    fn draw_points(&mut self, points: &[Vec3], mvp: &Mat4) {
        self.mvp = Some(*mvp);
        self.points.clear();
        self.points.extend_from_slice(points);
    }
}

fn fail(err: OverlayError) -> c_int {
    LAST_ERROR.set(&err);
    -1
}

fn lock_renderer(scene: &OvScene) -> std::sync::MutexGuard<'_, Renderer> {
    scene.renderer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a scene whose point cloud holds at most `max_points` points.
/// Configuration is read from `PCOVERLAY_*` environment variables.
#[no_mangle]
pub extern "C" fn ov_scene_new(max_points: u32) -> *mut OvScene {
    let config = OverlayConfig::from_env();
    let scene = SharedScene::new(&config);
    let renderer = Renderer::new(scene.clone(), max_points as usize, &config);
    Box::into_raw(Box::new(OvScene {
        scene,
        renderer: Mutex::new(renderer),
    }))
}

/// Free a scene.
///
/// # Safety
/// `scene` must be a pointer returned by `ov_scene_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_scene_free(scene: *mut OvScene) {
    if !scene.is_null() {
        drop(Box::from_raw(scene));
    }
}

/// Set the IMU→device calibration. Returns 0 on success, -1 on error.
///
/// # Safety
/// `scene` must be a valid scene pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_set_device_to_imu(scene: *const OvScene, pose: OvPose) -> c_int {
    if scene.is_null() {
        return -1;
    }
    let scene = &*scene;
    let sample = pose.to_sample(FramePair::imu_to_device());
    match scene.scene.with(|s| s.calculator.set_device_to_imu(&sample)) {
        Ok(()) => 0,
        Err(e) => fail(e),
    }
}

/// Set the IMU→color camera calibration. Returns 0 on success, -1 on error.
///
/// # Safety
/// `scene` must be a valid scene pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_set_color_camera_to_imu(scene: *const OvScene, pose: OvPose) -> c_int {
    if scene.is_null() {
        return -1;
    }
    let scene = &*scene;
    let sample = pose.to_sample(FramePair::imu_to_color_camera());
    match scene
        .scene
        .with(|s| s.calculator.set_color_camera_to_imu(&sample))
    {
        Ok(()) => 0,
        Err(e) => fail(e),
    }
}

/// Apply a start-of-service→device pose. Returns 0 on success, -1 if the
/// pose was rejected (previous matrices kept).
///
/// # Safety
/// `scene` must be a valid scene pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_push_pose(scene: *const OvScene, pose: OvPose) -> c_int {
    if scene.is_null() {
        return -1;
    }
    let scene = &*scene;
    let sample = pose.to_sample(FramePair::device_motion());
    match scene.scene.with(|s| s.apply_pose(&sample)) {
        Ok(()) => 0,
        Err(e) => fail(e),
    }
}

/// Replace the point cloud with `len` floats of xyz triples captured at
/// `timestamp`, placed with `pose` (the device pose at that timestamp).
/// Returns 0 on success, -1 on error (previous cloud kept).
///
/// # Safety
/// `scene` must be a valid scene pointer, or null. `xyz` must point to at
/// least `len` floats, or be null when `len` is 0.
#[no_mangle]
pub unsafe extern "C" fn ov_push_point_cloud(
    scene: *const OvScene,
    xyz: *const f32,
    len: usize,
    timestamp: f64,
    pose: OvPose,
) -> c_int {
    if scene.is_null() || (xyz.is_null() && len > 0) {
        return -1;
    }
    let scene = &*scene;
    let xyz = if len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(xyz, len).to_vec()
    };
    let depth = DepthSample {
        xyz,
        timestamp,
        ij_rows: 0,
        ij_cols: 0,
    };
    let sample = pose.to_sample(FramePair::device_motion());
    let info = depth.info_text();
    match scene.scene.with(|s| {
        s.info_text = info;
        s.apply_point_cloud(&depth, &sample)
    }) {
        Ok(()) => 0,
        Err(e) => fail(e),
    }
}

/// Select how the view follows the device.
/// `mode`: 0 = fixed, 1 = first person, 2 = third person, 3 = top down.
///
/// # Safety
/// `scene` must be a valid scene pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_set_camera_mode(scene: *const OvScene, mode: c_int) {
    if scene.is_null() {
        return;
    }
    let scene = &*scene;
    let mode = match mode {
        1 => CameraMode::FirstPerson,
        2 => CameraMode::ThirdPerson,
        3 => CameraMode::TopDown,
        _ => CameraMode::Fixed,
    };
    scene.scene.set_camera_mode(mode);
}

/// Render surface was (re)created. Resets the point cloud.
///
/// # Safety
/// `scene` must be a valid scene pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_surface_created(scene: *const OvScene) {
    if scene.is_null() {
        return;
    }
    let scene = &*scene;
    lock_renderer(scene).on_surface_created(&mut CaptureCanvas::default());
}

/// Render surface resized. Returns 0 on success, -1 on error.
///
/// # Safety
/// `scene` must be a valid scene pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_surface_changed(scene: *const OvScene, width: u32, height: u32) -> c_int {
    if scene.is_null() {
        return -1;
    }
    let scene = &*scene;
    match lock_renderer(scene).on_surface_changed(&mut CaptureCanvas::default(), width, height) {
        Ok(()) => 0,
        Err(e) => fail(e),
    }
}

/// Run one draw: writes the MVP and stats to `frame` and up to `points_max`
/// points (as xyz floats) to `points_out`. Returns the number of points
/// written, or -1 on error.
///
/// # Safety
/// `scene` and `frame` must be valid pointers, or null. `points_out` must
/// point to at least `3 * points_max` floats, or be null.
#[no_mangle]
pub unsafe extern "C" fn ov_draw_frame(
    scene: *const OvScene,
    frame: *mut OvFrame,
    points_out: *mut f32,
    points_max: usize,
) -> c_int {
    if scene.is_null() || frame.is_null() {
        return -1;
    }
    let scene = &*scene;
    let mut canvas = CaptureCanvas::default();
    let stats = match lock_renderer(scene).on_draw_frame(&mut canvas) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    frame.write(OvFrame {
        mvp: canvas.mvp.unwrap_or(Mat4::IDENTITY).to_cols_array(),
        point_count: stats.point_count as u32,
        average_depth: stats.average_depth,
    });

    if points_out.is_null() {
        return 0;
    }
    let count = canvas.points.len().min(points_max);
    let out = std::slice::from_raw_parts_mut(points_out, count * 3);
    for (dst, p) in out.chunks_exact_mut(3).zip(&canvas.points) {
        dst.copy_from_slice(&p.to_array());
    }
    count as c_int
}

/// Copy the current view, projection and model matrices.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `scene` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_frame_matrices(scene: *const OvScene, out: *mut OvMatrices) -> c_int {
    if scene.is_null() || out.is_null() {
        return -1;
    }
    let scene = &*scene;
    let snap = scene.scene.snapshot();
    out.write(OvMatrices {
        view: snap.view.to_cols_array(),
        projection: snap.projection.to_cols_array(),
        device_model: snap.device_model.to_cols_array(),
        point_cloud_model: snap.point_cloud_model.to_cols_array(),
    });
    0
}

/// Number of points in the current cloud, 0 before the surface is created.
///
/// # Safety
/// `scene` must be a valid scene pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ov_point_count(scene: *const OvScene) -> u32 {
    if scene.is_null() {
        return 0;
    }
    let scene = &*scene;
    scene
        .scene
        .with(|s| s.point_cloud.as_ref().map_or(0, |pc| pc.point_count() as u32))
}

/// Copy up to `max_points` points of the current cloud as xyz floats.
/// Returns the number of points copied, or -1 on error.
///
/// # Safety
/// `scene` must be a valid scene pointer, or null. `out` must point to at
/// least `3 * max_points` floats.
#[no_mangle]
pub unsafe extern "C" fn ov_copy_points(scene: *const OvScene, out: *mut f32, max_points: usize) -> c_int {
    if scene.is_null() || out.is_null() {
        return -1;
    }
    let scene = &*scene;
    scene.scene.with(|s| {
        let points = s.point_cloud.as_ref().map_or(&[][..], |pc| pc.points());
        let count = points.len().min(max_points);
        let dst = std::slice::from_raw_parts_mut(out, count * 3);
        for (d, p) in dst.chunks_exact_mut(3).zip(points) {
            d.copy_from_slice(&p.to_array());
        }
        count as c_int
    })
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next pcoverlay API call.
#[no_mangle]
pub extern "C" fn ov_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
