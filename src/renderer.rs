use glam::{Mat4, Vec3};

use crate::config::{CameraMode, OverlayConfig};
use crate::point_cloud::PointCloud;
use crate::scene::SharedScene;
use crate::transform::ModelMatrixCalculator;
use crate::{OverlayError, Result};

const FIXED_EYE: Vec3 = Vec3::new(5.0, 5.0, 5.0);
const THIRD_PERSON_OFFSET: Vec3 = Vec3::new(0.0, 2.0, 4.0);
const TOP_DOWN_HEIGHT: f32 = 8.0;

/// Drawing surface the renderer issues commands to.
///
/// Implemented by the host's GL layer; all calls come from the render thread.
pub trait Canvas {
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn enable_depth_test(&mut self);
    fn set_viewport(&mut self, width: u32, height: u32);
    /// Clear color and depth buffers.
    fn clear(&mut self);
    fn draw_points(&mut self, points: &[Vec3], mvp: &Mat4);
}

/// Static look-at from (5, 5, 5) towards the origin, +Y up.
pub fn fixed_view_matrix() -> Mat4 {
    Mat4::look_at_rh(FIXED_EYE, Vec3::ZERO, Vec3::Y)
}

/// View matrix for a camera mode given the current device model.
pub fn view_matrix_for(mode: CameraMode, calculator: &ModelMatrixCalculator) -> Mat4 {
    let device = calculator.device_position();
    match mode {
        CameraMode::Fixed => fixed_view_matrix(),
        CameraMode::FirstPerson => calculator.device_model().inverse(),
        CameraMode::ThirdPerson => Mat4::look_at_rh(device + THIRD_PERSON_OFFSET, device, Vec3::Y),
        // Looking straight down, so "up" on screen is world -Z.
        CameraMode::TopDown => Mat4::look_at_rh(
            device + Vec3::new(0.0, TOP_DOWN_HEIGHT, 0.0),
            device,
            Vec3::NEG_Z,
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    /// Surface exists, projection not yet sized.
    Created,
    Ready,
}

/// Per-frame diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub point_count: usize,
    pub average_depth: f32,
}

/// Drives the render surface lifecycle against the shared scene.
pub struct Renderer {
    scene: SharedScene,
    max_points: usize,
    fov_deg: f32,
    near: f32,
    far: f32,
    aspect: f32,
    state: SurfaceState,
}

impl Renderer {
    pub fn new(scene: SharedScene, max_points: usize, config: &OverlayConfig) -> Self {
        Self {
            scene,
            max_points,
            fov_deg: config.fov_deg,
            near: config.near,
            far: config.far,
            aspect: 1.0,
            state: SurfaceState::Uninitialized,
        }
    }

    pub fn surface_state(&self) -> SurfaceState {
        self.state
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    /// Allocate the point cloud store and reset the view.
    pub fn on_surface_created(&mut self, canvas: &mut dyn Canvas) {
        canvas.set_clear_color([0.0, 0.0, 0.0, 0.0]);
        canvas.enable_depth_test();

        let max_points = self.max_points;
        self.scene.with(|state| {
            state.point_cloud = Some(PointCloud::new(max_points));
            state.update_view_matrix();
        });
        self.state = SurfaceState::Created;
        log::info!("Surface created (point capacity {})", max_points);
    }

    /// Resize the viewport and recompute the projection.
    ///
    /// A zero-sized surface is rejected and the previous projection kept.
    pub fn on_surface_changed(
        &mut self,
        canvas: &mut dyn Canvas,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.state == SurfaceState::Uninitialized {
            return Err(OverlayError::SurfaceNotCreated);
        }
        if width == 0 || height == 0 {
            log::warn!("Ignoring surface resize to {}x{}", width, height);
            return Err(OverlayError::InvalidSurface { width, height });
        }

        canvas.set_viewport(width, height);
        self.aspect = width as f32 / height as f32;
        let projection =
            Mat4::perspective_rh_gl(self.fov_deg.to_radians(), self.aspect, self.near, self.far);
        self.scene.with(|state| state.projection = projection);
        self.state = SurfaceState::Ready;
        log::info!(
            "Surface changed to {}x{} (aspect {:.3})",
            width,
            height,
            self.aspect
        );
        Ok(())
    }

    /// Clear and draw the latest point cloud.
    ///
    /// The draw call runs inside the scene lock, so a frame waits for an
    /// in-flight sensor update rather than drawing a torn one.
    pub fn on_draw_frame(&mut self, canvas: &mut dyn Canvas) -> Result<FrameStats> {
        if self.state == SurfaceState::Uninitialized {
            return Err(OverlayError::SurfaceNotCreated);
        }

        canvas.clear();
        let stats = self.scene.with(|state| match &state.point_cloud {
            Some(pc) => {
                pc.draw(canvas, &state.view, &state.projection);
                FrameStats {
                    point_count: pc.point_count(),
                    average_depth: pc.average_depth(),
                }
            }
            None => FrameStats {
                point_count: 0,
                average_depth: 0.0,
            },
        });

        log::trace!("{}, {}", stats.point_count, stats.average_depth);
        Ok(stats)
    }
}
