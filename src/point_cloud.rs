use glam::{Mat4, Vec3};

use crate::renderer::Canvas;

/// Latest depth points and the matrix that places them in the world.
///
/// Contents are replaced wholesale on every update; capacity is fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct PointCloud {
    max_points: usize,
    points: Vec<Vec3>,
    model: Mat4,
    average_depth: f32,
}

impl PointCloud {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points,
            points: Vec::with_capacity(max_points),
            model: Mat4::IDENTITY,
            average_depth: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_points
    }

    /// Replace the stored points with flat `x, y, z` triples.
    ///
    /// A trailing partial triple is dropped, as is anything past capacity.
    pub fn update_points(&mut self, xyz: &[f32]) {
        if xyz.len() % 3 != 0 {
            log::warn!(
                "Point buffer length {} is not a multiple of 3, dropping {} trailing values",
                xyz.len(),
                xyz.len() % 3
            );
        }
        let mut count = xyz.len() / 3;
        if count > self.max_points {
            log::warn!(
                "Point cloud of {} points exceeds capacity {}, truncating",
                count,
                self.max_points
            );
            count = self.max_points;
        }

        self.points.clear();
        self.points.extend(
            xyz.chunks_exact(3)
                .take(count)
                .map(|p| Vec3::new(p[0], p[1], p[2])),
        );

        self.average_depth = if self.points.is_empty() {
            0.0
        } else {
            self.points.iter().map(|p| p.z).sum::<f32>() / self.points.len() as f32
        };
    }

    pub fn set_model_matrix(&mut self, model: Mat4) {
        self.model = model;
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Mean z of the stored points in the depth camera frame, 0 when empty.
    pub fn average_depth(&self) -> f32 {
        self.average_depth
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Issue one draw call with `projection · view · model`.
    pub fn draw(&self, canvas: &mut dyn Canvas, view: &Mat4, projection: &Mat4) {
        if self.points.is_empty() {
            return;
        }
        let mvp = *projection * *view * self.model;
        canvas.draw_points(&self.points, &mvp);
    }
}
