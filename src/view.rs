//! Camera description handed in by the camera collaborator.

use glam::{Mat4, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            eye: Vec3::new(10.0, 10.0, 10.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraView {
    pub fn new(eye: Vec3, target: Vec3) -> Self {
        Self {
            eye,
            target,
            ..Self::default()
        }
    }

    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up;
        self
    }

    pub fn with_fov(mut self, fov_y_degrees: f32) -> Self {
        self.fov_y_degrees = fov_y_degrees;
        self
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Right-handed perspective with a [0, 1] depth range (wgpu convention).
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_degrees.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }

    /// World-space ray through normalised device coordinates `(x, y)`.
    pub fn ray(&self, inverse_view_proj: &Mat4, ndc_x: f32, ndc_y: f32) -> (Vec3, Vec3) {
        let near = inverse_view_proj.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse_view_proj.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        (near, (far - near).normalize_or_zero())
    }
}

/// Intersection of a ray with the ground plane `y = 0`, if it is hit in front.
pub fn hit_ground(origin: Vec3, direction: Vec3) -> Option<Vec3> {
    if direction.y.abs() < 1e-8 {
        return None;
    }
    let t = -origin.y / direction.y;
    (t > 0.0 && t.is_finite()).then(|| origin + direction * t)
}
