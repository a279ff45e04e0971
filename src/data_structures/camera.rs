use cgmath::{Deg, Matrix4, Point3, Vector3};

/// Perspective camera: position, look-at target, up vector and vertical field of view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vector3<f32>,
    pub target: Vector3<f32>,
    pub up: Vector3<f32>,
    /// Field of view in Y, in degrees.
    pub fovy: f32,
}

impl Camera {
    pub const NEAR: f64 = 0.01;
    pub const FAR: f64 = 1000.0;

    pub fn new(position: Vector3<f32>, target: Vector3<f32>, up: Vector3<f32>, fovy: f32) -> Self {
        Self {
            position,
            target,
            up,
            fovy,
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        let eye = Point3::new(self.position.x, self.position.y, self.position.z);
        let target = Point3::new(self.target.x, self.target.y, self.target.z);
        Matrix4::look_at_rh(eye, target, self.up)
    }

    /// Frustum extents `(left, right, bottom, top)` at the near plane for the given aspect ratio.
    pub fn frustum_extents(&self, aspect: f64) -> (f64, f64, f64, f64) {
        let top = Self::NEAR * (f64::from(self.fovy) * 0.5).to_radians().tan();
        let right = top * aspect;
        (-right, right, -top, top)
    }

    pub fn fovy(&self) -> Deg<f32> {
        Deg(self.fovy)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 10.0, 10.0),
            target: Vector3::new(0.0, 0.0, 0.0),
            up: Vector3::unit_y(),
            fovy: 45.0,
        }
    }
}
