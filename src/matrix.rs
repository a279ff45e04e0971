//! Per-mode matrix stacks with fixed-function semantics.
//!
//! Matrices follow the OpenGL convention: column vectors, depth in `[-1, 1]`,
//! and every transform is right-multiplied onto the current matrix so that the
//! transform issued last is the first one applied to a vertex.

use cgmath::{Deg, InnerSpace, Matrix4, SquareMatrix, Vector3, Vector4};

/// Selects which matrix the transform operations affect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    Projection = 0,
    #[default]
    ModelView,
    Texture,
}

impl MatrixMode {
    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug)]
pub struct MatrixStack {
    mode: MatrixMode,
    current: [Matrix4<f32>; 3],
    stacks: [Vec<Matrix4<f32>>; 3],
    depth: usize,
}

impl MatrixStack {
    pub fn new(depth: usize) -> Self {
        Self {
            mode: MatrixMode::ModelView,
            current: [Matrix4::identity(); 3],
            stacks: [
                Vec::with_capacity(depth),
                Vec::with_capacity(depth),
                Vec::with_capacity(depth),
            ],
            depth,
        }
    }

    pub fn mode(&self) -> MatrixMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MatrixMode) {
        self.mode = mode;
    }

    pub fn current(&self) -> Matrix4<f32> {
        self.current[self.mode.slot()]
    }

    pub fn get(&self, mode: MatrixMode) -> Matrix4<f32> {
        self.current[mode.slot()]
    }

    /// Replace the current matrix of `mode` without touching its stack.
    pub fn set(&mut self, mode: MatrixMode, matrix: Matrix4<f32>) {
        self.current[mode.slot()] = matrix;
    }

    /// Number of matrices saved for `mode`.
    pub fn saved(&self, mode: MatrixMode) -> usize {
        self.stacks[mode.slot()].len()
    }

    /// Save the current matrix of the active mode. Returns false on overflow.
    pub fn push(&mut self) -> bool {
        let slot = self.mode.slot();
        if self.stacks[slot].len() >= self.depth {
            log::error!(
                "Matrix stack overflow for {:?}, depth {} reached",
                self.mode,
                self.depth
            );
            return false;
        }
        let current = self.current[slot];
        self.stacks[slot].push(current);
        true
    }

    /// Restore the last saved matrix of the active mode. Returns false if nothing was saved.
    pub fn pop(&mut self) -> bool {
        let slot = self.mode.slot();
        match self.stacks[slot].pop() {
            Some(matrix) => {
                self.current[slot] = matrix;
                true
            }
            None => {
                log::warn!("Matrix stack for {:?} is empty, pop ignored", self.mode);
                false
            }
        }
    }

    pub fn load_identity(&mut self) {
        self.current[self.mode.slot()] = Matrix4::identity();
    }

    pub fn mult(&mut self, matrix: Matrix4<f32>) {
        let slot = self.mode.slot();
        self.current[slot] = self.current[slot] * matrix;
    }

    pub fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.mult(Matrix4::from_translation(Vector3::new(x, y, z)));
    }

    /// Rotate by `angle_deg` around the axis `(x, y, z)`. A zero axis is ignored.
    pub fn rotate(&mut self, angle_deg: f32, x: f32, y: f32, z: f32) {
        let axis = Vector3::new(x, y, z);
        if axis.magnitude2() <= f32::EPSILON {
            log::warn!("Rotation around a zero axis ignored");
            return;
        }
        self.mult(Matrix4::from_axis_angle(axis.normalize(), Deg(angle_deg)));
    }

    pub fn scale(&mut self, x: f32, y: f32, z: f32) {
        self.mult(Matrix4::from_nonuniform_scale(x, y, z));
    }

    pub fn frustum(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        if left == right || bottom == top || near == far {
            log::warn!("Degenerate frustum ignored");
            return;
        }
        let (rl, tb, fne) = (right - left, top - bottom, far - near);
        #[rustfmt::skip]
        let frustum = Matrix4::new(
            near * 2.0 / rl, 0.0, 0.0, 0.0,
            0.0, near * 2.0 / tb, 0.0, 0.0,
            (right + left) / rl, (top + bottom) / tb, -(far + near) / fne, -1.0,
            0.0, 0.0, -(far * near * 2.0) / fne, 0.0,
        );
        self.mult(frustum.cast::<f32>().unwrap_or_else(Matrix4::identity));
    }

    pub fn ortho(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        if left == right || bottom == top || near == far {
            log::warn!("Degenerate orthographic projection ignored");
            return;
        }
        let ortho = cgmath::ortho(left, right, bottom, top, near, far);
        self.mult(ortho.cast::<f32>().unwrap_or_else(Matrix4::identity));
    }
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new(crate::config::Config::DEFAULT_MATRIX_STACK_DEPTH)
    }
}

/// Map a point from normalized device coordinates back to world space.
///
/// Returns `None` when `proj * view` cannot be inverted or the point lands at
/// infinity.
pub fn unproject(
    source: Vector3<f32>,
    proj: Matrix4<f32>,
    view: Matrix4<f32>,
) -> Option<Vector3<f32>> {
    let inverse = (proj * view).invert()?;
    let point = inverse * Vector4::new(source.x, source.y, source.z, 1.0);
    if point.w.abs() <= f32::EPSILON {
        return None;
    }
    Some(point.truncate() / point.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Transform};

    fn approx(a: Matrix4<f32>, b: Matrix4<f32>) -> bool {
        let a: &[f32; 16] = a.as_ref();
        let b: &[f32; 16] = b.as_ref();
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn push_and_pop_restore_per_mode() {
        let mut stack = MatrixStack::new(4);
        stack.translate(1.0, 2.0, 3.0);
        let translated = stack.current();
        assert!(stack.push());
        stack.scale(2.0, 2.0, 2.0);

        stack.set_mode(MatrixMode::Projection);
        assert!(!stack.pop());
        assert_eq!(stack.current(), Matrix4::identity());

        stack.set_mode(MatrixMode::ModelView);
        assert!(stack.pop());
        assert_eq!(stack.current(), translated);
        assert_eq!(stack.saved(MatrixMode::ModelView), 0);
    }

    #[test]
    fn push_keeps_current_matrix() {
        let mut stack = MatrixStack::new(2);
        stack.translate(5.0, 0.0, 0.0);
        let before = stack.current();
        stack.push();
        assert_eq!(stack.current(), before);
    }

    #[test]
    fn overflow_is_rejected() {
        let mut stack = MatrixStack::new(2);
        assert!(stack.push());
        assert!(stack.push());
        assert!(!stack.push());
        assert_eq!(stack.saved(MatrixMode::ModelView), 2);
    }

    #[test]
    fn transforms_right_multiply() {
        let mut stack = MatrixStack::new(4);
        stack.translate(10.0, 0.0, 0.0);
        stack.scale(2.0, 2.0, 2.0);
        // Scale applies first, translation last.
        let p = stack.current().transform_point(Point3::new(1.0, 1.0, 0.0));
        assert_eq!(p, Point3::new(12.0, 2.0, 0.0));
    }

    #[test]
    fn rotation_follows_right_hand_rule() {
        let mut stack = MatrixStack::new(4);
        stack.rotate(90.0, 0.0, 0.0, 1.0);
        let p = stack.current().transform_point(Point3::new(1.0, 0.0, 0.0));
        assert!((p.x).abs() < 1e-5 && (p.y - 1.0).abs() < 1e-5);

        let before = stack.current();
        stack.rotate(45.0, 0.0, 0.0, 0.0);
        assert_eq!(stack.current(), before);
    }

    #[test]
    fn ortho_matches_reference() {
        let mut stack = MatrixStack::new(4);
        stack.set_mode(MatrixMode::Projection);
        stack.ortho(0.0, 800.0, 450.0, 0.0, 0.0, 1.0);
        #[rustfmt::skip]
        let expected = Matrix4::new(
            2.0 / 800.0, 0.0, 0.0, 0.0,
            0.0, -2.0 / 450.0, 0.0, 0.0,
            0.0, 0.0, -2.0, 0.0,
            -1.0, 1.0, -1.0, 1.0,
        );
        assert!(approx(stack.current(), expected));
    }

    #[test]
    fn frustum_matches_reference() {
        let mut stack = MatrixStack::new(4);
        stack.frustum(-1.0, 1.0, -1.0, 1.0, 1.0, 3.0);
        #[rustfmt::skip]
        let expected = Matrix4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, -2.0, -1.0,
            0.0, 0.0, -3.0, 0.0,
        );
        assert!(approx(stack.current(), expected));
    }

    #[test]
    fn unproject_inverts_projection() {
        let proj = cgmath::perspective(Deg(60.0f32), 16.0 / 9.0, 0.1, 100.0);
        let view = Matrix4::look_at_rh(
            Point3::new(0.0, 2.0, 5.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        );
        let world = Vector3::new(0.5f32, 0.25, -1.0);
        let clip = proj * view * world.extend(1.0);
        let ndc = clip.truncate() / clip.w;

        let back = unproject(ndc, proj, view).unwrap();
        assert!((back - world).magnitude() < 1e-3);
    }

    #[test]
    fn unproject_rejects_singular_matrices() {
        let zero = Matrix4::from_nonuniform_scale(0.0, 1.0, 1.0);
        assert_eq!(unproject(Vector3::new(0.0, 0.0, 0.0), zero, Matrix4::identity()), None);
    }
}
