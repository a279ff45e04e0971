//! RGBA colors as the batch and the materials consume them.

/// 32 bit RGBA color.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0, 255);
    pub const BLANK: Color = Color::new(0, 0, 0, 0);
    pub const RED: Color = Color::new(230, 41, 55, 255);
    pub const GREEN: Color = Color::new(0, 228, 48, 255);
    pub const BLUE: Color = Color::new(0, 121, 241, 255);
    pub const GRAY: Color = Color::new(130, 130, 130, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build a color from normalized float channels. Values outside `[0, 1]` are clamped.
    pub fn from_f32(r: f32, g: f32, b: f32, a: f32) -> Self {
        let f_to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(f_to_u8(r), f_to_u8(g), f_to_u8(b), f_to_u8(a))
    }

    pub fn to_f32(self) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0,
        ]
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<[u8; 4]> for Color {
    fn from(c: [u8; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl From<Color> for wgpu::Color {
    fn from(c: Color) -> Self {
        let [r, g, b, a] = c.to_f32();
        wgpu::Color {
            r: f64::from(r),
            g: f64::from(g),
            b: f64::from(b),
            a: f64::from(a),
        }
    }
}

impl From<Color> for image::Rgba<u8> {
    fn from(c: Color) -> Self {
        image::Rgba(c.to_array())
    }
}
