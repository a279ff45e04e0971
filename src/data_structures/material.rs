use crate::data_structures::{color::Color, shader::Shader, texture::Texture2D};

/// Shader, texture maps and colors used when drawing a mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub shader: Shader,

    pub tex_diffuse: Texture2D,
    pub tex_normal: Texture2D,
    pub tex_specular: Texture2D,

    pub col_diffuse: Color,
    pub col_ambient: Color,
    pub col_specular: Color,

    /// Ranges from 0 to 1000.
    pub glossiness: f32,
}

impl Material {
    pub fn new(shader: Shader, tex_diffuse: Texture2D) -> Self {
        Self {
            shader,
            tex_diffuse,
            ..Default::default()
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            shader: Shader::default_shader(),
            tex_diffuse: Texture2D::default(),
            tex_normal: Texture2D::default(),
            tex_specular: Texture2D::default(),
            col_diffuse: Color::WHITE,
            col_ambient: Color::WHITE,
            col_specular: Color::WHITE,
            glossiness: 100.0,
        }
    }
}
