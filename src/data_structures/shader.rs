//! Shader program records.
//!
//! Only the two built-in programs exist: the unlit default shader and the
//! standard shader that adds diffuse lighting from the light pool. Their
//! attribute and uniform locations are fixed by `pipelines/rlgl.wgsl`.

/// Handle of the unlit built-in shader.
pub const DEFAULT_SHADER_ID: u32 = 1;
/// Handle of the lit built-in shader.
pub const STANDARD_SHADER_ID: u32 = 2;

/// A shader program plus its cached attribute and uniform locations.
///
/// A location of `-1` means the program does not use that slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shader {
    pub id: u32,

    pub vertex_loc: i32,
    pub texcoord_loc: i32,
    pub normal_loc: i32,
    pub color_loc: i32,
    pub tangent_loc: i32,
    pub texcoord2_loc: i32,

    pub mvp_loc: i32,
    pub tint_color_loc: i32,

    pub map_texture0_loc: i32,
    pub map_texture1_loc: i32,
    pub map_texture2_loc: i32,
}

impl Shader {
    pub const fn builtin(id: u32) -> Self {
        Self {
            id,
            vertex_loc: 0,
            texcoord_loc: 1,
            normal_loc: 2,
            color_loc: 3,
            tangent_loc: -1,
            texcoord2_loc: -1,
            mvp_loc: 0,
            tint_color_loc: 0,
            map_texture0_loc: 0,
            map_texture1_loc: -1,
            map_texture2_loc: -1,
        }
    }

    pub const fn default_shader() -> Self {
        Self::builtin(DEFAULT_SHADER_ID)
    }

    pub const fn standard_shader() -> Self {
        Self::builtin(STANDARD_SHADER_ID)
    }

    pub fn is_builtin(&self) -> bool {
        self.id == DEFAULT_SHADER_ID || self.id == STANDARD_SHADER_ID
    }

    pub fn uses_lighting(&self) -> bool {
        self.id == STANDARD_SHADER_ID
    }
}

impl Default for Shader {
    fn default() -> Self {
        Self::default_shader()
    }
}
