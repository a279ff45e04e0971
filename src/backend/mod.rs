//! The seam between the context and the graphics API.
//!
//! A [`Backend`] owns every GPU-side object and hands out `u32` handles for
//! them. The context never sees API objects, which keeps all of its state
//! machine logic testable with the [`headless::HeadlessBackend`]. The
//! [`gpu::WgpuBackend`] renders for real into an offscreen framebuffer.
//!
//! Backend methods report failures through `anyhow::Result`; the context
//! turns them into sentinel values for its callers.

pub mod gpu;
pub mod headless;

use anyhow::Result;
use cgmath::Matrix4;
use image::RgbaImage;

use crate::{
    batch::{DrawCall, DrawMode, Vertex},
    data_structures::{
        blend::BlendMode,
        color::Color,
        light::LightData,
        mesh::{Mesh, MeshBuffer},
        texture::{RenderTexture2D, TextureFormat},
    },
};

/// Handle of the 1x1 white texture every backend creates first.
pub const DEFAULT_TEXTURE_ID: u32 = 1;

/// Rectangle of the render target that receives drawing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Fixed-function switches a draw is rasterized with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub wire_mode: bool,
    pub blend: BlendMode,
}

/// Everything a backend needs to replay one flushed batch.
#[derive(Clone, Copy, Debug)]
pub struct BatchDraw<'a> {
    pub lines: &'a [Vertex],
    pub triangles: &'a [Vertex],
    pub quads: &'a [Vertex],
    /// Calls in submission order; `first`/`count` index the buffer of their mode.
    pub draws: &'a [DrawCall],
    /// Positions are already in view space, only the projection is left.
    pub projection: Matrix4<f32>,
    /// Brings view-space positions back into the space lights live in.
    pub model: Matrix4<f32>,
    pub state: RenderState,
    pub lighting: bool,
    pub lights: &'a [LightData],
}

impl BatchDraw<'_> {
    pub fn vertices(&self, mode: DrawMode) -> &[Vertex] {
        match mode {
            DrawMode::Lines => self.lines,
            DrawMode::Triangles => self.triangles,
            DrawMode::Quads => self.quads,
        }
    }
}

/// One mesh draw with its resolved material inputs.
#[derive(Clone, Copy, Debug)]
pub struct MeshDraw<'a> {
    pub mesh: &'a Mesh,
    /// `projection * modelview * transform`.
    pub mvp: Matrix4<f32>,
    /// Model matrix used to bring normals and positions into light space.
    pub model: Matrix4<f32>,
    pub texture: u32,
    pub tint: Color,
    pub ambient: Color,
    pub state: RenderState,
    pub lighting: bool,
    pub lights: &'a [LightData],
}

/// GPU handles assigned to an uploaded mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshHandles {
    pub vao: u32,
    pub vbo: [u32; MeshBuffer::COUNT],
}

pub trait Backend {
    /// Upload `data` holding `mipmaps` levels. Returns the new texture handle.
    fn load_texture(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
        mipmaps: u32,
    ) -> Result<u32>;

    /// Replace the base level of texture `id`.
    fn update_texture(
        &mut self,
        id: u32,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: &[u8],
    ) -> Result<()>;

    /// Build the mip chain of texture `id`. Returns the resulting level count.
    fn generate_mipmaps(&mut self, id: u32) -> Result<u32>;

    /// Read back the base level of texture `id` as RGBA8.
    fn read_texture_pixels(&mut self, id: u32) -> Result<Vec<u8>>;

    fn delete_texture(&mut self, id: u32);

    /// Create a framebuffer with color and depth attachments.
    fn load_render_texture(&mut self, width: u32, height: u32) -> Result<RenderTexture2D>;

    fn delete_render_texture(&mut self, id: u32);

    /// Direct drawing to render texture `id`, or to the screen for `None`.
    fn bind_render_target(&mut self, id: Option<u32>) -> Result<()>;

    fn load_mesh(&mut self, mesh: &Mesh, dynamic: bool) -> Result<MeshHandles>;

    /// Re-upload the first `vertex_count` vertices of one buffer of an uploaded mesh.
    fn update_mesh(&mut self, mesh: &Mesh, buffer: MeshBuffer, vertex_count: usize) -> Result<()>;

    fn delete_vertex_array(&mut self, id: u32);

    fn delete_buffer(&mut self, id: u32);

    fn draw_batch(&mut self, batch: &BatchDraw<'_>) -> Result<()>;

    fn draw_mesh(&mut self, draw: &MeshDraw<'_>) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport);

    /// Clear color and depth of the bound render target.
    fn clear(&mut self, color: Color) -> Result<()>;

    /// Read the top-left `width` x `height` pixels of the screen framebuffer.
    fn read_screen_pixels(&mut self, width: u32, height: u32) -> Result<RgbaImage>;

    /// Whether polygons can be rasterized as outlines.
    fn supports_wire_mode(&self) -> bool;

    /// Release everything the backend still owns.
    fn shutdown(&mut self) {}
}
