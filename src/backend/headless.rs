//! A backend without a GPU.
//!
//! [`HeadlessBackend`] keeps texture data and mesh arrays in memory and records
//! every draw as a [`Command`] instead of rasterizing it. Clears are applied to
//! the in-memory framebuffers, so pixel readback of cleared targets works.
//! Tests and tools use it to observe exactly what the context submits.

use std::collections::HashMap;

use anyhow::{Context as _, Result, anyhow, bail, ensure};
use cgmath::Matrix4;
use image::{RgbaImage, imageops};

use crate::{
    backend::{
        Backend, BatchDraw, DEFAULT_TEXTURE_ID, MeshDraw, MeshHandles, RenderState, Viewport,
    },
    batch::{DrawMode, Vertex},
    data_structures::{
        color::Color,
        mesh::{Mesh, MeshBuffer},
        texture::{RenderTexture2D, Texture2D, TextureFormat},
    },
    resources,
};

/// One draw call of a recorded batch with its vertices copied out.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub mode: DrawMode,
    pub texture: u32,
    pub vertices: Vec<Vertex>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedBatch {
    pub target: Option<u32>,
    pub projection: Matrix4<f32>,
    pub state: RenderState,
    pub lighting: bool,
    pub draws: Vec<RecordedDraw>,
}

impl RecordedBatch {
    pub fn vertex_count(&self) -> usize {
        self.draws.iter().map(|d| d.vertices.len()).sum()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Clear {
        target: Option<u32>,
        color: Color,
    },
    Batch(RecordedBatch),
    Mesh {
        target: Option<u32>,
        vao: u32,
        texture: u32,
        mvp: Matrix4<f32>,
        tint: Color,
        state: RenderState,
        lighting: bool,
        lights: usize,
    },
    Viewport(Viewport),
    BindTarget(Option<u32>),
}

#[derive(Clone, Debug)]
struct HeadlessTexture {
    width: u32,
    height: u32,
    format: TextureFormat,
    mipmaps: u32,
    /// All levels, tightly packed in `format`.
    data: Vec<u8>,
}

#[derive(Clone, Debug)]
struct HeadlessMesh {
    vertices: Vec<Vertex>,
    vbo: [u32; MeshBuffer::COUNT],
    dynamic: bool,
}

/// In-memory backend recording every submission.
///
/// The command log is only emptied by [`take_commands`](Self::take_commands);
/// long-running callers drain it once per frame or it keeps growing.
#[derive(Debug)]
pub struct HeadlessBackend {
    screen: RgbaImage,
    textures: HashMap<u32, HeadlessTexture>,
    render_textures: HashMap<u32, RenderTexture2D>,
    meshes: HashMap<u32, HeadlessMesh>,
    buffers: HashMap<u32, u32>,
    commands: Vec<Command>,
    target: Option<u32>,
    viewport: Viewport,
    next_texture: u32,
    next_framebuffer: u32,
    next_vao: u32,
    next_buffer: u32,
    wire_mode: bool,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let mut backend = Self {
            screen: RgbaImage::new(width.max(1), height.max(1)),
            textures: HashMap::new(),
            render_textures: HashMap::new(),
            meshes: HashMap::new(),
            buffers: HashMap::new(),
            commands: Vec::new(),
            target: None,
            viewport: Viewport::new(0, 0, width, height),
            next_texture: DEFAULT_TEXTURE_ID,
            next_framebuffer: 1,
            next_vao: 1,
            next_buffer: 1,
            wire_mode: true,
        };
        let id = backend.insert_texture(HeadlessTexture {
            width: 1,
            height: 1,
            format: TextureFormat::R8G8B8A8,
            mipmaps: 1,
            data: Color::WHITE.to_array().to_vec(),
        });
        debug_assert_eq!(id, DEFAULT_TEXTURE_ID);
        backend
    }

    /// Pretend the device cannot rasterize polygon outlines.
    pub fn without_wire_mode(mut self) -> Self {
        self.wire_mode = false;
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Hand out the recorded commands and start an empty log.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn batches(&self) -> impl Iterator<Item = &RecordedBatch> {
        self.commands.iter().filter_map(|c| match c {
            Command::Batch(batch) => Some(batch),
            _ => None,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn target(&self) -> Option<u32> {
        self.target
    }

    /// Live texture handles, the default texture included.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn texture(&self, id: u32) -> Option<Texture2D> {
        self.textures.get(&id).map(|t| Texture2D {
            id,
            width: t.width,
            height: t.height,
            mipmaps: t.mipmaps,
            format: t.format,
        })
    }

    pub fn render_texture_count(&self) -> usize {
        self.render_textures.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Interleaved vertices of uploaded mesh `vao`.
    pub fn mesh_vertices(&self, vao: u32) -> Option<&[Vertex]> {
        self.meshes.get(&vao).map(|m| m.vertices.as_slice())
    }

    pub fn mesh_is_dynamic(&self, vao: u32) -> Option<bool> {
        self.meshes.get(&vao).map(|m| m.dynamic)
    }

    fn insert_texture(&mut self, texture: HeadlessTexture) -> u32 {
        let id = self.next_texture;
        self.next_texture += 1;
        self.textures.insert(id, texture);
        id
    }

    fn next_buffer_id(&mut self) -> u32 {
        let id = self.next_buffer;
        self.next_buffer += 1;
        id
    }
}

impl Backend for HeadlessBackend {
    fn load_texture(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
        mipmaps: u32,
    ) -> Result<u32> {
        ensure!(width > 0 && height > 0, "texture size {}x{} is empty", width, height);
        if matches!(format, TextureFormat::PvrtRgb | TextureFormat::PvrtRgba) {
            bail!("{:?} textures are not supported", format);
        }
        let mipmaps = mipmaps.clamp(1, resources::texture::mip_level_count(width, height));
        let size = format.mip_chain_size(width, height, mipmaps);
        ensure!(
            data.len() >= size,
            "{:?} texture {}x{} with {} levels needs {} bytes, got {}",
            format,
            width,
            height,
            mipmaps,
            size,
            data.len()
        );
        Ok(self.insert_texture(HeadlessTexture {
            width,
            height,
            format,
            mipmaps,
            data: data[..size].to_vec(),
        }))
    }

    fn update_texture(
        &mut self,
        id: u32,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: &[u8],
    ) -> Result<()> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| anyhow!("texture {} does not exist", id))?;
        ensure!(
            width <= texture.width && height <= texture.height,
            "update of {}x{} does not fit texture {} ({}x{})",
            width,
            height,
            id,
            texture.width,
            texture.height
        );
        ensure!(format == texture.format, "format {:?} differs from {:?}", format, texture.format);
        ensure!(!format.is_compressed(), "compressed textures cannot be updated");
        let bpp = format.bits_per_pixel() as usize / 8;
        ensure!(data.len() >= width as usize * height as usize * bpp, "update data is truncated");
        let row = texture.width as usize * bpp;
        for y in 0..height as usize {
            let src = &data[y * width as usize * bpp..(y + 1) * width as usize * bpp];
            texture.data[y * row..y * row + src.len()].copy_from_slice(src);
        }
        Ok(())
    }

    fn generate_mipmaps(&mut self, id: u32) -> Result<u32> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| anyhow!("texture {} does not exist", id))?;
        if texture.format.is_compressed() {
            bail!("mipmaps of compressed {:?} textures cannot be generated", texture.format);
        }
        let base = resources::texture::to_rgba8(
            &texture.data,
            texture.width,
            texture.height,
            texture.format,
        )?;
        let chain = resources::texture::generate_mip_chain(&base, texture.width, texture.height)?;
        texture.mipmaps = chain.len() as u32;
        texture.format = TextureFormat::R8G8B8A8;
        texture.data = chain.into_iter().flat_map(|level| level.data).collect();
        Ok(texture.mipmaps)
    }

    fn read_texture_pixels(&mut self, id: u32) -> Result<Vec<u8>> {
        let texture = self
            .textures
            .get(&id)
            .ok_or_else(|| anyhow!("texture {} does not exist", id))?;
        resources::texture::to_rgba8(&texture.data, texture.width, texture.height, texture.format)
    }

    fn delete_texture(&mut self, id: u32) {
        if id == DEFAULT_TEXTURE_ID {
            log::warn!("The default texture cannot be deleted");
            return;
        }
        if self
            .render_textures
            .values()
            .any(|rt| rt.texture.id == id || rt.depth.id == id)
        {
            log::warn!("Texture {} is attached to a render texture, delete that instead", id);
            return;
        }
        if self.textures.remove(&id).is_none() {
            log::warn!("Texture {} does not exist, delete ignored", id);
        }
    }

    fn load_render_texture(&mut self, width: u32, height: u32) -> Result<RenderTexture2D> {
        ensure!(width > 0 && height > 0, "render texture size {}x{} is empty", width, height);
        let color = HeadlessTexture {
            width,
            height,
            format: TextureFormat::R8G8B8A8,
            mipmaps: 1,
            data: vec![0; width as usize * height as usize * 4],
        };
        let color_id = self.insert_texture(color);
        // Depth is not readable, only its handle is tracked.
        let depth_id = self.insert_texture(HeadlessTexture {
            width: 0,
            height: 0,
            format: TextureFormat::R8G8B8A8,
            mipmaps: 1,
            data: Vec::new(),
        });

        let id = self.next_framebuffer;
        self.next_framebuffer += 1;
        let target = RenderTexture2D {
            id,
            texture: Texture2D {
                id: color_id,
                width,
                height,
                mipmaps: 1,
                format: TextureFormat::R8G8B8A8,
            },
            depth: Texture2D {
                id: depth_id,
                width,
                height,
                mipmaps: 1,
                format: TextureFormat::R8G8B8A8,
            },
        };
        self.render_textures.insert(id, target);
        Ok(target)
    }

    fn delete_render_texture(&mut self, id: u32) {
        match self.render_textures.remove(&id) {
            Some(target) => {
                self.textures.remove(&target.texture.id);
                self.textures.remove(&target.depth.id);
                if self.target == Some(id) {
                    self.target = None;
                }
            }
            None => log::warn!("Render texture {} does not exist, delete ignored", id),
        }
    }

    fn bind_render_target(&mut self, id: Option<u32>) -> Result<()> {
        if let Some(id) = id {
            ensure!(self.render_textures.contains_key(&id), "render texture {} does not exist", id);
        }
        self.target = id;
        self.commands.push(Command::BindTarget(id));
        Ok(())
    }

    fn load_mesh(&mut self, mesh: &Mesh, dynamic: bool) -> Result<MeshHandles> {
        resources::mesh::validate(mesh)?;
        let mut vbo = [0; MeshBuffer::COUNT];
        let vao = self.next_vao;
        self.next_vao += 1;
        for buffer in MeshBuffer::ALL {
            if buffer.is_present(mesh) {
                let id = self.next_buffer_id();
                vbo[buffer as usize] = id;
                self.buffers.insert(id, vao);
            }
        }
        self.meshes.insert(
            vao,
            HeadlessMesh {
                vertices: resources::mesh::interleave(mesh),
                vbo,
                dynamic,
            },
        );
        Ok(MeshHandles { vao, vbo })
    }

    fn update_mesh(&mut self, mesh: &Mesh, buffer: MeshBuffer, vertex_count: usize) -> Result<()> {
        let stored = self
            .meshes
            .get_mut(&mesh.vao_id)
            .ok_or_else(|| anyhow!("mesh {} is not uploaded", mesh.vao_id))?;
        ensure!(
            stored.vbo[buffer as usize] != 0,
            "mesh {} has no {:?} buffer",
            mesh.vao_id,
            buffer
        );
        ensure!(vertex_count <= mesh.vertex_count, "update of {} vertices exceeds the mesh", vertex_count);
        stored.vertices = resources::mesh::interleave(mesh);
        Ok(())
    }

    fn delete_vertex_array(&mut self, id: u32) {
        match self.meshes.remove(&id) {
            Some(mesh) => {
                for vbo in mesh.vbo.into_iter().filter(|&vbo| vbo != 0) {
                    self.buffers.remove(&vbo);
                }
            }
            None => log::warn!("Vertex array {} does not exist, delete ignored", id),
        }
    }

    fn delete_buffer(&mut self, id: u32) {
        let Some(vao) = self.buffers.remove(&id) else {
            log::warn!("Buffer {} does not exist, delete ignored", id);
            return;
        };
        if let Some(mesh) = self.meshes.get_mut(&vao) {
            mesh.vbo.iter_mut().filter(|vbo| **vbo == id).for_each(|vbo| *vbo = 0);
        }
    }

    fn draw_batch(&mut self, batch: &BatchDraw<'_>) -> Result<()> {
        let draws = batch
            .draws
            .iter()
            .map(|call| {
                let vertices = batch
                    .vertices(call.mode)
                    .get(call.first..call.first + call.count)
                    .with_context(|| format!("draw call {:?} is out of range", call))?;
                Ok(RecordedDraw {
                    mode: call.mode,
                    texture: call.texture,
                    vertices: vertices.to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.commands.push(Command::Batch(RecordedBatch {
            target: self.target,
            projection: batch.projection,
            state: batch.state,
            lighting: batch.lighting,
            draws,
        }));
        Ok(())
    }

    fn draw_mesh(&mut self, draw: &MeshDraw<'_>) -> Result<()> {
        ensure!(
            self.meshes.contains_key(&draw.mesh.vao_id),
            "mesh {} is not uploaded",
            draw.mesh.vao_id
        );
        self.commands.push(Command::Mesh {
            target: self.target,
            vao: draw.mesh.vao_id,
            texture: draw.texture,
            mvp: draw.mvp,
            tint: draw.tint,
            state: draw.state,
            lighting: draw.lighting,
            lights: draw.lights.iter().filter(|l| l.enabled).count(),
        });
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(Command::Viewport(viewport));
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        match self.target {
            None => {
                let pixel = image::Rgba::from(color);
                self.screen.pixels_mut().for_each(|p| *p = pixel);
            }
            Some(id) => {
                let target = self
                    .render_textures
                    .get(&id)
                    .ok_or_else(|| anyhow!("render texture {} does not exist", id))?;
                if let Some(texture) = self.textures.get_mut(&target.texture.id) {
                    let rgba = color.to_array();
                    texture.data.chunks_exact_mut(4).for_each(|p| p.copy_from_slice(&rgba));
                }
            }
        }
        self.commands.push(Command::Clear {
            target: self.target,
            color,
        });
        Ok(())
    }

    fn read_screen_pixels(&mut self, width: u32, height: u32) -> Result<RgbaImage> {
        ensure!(
            width <= self.screen.width() && height <= self.screen.height(),
            "readback of {}x{} exceeds the {}x{} screen",
            width,
            height,
            self.screen.width(),
            self.screen.height()
        );
        Ok(imageops::crop_imm(&self.screen, 0, 0, width, height).to_image())
    }

    fn supports_wire_mode(&self) -> bool {
        self.wire_mode
    }

    fn shutdown(&mut self) {
        log::info!(
            "Headless backend closed with {} textures, {} meshes, {} render textures alive",
            self.textures.len(),
            self.meshes.len(),
            self.render_textures.len()
        );
        self.textures.clear();
        self.meshes.clear();
        self.buffers.clear();
        self.render_textures.clear();
    }
}
