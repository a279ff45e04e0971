//! Offscreen rendering with wgpu.
//!
//! [`WgpuBackend`] renders into its own color and depth textures instead of a
//! window surface; the screen framebuffer is read back with
//! [`Backend::read_screen_pixels`]. Every batch flush, mesh draw and clear is
//! encoded and submitted on its own, so uniform and vertex uploads done with
//! `queue.write_buffer` always belong to exactly one submission.

mod readback;
pub mod texture;

use std::{collections::HashMap, iter};

use anyhow::{Context as _, Result, anyhow, bail, ensure};
use cgmath::{Matrix4, SquareMatrix};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::{
    backend::{Backend, BatchDraw, DEFAULT_TEXTURE_ID, MeshDraw, MeshHandles, Viewport},
    batch::{DrawMode, Vertex},
    config::Config,
    data_structures::{
        color::Color,
        mesh::{Mesh, MeshBuffer},
        texture::{RenderTexture2D, Texture2D, TextureFormat},
    },
    pipelines::{PipelineKey, Pipelines, Topology, Uniforms, VertexLayout},
    resources,
};

use self::texture::{GpuTexture, create_default_sampler};

/// Ambient term of lit batches; meshes take theirs from the material.
const BATCH_AMBIENT: Color = Color::new(51, 51, 51, 255);

/// Device features used when the adapter offers them.
const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::POLYGON_MODE_LINE
    .union(wgpu::Features::TEXTURE_COMPRESSION_BC)
    .union(wgpu::Features::TEXTURE_COMPRESSION_ETC2)
    .union(wgpu::Features::TEXTURE_COMPRESSION_ASTC);

#[derive(Debug)]
struct Framebuffer {
    color: wgpu::TextureView,
    color_texture: wgpu::Texture,
    depth: wgpu::TextureView,
    width: u32,
    height: u32,
    /// Texture handles of the attachments, 0 for the screen.
    color_id: u32,
    depth_id: u32,
}

#[derive(Debug)]
struct GpuMesh {
    vertex_count: u32,
    index_count: u32,
    /// Uploaded arrays, indexed by [`MeshBuffer`].
    buffers: [Option<wgpu::Buffer>; MeshBuffer::COUNT],
    /// Default-filled stand-ins for absent draw attributes (slots 0..4).
    fallback: [Option<wgpu::Buffer>; 4],
    vbo: [u32; MeshBuffer::COUNT],
    dynamic: bool,
}

impl GpuMesh {
    fn attribute(&self, slot: usize) -> Option<&wgpu::Buffer> {
        self.buffers[slot].as_ref().or(self.fallback[slot].as_ref())
    }
}

#[derive(Debug)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: Pipelines,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    /// One vertex buffer per [`DrawMode`], sized to the batch capacity.
    batch_buffers: [wgpu::Buffer; 3],
    quad_indices: wgpu::Buffer,
    screen: Framebuffer,
    textures: HashMap<u32, GpuTexture>,
    framebuffers: HashMap<u32, Framebuffer>,
    meshes: HashMap<u32, GpuMesh>,
    /// Buffer handle to owning vertex array.
    buffers: HashMap<u32, u32>,
    target: Option<u32>,
    viewport: Viewport,
    next_texture: u32,
    next_framebuffer: u32,
    next_vao: u32,
    next_buffer: u32,
}

impl WgpuBackend {
    /// Open a device on the default adapter and allocate the screen
    /// framebuffer and batch buffers described by `config`.
    pub async fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter found")?;
        let required_features = adapter.features() & OPTIONAL_FEATURES;
        log::info!(
            "Adapter {:?}, optional features {:?}",
            adapter.get_info().name,
            required_features
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("rlgl device"),
                required_features,
                // WebGL doesn't support all of wgpu's features.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await
            .context("GPU device request failed")?;

        let pipelines = Pipelines::new(&device);
        let sampler = create_default_sampler(&device);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("rlgl Uniform Buffer"),
            contents: bytemuck::cast_slice(&[Uniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("rlgl uniform_bind_group"),
        });

        let vertex_size = std::mem::size_of::<Vertex>() as wgpu::BufferAddress;
        let capacity = [
            config.limits.lines * DrawMode::Lines.vertices_per_primitive(),
            config.limits.triangles * DrawMode::Triangles.vertices_per_primitive(),
            config.limits.quads * DrawMode::Quads.vertices_per_primitive(),
        ];
        let batch_buffers = capacity.map(|vertices| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("rlgl Batch Vertex Buffer"),
                size: vertices as wgpu::BufferAddress * vertex_size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let indices: Vec<u32> = (0..config.limits.quads as u32)
            .flat_map(|quad| {
                let base = quad * 4;
                [base, base + 1, base + 2, base, base + 2, base + 3]
            })
            .collect();
        let quad_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("rlgl Quad Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let screen_color = GpuTexture::create_render_target(
            &device,
            &pipelines.texture_layout,
            &sampler,
            config.width,
            config.height,
            "screen texture",
        );
        let screen_depth =
            GpuTexture::create_depth_texture(&device, config.width, config.height, "screen depth");
        let screen = Framebuffer {
            color: screen_color.view,
            color_texture: screen_color.texture,
            depth: screen_depth.view,
            width: config.width.max(1),
            height: config.height.max(1),
            color_id: 0,
            depth_id: 0,
        };

        let mut backend = Self {
            device,
            queue,
            pipelines,
            sampler,
            uniform_buffer,
            uniform_bind_group,
            batch_buffers,
            quad_indices,
            screen,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            meshes: HashMap::new(),
            buffers: HashMap::new(),
            target: None,
            viewport: Viewport::new(0, 0, config.width, config.height),
            next_texture: DEFAULT_TEXTURE_ID,
            next_framebuffer: 1,
            next_vao: 1,
            next_buffer: 1,
        };
        let white = backend.load_texture(&Color::WHITE.to_array(), 1, 1, TextureFormat::R8G8B8A8, 1)?;
        ensure!(white == DEFAULT_TEXTURE_ID, "default texture got handle {}", white);
        Ok(backend)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Metadata of a live texture.
    pub fn texture(&self, id: u32) -> Option<Texture2D> {
        self.textures.get(&id).map(|t| Texture2D {
            id,
            width: t.width(),
            height: t.height(),
            mipmaps: t.mipmaps(),
            format: t.format,
        })
    }

    fn insert_texture(&mut self, texture: GpuTexture) -> u32 {
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

    fn framebuffer(&self) -> Result<&Framebuffer> {
        match self.target {
            None => Ok(&self.screen),
            Some(id) => self
                .framebuffers
                .get(&id)
                .ok_or_else(|| anyhow!("render texture {} does not exist", id)),
        }
    }

    /// Bind group of texture `id`, the default texture for 0 or unusable ids.
    fn texture_bind_group(&self, id: u32) -> Result<&wgpu::BindGroup> {
        let id = if id == 0 { DEFAULT_TEXTURE_ID } else { id };
        if let Some(group) = self.textures.get(&id).and_then(|t| t.bind_group.as_ref()) {
            return Ok(group);
        }
        log::warn!("Texture {} cannot be sampled, using the default texture", id);
        self.textures
            .get(&DEFAULT_TEXTURE_ID)
            .and_then(|t| t.bind_group.as_ref())
            .context("default texture is missing")
    }

    /// Viewport in wgpu coordinates: origin at the top-left, clamped to the
    /// framebuffer. `None` when nothing of it is visible.
    fn viewport_rect(&self, width: u32, height: u32) -> Option<[f32; 4]> {
        let vp = self.viewport;
        let left = vp.x.max(0) as f32;
        let right = (vp.x as f32 + vp.width as f32).min(width as f32);
        // GL places the viewport origin at the bottom-left corner.
        let top = (height as f32 - (vp.y as f32 + vp.height as f32)).max(0.0);
        let bottom = (height as f32 - vp.y as f32).min(height as f32);
        (right > left && bottom > top).then_some([left, top, right - left, bottom - top])
    }

    fn upload_attribute(&self, mesh: &Mesh, buffer: MeshBuffer, label: &str) -> wgpu::Buffer {
        let usage = if buffer == MeshBuffer::Indices {
            wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST
        } else {
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST
        };
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &resources::mesh::attribute_bytes(mesh, buffer, mesh.vertex_count),
            usage,
        })
    }

    fn fallback_attribute(&self, buffer: MeshBuffer, vertex_count: usize) -> wgpu::Buffer {
        let empty = Mesh {
            vertex_count,
            ..Default::default()
        };
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("rlgl Mesh Default Attribute"),
            contents: &resources::mesh::attribute_bytes(&empty, buffer, vertex_count),
            usage: wgpu::BufferUsages::VERTEX,
        })
    }

    fn submit_pass(
        &mut self,
        key: PipelineKey,
        uniforms: Uniforms,
        draw: impl FnOnce(&Self, &mut wgpu::RenderPass<'_>) -> Result<()>,
    ) -> Result<()> {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
        // Build the pipeline before borrowing the rest of self for the pass.
        self.pipelines.prepare(&self.device, key);

        let framebuffer = self.framebuffer()?;
        let Some([x, y, w, h]) = self.viewport_rect(framebuffer.width, framebuffer.height) else {
            log::debug!("Viewport {:?} is outside the render target", self.viewport);
            return Ok(());
        };
        let pipeline = self
            .pipelines
            .cached(&key)
            .context("pipeline was not built")?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rlgl Draw Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("rlgl Draw Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &framebuffer.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &framebuffer.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            render_pass.set_viewport(x, y, w, h, 0.0, 1.0);
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            draw(self, &mut render_pass)?;
        }
        self.queue.submit(iter::once(encoder.finish()));
        Ok(())
    }
}

impl Backend for WgpuBackend {
    fn load_texture(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
        mipmaps: u32,
    ) -> Result<u32> {
        ensure!(width > 0 && height > 0, "texture size {}x{} is empty", width, height);
        let texture = GpuTexture::from_data(
            &self.device,
            &self.queue,
            &self.pipelines.texture_layout,
            &self.sampler,
            data,
            width,
            height,
            format,
            mipmaps,
        )?;
        Ok(self.insert_texture(texture))
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
            .get(&id)
            .ok_or_else(|| anyhow!("texture {} does not exist", id))?;
        ensure!(
            width <= texture.width() && height <= texture.height(),
            "update of {}x{} does not fit texture {} ({}x{})",
            width,
            height,
            id,
            texture.width(),
            texture.height()
        );
        ensure!(format == texture.format, "format {:?} differs from {:?}", format, texture.format);
        ensure!(!format.is_compressed(), "compressed textures cannot be updated");
        let rgba = resources::texture::to_rgba8(data, width, height, format)?;
        texture::write_level(&self.queue, &texture.texture, 0, width, height, &rgba);
        Ok(())
    }

    fn generate_mipmaps(&mut self, id: u32) -> Result<u32> {
        let texture = self
            .textures
            .get(&id)
            .ok_or_else(|| anyhow!("texture {} does not exist", id))?;
        if texture.format.is_compressed() {
            bail!("mipmaps of compressed {:?} textures cannot be generated", texture.format);
        }
        let (width, height) = (texture.width(), texture.height());
        let base = readback::read_rgba8(&self.device, &self.queue, &texture.texture, width, height)?;
        let chain = resources::texture::generate_mip_chain(&base, width, height)?;
        let mipmapped = texture.with_mip_chain(
            &self.device,
            &self.queue,
            &self.pipelines.texture_layout,
            &self.sampler,
            &chain,
        )?;
        let levels = mipmapped.mipmaps();
        self.textures.insert(id, mipmapped);
        Ok(levels)
    }

    fn read_texture_pixels(&mut self, id: u32) -> Result<Vec<u8>> {
        let texture = self
            .textures
            .get(&id)
            .ok_or_else(|| anyhow!("texture {} does not exist", id))?;
        ensure!(
            !texture.format.is_compressed(),
            "compressed {:?} textures cannot be read back",
            texture.format
        );
        readback::read_rgba8(
            &self.device,
            &self.queue,
            &texture.texture,
            texture.width(),
            texture.height(),
        )
    }

    fn delete_texture(&mut self, id: u32) {
        if id == DEFAULT_TEXTURE_ID {
            log::warn!("The default texture cannot be deleted");
            return;
        }
        if self.framebuffers.values().any(|fb| fb.color_id == id || fb.depth_id == id) {
            log::warn!("Texture {} is attached to a render texture, delete that instead", id);
            return;
        }
        match self.textures.remove(&id) {
            Some(texture) => texture.texture.destroy(),
            None => log::warn!("Texture {} does not exist, delete ignored", id),
        }
    }

    fn load_render_texture(&mut self, width: u32, height: u32) -> Result<RenderTexture2D> {
        ensure!(width > 0 && height > 0, "render texture size {}x{} is empty", width, height);
        let max = self.device.limits().max_texture_dimension_2d;
        ensure!(
            width <= max && height <= max,
            "render texture {}x{} exceeds the device limit of {}",
            width,
            height,
            max
        );
        let color = GpuTexture::create_render_target(
            &self.device,
            &self.pipelines.texture_layout,
            &self.sampler,
            width,
            height,
            "render texture",
        );
        let depth = GpuTexture::create_depth_texture(&self.device, width, height, "render depth");
        let framebuffer = Framebuffer {
            color: color.view.clone(),
            color_texture: color.texture.clone(),
            depth: depth.view.clone(),
            width,
            height,
            color_id: 0,
            depth_id: 0,
        };
        let color_id = self.insert_texture(color);
        let depth_id = self.insert_texture(depth);

        let id = self.next_framebuffer;
        self.next_framebuffer += 1;
        self.framebuffers.insert(
            id,
            Framebuffer {
                color_id,
                depth_id,
                ..framebuffer
            },
        );
        let attachment = |id| Texture2D {
            id,
            width,
            height,
            mipmaps: 1,
            format: TextureFormat::R8G8B8A8,
        };
        Ok(RenderTexture2D {
            id,
            texture: attachment(color_id),
            depth: attachment(depth_id),
        })
    }

    fn delete_render_texture(&mut self, id: u32) {
        let Some(framebuffer) = self.framebuffers.remove(&id) else {
            log::warn!("Render texture {} does not exist, delete ignored", id);
            return;
        };
        for attachment in [framebuffer.color_id, framebuffer.depth_id] {
            if let Some(texture) = self.textures.remove(&attachment) {
                texture.texture.destroy();
            }
        }
        if self.target == Some(id) {
            self.target = None;
        }
    }

    fn bind_render_target(&mut self, id: Option<u32>) -> Result<()> {
        if let Some(id) = id {
            ensure!(self.framebuffers.contains_key(&id), "render texture {} does not exist", id);
        }
        self.target = id;
        Ok(())
    }

    fn load_mesh(&mut self, mesh: &Mesh, dynamic: bool) -> Result<MeshHandles> {
        resources::mesh::validate(mesh)?;
        let vao = self.next_vao;
        self.next_vao += 1;

        let mut buffers: [Option<wgpu::Buffer>; MeshBuffer::COUNT] = Default::default();
        let mut vbo = [0; MeshBuffer::COUNT];
        for buffer in MeshBuffer::ALL {
            if buffer.is_present(mesh) {
                buffers[buffer as usize] = Some(self.upload_attribute(mesh, buffer, "rlgl Mesh Buffer"));
                let id = self.next_buffer_id();
                vbo[buffer as usize] = id;
                self.buffers.insert(id, vao);
            }
        }
        let fallback = std::array::from_fn(|slot| match buffers[slot] {
            Some(_) => None,
            None => MeshBuffer::from_index(slot)
                .map(|buffer| self.fallback_attribute(buffer, mesh.vertex_count)),
        });

        self.meshes.insert(
            vao,
            GpuMesh {
                vertex_count: mesh.vertex_count as u32,
                index_count: (mesh.triangle_count * 3) as u32,
                buffers,
                fallback,
                vbo,
                dynamic,
            },
        );
        Ok(MeshHandles { vao, vbo })
    }

    fn update_mesh(&mut self, mesh: &Mesh, buffer: MeshBuffer, vertex_count: usize) -> Result<()> {
        let stored = self
            .meshes
            .get(&mesh.vao_id)
            .ok_or_else(|| anyhow!("mesh {} is not uploaded", mesh.vao_id))?;
        let target = stored.buffers[buffer as usize]
            .as_ref()
            .ok_or_else(|| anyhow!("mesh {} has no {:?} buffer", mesh.vao_id, buffer))?;
        ensure!(
            vertex_count <= stored.vertex_count as usize,
            "update of {} vertices exceeds the {} the mesh was uploaded with",
            vertex_count,
            stored.vertex_count
        );
        if !stored.dynamic {
            log::debug!("Updating static mesh {}", mesh.vao_id);
        }
        let mut bytes = resources::mesh::attribute_bytes(mesh, buffer, vertex_count);
        // Buffer writes must be a multiple of four bytes.
        bytes.resize(bytes.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
        ensure!(bytes.len() as u64 <= target.size(), "update is larger than the buffer");
        self.queue.write_buffer(target, 0, &bytes);
        Ok(())
    }

    fn delete_vertex_array(&mut self, id: u32) {
        match self.meshes.remove(&id) {
            Some(mesh) => {
                for vbo in mesh.vbo.into_iter().filter(|&vbo| vbo != 0) {
                    self.buffers.remove(&vbo);
                }
                mesh.buffers.iter().flatten().for_each(wgpu::Buffer::destroy);
                mesh.fallback.iter().flatten().for_each(wgpu::Buffer::destroy);
            }
            None => log::warn!("Vertex array {} does not exist, delete ignored", id),
        }
    }

    fn delete_buffer(&mut self, id: u32) {
        let Some(vao) = self.buffers.remove(&id) else {
            log::warn!("Buffer {} does not exist, delete ignored", id);
            return;
        };
        let Some(slot) = self
            .meshes
            .get(&vao)
            .and_then(|mesh| mesh.vbo.iter().position(|&vbo| vbo == id))
        else {
            return;
        };
        let replacement = match (MeshBuffer::from_index(slot), self.meshes.get(&vao)) {
            (Some(buffer), Some(mesh)) if slot < 4 => {
                Some(self.fallback_attribute(buffer, mesh.vertex_count as usize))
            }
            _ => None,
        };
        if let Some(mesh) = self.meshes.get_mut(&vao) {
            mesh.vbo[slot] = 0;
            if let Some(buffer) = mesh.buffers[slot].take() {
                buffer.destroy();
            }
            if slot < 4 {
                mesh.fallback[slot] = replacement;
            }
        }
    }

    fn draw_batch(&mut self, batch: &BatchDraw<'_>) -> Result<()> {
        if batch.draws.iter().all(|call| call.count == 0) {
            return Ok(());
        }
        for mode in DrawMode::ALL {
            let vertices = batch.vertices(mode);
            if !vertices.is_empty() {
                self.queue.write_buffer(
                    &self.batch_buffers[mode as usize],
                    0,
                    bytemuck::cast_slice(vertices),
                );
            }
        }
        let mut uniforms = Uniforms::new(batch.projection, batch.model, Matrix4::identity());
        if batch.lighting {
            uniforms = uniforms.with_lighting(BATCH_AMBIENT, batch.lights);
        }

        // Lines and triangle-based modes need different pipelines; runs are
        // replayed in order, each in its own pass when the topology changes.
        let mut start = 0;
        while start < batch.draws.len() {
            let topology = topology_of(batch.draws[start].mode);
            let end = batch.draws[start..]
                .iter()
                .position(|call| topology_of(call.mode) != topology)
                .map_or(batch.draws.len(), |offset| start + offset);
            let calls = &batch.draws[start..end];
            let key = PipelineKey {
                layout: VertexLayout::Batch,
                topology,
                state: batch.state,
            };
            self.submit_pass(key, uniforms, |backend, pass| {
                for call in calls.iter().filter(|call| call.count > 0) {
                    pass.set_bind_group(1, backend.texture_bind_group(call.texture)?, &[]);
                    pass.set_vertex_buffer(0, backend.batch_buffers[call.mode as usize].slice(..));
                    let (first, count) = (call.first as u32, call.count as u32);
                    match call.mode {
                        DrawMode::Lines | DrawMode::Triangles => pass.draw(first..first + count, 0..1),
                        DrawMode::Quads => {
                            pass.set_index_buffer(
                                backend.quad_indices.slice(..),
                                wgpu::IndexFormat::Uint32,
                            );
                            let first_index = first / 4 * 6;
                            pass.draw_indexed(first_index..first_index + count / 4 * 6, 0, 0..1);
                        }
                    }
                }
                Ok(())
            })?;
            start = end;
        }
        log::trace!("Batch of {} draw calls submitted", batch.draws.len());
        Ok(())
    }

    fn draw_mesh(&mut self, draw: &MeshDraw<'_>) -> Result<()> {
        let vao = draw.mesh.vao_id;
        ensure!(self.meshes.contains_key(&vao), "mesh {} is not uploaded", vao);
        let mut uniforms = Uniforms::new(draw.mvp, draw.model, draw.model).with_tint(draw.tint);
        if draw.lighting {
            uniforms = uniforms.with_lighting(draw.ambient, draw.lights);
        }
        let key = PipelineKey {
            layout: VertexLayout::Mesh,
            topology: Topology::Triangles,
            state: draw.state,
        };
        let texture = draw.texture;
        self.submit_pass(key, uniforms, |backend, pass| {
            let mesh = backend
                .meshes
                .get(&vao)
                .ok_or_else(|| anyhow!("mesh {} is not uploaded", vao))?;
            pass.set_bind_group(1, backend.texture_bind_group(texture)?, &[]);
            for slot in 0..4 {
                let buffer = mesh
                    .attribute(slot)
                    .with_context(|| format!("mesh {} lacks attribute slot {}", vao, slot))?;
                pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            match &mesh.buffers[MeshBuffer::Indices as usize] {
                Some(indices) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
                None => pass.draw(0..mesh.vertex_count, 0..1),
            }
            Ok(())
        })
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        let framebuffer = self.framebuffer()?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rlgl Clear Encoder"),
            });
        {
            let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("rlgl Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &framebuffer.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color.into()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &framebuffer.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
        }
        self.queue.submit(iter::once(encoder.finish()));
        Ok(())
    }

    fn read_screen_pixels(&mut self, width: u32, height: u32) -> Result<RgbaImage> {
        let pixels = readback::read_rgba8(
            &self.device,
            &self.queue,
            &self.screen.color_texture,
            width,
            height,
        )?;
        RgbaImage::from_raw(width, height, pixels).context("readback size mismatch")
    }

    fn supports_wire_mode(&self) -> bool {
        self.device.features().contains(wgpu::Features::POLYGON_MODE_LINE)
    }

    fn shutdown(&mut self) {
        log::info!(
            "Releasing {} textures, {} meshes, {} render textures",
            self.textures.len(),
            self.meshes.len(),
            self.framebuffers.len()
        );
        self.textures.drain().for_each(|(_, t)| t.texture.destroy());
        self.meshes
            .drain()
            .flat_map(|(_, mesh)| mesh.buffers.into_iter().chain(mesh.fallback).flatten())
            .for_each(|buffer| buffer.destroy());
        self.buffers.clear();
        self.framebuffers.clear();
        self.target = None;
    }
}

fn topology_of(mode: DrawMode) -> Topology {
    match mode {
        DrawMode::Lines => Topology::Lines,
        DrawMode::Triangles | DrawMode::Quads => Topology::Triangles,
    }
}
