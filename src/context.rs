//! The rendering context.
//!
//! [`Context`] owns everything the layer keeps between calls: the matrix
//! stacks, the vertex batch, the fixed-function render state, the light pool
//! and the backend holding the GPU objects. All operations take `&mut self`;
//! nothing lives in globals.
//!
//! Operations never fail loudly. Loads return a zero handle (or `None` for
//! readbacks) and log why, misuse such as a vertex outside `begin`/`end` is a
//! logged no-op. State changes that influence how already batched vertices
//! would render flush the batch first, so draws always appear in the order
//! they were issued.

use cgmath::{Matrix4, SquareMatrix, Vector2, Vector3, Vector4};
use image::RgbaImage;

use crate::{
    backend::{Backend, BatchDraw, DEFAULT_TEXTURE_ID, MeshDraw, RenderState, Viewport},
    batch::{DrawCall, DrawMode, Push, VertexBatch},
    config::{Config, GlVersion},
    data_structures::{
        blend::BlendMode,
        camera::Camera,
        color::Color,
        light::{LightData, LightId, LightType},
        material::Material,
        mesh::{Mesh, MeshBuffer},
        shader::Shader,
        texture::{RenderTexture2D, Texture2D, TextureFormat},
    },
    matrix::{MatrixMode, MatrixStack},
};

pub struct Context<B: Backend> {
    config: Config,
    backend: B,
    matrices: MatrixStack,
    batch: VertexBatch,
    state: RenderState,
    shader: Shader,
    lights: Vec<LightData>,
    next_light: u32,
    clear_color: Color,
    viewport: Viewport,
    target: Option<u32>,
    /// Camera view while inside `begin_mode_3d`, identity otherwise.
    view: Matrix4<f32>,
    /// Projections saved by `begin_mode_3d` and not yet restored.
    mode_3d_depth: usize,
}

impl<B: Backend> Context<B> {
    /// Set up a context drawing through `backend`.
    ///
    /// Fails only when `config` holds zero capacities.
    pub fn new(mut backend: B, config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let viewport = Viewport::new(0, 0, config.width, config.height);
        backend.set_viewport(viewport);
        log::info!(
            "Context initialized: {:?}, {}x{}, batch limits {:?}, {} draw calls",
            config.version,
            config.width,
            config.height,
            config.limits,
            config.max_draw_calls
        );
        Ok(Self {
            matrices: MatrixStack::new(config.matrix_stack_depth),
            batch: VertexBatch::new(config.limits, config.max_draw_calls),
            state: RenderState::default(),
            shader: Shader::default_shader(),
            lights: Vec::with_capacity(config.max_lights),
            next_light: 0,
            clear_color: config.clear_color,
            viewport,
            target: None,
            view: Matrix4::identity(),
            mode_3d_depth: 0,
            backend,
            config,
        })
    }

    /// Flush what is left and release every backend resource.
    pub fn close(mut self) -> B {
        self.flush();
        self.backend.shutdown();
        log::info!("Context closed");
        self.backend
    }

    /// Submit everything batched so far.
    pub fn draw(&mut self) {
        self.flush();
    }

    /// Viewport shrunk by the offsets, a top-left origin orthographic
    /// projection in pixels and an identity modelview; then clear.
    pub fn init_graphics(&mut self, offset_x: i32, offset_y: i32, width: i32, height: i32) {
        let w = (width - offset_x).max(0);
        let h = (height - offset_y).max(0);
        self.viewport(offset_x / 2, offset_y / 2, w, h);

        self.matrix_mode(MatrixMode::Projection);
        self.load_identity();
        self.ortho(0.0, f64::from(w), f64::from(h), 0.0, 0.0, 1.0);
        self.matrix_mode(MatrixMode::ModelView);
        self.load_identity();

        self.clear_screen_buffers();
        log::info!("Graphics initialized for {}x{}", w, h);
    }

    pub fn version(&self) -> GlVersion {
        self.config.version
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn matrices(&self) -> &MatrixStack {
        &self.matrices
    }

    pub fn batch(&self) -> &VertexBatch {
        &self.batch
    }

    pub fn render_state(&self) -> RenderState {
        self.state
    }

    // Only whole primitives are submitted; an unfinished one is carried over.
    fn flush(&mut self) {
        self.batch.hold_partial();
        if self.batch.is_empty() {
            self.batch.reset();
            return;
        }
        let draws: Vec<DrawCall> = self
            .batch
            .draw_calls()
            .iter()
            .filter(|call| call.count > 0)
            .copied()
            .collect();
        let draw = BatchDraw {
            lines: self.batch.vertices(DrawMode::Lines),
            triangles: self.batch.vertices(DrawMode::Triangles),
            quads: self.batch.vertices(DrawMode::Quads),
            draws: &draws,
            projection: self.matrices.get(MatrixMode::Projection),
            model: self.view.invert().unwrap_or_else(Matrix4::identity),
            state: self.state,
            lighting: self.shader.uses_lighting(),
            lights: &self.lights,
        };
        log::debug!(
            "Flushing {} vertices in {} draw calls",
            self.batch.vertex_count(),
            draws.len()
        );
        if let Err(e) = self.backend.draw_batch(&draw) {
            log::error!("Batch flush failed: {:#}", e);
        }
        self.batch.reset();
    }

    // Matrix operations

    pub fn matrix_mode(&mut self, mode: MatrixMode) {
        self.matrices.set_mode(mode);
    }

    pub fn push_matrix(&mut self) {
        self.matrices.push();
    }

    pub fn pop_matrix(&mut self) {
        self.before_matrix_change();
        self.matrices.pop();
    }

    pub fn load_identity(&mut self) {
        self.before_matrix_change();
        self.matrices.load_identity();
    }

    pub fn translatef(&mut self, x: f32, y: f32, z: f32) {
        self.before_matrix_change();
        self.matrices.translate(x, y, z);
    }

    pub fn rotatef(&mut self, angle_deg: f32, x: f32, y: f32, z: f32) {
        self.before_matrix_change();
        self.matrices.rotate(angle_deg, x, y, z);
    }

    pub fn scalef(&mut self, x: f32, y: f32, z: f32) {
        self.before_matrix_change();
        self.matrices.scale(x, y, z);
    }

    pub fn mult_matrixf(&mut self, matrix: Matrix4<f32>) {
        self.before_matrix_change();
        self.matrices.mult(matrix);
    }

    pub fn frustum(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        self.before_matrix_change();
        self.matrices.frustum(left, right, bottom, top, near, far);
    }

    pub fn ortho(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        self.before_matrix_change();
        self.matrices.ortho(left, right, bottom, top, near, far);
    }

    /// Replace the projection matrix.
    pub fn set_matrix_projection(&mut self, projection: Matrix4<f32>) {
        if !self.batch.is_empty() {
            self.flush();
        }
        self.matrices.set(MatrixMode::Projection, projection);
    }

    /// Replace the modelview matrix.
    pub fn set_matrix_modelview(&mut self, modelview: Matrix4<f32>) {
        self.matrices.set(MatrixMode::ModelView, modelview);
    }

    // Batched vertices were projected with nothing yet; the projection is
    // applied at flush time, so it must not change under pending vertices.
    fn before_matrix_change(&mut self) {
        if self.matrices.mode() == MatrixMode::Projection && !self.batch.is_empty() {
            self.flush();
        }
    }

    /// Set the drawing area in pixels, origin at the bottom-left corner.
    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let viewport = Viewport::new(x, y, width.max(0) as u32, height.max(0) as u32);
        if viewport == self.viewport {
            return;
        }
        self.flush();
        self.viewport = viewport;
        self.backend.set_viewport(viewport);
    }

    // Vertex submission

    /// Start a run of `mode` primitives. An active run is ended first.
    pub fn begin(&mut self, mode: DrawMode) {
        if self.batch.active().is_some() {
            log::warn!("begin({:?}) inside an active run, ending the previous one", mode);
            self.end();
        }
        if !self.batch.begin(mode) {
            self.flush();
            self.batch.begin(mode);
        }
    }

    pub fn end(&mut self) {
        if self.batch.active().is_none() {
            log::warn!("end() without begin()");
            return;
        }
        let dropped = self.batch.end();
        if dropped > 0 {
            log::warn!("Incomplete primitive dropped ({} vertices)", dropped);
        }
    }

    pub fn vertex2i(&mut self, x: i32, y: i32) {
        self.vertex3f(x as f32, y as f32, 0.0);
    }

    pub fn vertex2f(&mut self, x: f32, y: f32) {
        self.vertex3f(x, y, 0.0);
    }

    /// Submit a vertex with the current color, texcoord and normal.
    ///
    /// The position goes through the current modelview matrix and the
    /// texcoord through the texture matrix before they are stored.
    pub fn vertex3f(&mut self, x: f32, y: f32, z: f32) {
        let position = (self.matrices.get(MatrixMode::ModelView) * Vector4::new(x, y, z, 1.0))
            .truncate();
        let uv = self.batch.state().tex_coords;
        let tex_coords = self.matrices.get(MatrixMode::Texture) * Vector4::new(uv.x, uv.y, 0.0, 1.0);
        let tex_coords = Vector2::new(tex_coords.x, tex_coords.y);

        match self.batch.push(position, tex_coords) {
            Push::Accepted => {}
            Push::Inactive => log::warn!("Vertex outside begin()/end() ignored"),
            Push::NeedsFlush => {
                self.flush();
                if self.batch.push(position, tex_coords) != Push::Accepted {
                    log::error!("Vertex rejected by an empty batch");
                }
            }
        }
    }

    pub fn tex_coord2f(&mut self, u: f32, v: f32) {
        self.batch.state_mut().tex_coords = Vector2::new(u, v);
    }

    pub fn normal3f(&mut self, x: f32, y: f32, z: f32) {
        self.batch.state_mut().normal = Vector3::new(x, y, z);
    }

    pub fn color4ub(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.batch.state_mut().color = Color::new(r, g, b, a);
    }

    pub fn color3f(&mut self, r: f32, g: f32, b: f32) {
        self.batch.state_mut().color = Color::from_f32(r, g, b, 1.0);
    }

    pub fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.batch.state_mut().color = Color::from_f32(r, g, b, a);
    }

    // Render state

    /// Texture for the following vertices; 0 selects the default texture.
    pub fn enable_texture(&mut self, id: u32) {
        self.batch.set_texture(id);
    }

    pub fn disable_texture(&mut self) {
        self.batch.set_texture(0);
    }

    /// Direct drawing into render texture `id`.
    pub fn enable_render_texture(&mut self, id: u32) {
        self.set_target(Some(id));
    }

    pub fn disable_render_texture(&mut self) {
        self.set_target(None);
    }

    fn set_target(&mut self, target: Option<u32>) {
        if target == self.target {
            return;
        }
        self.flush();
        match self.backend.bind_render_target(target) {
            Ok(()) => self.target = target,
            Err(e) => log::error!("Binding render target {:?} failed: {:#}", target, e),
        }
    }

    pub fn enable_depth_test(&mut self) {
        self.update_state(|state| state.depth_test = true);
    }

    pub fn disable_depth_test(&mut self) {
        self.update_state(|state| state.depth_test = false);
    }

    pub fn enable_wire_mode(&mut self) {
        if !self.backend.supports_wire_mode() {
            log::warn!("Wire mode is not supported by this backend, filling polygons");
            return;
        }
        self.update_state(|state| state.wire_mode = true);
    }

    pub fn disable_wire_mode(&mut self) {
        self.update_state(|state| state.wire_mode = false);
    }

    pub fn begin_blend_mode(&mut self, mode: BlendMode) {
        self.update_state(|state| state.blend = mode);
    }

    pub fn end_blend_mode(&mut self) {
        self.update_state(|state| state.blend = BlendMode::Alpha);
    }

    fn update_state(&mut self, change: impl FnOnce(&mut RenderState)) {
        let mut next = self.state;
        change(&mut next);
        if next != self.state {
            self.flush();
            self.state = next;
        }
    }

    pub fn clear_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.clear_color = Color::new(r, g, b, a);
    }

    /// Clear color and depth of the current render target.
    pub fn clear_screen_buffers(&mut self) {
        self.flush();
        if let Err(e) = self.backend.clear(self.clear_color) {
            log::error!("Clear failed: {:#}", e);
        }
    }

    // Shaders

    pub fn default_shader(&self) -> Shader {
        Shader::default_shader()
    }

    pub fn standard_shader(&self) -> Shader {
        Shader::standard_shader()
    }

    pub fn current_shader(&self) -> Shader {
        self.shader
    }

    /// Use `shader` for the batched vertices that follow.
    pub fn begin_shader_mode(&mut self, shader: &Shader) {
        if !shader.is_builtin() {
            log::warn!("Shader {} is unknown, keeping shader {}", shader.id, self.shader.id);
            return;
        }
        if shader.id != self.shader.id {
            self.flush();
            self.shader = *shader;
        }
    }

    pub fn end_shader_mode(&mut self) {
        let default = Shader::default_shader();
        self.begin_shader_mode(&default);
    }

    /// Built-in shaders live as long as the context and are never deleted.
    pub fn delete_shader(&mut self, id: u32) {
        if Shader::builtin(id).is_builtin() {
            log::warn!("Shader {} is built in and cannot be deleted", id);
        } else {
            log::warn!("Shader {} does not exist, delete ignored", id);
        }
    }

    // Textures

    /// 1x1 white texture, used whenever no texture is enabled.
    pub fn default_texture(&self) -> Texture2D {
        Texture2D {
            id: DEFAULT_TEXTURE_ID,
            width: 1,
            height: 1,
            mipmaps: 1,
            format: TextureFormat::R8G8B8A8,
        }
    }

    /// Upload texel `data` holding `mipmaps` levels. Returns the texture
    /// handle, 0 on failure.
    pub fn load_texture(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
        mipmaps: u32,
    ) -> u32 {
        match self.backend.load_texture(data, width, height, format, mipmaps) {
            Ok(id) => {
                log::info!(
                    "[TEX ID {}] Texture loaded: {}x{}, {:?}, {} mipmaps",
                    id,
                    width,
                    height,
                    format,
                    mipmaps.max(1)
                );
                id
            }
            Err(e) => {
                log::error!("Texture {}x{} {:?} could not be loaded: {:#}", width, height, format, e);
                0
            }
        }
    }

    /// Replace the base level of texture `id` with `data`.
    pub fn update_texture(&mut self, id: u32, width: u32, height: u32, format: TextureFormat, data: &[u8]) {
        self.flush();
        if let Err(e) = self.backend.update_texture(id, width, height, format, data) {
            log::error!("[TEX ID {}] Update failed: {:#}", id, e);
        }
    }

    /// Generate the full mip chain of `texture` on the CPU.
    ///
    /// On success the texture holds RGBA8 levels and its record is updated.
    /// Compressed textures are left untouched.
    pub fn generate_mipmaps(&mut self, texture: &mut Texture2D) {
        if texture.format.is_compressed() {
            log::warn!("[TEX ID {}] Mipmaps of compressed textures cannot be generated", texture.id);
            return;
        }
        self.flush();
        match self.backend.generate_mipmaps(texture.id) {
            Ok(levels) => {
                texture.mipmaps = levels;
                texture.format = TextureFormat::R8G8B8A8;
                log::info!("[TEX ID {}] Mipmaps generated: {} levels", texture.id, levels);
            }
            Err(e) => log::error!("[TEX ID {}] Mipmap generation failed: {:#}", texture.id, e),
        }
    }

    pub fn delete_textures(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        self.flush();
        self.backend.delete_texture(id);
    }

    /// Create a render target with color and depth attachments. The returned
    /// record has id 0 on failure.
    pub fn load_render_texture(&mut self, width: u32, height: u32) -> RenderTexture2D {
        match self.backend.load_render_texture(width, height) {
            Ok(target) => {
                log::info!(
                    "[FBO ID {}] Render texture loaded: {}x{} (color {}, depth {})",
                    target.id,
                    width,
                    height,
                    target.texture.id,
                    target.depth.id
                );
                target
            }
            Err(e) => {
                log::error!("Render texture {}x{} could not be created: {:#}", width, height, e);
                RenderTexture2D::default()
            }
        }
    }

    /// Delete render texture `id` with both of its attachments.
    pub fn delete_render_textures(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        self.flush();
        if self.target == Some(id) {
            self.set_target(None);
        }
        self.backend.delete_render_texture(id);
    }

    /// Read back the base level of `texture` as RGBA8.
    pub fn read_texture_pixels(&mut self, texture: &Texture2D) -> Option<Vec<u8>> {
        if texture.format.is_compressed() {
            log::warn!("[TEX ID {}] Compressed textures cannot be read back", texture.id);
            return None;
        }
        self.flush();
        self.backend
            .read_texture_pixels(texture.id)
            .map_err(|e| log::error!("[TEX ID {}] Readback failed: {:#}", texture.id, e))
            .ok()
    }

    /// Read the top-left `width` x `height` pixels of the screen, top row first.
    pub fn read_screen_pixels(&mut self, width: u32, height: u32) -> Option<RgbaImage> {
        self.flush();
        self.backend
            .read_screen_pixels(width, height)
            .map_err(|e| log::error!("Screen readback failed: {:#}", e))
            .ok()
    }

    // Meshes

    /// Upload the arrays of `mesh` and store the handles in it.
    pub fn load_mesh(&mut self, mesh: &mut Mesh, dynamic: bool) {
        if mesh.is_uploaded() {
            log::warn!("[VAO ID {}] Mesh is already uploaded", mesh.vao_id);
            return;
        }
        match self.backend.load_mesh(mesh, dynamic) {
            Ok(handles) => {
                mesh.vao_id = handles.vao;
                mesh.vbo_id = handles.vbo;
                log::info!(
                    "[VAO ID {}] Mesh uploaded: {} vertices, {} triangles",
                    handles.vao,
                    mesh.vertex_count,
                    mesh.triangle_count
                );
            }
            Err(e) => log::error!("Mesh could not be uploaded: {:#}", e),
        }
    }

    /// Re-upload the first `vertex_count` vertices of one array of `mesh`.
    pub fn update_mesh(&mut self, mesh: &Mesh, buffer: MeshBuffer, vertex_count: usize) {
        self.flush();
        if let Err(e) = self.backend.update_mesh(mesh, buffer, vertex_count) {
            log::error!("[VAO ID {}] {:?} update failed: {:#}", mesh.vao_id, buffer, e);
        }
    }

    /// Draw an uploaded mesh with `material`, placed by `transform` on top of
    /// the current modelview.
    pub fn draw_mesh(&mut self, mesh: &Mesh, material: &Material, transform: Matrix4<f32>) {
        if !mesh.is_uploaded() {
            log::warn!("Mesh is not uploaded, draw ignored");
            return;
        }
        self.flush();
        let modelview = self.matrices.get(MatrixMode::ModelView);
        let projection = self.matrices.get(MatrixMode::Projection);
        let draw = MeshDraw {
            mesh,
            mvp: projection * modelview * transform,
            model: transform,
            texture: material.tex_diffuse.id,
            tint: material.col_diffuse,
            ambient: material.col_ambient,
            state: self.state,
            lighting: material.shader.uses_lighting(),
            lights: &self.lights,
        };
        if let Err(e) = self.backend.draw_mesh(&draw) {
            log::error!("[VAO ID {}] Mesh draw failed: {:#}", mesh.vao_id, e);
        }
    }

    /// Release the GPU side of `mesh` and reset its handles. The CPU arrays
    /// stay with the caller.
    pub fn unload_mesh(&mut self, mesh: &mut Mesh) {
        if !mesh.is_uploaded() {
            return;
        }
        self.flush();
        self.backend.delete_vertex_array(mesh.vao_id);
        log::info!("[VAO ID {}] Mesh unloaded", mesh.vao_id);
        mesh.vao_id = 0;
        mesh.vbo_id = [0; MeshBuffer::COUNT];
    }

    pub fn delete_vertex_arrays(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        self.flush();
        self.backend.delete_vertex_array(id);
    }

    pub fn delete_buffers(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        self.flush();
        self.backend.delete_buffer(id);
    }

    // Lights

    /// Add a light to the pool. `None` when the pool is full.
    pub fn create_light(
        &mut self,
        light_type: LightType,
        position: Vector3<f32>,
        diffuse: Color,
    ) -> Option<LightId> {
        if self.lights.len() >= self.config.max_lights {
            log::warn!("Light pool is full ({} lights)", self.config.max_lights);
            return None;
        }
        self.flush();
        let id = LightId(self.next_light);
        self.next_light += 1;
        self.lights.push(LightData::new(id, light_type, position, diffuse));
        Some(id)
    }

    /// Mutable access to a light; draws issued before stay unaffected.
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut LightData> {
        self.flush();
        self.lights.iter_mut().find(|light| light.id == id)
    }

    pub fn lights(&self) -> &[LightData] {
        &self.lights
    }

    pub fn destroy_light(&mut self, id: LightId) -> bool {
        let Some(index) = self.lights.iter().position(|light| light.id == id) else {
            log::warn!("Light {:?} does not exist", id);
            return false;
        };
        self.flush();
        self.lights.remove(index);
        true
    }

    // Camera

    /// Perspective projection and camera view for 3D drawing, depth test on.
    ///
    /// Nothing changes when the projection stack has no room left.
    pub fn begin_mode_3d(&mut self, camera: &Camera) {
        self.flush();
        let aspect = f64::from(self.viewport.width.max(1)) / f64::from(self.viewport.height.max(1));
        let (left, right, bottom, top) = camera.frustum_extents(aspect);

        let mode = self.matrices.mode();
        self.matrix_mode(MatrixMode::Projection);
        if !self.matrices.push() {
            self.matrix_mode(mode);
            log::warn!("Projection stack is full, 3D mode not entered");
            return;
        }
        self.mode_3d_depth += 1;
        self.load_identity();
        self.frustum(left, right, bottom, top, Camera::NEAR, Camera::FAR);

        self.view = camera.view_matrix();
        self.matrix_mode(MatrixMode::ModelView);
        self.load_identity();
        self.mult_matrixf(self.view);

        self.enable_depth_test();
    }

    /// Back to the projection saved by [`begin_mode_3d`](Self::begin_mode_3d).
    pub fn end_mode_3d(&mut self) {
        if self.mode_3d_depth == 0 {
            log::warn!("end_mode_3d() without begin_mode_3d()");
            return;
        }
        self.mode_3d_depth -= 1;
        self.flush();
        self.matrix_mode(MatrixMode::Projection);
        self.pop_matrix();
        self.matrix_mode(MatrixMode::ModelView);
        self.load_identity();
        self.view = Matrix4::identity();
        self.disable_depth_test();
    }
}
