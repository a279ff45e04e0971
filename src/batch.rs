//! Immediate-mode vertex accumulator.
//!
//! Vertices described between `begin` and `end` are appended to one buffer
//! per [`DrawMode`]. Every contiguous run of one mode and one texture is a
//! [`DrawCall`]; calls are kept in submission order across all three buffers
//! so that a flush reproduces the order the caller drew in.
//!
//! The batch never talks to a backend itself. When a buffer is full or the
//! draw call list is used up, [`VertexBatch::push`] answers
//! [`Push::NeedsFlush`] and the owning [`Context`](crate::context::Context)
//! flushes before pushing the vertex again.

use cgmath::{Vector2, Vector3};

use crate::{config::BatchLimits, data_structures::color::Color};

/// How consecutive vertices are grouped into primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Lines = 0,
    Triangles,
    Quads,
}

impl DrawMode {
    pub const ALL: [DrawMode; 3] = [DrawMode::Lines, DrawMode::Triangles, DrawMode::Quads];

    pub fn vertices_per_primitive(self) -> usize {
        match self {
            DrawMode::Lines => 2,
            DrawMode::Triangles => 3,
            DrawMode::Quads => 4,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// One accumulated vertex as it is uploaded to the GPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub color: [u8; 4],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Unorm8x4,
                },
            ],
        }
    }
}

/// A contiguous run of vertices sharing a mode and a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub mode: DrawMode,
    /// Texture handle, `0` selects the default white texture.
    pub texture: u32,
    /// Index of the first vertex inside the buffer of `mode`.
    pub first: usize,
    pub count: usize,
}

/// Attribute state applied to every vertex submitted after it was set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexState {
    pub color: Color,
    pub tex_coords: Vector2<f32>,
    pub normal: Vector3<f32>,
}

impl Default for VertexState {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            tex_coords: Vector2::new(0.0, 0.0),
            normal: Vector3::new(0.0, 0.0, 1.0),
        }
    }
}

/// Outcome of [`VertexBatch::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Push {
    Accepted,
    /// The vertex was not stored; flush the batch and push it again.
    NeedsFlush,
    /// No `begin` is active, the vertex was ignored.
    Inactive,
}

#[derive(Clone, Debug)]
pub struct VertexBatch {
    /// Capacity of each mode buffer, in vertices.
    capacity: [usize; 3],
    buffers: [Vec<Vertex>; 3],
    draws: Vec<DrawCall>,
    max_draws: usize,
    active: Option<DrawMode>,
    texture: u32,
    /// A texture switch requested in the middle of a primitive.
    pending_switch: bool,
    /// Incomplete trailing primitive held back from a flush.
    held: Vec<Vertex>,
    held_texture: u32,
    state: VertexState,
}

impl VertexBatch {
    pub fn new(limits: BatchLimits, max_draws: usize) -> Self {
        let capacity = [
            limits.lines * DrawMode::Lines.vertices_per_primitive(),
            limits.triangles * DrawMode::Triangles.vertices_per_primitive(),
            limits.quads * DrawMode::Quads.vertices_per_primitive(),
        ];
        Self {
            capacity,
            buffers: capacity.map(Vec::with_capacity),
            draws: Vec::with_capacity(max_draws),
            max_draws: max_draws.max(1),
            active: None,
            texture: 0,
            pending_switch: false,
            held: Vec::new(),
            held_texture: 0,
            state: VertexState::default(),
        }
    }

    pub fn active(&self) -> Option<DrawMode> {
        self.active
    }

    pub fn texture(&self) -> u32 {
        self.texture
    }

    pub fn state(&self) -> &VertexState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut VertexState {
        &mut self.state
    }

    pub fn capacity(&self, mode: DrawMode) -> usize {
        self.capacity[mode.slot()]
    }

    pub fn vertices(&self, mode: DrawMode) -> &[Vertex] {
        &self.buffers[mode.slot()]
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn vertex_count(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// True when the buffer of `mode` cannot take another vertex.
    pub fn is_full(&self, mode: DrawMode) -> bool {
        self.buffers[mode.slot()].len() >= self.capacity[mode.slot()]
    }

    /// True when opening another draw call would exceed the per-batch limit.
    pub fn draw_calls_exhausted(&self) -> bool {
        self.draws.len() >= self.max_draws
    }

    /// Start a primitive run. The caller ends any active run first.
    ///
    /// Returns false if the run needs a new draw call and none is left; the
    /// caller flushes and begins again.
    pub fn begin(&mut self, mode: DrawMode) -> bool {
        self.active = Some(mode);
        if self.needs_new_call(mode) && self.draw_calls_exhausted() {
            self.active = None;
            return false;
        }
        self.open_draw_call();
        true
    }

    /// Close the active run, discarding a trailing incomplete primitive.
    /// Returns the number of discarded vertices.
    pub fn end(&mut self) -> usize {
        let Some(mode) = self.active.take() else {
            return 0;
        };
        self.pending_switch = false;
        let buffer = &mut self.buffers[mode.slot()];
        let dropped = buffer.len() % mode.vertices_per_primitive();
        buffer.truncate(buffer.len() - dropped);

        let mut remaining = dropped;
        while remaining > 0 {
            let Some(call) = self.draws.last_mut() else {
                break;
            };
            let taken = remaining.min(call.count);
            call.count -= taken;
            remaining -= taken;
            if call.count == 0 {
                self.draws.pop();
            }
        }
        if self.draws.last().is_some_and(|call| call.count == 0) {
            self.draws.pop();
        }
        dropped
    }

    /// Select the texture for the following vertices.
    ///
    /// Inside a run the switch takes effect at the next primitive boundary,
    /// where it opens a new draw call.
    pub fn set_texture(&mut self, texture: u32) {
        if self.texture == texture {
            return;
        }
        self.texture = texture;
        if self.active.is_some() {
            self.pending_switch = true;
        }
    }

    /// Append a vertex built from `position` and the current attribute state.
    pub fn push(&mut self, position: Vector3<f32>, tex_coords: Vector2<f32>) -> Push {
        let Some(mode) = self.active else {
            return Push::Inactive;
        };
        if self.is_full(mode) {
            return Push::NeedsFlush;
        }
        if self.pending_switch && self.at_primitive_boundary(mode) {
            if self.needs_new_call(mode) && self.draw_calls_exhausted() {
                return Push::NeedsFlush;
            }
            self.pending_switch = false;
            self.open_draw_call();
        }
        if self.draws.is_empty() {
            self.open_draw_call();
        }
        let vertex = Vertex {
            position: position.into(),
            tex_coords: tex_coords.into(),
            normal: self.state.normal.into(),
            color: self.state.color.to_array(),
        };
        self.buffers[mode.slot()].push(vertex);
        if let Some(call) = self.draws.last_mut() {
            call.count += 1;
        }
        Push::Accepted
    }

    /// Take the vertices of an unfinished primitive out of the active run so
    /// that a flush only sees whole primitives. [`reset`](Self::reset) puts
    /// them back.
    pub fn hold_partial(&mut self) {
        let Some(mode) = self.active else {
            return;
        };
        let buffer = &mut self.buffers[mode.slot()];
        let partial = buffer.len() % mode.vertices_per_primitive();
        if partial == 0 {
            return;
        }
        self.held = buffer.split_off(buffer.len() - partial);
        if let Some(call) = self.draws.last_mut() {
            self.held_texture = call.texture;
            call.count = call.count.saturating_sub(partial);
        }
        if self.draws.last().is_some_and(|call| call.count == 0) {
            self.draws.pop();
        }
    }

    /// Drop all accumulated vertices after a flush.
    ///
    /// An active run survives the reset: a fresh draw call with the same mode
    /// and texture is opened so that submission continues seamlessly. Held
    /// vertices of an unfinished primitive start the new buffer.
    pub fn reset(&mut self) {
        self.buffers.iter_mut().for_each(Vec::clear);
        self.draws.clear();
        self.pending_switch = false;
        let held = std::mem::take(&mut self.held);
        let Some(mode) = self.active else {
            return;
        };
        if held.is_empty() {
            self.open_draw_call();
            return;
        }
        self.draws.push(DrawCall {
            mode,
            texture: self.held_texture,
            first: 0,
            count: held.len(),
        });
        self.pending_switch = self.held_texture != self.texture;
        self.buffers[mode.slot()].extend(held);
    }

    fn at_primitive_boundary(&self, mode: DrawMode) -> bool {
        self.buffers[mode.slot()].len() % mode.vertices_per_primitive() == 0
    }

    fn needs_new_call(&self, mode: DrawMode) -> bool {
        match self.draws.last() {
            Some(call) if call.count == 0 => false,
            Some(call) => call.mode != mode || call.texture != self.texture,
            None => true,
        }
    }

    fn open_draw_call(&mut self) {
        let Some(mode) = self.active else {
            return;
        };
        let first = self.buffers[mode.slot()].len();
        let call = DrawCall {
            mode,
            texture: self.texture,
            first,
            count: 0,
        };
        match self.draws.last_mut() {
            // An empty trailing call is retagged instead of leaving a gap.
            Some(last) if last.count == 0 => *last = call,
            Some(last) if last.mode == mode && last.texture == self.texture => {}
            _ => self.draws.push(call),
        }
    }
}
