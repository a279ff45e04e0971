//! Render pipelines for batch and mesh drawing.
//!
//! Every draw goes through the single shader in `rlgl.wgsl`. What varies is
//! the vertex layout (interleaved batch vertices or one buffer per mesh
//! attribute), the topology and the fixed-function state. Pipelines for each
//! combination are built on first use and cached by [`PipelineKey`].

use std::collections::HashMap;

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    backend::RenderState,
    batch::Vertex,
    data_structures::{
        blend::BlendMode,
        color::Color,
        light::{LightData, LightType},
    },
};

/// Size of the light array in the uniform block.
pub const MAX_LIGHTS: usize = 8;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Maps OpenGL clip space (z in -1..1) onto wgpu clip space (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRaw {
    /// xyz position, w attenuation radius
    position: [f32; 4],
    target: [f32; 4],
    color: [f32; 4],
    /// kind, enabled, intensity, cosine of the cone angle
    params: [f32; 4],
}

impl From<&LightData> for LightRaw {
    fn from(light: &LightData) -> Self {
        let kind = match light.light_type {
            LightType::Point => 0.0,
            LightType::Directional => 1.0,
            LightType::Spot => 2.0,
        };
        Self {
            position: [light.position.x, light.position.y, light.position.z, light.radius],
            target: [light.target.x, light.target.y, light.target.z, 0.0],
            color: light.diffuse.to_f32(),
            params: [
                kind,
                if light.enabled { 1.0 } else { 0.0 },
                light.intensity,
                light.cone_angle.to_radians().cos(),
            ],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Uniforms {
    mvp: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    tint: [f32; 4],
    ambient: [f32; 4],
    /// lighting enabled, light count
    params: [u32; 4],
    lights: [LightRaw; MAX_LIGHTS],
}

impl Uniforms {
    /// `mvp` is in OpenGL clip convention and gets corrected here.
    pub fn new(mvp: Matrix4<f32>, model: Matrix4<f32>, normal_matrix: Matrix4<f32>) -> Self {
        Self {
            mvp: (OPENGL_TO_WGPU_MATRIX * mvp).into(),
            model: model.into(),
            normal_matrix: normal_matrix.into(),
            tint: Color::WHITE.to_f32(),
            ambient: [1.0; 4],
            params: [0; 4],
            lights: [LightRaw::default(); MAX_LIGHTS],
        }
    }

    pub fn with_tint(mut self, tint: Color) -> Self {
        self.tint = tint.to_f32();
        self
    }

    /// Turn on diffuse lighting. Lights past [`MAX_LIGHTS`] are dropped.
    pub fn with_lighting(mut self, ambient: Color, lights: &[LightData]) -> Self {
        if lights.len() > MAX_LIGHTS {
            log::warn!("{} lights given, only the first {} are shaded", lights.len(), MAX_LIGHTS);
        }
        let count = lights.len().min(MAX_LIGHTS);
        for (raw, light) in self.lights.iter_mut().zip(lights) {
            *raw = LightRaw::from(light);
        }
        self.ambient = ambient.to_f32();
        self.params = [1, count as u32, 0, 0];
        self
    }
}

impl Default for Uniforms {
    fn default() -> Self {
        Self::new(Matrix4::identity(), Matrix4::identity(), Matrix4::identity())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Interleaved [`Vertex`] from the batch.
    Batch,
    /// One buffer per attribute: positions, texcoords, normals, colors.
    Mesh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Lines,
    Triangles,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub layout: VertexLayout,
    pub topology: Topology,
    pub state: RenderState,
}

pub fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    use wgpu::{BlendComponent, BlendFactor, BlendOperation};
    let component = |src_factor, dst_factor| BlendComponent {
        src_factor,
        dst_factor,
        operation: BlendOperation::Add,
    };
    let both = |c: BlendComponent| wgpu::BlendState { color: c, alpha: c };
    match mode {
        BlendMode::Alpha => both(component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)),
        BlendMode::Additive => both(component(BlendFactor::SrcAlpha, BlendFactor::One)),
        BlendMode::Multiplied => both(component(BlendFactor::Dst, BlendFactor::OneMinusSrcAlpha)),
    }
}

const MESH_ATTRIBUTES: [[wgpu::VertexAttribute; 1]; 4] = [
    wgpu::vertex_attr_array![0 => Float32x3],
    wgpu::vertex_attr_array![1 => Float32x2],
    wgpu::vertex_attr_array![2 => Float32x3],
    wgpu::vertex_attr_array![3 => Unorm8x4],
];

/// Layouts of the four mesh attribute buffers, bound to slots 0..4.
pub fn mesh_vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 4] {
    let stride = [12, 8, 12, 4];
    std::array::from_fn(|slot| wgpu::VertexBufferLayout {
        array_stride: stride[slot],
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &MESH_ATTRIBUTES[slot],
    })
}

pub fn mk_uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("rlgl uniform_bind_group_layout"),
    })
}

pub fn mk_texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("rlgl texture_bind_group_layout"),
    })
}

/// Lazily built pipelines sharing one shader and one pipeline layout.
#[derive(Debug)]
pub struct Pipelines {
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    cache: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = mk_uniform_layout(device);
        let texture_layout = mk_texture_layout(device);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("rlgl Pipeline Layout"),
            bind_group_layouts: &[Some(&uniform_layout), Some(&texture_layout)],
            immediate_size: 0,
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("rlgl Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("rlgl.wgsl").into()),
        });
        Self {
            shader,
            layout,
            uniform_layout,
            texture_layout,
            cache: HashMap::new(),
        }
    }

    /// Build the pipeline for `key` unless it is cached already.
    pub fn prepare(&mut self, device: &wgpu::Device, key: PipelineKey) {
        let Self {
            shader,
            layout,
            cache,
            ..
        } = self;
        cache.entry(key).or_insert_with(|| {
            log::debug!("Building pipeline for {:?}", key);
            let batch = [Vertex::desc()];
            let mesh = mesh_vertex_layouts();
            let vertex_layouts: &[wgpu::VertexBufferLayout] = match key.layout {
                VertexLayout::Batch => &batch,
                VertexLayout::Mesh => &mesh,
            };
            mk_render_pipeline(device, layout, shader, key, vertex_layouts)
        });
    }

    pub fn cached(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.cache.get(key)
    }
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    key: PipelineKey,
    vertex_layouts: &[wgpu::VertexBufferLayout],
) -> wgpu::RenderPipeline {
    let topology = match key.topology {
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
    };
    let polygon_mode = if key.state.wire_mode && key.topology == Topology::Triangles {
        wgpu::PolygonMode::Line
    } else {
        wgpu::PolygonMode::Fill
    };
    // The depth attachment is always present; a disabled depth test neither
    // tests nor writes.
    let (depth_write_enabled, depth_compare) = if key.state.depth_test {
        (true, wgpu::CompareFunction::LessEqual)
    } else {
        (false, wgpu::CompareFunction::Always)
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("rlgl Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(blend_state(key.state.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: Some(depth_write_enabled),
            depth_compare: Some(depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Vector3, Vector4};

    use crate::data_structures::light::LightId;

    #[test]
    fn correction_maps_gl_depth_range() {
        let near = OPENGL_TO_WGPU_MATRIX * Vector4::new(0.0, 0.0, -1.0, 1.0);
        let far = OPENGL_TO_WGPU_MATRIX * Vector4::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(near.z, 0.0);
        assert_eq!(far.z, 1.0);
    }

    #[test]
    fn uniform_block_matches_wgsl_layout() {
        // three mat4, tint, ambient, params, 8 lights of 4 vec4
        assert_eq!(std::mem::size_of::<Uniforms>(), 3 * 64 + 3 * 16 + MAX_LIGHTS * 64);
    }

    #[test]
    fn lights_past_the_array_are_dropped() {
        let light = LightData::new(
            LightId(0),
            LightType::Spot,
            Vector3::new(1.0, 2.0, 3.0),
            Color::RED,
        );
        let uniforms = Uniforms::default().with_lighting(Color::GRAY, &[light; MAX_LIGHTS + 2]);
        assert_eq!(uniforms.params[1], MAX_LIGHTS as u32);
        assert_eq!(uniforms.lights[0].params[0], 2.0);
        assert_eq!(uniforms.lights[0].position[..3], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn additive_blend_keeps_destination() {
        let state = blend_state(BlendMode::Additive);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color, state.alpha);
    }
}
