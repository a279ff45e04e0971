//! Vertex data defining a mesh.

/// CPU-side mesh arrays plus the GPU handles assigned by
/// [`Context::load_mesh`](crate::context::Context::load_mesh).
///
/// Arrays that are empty are treated as absent; positions are mandatory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// XYZ, 3 components per vertex (shader location 0).
    pub vertices: Vec<f32>,
    /// UV, 2 components per vertex (shader location 1).
    pub texcoords: Vec<f32>,
    /// Second UV set, e.g. for lightmaps (shader location 5).
    pub texcoords2: Vec<f32>,
    /// XYZ, 3 components per vertex (shader location 2).
    pub normals: Vec<f32>,
    /// XYZ, 3 components per vertex (shader location 4).
    pub tangents: Vec<f32>,
    /// RGBA, 4 components per vertex (shader location 3).
    pub colors: Vec<u8>,
    pub indices: Vec<u16>,

    pub vao_id: u32,
    /// One handle per [`MeshBuffer`], `0` when that array was not uploaded.
    pub vbo_id: [u32; MeshBuffer::COUNT],
}

impl Mesh {
    /// Non-indexed triangle mesh from plain positions.
    pub fn from_positions(vertices: Vec<f32>) -> Self {
        let vertex_count = vertices.len() / 3;
        Self {
            vertex_count,
            triangle_count: vertex_count / 3,
            vertices,
            ..Default::default()
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.vao_id != 0
    }

    /// Number of elements a draw of this mesh consumes.
    pub fn element_count(&self) -> usize {
        if self.indices.is_empty() {
            self.vertex_count
        } else {
            self.triangle_count * 3
        }
    }
}

/// Vertex buffers a mesh owns on the GPU, in handle-slot order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshBuffer {
    Positions = 0,
    TexCoords,
    Normals,
    Colors,
    Tangents,
    TexCoords2,
    Indices,
}

impl MeshBuffer {
    pub const COUNT: usize = 7;
    pub const ALL: [MeshBuffer; MeshBuffer::COUNT] = [
        MeshBuffer::Positions,
        MeshBuffer::TexCoords,
        MeshBuffer::Normals,
        MeshBuffer::Colors,
        MeshBuffer::Tangents,
        MeshBuffer::TexCoords2,
        MeshBuffer::Indices,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Components per vertex stored in this buffer.
    pub fn components(self) -> usize {
        match self {
            MeshBuffer::Positions | MeshBuffer::Normals | MeshBuffer::Tangents => 3,
            MeshBuffer::TexCoords | MeshBuffer::TexCoords2 => 2,
            MeshBuffer::Colors => 4,
            MeshBuffer::Indices => 1,
        }
    }

    /// True when the mesh carries data for this buffer.
    pub fn is_present(self, mesh: &Mesh) -> bool {
        match self {
            MeshBuffer::Positions => !mesh.vertices.is_empty(),
            MeshBuffer::TexCoords => !mesh.texcoords.is_empty(),
            MeshBuffer::Normals => !mesh.normals.is_empty(),
            MeshBuffer::Colors => !mesh.colors.is_empty(),
            MeshBuffer::Tangents => !mesh.tangents.is_empty(),
            MeshBuffer::TexCoords2 => !mesh.texcoords2.is_empty(),
            MeshBuffer::Indices => !mesh.indices.is_empty(),
        }
    }
}
