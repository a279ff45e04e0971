use anyhow::{Result, ensure};

use crate::{
    batch::Vertex,
    data_structures::mesh::{Mesh, MeshBuffer},
};

/// Check that every present array of `mesh` matches its vertex count and that
/// indices stay in range.
pub fn validate(mesh: &Mesh) -> Result<()> {
    ensure!(mesh.vertex_count > 0, "mesh has no vertices");
    for buffer in MeshBuffer::ALL {
        if buffer == MeshBuffer::Indices || !buffer.is_present(mesh) {
            continue;
        }
        let expected = mesh.vertex_count * buffer.components();
        let actual = array_len(mesh, buffer);
        ensure!(
            actual >= expected,
            "{:?} holds {} values, {} vertices need {}",
            buffer,
            actual,
            mesh.vertex_count,
            expected
        );
    }
    ensure!(
        MeshBuffer::Positions.is_present(mesh),
        "mesh positions are mandatory"
    );
    if let Some(&max) = mesh.indices.iter().max() {
        ensure!(
            usize::from(max) < mesh.vertex_count,
            "index {} is out of range for {} vertices",
            max,
            mesh.vertex_count
        );
        ensure!(
            mesh.indices.len() >= mesh.triangle_count * 3,
            "{} triangles need {} indices, got {}",
            mesh.triangle_count,
            mesh.triangle_count * 3,
            mesh.indices.len()
        );
    }
    Ok(())
}

fn array_len(mesh: &Mesh, buffer: MeshBuffer) -> usize {
    match buffer {
        MeshBuffer::Positions => mesh.vertices.len(),
        MeshBuffer::TexCoords => mesh.texcoords.len(),
        MeshBuffer::Normals => mesh.normals.len(),
        MeshBuffer::Colors => mesh.colors.len(),
        MeshBuffer::Tangents => mesh.tangents.len(),
        MeshBuffer::TexCoords2 => mesh.texcoords2.len(),
        MeshBuffer::Indices => mesh.indices.len(),
    }
}

/// Raw bytes of the first `vertex_count` vertices of one attribute.
///
/// Absent texcoords, normals and colors are filled with the defaults the
/// shaders expect (zero UV, +Z normal, opaque white), so every mesh can be
/// drawn with the same vertex layout.
pub fn attribute_bytes(mesh: &Mesh, buffer: MeshBuffer, vertex_count: usize) -> Vec<u8> {
    let n = vertex_count * buffer.components();
    let floats = |values: &[f32], default: &[f32]| -> Vec<u8> {
        if values.is_empty() {
            let filled: Vec<f32> = default.iter().copied().cycle().take(n).collect();
            bytemuck::cast_slice(&filled).to_vec()
        } else {
            bytemuck::cast_slice(&values[..n.min(values.len())]).to_vec()
        }
    };
    match buffer {
        MeshBuffer::Positions => floats(&mesh.vertices, &[0.0, 0.0, 0.0]),
        MeshBuffer::TexCoords => floats(&mesh.texcoords, &[0.0, 0.0]),
        MeshBuffer::Normals => floats(&mesh.normals, &[0.0, 0.0, 1.0]),
        MeshBuffer::Tangents => floats(&mesh.tangents, &[1.0, 0.0, 0.0]),
        MeshBuffer::TexCoords2 => floats(&mesh.texcoords2, &[0.0, 0.0]),
        MeshBuffer::Colors if mesh.colors.is_empty() => vec![255; n],
        MeshBuffer::Colors => mesh.colors[..n.min(mesh.colors.len())].to_vec(),
        MeshBuffer::Indices => bytemuck::cast_slice(&mesh.indices).to_vec(),
    }
}

/// Interleave the mesh arrays into batch vertices, applying the same defaults
/// as [`attribute_bytes`]. Indexed meshes are expanded.
pub fn interleave(mesh: &Mesh) -> Vec<Vertex> {
    let vertex = |i: usize| {
        let get = |values: &[f32], at: usize, default: f32| values.get(at).copied().unwrap_or(default);
        Vertex {
            position: [
                get(&mesh.vertices, i * 3, 0.0),
                get(&mesh.vertices, i * 3 + 1, 0.0),
                get(&mesh.vertices, i * 3 + 2, 0.0),
            ],
            tex_coords: [get(&mesh.texcoords, i * 2, 0.0), get(&mesh.texcoords, i * 2 + 1, 0.0)],
            normal: [
                get(&mesh.normals, i * 3, 0.0),
                get(&mesh.normals, i * 3 + 1, 0.0),
                get(&mesh.normals, i * 3 + 2, 1.0),
            ],
            color: [0, 1, 2, 3].map(|c| mesh.colors.get(i * 4 + c).copied().unwrap_or(255)),
        }
    };
    if mesh.indices.is_empty() {
        (0..mesh.vertex_count).map(vertex).collect()
    } else {
        mesh.indices
            .iter()
            .take(mesh.triangle_count * 3)
            .map(|&i| vertex(usize::from(i)))
            .collect()
    }
}
