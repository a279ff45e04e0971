mod common;

use common::test_utils::{headless_context, quad, small_config, triangle};
use rlgl_ngin::{
    Matrix4, SquareMatrix, Vector3,
    backend::{DEFAULT_TEXTURE_ID, headless::Command},
    config::{Config, GlVersion},
    batch::DrawMode,
    data_structures::{
        color::Color,
        light::LightType,
        material::Material,
        mesh::{Mesh, MeshBuffer},
        shader::{DEFAULT_SHADER_ID, STANDARD_SHADER_ID},
        texture::{Texture2D, TextureFormat},
    },
};

fn triangle_mesh() -> Mesh {
    let mut mesh = Mesh::from_positions(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    mesh.colors = vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255];
    mesh
}

#[test]
fn default_texture_exists_from_the_start() {
    let ctx = headless_context(small_config());
    let default = ctx.default_texture();
    assert_eq!(default.id, DEFAULT_TEXTURE_ID);
    assert_eq!(ctx.backend().texture(DEFAULT_TEXTURE_ID), Some(default));
    assert_eq!(ctx.backend().texture_count(), 1);
}

#[test]
fn default_texture_cannot_be_deleted() {
    let mut ctx = headless_context(small_config());
    ctx.delete_textures(DEFAULT_TEXTURE_ID);
    assert_eq!(ctx.backend().texture_count(), 1);
}

#[test]
fn texture_load_and_delete_leave_no_handle_behind() {
    let mut ctx = headless_context(small_config());
    let id = ctx.load_texture(&[255; 16], 2, 2, TextureFormat::R8G8B8A8, 1);
    assert_ne!(id, 0);
    assert_ne!(id, DEFAULT_TEXTURE_ID);
    assert_eq!(ctx.backend().texture_count(), 2);

    ctx.delete_textures(id);
    assert_eq!(ctx.backend().texture_count(), 1);
    assert_eq!(ctx.backend().texture(id), None);
}

#[test]
fn failed_texture_loads_return_zero() {
    let mut ctx = headless_context(small_config());
    assert_eq!(ctx.load_texture(&[0; 3], 2, 2, TextureFormat::R8G8B8A8, 1), 0);
    assert_eq!(ctx.load_texture(&[], 0, 4, TextureFormat::Grayscale, 1), 0);
    assert_eq!(ctx.load_texture(&[0; 32], 4, 4, TextureFormat::PvrtRgba, 1), 0);
    // Two levels of 2x2 RGBA need 20 bytes.
    assert_eq!(ctx.load_texture(&[0; 16], 2, 2, TextureFormat::R8G8B8A8, 2), 0);
    assert_eq!(ctx.backend().texture_count(), 1);
}

#[test]
fn oversized_mip_count_is_clamped_to_the_full_chain() {
    let mut ctx = headless_context(small_config());
    let id = ctx.load_texture(&[255; 4096], 4, 4, TextureFormat::R8G8B8A8, 40);
    assert_ne!(id, 0);
    assert_eq!(ctx.backend().texture(id).map(|t| t.mipmaps), Some(3));
}

#[test]
fn texture_readback_expands_to_rgba8() {
    let mut ctx = headless_context(small_config());
    let id = ctx.load_texture(&[10, 20, 30, 40], 2, 2, TextureFormat::Grayscale, 1);
    let texture = ctx.backend().texture(id).unwrap();

    let pixels = ctx.read_texture_pixels(&texture).unwrap();
    assert_eq!(
        pixels,
        vec![10, 10, 10, 255, 20, 20, 20, 255, 30, 30, 30, 255, 40, 40, 40, 255]
    );
}

#[test]
fn compressed_textures_load_but_do_not_read_back() {
    let mut ctx = headless_context(small_config());
    let id = ctx.load_texture(&[0; 8], 4, 4, TextureFormat::Dxt1Rgb, 1);
    assert_ne!(id, 0);
    let texture = ctx.backend().texture(id).unwrap();
    assert_eq!(ctx.read_texture_pixels(&texture), None);

    let missing = Texture2D {
        id: 999,
        width: 1,
        height: 1,
        mipmaps: 1,
        format: TextureFormat::R8G8B8A8,
    };
    assert_eq!(ctx.read_texture_pixels(&missing), None);
}

#[test]
fn update_texture_replaces_a_sub_rectangle() {
    let mut ctx = headless_context(small_config());
    let id = ctx.load_texture(&[0; 16], 2, 2, TextureFormat::R8G8B8A8, 1);
    ctx.update_texture(id, 1, 1, TextureFormat::R8G8B8A8, &[9, 9, 9, 9]);

    let texture = ctx.backend().texture(id).unwrap();
    let pixels = ctx.read_texture_pixels(&texture).unwrap();
    assert_eq!(&pixels[..4], &[9, 9, 9, 9]);
    assert!(pixels[4..].iter().all(|&b| b == 0));
}

#[test]
fn mipmaps_are_generated_as_rgba8() {
    let mut ctx = headless_context(small_config());
    let id = ctx.load_texture(&[128; 16], 4, 4, TextureFormat::Grayscale, 1);
    let mut texture = ctx.backend().texture(id).unwrap();

    ctx.generate_mipmaps(&mut texture);
    assert_eq!(texture.mipmaps, 3);
    assert_eq!(texture.format, TextureFormat::R8G8B8A8);
    assert_eq!(ctx.backend().texture(id), Some(texture));

    let pixels = ctx.read_texture_pixels(&texture).unwrap();
    assert_eq!(pixels.len(), 4 * 4 * 4);
    assert_eq!(&pixels[..4], &[128, 128, 128, 255]);
}

#[test]
fn mipmaps_of_compressed_textures_are_refused() {
    let mut ctx = headless_context(small_config());
    let id = ctx.load_texture(&[0; 8], 4, 4, TextureFormat::Dxt1Rgb, 1);
    let mut texture = ctx.backend().texture(id).unwrap();
    ctx.generate_mipmaps(&mut texture);
    assert_eq!(texture.mipmaps, 1);
    assert_eq!(texture.format, TextureFormat::Dxt1Rgb);
}

#[test]
fn render_texture_owns_two_attachments() {
    let mut ctx = headless_context(small_config());
    let target = ctx.load_render_texture(16, 8);
    assert!(target.is_valid());
    assert_eq!((target.texture.width, target.texture.height), (16, 8));
    assert_ne!(target.texture.id, target.depth.id);
    assert_eq!(ctx.backend().texture_count(), 3);
    assert_eq!(ctx.backend().render_texture_count(), 1);

    // Attachments go away with their render texture only.
    ctx.delete_textures(target.texture.id);
    assert_eq!(ctx.backend().texture_count(), 3);

    ctx.delete_render_textures(target.id);
    assert_eq!(ctx.backend().texture_count(), 1);
    assert_eq!(ctx.backend().render_texture_count(), 0);
}

#[test]
fn empty_render_texture_is_refused() {
    let mut ctx = headless_context(small_config());
    let target = ctx.load_render_texture(0, 8);
    assert_eq!(target.id, 0);
    assert_eq!(ctx.backend().render_texture_count(), 0);
}

#[test]
fn cleared_render_texture_reads_back_the_clear_color() {
    let mut ctx = headless_context(small_config());
    ctx.clear_color(0, 0, 0, 255);
    ctx.clear_screen_buffers();

    let target = ctx.load_render_texture(4, 4);
    ctx.enable_render_texture(target.id);
    ctx.clear_color(255, 0, 0, 255);
    ctx.clear_screen_buffers();
    ctx.disable_render_texture();

    let pixels = ctx.read_texture_pixels(&target.texture).unwrap();
    assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));

    let screen = ctx.read_screen_pixels(4, 4).unwrap();
    assert!(screen.pixels().all(|p| *p == image::Rgba([0, 0, 0, 255])));
}

#[test]
fn draws_land_on_the_bound_render_texture() {
    let mut ctx = headless_context(small_config());
    let target = ctx.load_render_texture(8, 8);

    ctx.enable_render_texture(target.id);
    triangle(&mut ctx, 0.0);
    ctx.disable_render_texture();
    triangle(&mut ctx, 1.0);
    ctx.draw();

    let targets: Vec<_> = ctx.backend().batches().map(|b| b.target).collect();
    assert_eq!(targets, vec![Some(target.id), None]);
}

#[test]
fn deleting_the_bound_render_texture_unbinds_it() {
    let mut ctx = headless_context(small_config());
    let target = ctx.load_render_texture(8, 8);
    ctx.enable_render_texture(target.id);
    ctx.delete_render_textures(target.id);
    assert_eq!(ctx.backend().target(), None);

    // Binding an unknown target keeps the screen.
    ctx.enable_render_texture(42);
    assert_eq!(ctx.backend().target(), None);
}

#[test]
fn screen_readback_larger_than_the_screen_fails() {
    let mut ctx = headless_context(small_config());
    assert!(ctx.read_screen_pixels(1000, 1).is_none());
    let image = ctx.read_screen_pixels(8, 4).unwrap();
    assert_eq!(image.dimensions(), (8, 4));
}

#[test]
fn mesh_load_and_unload_leave_no_handle_behind() {
    let mut ctx = headless_context(small_config());
    let mut mesh = triangle_mesh();
    ctx.load_mesh(&mut mesh, false);

    assert!(mesh.is_uploaded());
    assert_ne!(mesh.vbo_id[MeshBuffer::Positions as usize], 0);
    assert_ne!(mesh.vbo_id[MeshBuffer::Colors as usize], 0);
    assert_eq!(mesh.vbo_id[MeshBuffer::Normals as usize], 0);
    assert_eq!(ctx.backend().mesh_count(), 1);
    assert_eq!(ctx.backend().buffer_count(), 2);
    assert_eq!(ctx.backend().mesh_is_dynamic(mesh.vao_id), Some(false));

    let vertices = ctx.backend().mesh_vertices(mesh.vao_id).unwrap();
    assert_eq!(vertices[1].color, [0, 255, 0, 255]);
    assert_eq!(vertices[2].normal, [0.0, 0.0, 1.0]);

    ctx.unload_mesh(&mut mesh);
    assert!(!mesh.is_uploaded());
    assert_eq!(mesh.vbo_id, [0; MeshBuffer::COUNT]);
    assert_eq!(mesh.vertices.len(), 9);
    assert_eq!(ctx.backend().mesh_count(), 0);
    assert_eq!(ctx.backend().buffer_count(), 0);
}

#[test]
fn invalid_meshes_are_not_uploaded() {
    let mut ctx = headless_context(small_config());
    let mut empty = Mesh::default();
    ctx.load_mesh(&mut empty, false);
    assert_eq!(empty.vao_id, 0);

    let mut bad_index = triangle_mesh();
    bad_index.indices = vec![0, 1, 7];
    ctx.load_mesh(&mut bad_index, false);
    assert_eq!(bad_index.vao_id, 0);
    assert_eq!(ctx.backend().mesh_count(), 0);
}

#[test]
fn dynamic_mesh_updates_reach_the_backend() {
    let mut ctx = headless_context(small_config());
    let mut mesh = triangle_mesh();
    ctx.load_mesh(&mut mesh, true);
    assert_eq!(ctx.backend().mesh_is_dynamic(mesh.vao_id), Some(true));

    mesh.vertices[0] = 5.0;
    ctx.update_mesh(&mesh, MeshBuffer::Positions, 3);
    let vertices = ctx.backend().mesh_vertices(mesh.vao_id).unwrap();
    assert_eq!(vertices[0].position, [5.0, 0.0, 0.0]);
}

#[test]
fn deleting_single_buffers_and_arrays() {
    let mut ctx = headless_context(small_config());
    let mut mesh = triangle_mesh();
    ctx.load_mesh(&mut mesh, false);

    ctx.delete_buffers(mesh.vbo_id[MeshBuffer::Colors as usize]);
    assert_eq!(ctx.backend().buffer_count(), 1);

    ctx.delete_vertex_arrays(mesh.vao_id);
    assert_eq!(ctx.backend().mesh_count(), 0);
    assert_eq!(ctx.backend().buffer_count(), 0);
}

#[test]
fn mesh_draw_flushes_the_batch_first() {
    let mut ctx = headless_context(small_config());
    let mut mesh = triangle_mesh();
    ctx.load_mesh(&mut mesh, false);

    quad(&mut ctx, 0.0, 0.0, 1.0, 1.0);
    ctx.translatef(1.0, 0.0, 0.0);
    let material = Material::default();
    ctx.draw_mesh(&mesh, &material, Matrix4::from_scale(2.0));

    let commands = ctx.backend().commands();
    let n = commands.len();
    assert!(matches!(commands[n - 2], Command::Batch(_)));
    match &commands[n - 1] {
        Command::Mesh {
            vao,
            texture,
            mvp,
            tint,
            lighting,
            ..
        } => {
            assert_eq!(*vao, mesh.vao_id);
            assert_eq!(*texture, 0);
            assert_eq!(*tint, Color::WHITE);
            assert!(!lighting);
            assert_eq!(
                *mvp,
                Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0)) * Matrix4::from_scale(2.0)
            );
        }
        other => panic!("expected a mesh draw, got {:?}", other),
    }
}

#[test]
fn unuploaded_mesh_draw_is_ignored() {
    let mut ctx = headless_context(small_config());
    let mesh = triangle_mesh();
    ctx.draw_mesh(&mesh, &Material::default(), Matrix4::identity());
    assert!(
        !ctx.backend()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Mesh { .. }))
    );
}

#[test]
fn light_pool_is_bounded() {
    let mut config = small_config();
    config.max_lights = 2;
    let mut ctx = headless_context(config);

    let first = ctx
        .create_light(LightType::Point, Vector3::new(0.0, 1.0, 0.0), Color::WHITE)
        .unwrap();
    let second = ctx
        .create_light(LightType::Directional, Vector3::new(1.0, 1.0, 0.0), Color::RED)
        .unwrap();
    assert_ne!(first, second);
    assert!(ctx.create_light(LightType::Spot, Vector3::new(0.0, 0.0, 0.0), Color::BLUE).is_none());

    assert!(ctx.destroy_light(first));
    assert!(!ctx.destroy_light(first));
    assert!(ctx.create_light(LightType::Spot, Vector3::new(0.0, 0.0, 0.0), Color::BLUE).is_some());
    assert_eq!(ctx.lights().len(), 2);
}

#[test]
fn standard_material_draws_with_enabled_lights() {
    let mut ctx = headless_context(small_config());
    let mut mesh = triangle_mesh();
    ctx.load_mesh(&mut mesh, false);
    let lit = ctx
        .create_light(LightType::Point, Vector3::new(0.0, 2.0, 0.0), Color::WHITE)
        .unwrap();
    ctx.create_light(LightType::Directional, Vector3::new(0.0, 2.0, 0.0), Color::WHITE);
    if let Some(light) = ctx.light_mut(lit) {
        light.enabled = false;
    }

    let material = Material::new(ctx.standard_shader(), ctx.default_texture());
    ctx.draw_mesh(&mesh, &material, Matrix4::identity());

    match ctx.backend().commands().last() {
        Some(Command::Mesh {
            lighting,
            lights,
            texture,
            ..
        }) => {
            assert!(*lighting);
            assert_eq!(*lights, 1);
            assert_eq!(*texture, DEFAULT_TEXTURE_ID);
        }
        other => panic!("expected a mesh draw, got {:?}", other),
    }
}

#[test]
fn built_in_shaders_survive_deletion() {
    let mut ctx = headless_context(small_config());
    ctx.delete_shader(DEFAULT_SHADER_ID);
    ctx.delete_shader(STANDARD_SHADER_ID);
    assert_eq!(ctx.default_shader().id, DEFAULT_SHADER_ID);
    assert_eq!(ctx.standard_shader().id, STANDARD_SHADER_ID);
    assert_eq!(ctx.current_shader().id, DEFAULT_SHADER_ID);
}

#[test]
fn embedded_profile_reduces_batch_capacity() {
    let ctx = headless_context(Config::for_version(GlVersion::OpenGlEs20));
    assert_eq!(ctx.version(), GlVersion::OpenGlEs20);
    assert_eq!(ctx.batch().capacity(DrawMode::Lines), 1024 * 2);
    assert_eq!(ctx.batch().capacity(DrawMode::Triangles), 2048 * 3);
    assert_eq!(ctx.batch().capacity(DrawMode::Quads), 1024 * 4);

    let desktop = headless_context(Config::default());
    assert_eq!(desktop.batch().capacity(DrawMode::Lines), 8192 * 2);
}

#[test]
fn zero_capacities_are_rejected() {
    let mut config = small_config();
    config.limits.quads = 0;
    let backend = rlgl_ngin::backend::headless::HeadlessBackend::new(8, 8);
    assert!(rlgl_ngin::context::Context::new(backend, config).is_err());
}
