mod common;

use common::test_utils::{headless_context, line, quad, small_config, triangle};
use rlgl_ngin::{
    Matrix4, SquareMatrix,
    backend::headless::RecordedBatch,
    batch::DrawMode,
    data_structures::{blend::BlendMode, color::Color},
    matrix::MatrixMode,
};

fn batches(ctx: &rlgl_ngin::context::Context<rlgl_ngin::backend::headless::HeadlessBackend>) -> Vec<RecordedBatch> {
    ctx.backend().batches().cloned().collect()
}

#[test]
fn full_buffer_flushes_and_keeps_the_overflowing_vertex() {
    let mut ctx = headless_context(small_config());

    ctx.begin(DrawMode::Triangles);
    for i in 0..9 {
        ctx.vertex2f(i as f32, 0.0);
    }
    ctx.end();
    assert_eq!(ctx.backend().batches().count(), 1);
    ctx.draw();

    let recorded = batches(&ctx);
    let counts: Vec<_> = recorded.iter().map(RecordedBatch::vertex_count).collect();
    assert_eq!(counts, vec![6, 3]);
    assert_eq!(recorded[1].draws[0].vertices[0].position, [6.0, 0.0, 0.0]);
}

fn positions(batch: &RecordedBatch) -> Vec<(f32, f32)> {
    batch
        .draws
        .iter()
        .flat_map(|d| d.vertices.iter().map(|v| (v.position[0], v.position[1])))
        .collect()
}

#[test]
fn state_change_inside_a_triangle_keeps_primitives_whole() {
    let mut ctx = headless_context(small_config());
    ctx.begin(DrawMode::Triangles);
    ctx.vertex2f(0.0, 0.0);
    ctx.vertex2f(1.0, 0.0);
    ctx.enable_depth_test();
    ctx.vertex2f(1.0, 1.0);
    ctx.vertex2f(5.0, 5.0);
    ctx.vertex2f(6.0, 5.0);
    ctx.vertex2f(6.0, 6.0);
    ctx.end();
    ctx.draw();

    // Nothing was complete at the state change, so nothing was submitted.
    let recorded = batches(&ctx);
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].state.depth_test);
    assert_eq!(
        positions(&recorded[0]),
        vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (5.0, 5.0), (6.0, 5.0), (6.0, 6.0)]
    );
}

#[test]
fn draw_inside_a_primitive_carries_the_unfinished_vertices() {
    let mut ctx = headless_context(small_config());
    ctx.begin(DrawMode::Lines);
    ctx.vertex2f(0.0, 0.0);
    ctx.vertex2f(1.0, 0.0);
    ctx.vertex2f(2.0, 0.0);
    ctx.draw();
    ctx.vertex2f(3.0, 0.0);
    ctx.end();
    ctx.draw();

    let recorded = batches(&ctx);
    assert_eq!(recorded.len(), 2);
    assert_eq!(positions(&recorded[0]), vec![(0.0, 0.0), (1.0, 0.0)]);
    assert_eq!(positions(&recorded[1]), vec![(2.0, 0.0), (3.0, 0.0)]);
}

#[test]
fn draw_order_is_kept_across_modes() {
    let mut ctx = headless_context(small_config());
    line(&mut ctx, 0.0);
    triangle(&mut ctx, 1.0);
    line(&mut ctx, 2.0);
    ctx.draw();

    let recorded = batches(&ctx);
    assert_eq!(recorded.len(), 1);
    let modes: Vec<_> = recorded[0].draws.iter().map(|d| d.mode).collect();
    assert_eq!(modes, vec![DrawMode::Lines, DrawMode::Triangles, DrawMode::Lines]);
    assert_eq!(recorded[0].draws[2].vertices[0].position, [2.0, 0.0, 0.0]);
}

#[test]
fn texture_switch_between_primitives_opens_a_draw_call() {
    let mut ctx = headless_context(small_config());
    ctx.enable_texture(5);
    ctx.begin(DrawMode::Lines);
    ctx.vertex2f(0.0, 0.0);
    ctx.vertex2f(1.0, 0.0);
    ctx.enable_texture(7);
    ctx.vertex2f(2.0, 0.0);
    ctx.vertex2f(3.0, 0.0);
    ctx.end();
    ctx.disable_texture();
    ctx.draw();

    let recorded = batches(&ctx);
    let draws: Vec<_> = recorded[0]
        .draws
        .iter()
        .map(|d| (d.texture, d.vertices.len()))
        .collect();
    assert_eq!(draws, vec![(5, 2), (7, 2)]);
}

#[test]
fn texture_switch_mid_primitive_waits_for_the_boundary() {
    let mut ctx = headless_context(small_config());
    ctx.begin(DrawMode::Triangles);
    ctx.vertex2f(0.0, 0.0);
    ctx.vertex2f(1.0, 0.0);
    ctx.enable_texture(3);
    ctx.vertex2f(2.0, 0.0);
    ctx.vertex2f(3.0, 0.0);
    ctx.vertex2f(4.0, 0.0);
    ctx.vertex2f(5.0, 0.0);
    ctx.end();
    ctx.draw();

    let recorded = batches(&ctx);
    let draws: Vec<_> = recorded[0]
        .draws
        .iter()
        .map(|d| (d.texture, d.vertices.len()))
        .collect();
    assert_eq!(draws, vec![(0, 3), (3, 3)]);
}

#[test]
fn exhausted_draw_calls_flush_on_begin() {
    let mut config = small_config();
    config.max_draw_calls = 2;
    let mut ctx = headless_context(config);

    for texture in 1..=3 {
        ctx.enable_texture(texture);
        line(&mut ctx, texture as f32);
    }
    ctx.draw();

    let per_batch: Vec<Vec<u32>> = batches(&ctx)
        .iter()
        .map(|b| b.draws.iter().map(|d| d.texture).collect())
        .collect();
    assert_eq!(per_batch, vec![vec![1, 2], vec![3]]);
}

#[test]
fn attribute_state_sticks_until_changed() {
    let mut ctx = headless_context(small_config());
    ctx.color4ub(255, 0, 0, 255);
    ctx.normal3f(0.0, 1.0, 0.0);
    ctx.begin(DrawMode::Lines);
    ctx.vertex2f(0.0, 0.0);
    ctx.color4f(0.0, 1.0, 0.0, 1.0);
    ctx.vertex2f(1.0, 0.0);
    ctx.end();
    line(&mut ctx, 2.0);
    ctx.draw();

    let recorded = batches(&ctx);
    let colors: Vec<_> = recorded[0]
        .draws
        .iter()
        .flat_map(|d| d.vertices.iter().map(|v| v.color))
        .collect();
    assert_eq!(
        colors,
        vec![[255, 0, 0, 255], [0, 255, 0, 255], [0, 255, 0, 255], [0, 255, 0, 255]]
    );
    assert!(recorded[0].draws[0].vertices.iter().all(|v| v.normal == [0.0, 1.0, 0.0]));
}

#[test]
fn end_drops_an_incomplete_primitive() {
    let mut ctx = headless_context(small_config());
    ctx.begin(DrawMode::Triangles);
    for i in 0..4 {
        ctx.vertex2f(i as f32, 0.0);
    }
    ctx.end();
    ctx.draw();

    let recorded = batches(&ctx);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].vertex_count(), 3);
}

#[test]
fn vertices_outside_begin_are_ignored() {
    let mut ctx = headless_context(small_config());
    ctx.vertex2f(0.0, 0.0);
    ctx.vertex3f(1.0, 1.0, 1.0);
    ctx.end();
    ctx.draw();

    assert_eq!(ctx.backend().batches().count(), 0);
    assert!(ctx.batch().is_empty());
}

#[test]
fn changing_the_projection_flushes_pending_vertices() {
    let mut ctx = headless_context(small_config());
    triangle(&mut ctx, 0.0);

    ctx.matrix_mode(MatrixMode::Projection);
    ctx.ortho(0.0, 64.0, 32.0, 0.0, 0.0, 1.0);
    ctx.matrix_mode(MatrixMode::ModelView);
    assert_eq!(ctx.backend().batches().count(), 1);

    triangle(&mut ctx, 1.0);
    ctx.draw();

    let recorded = batches(&ctx);
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].projection, Matrix4::identity());
    assert_eq!(recorded[1].projection, ctx.matrices().get(MatrixMode::Projection));
    assert_ne!(recorded[1].projection, Matrix4::identity());
}

#[test]
fn modelview_changes_do_not_flush() {
    let mut ctx = headless_context(small_config());
    line(&mut ctx, 0.0);
    ctx.translatef(10.0, 0.0, 0.0);
    line(&mut ctx, 0.0);
    ctx.draw();

    let recorded = batches(&ctx);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].draws[0].vertices[2].position, [10.0, 0.0, 0.0]);
}

#[test]
fn render_state_changes_split_batches() {
    let mut ctx = headless_context(small_config());
    triangle(&mut ctx, 0.0);
    ctx.enable_depth_test();
    triangle(&mut ctx, 1.0);
    ctx.begin_blend_mode(BlendMode::Additive);
    triangle(&mut ctx, 2.0);
    ctx.end_blend_mode();
    ctx.draw();

    let states: Vec<_> = batches(&ctx)
        .iter()
        .map(|b| (b.state.depth_test, b.state.blend))
        .collect();
    assert_eq!(
        states,
        vec![
            (false, BlendMode::Alpha),
            (true, BlendMode::Alpha),
            (true, BlendMode::Additive)
        ]
    );
}

#[test]
fn redundant_state_changes_keep_one_batch() {
    let mut ctx = headless_context(small_config());
    triangle(&mut ctx, 0.0);
    ctx.disable_depth_test();
    ctx.end_blend_mode();
    ctx.disable_wire_mode();
    triangle(&mut ctx, 1.0);
    ctx.draw();

    assert_eq!(ctx.backend().batches().count(), 1);
}

#[test]
fn wire_mode_falls_back_when_unsupported() {
    let config = small_config();
    let backend = rlgl_ngin::backend::headless::HeadlessBackend::new(config.width, config.height)
        .without_wire_mode();
    let mut ctx = rlgl_ngin::context::Context::new(backend, config).unwrap();

    ctx.enable_wire_mode();
    assert!(!ctx.render_state().wire_mode);

    let mut ctx = headless_context(small_config());
    ctx.enable_wire_mode();
    assert!(ctx.render_state().wire_mode);
}

#[test]
fn standard_shader_turns_on_lighting() {
    let mut ctx = headless_context(small_config());
    triangle(&mut ctx, 0.0);
    let standard = ctx.standard_shader();
    ctx.begin_shader_mode(&standard);
    assert_eq!(ctx.current_shader(), standard);
    triangle(&mut ctx, 1.0);
    ctx.end_shader_mode();
    triangle(&mut ctx, 2.0);
    ctx.draw();

    let lighting: Vec<_> = batches(&ctx).iter().map(|b| b.lighting).collect();
    assert_eq!(lighting, vec![false, true, false]);
}

#[test]
fn quads_flush_when_their_buffer_is_full() {
    let mut ctx = headless_context(small_config());
    ctx.color4ub(1, 2, 3, 4);
    quad(&mut ctx, 0.0, 0.0, 1.0, 1.0);
    quad(&mut ctx, 2.0, 0.0, 1.0, 1.0);
    ctx.draw();

    let recorded = batches(&ctx);
    assert_eq!(recorded.len(), 2);
    assert!(recorded.iter().all(|b| b.vertex_count() == 4));
    assert_eq!(recorded[1].draws[0].vertices[0].color, Color::new(1, 2, 3, 4).to_array());
}

#[test]
fn close_flushes_remaining_vertices() {
    let mut ctx = headless_context(small_config());
    triangle(&mut ctx, 0.0);
    let backend = ctx.close();

    assert_eq!(backend.batches().count(), 1);
    assert_eq!(backend.texture_count(), 0);
}

#[test]
fn taking_commands_empties_the_log() {
    let mut ctx = headless_context(small_config());
    triangle(&mut ctx, 0.0);
    ctx.draw();

    let taken = ctx.backend_mut().take_commands();
    assert!(taken.iter().any(|c| matches!(c, rlgl_ngin::backend::headless::Command::Batch(_))));
    assert!(ctx.backend().commands().is_empty());

    triangle(&mut ctx, 1.0);
    ctx.draw();
    assert_eq!(ctx.backend().commands().len(), 1);
}
