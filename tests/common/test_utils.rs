#![allow(dead_code)]

use rlgl_ngin::{
    backend::headless::HeadlessBackend,
    batch::DrawMode,
    config::{BatchLimits, Config},
    context::Context,
};

pub(crate) const WIDTH: u32 = 64;
pub(crate) const HEIGHT: u32 = 32;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Tiny batch buffers so that implicit flushes are easy to provoke.
pub(crate) fn small_config() -> Config {
    let mut config = Config::default().with_size(WIDTH, HEIGHT);
    config.limits = BatchLimits {
        lines: 2,
        triangles: 2,
        quads: 1,
    };
    config.max_draw_calls = 4;
    config
}

pub(crate) fn headless_context(config: Config) -> Context<HeadlessBackend> {
    init_logger();
    let backend = HeadlessBackend::new(config.width, config.height);
    Context::new(backend, config).expect("valid test config")
}

pub(crate) fn triangle(ctx: &mut Context<HeadlessBackend>, x: f32) {
    ctx.begin(DrawMode::Triangles);
    ctx.vertex2f(x, 0.0);
    ctx.vertex2f(x, 1.0);
    ctx.vertex2f(x + 1.0, 1.0);
    ctx.end();
}

pub(crate) fn line(ctx: &mut Context<HeadlessBackend>, x: f32) {
    ctx.begin(DrawMode::Lines);
    ctx.vertex2f(x, 0.0);
    ctx.vertex2f(x, 1.0);
    ctx.end();
}

/// Axis aligned quad with texcoords spanning the full texture.
pub(crate) fn quad<B: rlgl_ngin::backend::Backend>(
    ctx: &mut Context<B>,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
) {
    ctx.begin(DrawMode::Quads);
    ctx.tex_coord2f(0.0, 0.0);
    ctx.vertex2f(x, y);
    ctx.tex_coord2f(0.0, 1.0);
    ctx.vertex2f(x, y + h);
    ctx.tex_coord2f(1.0, 1.0);
    ctx.vertex2f(x + w, y + h);
    ctx.tex_coord2f(1.0, 0.0);
    ctx.vertex2f(x + w, y);
    ctx.end();
}

#[cfg(feature = "integration-tests")]
pub(crate) async fn gpu_context(
    width: u32,
    height: u32,
) -> Context<rlgl_ngin::backend::gpu::WgpuBackend> {
    init_logger();
    let config = Config::default().with_size(width, height);
    let backend = rlgl_ngin::backend::gpu::WgpuBackend::new(&config)
        .await
        .expect("a GPU adapter is required for integration tests");
    Context::new(backend, config).expect("valid test config")
}
