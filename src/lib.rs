//! rlgl-ngin
//!
//! An immediate-mode rendering layer on top of wgpu. Geometry is described
//! vertex by vertex between `begin` and `end`, collected into per-mode
//! batches and submitted in as few draw calls as possible. Around that sit an
//! OpenGL-style matrix stack and single-call lifecycles for textures, render
//! textures and meshes, all addressed by plain `u32` handles.
//!
//! High-level modules
//! - `config`: graphics profile, batch limits and context settings
//! - `context`: the [`Context`](context::Context) every operation goes through
//! - `matrix`: per-mode matrix stacks and unprojection
//! - `batch`: the vertex accumulator behind `begin`/`vertex`/`end`
//! - `backend`: the backend seam with a headless and a wgpu implementation
//! - `pipelines`: wgpu render pipelines and the shared shader
//! - `data_structures`: plain records (textures, meshes, materials, lights)
//! - `resources`: CPU-side texture and mesh data preparation
//!

pub mod backend;
pub mod batch;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod matrix;
pub mod pipelines;
pub mod resources;

pub use matrix::unproject;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use image::RgbaImage;
