//! Plain records exchanged with the context.
//!
//! - `color` holds the RGBA color type
//! - `texture` contains texture formats, `Texture2D` and `RenderTexture2D`
//! - `mesh` holds mesh arrays and their GPU handles
//! - `shader` and `material` describe how a mesh is shaded
//! - `camera` and `light` feed the 3D mode and the standard shader
//! - `blend` lists the color blending modes

pub mod blend;
pub mod camera;
pub mod color;
pub mod light;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod texture;
