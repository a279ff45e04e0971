//! CPU-side preparation of resource data before it reaches a backend.
//!
//! - `texture` expands packed pixel formats and builds mip chains
//! - `mesh` validates mesh arrays and fills absent attributes with defaults

pub mod mesh;
pub mod texture;
