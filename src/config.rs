//! Backend profile selection and context configuration.
//!
//! A [`Config`] is built once, adjusted by mutating its fields and then handed
//! to [`Context::new`](crate::context::Context::new). The graphics profile
//! only decides the default batch capacities; everything else is independent.

use anyhow::bail;

use crate::data_structures::color::Color;

/// Graphics API profile the layer pretends to target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GlVersion {
    /// Fixed-function desktop profile.
    OpenGl11 = 1,
    /// Core profile, shader mandatory.
    #[default]
    OpenGl33,
    /// Embedded profile (web and small devices), reduced batch memory.
    OpenGlEs20,
}

/// Capacity of the batch buffers, counted in primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub lines: usize,
    pub triangles: usize,
    pub quads: usize,
}

impl BatchLimits {
    pub const DESKTOP: BatchLimits = BatchLimits {
        lines: 8192,
        triangles: 4096,
        quads: 4096,
    };

    // Text maps one quad per glyph and wire spheres eat lines quickly, keep
    // that in mind when lowering these further.
    pub const EMBEDDED: BatchLimits = BatchLimits {
        lines: 1024,
        triangles: 2048,
        quads: 1024,
    };

    pub fn for_version(version: GlVersion) -> Self {
        match version {
            GlVersion::OpenGl11 | GlVersion::OpenGl33 => Self::DESKTOP,
            GlVersion::OpenGlEs20 => Self::EMBEDDED,
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::for_version(GlVersion::default())
    }
}

/// Settings for a rendering [`Context`](crate::context::Context).
#[derive(Clone, Debug)]
pub struct Config {
    pub version: GlVersion,
    pub limits: BatchLimits,
    /// Texture switches a single batch may record before it is flushed.
    pub max_draw_calls: usize,
    /// Depth of each per-mode matrix stack.
    pub matrix_stack_depth: usize,
    pub max_lights: usize,
    pub width: u32,
    pub height: u32,
    pub clear_color: Color,
}

impl Config {
    pub const DEFAULT_MAX_DRAW_CALLS: usize = 256;
    pub const DEFAULT_MATRIX_STACK_DEPTH: usize = 16;
    pub const DEFAULT_MAX_LIGHTS: usize = 8;

    pub fn for_version(version: GlVersion) -> Self {
        Self {
            version,
            limits: BatchLimits::for_version(version),
            max_draw_calls: Self::DEFAULT_MAX_DRAW_CALLS,
            matrix_stack_depth: Self::DEFAULT_MATRIX_STACK_DEPTH,
            max_lights: Self::DEFAULT_MAX_LIGHTS,
            width: 800,
            height: 450,
            clear_color: Color::BLACK,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let BatchLimits {
            lines,
            triangles,
            quads,
        } = self.limits;
        if lines == 0 || triangles == 0 || quads == 0 {
            bail!("batch capacities must be positive, got {:?}", self.limits);
        }
        if self.max_draw_calls == 0 {
            bail!("at least one draw call per batch is required");
        }
        if self.matrix_stack_depth == 0 {
            bail!("matrix stack depth must be positive");
        }
        if self.width == 0 || self.height == 0 {
            bail!("framebuffer size {}x{} is empty", self.width, self.height);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_version(GlVersion::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_pick_their_capacities() {
        assert_eq!(BatchLimits::for_version(GlVersion::OpenGl11), BatchLimits::DESKTOP);
        assert_eq!(BatchLimits::for_version(GlVersion::OpenGl33), BatchLimits::DESKTOP);
        let es = BatchLimits::for_version(GlVersion::OpenGlEs20);
        assert_eq!((es.lines, es.triangles, es.quads), (1024, 2048, 1024));
    }

    #[test]
    fn all_capacities_are_positive() {
        for version in [GlVersion::OpenGl11, GlVersion::OpenGl33, GlVersion::OpenGlEs20] {
            let config = Config::for_version(version);
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = Config::default();
        config.limits.quads = 0;
        assert!(config.validate().is_err());

        let config = Config::default().with_size(0, 10);
        assert!(config.validate().is_err());
    }
}
