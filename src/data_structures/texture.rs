//! Texture records handed out by the texture lifecycle operations.
//!
//! [`Texture2D`] and [`RenderTexture2D`] are plain values: they carry the
//! backend handle plus the metadata the caller needs, and they stay valid
//! until the matching delete call on the [`Context`](crate::context::Context).

/// Pixel formats a texture can be uploaded with.
///
/// The discriminants follow the numbering of the classic rlgl format table so
/// that values coming from serialized data can be mapped with
/// [`TextureFormat::from_raw`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8 bit per pixel, no alpha.
    Grayscale = 1,
    /// 16 bpp, 2 channels.
    GrayAlpha,
    /// 16 bpp.
    R5G6B5,
    /// 24 bpp.
    R8G8B8,
    /// 16 bpp, 1 bit alpha.
    R5G5B5A1,
    /// 16 bpp, 4 bit alpha.
    R4G4B4A4,
    /// 32 bpp.
    R8G8B8A8,
    Dxt1Rgb,
    Dxt1Rgba,
    Dxt3Rgba,
    Dxt5Rgba,
    Etc1Rgb,
    Etc2Rgb,
    Etc2EacRgba,
    PvrtRgb,
    PvrtRgba,
    Astc4x4Rgba,
    Astc8x8Rgba,
}

impl TextureFormat {
    pub fn from_raw(raw: i32) -> Option<Self> {
        use TextureFormat::*;
        let format = match raw {
            1 => Grayscale,
            2 => GrayAlpha,
            3 => R5G6B5,
            4 => R8G8B8,
            5 => R5G5B5A1,
            6 => R4G4B4A4,
            7 => R8G8B8A8,
            8 => Dxt1Rgb,
            9 => Dxt1Rgba,
            10 => Dxt3Rgba,
            11 => Dxt5Rgba,
            12 => Etc1Rgb,
            13 => Etc2Rgb,
            14 => Etc2EacRgba,
            15 => PvrtRgb,
            16 => PvrtRgba,
            17 => Astc4x4Rgba,
            18 => Astc8x8Rgba,
            _ => return None,
        };
        Some(format)
    }

    pub fn is_compressed(self) -> bool {
        self as i32 >= TextureFormat::Dxt1Rgb as i32
    }

    pub fn bits_per_pixel(self) -> u32 {
        use TextureFormat::*;
        match self {
            Grayscale => 8,
            GrayAlpha | R5G6B5 | R5G5B5A1 | R4G4B4A4 => 16,
            R8G8B8 => 24,
            R8G8B8A8 => 32,
            Dxt1Rgb | Dxt1Rgba | Etc1Rgb | Etc2Rgb | PvrtRgb | PvrtRgba => 4,
            Dxt3Rgba | Dxt5Rgba | Etc2EacRgba | Astc4x4Rgba => 8,
            Astc8x8Rgba => 2,
        }
    }

    /// Block edge length in pixels. Uncompressed formats report 1.
    pub fn block_size(self) -> u32 {
        match self {
            TextureFormat::Astc8x8Rgba => 8,
            f if f.is_compressed() => 4,
            _ => 1,
        }
    }

    /// Number of bytes one image of `width` x `height` occupies in this format.
    pub fn data_size(self, width: u32, height: u32) -> usize {
        let block = self.block_size();
        let blocks_x = width.div_ceil(block) as usize;
        let blocks_y = height.div_ceil(block) as usize;
        let bits_per_block = (block * block * self.bits_per_pixel()) as usize;
        blocks_x * blocks_y * bits_per_block / 8
    }

    /// Size of a full chain of `mipmaps` levels starting at `width` x `height`.
    pub fn mip_chain_size(self, width: u32, height: u32, mipmaps: u32) -> usize {
        (0..mipmaps.max(1))
            .map(|level| {
                let w = width.checked_shr(level).unwrap_or(0).max(1);
                let h = height.checked_shr(level).unwrap_or(0).max(1);
                self.data_size(w, h)
            })
            .sum()
    }
}

/// A texture living in GPU memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Texture2D {
    /// Backend handle, `0` when the load failed.
    pub id: u32,
    pub width: u32,
    pub height: u32,
    /// Mipmap levels, 1 by default.
    pub mipmaps: u32,
    pub format: TextureFormat,
}

impl Texture2D {
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl Default for Texture2D {
    fn default() -> Self {
        Self {
            id: 0,
            width: 0,
            height: 0,
            mipmaps: 0,
            format: TextureFormat::R8G8B8A8,
        }
    }
}

/// An offscreen render target with a color and a depth attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderTexture2D {
    /// Framebuffer handle, `0` when the load failed.
    pub id: u32,
    pub texture: Texture2D,
    pub depth: Texture2D,
}

impl RenderTexture2D {
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_format_numbers_round_trip() {
        for raw in 1..=18 {
            let format = TextureFormat::from_raw(raw).unwrap();
            assert_eq!(format as i32, raw);
        }
        assert_eq!(TextureFormat::from_raw(0), None);
        assert_eq!(TextureFormat::from_raw(19), None);
    }

    #[test]
    fn compressed_sizes_round_up_to_blocks() {
        assert_eq!(TextureFormat::Dxt1Rgb.data_size(4, 4), 8);
        assert_eq!(TextureFormat::Dxt1Rgb.data_size(5, 5), 32);
        assert_eq!(TextureFormat::Dxt5Rgba.data_size(8, 4), 32);
        assert_eq!(TextureFormat::Astc8x8Rgba.data_size(8, 8), 16);
    }

    #[test]
    fn mip_chain_adds_every_level() {
        // 4x4 + 2x2 + 1x1
        assert_eq!(TextureFormat::R8G8B8A8.mip_chain_size(4, 4, 3), (16 + 4 + 1) * 4);
        assert_eq!(TextureFormat::Grayscale.mip_chain_size(3, 1, 0), 3);
    }

    #[test]
    fn levels_past_the_32nd_stay_one_pixel() {
        assert_eq!(TextureFormat::Grayscale.mip_chain_size(4, 4, 40), 16 + 4 + 38);
    }
}
