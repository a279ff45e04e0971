//! CPU-side texture helpers: format conversion and mipmap generation.
//!
//! Backends that cannot sample every packed format natively expand texel data
//! to RGBA8 with [`to_rgba8`] before upload, and mip chains for uncompressed
//! textures are computed on the CPU with [`generate_mip_chain`].

use anyhow::{Result, bail, ensure};

use crate::data_structures::texture::TextureFormat;

/// Expand one image of `format` into tightly packed RGBA8.
///
/// Compressed formats cannot be expanded and yield an error.
pub fn to_rgba8(data: &[u8], width: u32, height: u32, format: TextureFormat) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let expected = format.data_size(width, height);
    ensure!(
        data.len() >= expected,
        "{:?} image of {}x{} needs {} bytes, got {}",
        format,
        width,
        height,
        expected,
        data.len()
    );
    let data = &data[..expected];

    let expand5 = |v: u16| ((u32::from(v) * 255 + 15) / 31) as u8;
    let expand6 = |v: u16| ((u32::from(v) * 255 + 31) / 63) as u8;
    let expand4 = |v: u16| (v as u8) * 17;
    let packed = |chunk: &[u8]| u16::from_le_bytes([chunk[0], chunk[1]]);

    let mut rgba = Vec::with_capacity(pixels * 4);
    match format {
        TextureFormat::Grayscale => data.iter().for_each(|&g| rgba.extend_from_slice(&[g, g, g, 255])),
        TextureFormat::GrayAlpha => data
            .chunks_exact(2)
            .for_each(|c| rgba.extend_from_slice(&[c[0], c[0], c[0], c[1]])),
        TextureFormat::R5G6B5 => data.chunks_exact(2).map(packed).for_each(|v| {
            rgba.extend_from_slice(&[
                expand5((v >> 11) & 0x1f),
                expand6((v >> 5) & 0x3f),
                expand5(v & 0x1f),
                255,
            ])
        }),
        TextureFormat::R8G8B8 => data
            .chunks_exact(3)
            .for_each(|c| rgba.extend_from_slice(&[c[0], c[1], c[2], 255])),
        TextureFormat::R5G5B5A1 => data.chunks_exact(2).map(packed).for_each(|v| {
            rgba.extend_from_slice(&[
                expand5((v >> 11) & 0x1f),
                expand5((v >> 6) & 0x1f),
                expand5((v >> 1) & 0x1f),
                if v & 1 == 1 { 255 } else { 0 },
            ])
        }),
        TextureFormat::R4G4B4A4 => data.chunks_exact(2).map(packed).for_each(|v| {
            rgba.extend_from_slice(&[
                expand4((v >> 12) & 0xf),
                expand4((v >> 8) & 0xf),
                expand4((v >> 4) & 0xf),
                expand4(v & 0xf),
            ])
        }),
        TextureFormat::R8G8B8A8 => rgba.extend_from_slice(data),
        compressed => bail!("{:?} cannot be expanded to RGBA8", compressed),
    }
    Ok(rgba)
}

/// One level of a mip chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Box-filter an RGBA8 base image down to 1x1.
///
/// The returned chain starts with the base level itself.
pub fn generate_mip_chain(base: &[u8], width: u32, height: u32) -> Result<Vec<MipLevel>> {
    ensure!(
        base.len() >= width as usize * height as usize * 4,
        "base level of {}x{} is truncated",
        width,
        height
    );
    let mut levels = vec![MipLevel {
        width,
        height,
        data: base[..width as usize * height as usize * 4].to_vec(),
    }];
    while let Some(prev) = levels.last().filter(|l| l.width > 1 || l.height > 1) {
        let next = next_mip(prev);
        log::trace!("Mipmap level {} generated: {}x{}", levels.len(), next.width, next.height);
        levels.push(next);
    }
    Ok(levels)
}

fn next_mip(prev: &MipLevel) -> MipLevel {
    let width = (prev.width / 2).max(1);
    let height = (prev.height / 2).max(1);
    let texel = |x: u32, y: u32| {
        let x = x.min(prev.width - 1) as usize;
        let y = y.min(prev.height - 1) as usize;
        let i = (y * prev.width as usize + x) * 4;
        &prev.data[i..i + 4]
    };

    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let samples = [
                texel(x * 2, y * 2),
                texel(x * 2 + 1, y * 2),
                texel(x * 2, y * 2 + 1),
                texel(x * 2 + 1, y * 2 + 1),
            ];
            for channel in 0..4 {
                let sum: u32 = samples.iter().map(|s| u32::from(s[channel])).sum();
                data.push(((sum + 2) / 4) as u8);
            }
        }
    }
    MipLevel {
        width,
        height,
        data,
    }
}

/// Number of levels a full chain for `width` x `height` has.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_formats_expand_to_full_range() {
        let white_565 = 0xffffu16.to_le_bytes();
        assert_eq!(
            to_rgba8(&white_565, 1, 1, TextureFormat::R5G6B5).unwrap(),
            vec![255, 255, 255, 255]
        );

        // r = 0b11111, g = 0, b = 0, a = 1
        let red_5551 = (0b11111u16 << 11 | 1).to_le_bytes();
        assert_eq!(
            to_rgba8(&red_5551, 1, 1, TextureFormat::R5G5B5A1).unwrap(),
            vec![255, 0, 0, 255]
        );

        let half_4444 = 0x8888u16.to_le_bytes();
        assert_eq!(
            to_rgba8(&half_4444, 1, 1, TextureFormat::R4G4B4A4).unwrap(),
            vec![136, 136, 136, 136]
        );
    }

    #[test]
    fn gray_formats_replicate_channels() {
        assert_eq!(
            to_rgba8(&[10, 20], 2, 1, TextureFormat::Grayscale).unwrap(),
            vec![10, 10, 10, 255, 20, 20, 20, 255]
        );
        assert_eq!(
            to_rgba8(&[10, 99], 1, 1, TextureFormat::GrayAlpha).unwrap(),
            vec![10, 10, 10, 99]
        );
    }

    #[test]
    fn short_or_compressed_input_is_rejected() {
        assert!(to_rgba8(&[0; 5], 2, 1, TextureFormat::R8G8B8).is_err());
        assert!(to_rgba8(&[0; 8], 4, 4, TextureFormat::Dxt1Rgb).is_err());
    }

    #[test]
    fn mip_chain_reaches_one_pixel() {
        let base: Vec<u8> = [0u8, 0, 0, 255, 255, 255, 255, 255]
            .iter()
            .copied()
            .cycle()
            .take(4 * 4 * 4)
            .collect();
        let chain = generate_mip_chain(&base, 4, 4).unwrap();
        let sizes: Vec<_> = chain.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(4, 4), (2, 2), (1, 1)]);
        // Alternating black/white columns average to mid gray.
        assert_eq!(&chain[1].data[..4], &[128, 128, 128, 255]);
        assert_eq!(chain.len() as u32, mip_level_count(4, 4));
    }

    #[test]
    fn non_square_chain_clamps_at_one() {
        let chain = generate_mip_chain(&[255; 8 * 2 * 4], 8, 2).unwrap();
        let sizes: Vec<_> = chain.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        assert_eq!(mip_level_count(8, 2), 4);
    }
}
