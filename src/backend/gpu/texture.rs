//! GPU textures and texture creation utilities.

use anyhow::{Result, bail, ensure};

use crate::{
    data_structures::texture::TextureFormat,
    pipelines::{COLOR_FORMAT, DEPTH_FORMAT},
    resources,
};

/// A GPU texture with its view and, for sampleable textures, a bind group.
#[derive(Clone, Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    /// `None` for depth attachments, which cannot be sampled as color.
    pub bind_group: Option<wgpu::BindGroup>,
    pub format: TextureFormat,
}

/// GPU format a texture format is uploaded as, with the device feature it needs.
pub fn wgpu_format(format: TextureFormat) -> Option<(wgpu::TextureFormat, wgpu::Features)> {
    use TextureFormat::*;
    use wgpu::{AstcBlock, AstcChannel, Features};
    let mapped = match format {
        Grayscale | GrayAlpha | R5G6B5 | R8G8B8 | R5G5B5A1 | R4G4B4A4 | R8G8B8A8 => {
            (COLOR_FORMAT, Features::empty())
        }
        Dxt1Rgb | Dxt1Rgba => (wgpu::TextureFormat::Bc1RgbaUnorm, Features::TEXTURE_COMPRESSION_BC),
        Dxt3Rgba => (wgpu::TextureFormat::Bc2RgbaUnorm, Features::TEXTURE_COMPRESSION_BC),
        Dxt5Rgba => (wgpu::TextureFormat::Bc3RgbaUnorm, Features::TEXTURE_COMPRESSION_BC),
        // ETC2 decoders read ETC1 data unchanged.
        Etc1Rgb | Etc2Rgb => (wgpu::TextureFormat::Etc2Rgb8Unorm, Features::TEXTURE_COMPRESSION_ETC2),
        Etc2EacRgba => (wgpu::TextureFormat::Etc2Rgba8Unorm, Features::TEXTURE_COMPRESSION_ETC2),
        Astc4x4Rgba => (
            wgpu::TextureFormat::Astc {
                block: AstcBlock::B4x4,
                channel: AstcChannel::Unorm,
            },
            Features::TEXTURE_COMPRESSION_ASTC,
        ),
        Astc8x8Rgba => (
            wgpu::TextureFormat::Astc {
                block: AstcBlock::B8x8,
                channel: AstcChannel::Unorm,
            },
            Features::TEXTURE_COMPRESSION_ASTC,
        ),
        PvrtRgb | PvrtRgba => return None,
    };
    Some(mapped)
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::MipmapFilterMode::Linear,
        ..Default::default()
    })
}

fn bind(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some("rlgl texture_bind_group"),
    })
}

/// Write one mip level. `data` is already in the layout of the GPU format.
pub fn write_level(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    level: u32,
    width: u32,
    height: u32,
    data: &[u8],
) {
    let format = texture.format();
    let (block_width, block_height) = format.block_dimensions();
    let block_size = format.block_copy_size(None).unwrap_or(4);
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
    .physical_size(format);

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level: level,
            origin: wgpu::Origin3d::ZERO,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width.div_ceil(block_width) * block_size),
            rows_per_image: Some(height.div_ceil(block_height)),
        },
        size,
    );
}

impl GpuTexture {
    /// Upload `mipmaps` levels of `data` in `format`.
    ///
    /// Uncompressed formats are expanded to RGBA8; block-compressed ones are
    /// uploaded as they are and need the matching device feature.
    #[allow(clippy::too_many_arguments)]
    pub fn from_data(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        data: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
        mipmaps: u32,
    ) -> Result<Self> {
        let Some((gpu_format, feature)) = wgpu_format(format) else {
            bail!("{:?} textures are not supported", format);
        };
        ensure!(
            device.features().contains(feature),
            "{:?} textures need {:?}, which the device lacks",
            format,
            feature
        );
        let (block_width, block_height) = gpu_format.block_dimensions();
        ensure!(
            width % block_width == 0 && height % block_height == 0,
            "{}x{} is not a multiple of the {}x{} blocks of {:?}",
            width,
            height,
            block_width,
            block_height,
            format
        );
        let mipmaps = mipmaps.clamp(1, resources::texture::mip_level_count(width, height));
        let needed = format.mip_chain_size(width, height, mipmaps);
        ensure!(
            data.len() >= needed,
            "{:?} texture {}x{} with {} levels needs {} bytes, got {}",
            format,
            width,
            height,
            mipmaps,
            needed,
            data.len()
        );

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("rlgl texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mipmaps,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: gpu_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let mut offset = 0;
        for level in 0..mipmaps {
            let level_width = (width >> level).max(1);
            let level_height = (height >> level).max(1);
            let size = format.data_size(level_width, level_height);
            let level_data = &data[offset..offset + size];
            offset += size;
            if format.is_compressed() {
                write_level(queue, &texture, level, level_width, level_height, level_data);
            } else {
                let rgba = resources::texture::to_rgba8(level_data, level_width, level_height, format)?;
                write_level(queue, &texture, level, level_width, level_height, &rgba);
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = Some(bind(device, layout, sampler, &view));
        Ok(Self {
            texture,
            view,
            bind_group,
            format,
        })
    }

    /// Color attachment of a render texture; it can be sampled and read back.
    pub fn create_render_target(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = Some(bind(device, layout, sampler, &view));
        Self {
            texture,
            view,
            bind_group,
            format: TextureFormat::R8G8B8A8,
        }
    }

    /// Create a depth texture for depth-testing during rendering.
    pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[DEPTH_FORMAT],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            bind_group: None,
            format: TextureFormat::R8G8B8A8,
        }
    }

    /// Replace the texture by an RGBA8 one holding the full `chain`.
    pub fn with_mip_chain(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        chain: &[resources::texture::MipLevel],
    ) -> Result<Self> {
        let Some(base) = chain.first() else {
            bail!("mip chain is empty");
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("rlgl mipmapped texture"),
            size: wgpu::Extent3d {
                width: base.width,
                height: base.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: chain.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: self.texture.usage() | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (level, mip) in chain.iter().enumerate() {
            write_level(queue, &texture, level as u32, mip.width, mip.height, &mip.data);
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = Some(bind(device, layout, sampler, &view));
        Ok(Self {
            texture,
            view,
            bind_group,
            format: TextureFormat::R8G8B8A8,
        })
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn mipmaps(&self) -> u32 {
        self.texture.mip_level_count()
    }
}
