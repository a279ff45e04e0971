//! Copying texture contents back to the CPU.

use std::iter;

use anyhow::{Context as _, Result, ensure};

use crate::pipelines::COLOR_FORMAT;

/// Read the top-left `width` x `height` texels of mip level 0 of an RGBA8
/// texture, tightly packed row by row.
pub fn read_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    ensure!(
        texture.format() == COLOR_FORMAT
            && texture.usage().contains(wgpu::TextureUsages::COPY_SRC),
        "{:?} texture cannot be read back",
        texture.format()
    );
    ensure!(
        width <= texture.width() && height <= texture.height() && width > 0 && height > 0,
        "readback of {}x{} does not fit the {}x{} texture",
        width,
        height,
        texture.width(),
        texture.height()
    );

    let unpadded_bytes_per_row = width * 4;
    // Buffer copies need rows aligned to 256 bytes.
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        label: Some("Readback buffer"),
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(iter::once(encoder.finish()));

    let buffer_slice = output_buffer.slice(..);
    // The mapping has to be requested before polling, otherwise the wait never ends.
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        if tx.send(result).is_err() {
            log::warn!("Readback receiver dropped before the buffer was mapped");
        }
    });
    #[cfg(target_arch = "wasm32")]
    device.poll(wgpu::PollType::Poll)?;
    #[cfg(not(target_arch = "wasm32"))]
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    })?;
    futures::executor::block_on(rx.receive())
        .context("readback buffer mapping was cancelled")??;

    let pixels = {
        let data = buffer_slice.get_mapped_range();
        data.chunks(padded_bytes_per_row as usize)
            .flat_map(|row| &row[..unpadded_bytes_per_row as usize])
            .copied()
            .collect::<Vec<u8>>()
    };
    output_buffer.unmap();
    Ok(pixels)
}
