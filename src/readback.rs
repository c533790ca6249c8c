//! GPU-to-host buffer readback: a small ring of staging buffers so the
//! driver can keep submitting work while earlier copies are still being
//! mapped, and the async-to-sync bridge (`futures_intrusive` oneshot +
//! `pollster::block_on`) that turns `wgpu`'s callback-based mapping into a
//! blocking call at the public API boundary.

use futures_intrusive::channel::shared::oneshot_channel;

use crate::error::{Result, SiftError};

/// Minimum ring depth: one buffer draining while another fills leaves a
/// third free for the driver to start a new copy without stalling.
pub const MIN_STAGING_SLOTS: usize = 3;

pub struct StagingRing {
    slots: Vec<wgpu::Buffer>,
    next: usize,
    size: u64,
}

impl StagingRing {
    pub fn new(device: &wgpu::Device, size: u64, slots: usize) -> Self {
        let slots = slots.max(MIN_STAGING_SLOTS);
        let buffers = (0..slots)
            .map(|i| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("staging_ring_{i}")),
                    size: size.max(1),
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                })
            })
            .collect();
        StagingRing { slots: buffers, next: 0, size }
    }

    /// Returns the next slot in round-robin order. The caller must ensure
    /// any previous mapping on that slot has been unmapped before reuse.
    pub fn acquire(&mut self) -> &wgpu::Buffer {
        let slot = &self.slots[self.next];
        self.next = (self.next + 1) % self.slots.len();
        slot
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Copies `src[..size]` into a staging buffer and blocks until the bytes
/// are readable host-side, returning an owned copy.
///
/// `size` may be smaller than the staging buffer's allocated size (e.g. the
/// live append-buffer count times the record stride); only the requested
/// prefix is copied and read back.
pub fn readback_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    src: &wgpu::Buffer,
    staging: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>> {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_copy"),
    });
    encoder.copy_buffer_to_buffer(src, 0, staging, 0, size);
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..size);
    let (sender, receiver) = oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    let mapped = pollster::block_on(receiver.receive())
        .ok_or_else(|| SiftError::device_lost("staging buffer mapping channel closed"))?;
    mapped.map_err(|e| SiftError::device_lost(format!("buffer mapping failed: {e}")))?;

    let data = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::MIN_STAGING_SLOTS;

    #[test]
    fn minimum_ring_depth_is_at_least_three() {
        assert!(MIN_STAGING_SLOTS >= 3);
    }
}
