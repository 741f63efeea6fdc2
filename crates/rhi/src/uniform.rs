//! Dynamic uniform buffers.
//!
//! One buffer holds many per-object records, each padded to the device's
//! `minUniformBufferOffsetAlignment` so a draw can address its record with a
//! dynamic offset.
//!
//! Growth is exact-fit: when a frame needs more room the buffer is destroyed
//! and reallocated at the aligned required size. It never shrinks.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `size` up to a multiple of `alignment`.
///
/// `alignment` must be zero or a power of two; zero means no alignment
/// requirement and returns `size` unchanged.
#[inline]
pub fn aligned_size(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        return size;
    }
    debug_assert!(alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}

/// New capacity needed to hold `required` bytes, or `None` when `current`
/// already suffices.
#[inline]
pub fn grown_capacity(
    current: vk::DeviceSize,
    required: vk::DeviceSize,
    alignment: vk::DeviceSize,
) -> Option<vk::DeviceSize> {
    let target = aligned_size(required, alignment);
    (target > current).then_some(target)
}

/// Uniform buffer addressed through dynamic offsets.
pub struct DynamicUniformBuffer {
    device: Arc<Device>,
    buffer: Option<Buffer>,
    capacity: vk::DeviceSize,
    alignment: vk::DeviceSize,
}

impl DynamicUniformBuffer {
    /// Creates an empty buffer using the device's uniform offset alignment.
    ///
    /// No memory is allocated until the first [`ensure_capacity`](Self::ensure_capacity).
    pub fn new(device: Arc<Device>) -> Self {
        let alignment = device.min_uniform_buffer_offset_alignment();
        Self {
            device,
            buffer: None,
            capacity: 0,
            alignment,
        }
    }

    /// `size` rounded up to the device's uniform offset alignment.
    #[inline]
    pub fn aligned_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        aligned_size(size, self.alignment)
    }

    /// Stride between consecutive records of type `T`.
    #[inline]
    pub fn stride<T: Pod>(&self) -> vk::DeviceSize {
        self.aligned_size(size_of::<T>() as vk::DeviceSize)
    }

    /// Makes sure the buffer holds at least `required` bytes.
    ///
    /// Returns `true` when the buffer was reallocated; descriptors that
    /// referenced the old buffer must then be rewritten. The caller must
    /// have waited on every submission that could still read the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the reallocation fails. The old buffer is already
    /// gone at that point and the capacity reads zero.
    pub fn ensure_capacity(&mut self, required: vk::DeviceSize) -> RhiResult<bool> {
        let Some(new_capacity) = grown_capacity(self.capacity, required, self.alignment) else {
            return Ok(false);
        };

        self.buffer = None;
        self.capacity = 0;

        let buffer = Buffer::new(self.device.clone(), BufferUsage::Uniform, new_capacity)?;
        debug!(
            "Dynamic uniform buffer grown to {} bytes (required {})",
            new_capacity, required
        );

        self.buffer = Some(buffer);
        self.capacity = new_capacity;
        Ok(true)
    }

    /// Writes `value` as record `index`, at byte offset `index * stride::<T>()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record lies beyond the current capacity.
    pub fn write<T: Pod>(&self, index: usize, value: &T) -> RhiResult<()> {
        let offset = index as vk::DeviceSize * self.stride::<T>();
        self.allocated()?.write_data(offset, bytemuck::bytes_of(value))
    }

    /// Returns the Vulkan buffer handle, or null before the first allocation.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
            .as_ref()
            .map_or(vk::Buffer::null(), Buffer::handle)
    }

    /// Current capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> vk::DeviceSize {
        self.capacity
    }

    /// The alignment records are padded to.
    #[inline]
    pub fn alignment(&self) -> vk::DeviceSize {
        self.alignment
    }

    fn allocated(&self) -> RhiResult<&Buffer> {
        self.buffer.as_ref().ok_or_else(|| {
            RhiError::OutOfBounds("dynamic uniform buffer has no storage yet".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_size_rounds_up() {
        assert_eq!(aligned_size(0, 256), 0);
        assert_eq!(aligned_size(1, 256), 256);
        assert_eq!(aligned_size(128, 256), 256);
        assert_eq!(aligned_size(256, 256), 256);
        assert_eq!(aligned_size(257, 256), 512);
        assert_eq!(aligned_size(80, 64), 128);
    }

    #[test]
    fn test_aligned_size_zero_alignment_is_identity() {
        assert_eq!(aligned_size(0, 0), 0);
        assert_eq!(aligned_size(13, 0), 13);
        assert_eq!(aligned_size(4096, 0), 4096);
    }

    #[test]
    fn test_aligned_size_is_multiple_and_not_smaller() {
        for shift in 0..9 {
            let alignment = 1u64 << shift;
            for size in 0..1024u64 {
                let aligned = aligned_size(size, alignment);
                assert_eq!(aligned % alignment, 0, "size {} align {}", size, alignment);
                assert!(aligned >= size);
                assert!(aligned - size < alignment);
            }
        }
    }

    #[test]
    fn test_grown_capacity_noop_when_large_enough() {
        assert_eq!(grown_capacity(512, 512, 256), None);
        assert_eq!(grown_capacity(512, 300, 256), None);
        assert_eq!(grown_capacity(512, 0, 256), None);
    }

    #[test]
    fn test_grown_capacity_is_exact_fit() {
        assert_eq!(grown_capacity(0, 1, 256), Some(256));
        assert_eq!(grown_capacity(256, 300, 256), Some(512));
        assert_eq!(grown_capacity(512, 2000, 64), Some(2048));
    }

    #[test]
    fn test_capacity_is_monotonic_maximum() {
        let alignment = 64;
        let requests = [100, 50, 700, 10, 700, 701, 0, 64];
        let mut capacity = 0;

        for required in requests {
            let previous = capacity;
            if let Some(grown) = grown_capacity(capacity, required, alignment) {
                capacity = grown;
            }
            assert_eq!(capacity, previous.max(aligned_size(required, alignment)));
        }

        assert_eq!(capacity, 704);
    }
}
