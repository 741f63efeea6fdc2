//! Per-frame geometry ring arena.
//!
//! One persistently mapped buffer is split into one equal region per
//! frame-in-flight slot. A slot rewrites its region from the start every
//! frame, so vertex and index data is never reallocated on the hot path.
//!
//! ```text
//! | slot 0 region | slot 1 region | ... |
//!   ^ cursor resets at begin_frame(0)
//! ```
//!
//! Every slot carries a generation counter bumped by [`GeometryArena::begin_frame`].
//! Spans remember the generation they were written in and are rejected once
//! it has moved on. When a frame needs more room than a region holds the
//! arena grows: a new buffer replaces the old one, which is retired and only
//! freed after every slot has started a new frame since.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::uniform::aligned_size;

/// Region size and count of an arena buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaLayout {
    region_size: vk::DeviceSize,
    regions: usize,
}

impl ArenaLayout {
    /// Layout with `regions` regions of `region_size` bytes, rounded up to a
    /// power of two.
    pub fn new(region_size: vk::DeviceSize, regions: usize) -> Self {
        Self {
            region_size: region_size.max(1).next_power_of_two(),
            regions: regions.max(1),
        }
    }

    /// Bytes per region.
    #[inline]
    pub fn region_size(&self) -> vk::DeviceSize {
        self.region_size
    }

    /// Number of regions.
    #[inline]
    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Byte offset of `slot`'s region.
    #[inline]
    pub fn region_offset(&self, slot: usize) -> vk::DeviceSize {
        slot as vk::DeviceSize * self.region_size
    }

    /// Size of the whole buffer.
    #[inline]
    pub fn total_size(&self) -> vk::DeviceSize {
        self.region_size * self.regions as vk::DeviceSize
    }

    /// Layout whose regions hold `bytes`, or `None` if this one already does.
    pub fn grown_for(&self, bytes: vk::DeviceSize) -> Option<Self> {
        (bytes > self.region_size).then(|| Self::new(bytes, self.regions))
    }
}

/// A range of the arena written during one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaSpan {
    /// Slot whose region holds the data.
    pub slot: usize,
    /// Byte offset from the start of the arena buffer.
    pub offset: vk::DeviceSize,
    /// Length in bytes.
    pub size: vk::DeviceSize,
    /// Slot generation the span was written in.
    pub generation: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct SlotCursor {
    cursor: vk::DeviceSize,
    generation: u64,
}

/// CPU-side bookkeeping of the ring: cursors, generations and frame count.
#[derive(Debug)]
pub struct RingLedger {
    layout: ArenaLayout,
    slots: Vec<SlotCursor>,
    current: usize,
    frames_started: u64,
}

impl RingLedger {
    /// Fresh ledger; every slot at generation 0 with an empty region.
    pub fn new(layout: ArenaLayout) -> Self {
        Self {
            layout,
            slots: vec![SlotCursor::default(); layout.regions()],
            current: 0,
            frames_started: 0,
        }
    }

    /// Starts `slot`'s frame: rewinds its cursor and bumps its generation.
    ///
    /// Returns the number of frames started so far, this one included.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OutOfBounds`] for a slot outside the layout.
    pub fn begin_frame(&mut self, slot: usize) -> RhiResult<u64> {
        let cursor = self.slots.get_mut(slot).ok_or_else(|| {
            RhiError::OutOfBounds(format!(
                "arena slot {} of {}",
                slot,
                self.layout.regions()
            ))
        })?;

        cursor.cursor = 0;
        cursor.generation += 1;
        self.current = slot;
        self.frames_started += 1;

        Ok(self.frames_started)
    }

    /// Switches to a larger layout.
    ///
    /// Only valid before the current frame wrote anything. Every other slot's
    /// generation is bumped, since its spans point into the retired buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FrameOrder`] if the current frame already wrote data.
    pub fn regrow(&mut self, layout: ArenaLayout) -> RhiResult<()> {
        if self.slots[self.current].cursor != 0 {
            return Err(RhiError::FrameOrder(
                "arena must be reserved before the first write of a frame".to_string(),
            ));
        }

        self.layout = layout;
        let current = self.current;
        for (slot, cursor) in self.slots.iter_mut().enumerate() {
            cursor.cursor = 0;
            if slot != current {
                cursor.generation += 1;
            }
        }
        Ok(())
    }

    /// Claims `size` bytes aligned to `align` in the current slot's region.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OutOfBounds`] if the region is full.
    pub fn claim(&mut self, size: vk::DeviceSize, align: vk::DeviceSize) -> RhiResult<ArenaSpan> {
        let slot = self.current;
        let region_size = self.layout.region_size();
        let state = &mut self.slots[slot];

        let start = aligned_size(state.cursor, align);
        let end = start + size;
        if end > region_size {
            return Err(RhiError::OutOfBounds(format!(
                "arena region {} holds {} bytes, frame needs {}",
                slot, region_size, end
            )));
        }
        state.cursor = end;

        Ok(ArenaSpan {
            slot,
            offset: self.layout.region_offset(slot) + start,
            size,
            generation: state.generation,
        })
    }

    /// Checks that `span` was written in its slot's live generation.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::StaleSpan`] otherwise.
    pub fn validate(&self, span: &ArenaSpan) -> RhiResult<()> {
        let current = self
            .slots
            .get(span.slot)
            .map_or(u64::MAX, |state| state.generation);

        if span.generation == current {
            Ok(())
        } else {
            Err(RhiError::StaleSpan {
                span: span.generation,
                current,
            })
        }
    }

    /// Bytes written so far in the current slot.
    #[inline]
    pub fn used(&self) -> vk::DeviceSize {
        self.slots[self.current].cursor
    }

    /// Current layout.
    #[inline]
    pub fn layout(&self) -> ArenaLayout {
        self.layout
    }

    /// Generation of `slot`.
    #[inline]
    pub fn generation(&self, slot: usize) -> Option<u64> {
        self.slots.get(slot).map(|state| state.generation)
    }

    /// Frames started so far.
    #[inline]
    pub fn frames_started(&self) -> u64 {
        self.frames_started
    }
}

/// A buffer replaced by growth, kept alive until no slot can still read it.
struct RetiredBuffer {
    buffer: Buffer,
    retired_at: u64,
}

/// Whether a buffer retired at frame `retired_at` is unreachable at frame
/// `now` with `frames_in_flight` slots: every slot has waited on its fence
/// since.
#[inline]
pub fn is_reclaimable(retired_at: u64, now: u64, frames_in_flight: usize) -> bool {
    now.saturating_sub(retired_at) >= frames_in_flight as u64
}

/// Vertex and index storage shared by all frame-in-flight slots.
pub struct GeometryArena {
    device: Arc<Device>,
    buffer: Buffer,
    ledger: RingLedger,
    retired: Vec<RetiredBuffer>,
}

impl GeometryArena {
    /// Creates the arena with `regions` regions of at least `region_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be created.
    pub fn new(
        device: Arc<Device>,
        region_size: vk::DeviceSize,
        regions: usize,
    ) -> RhiResult<Self> {
        let layout = ArenaLayout::new(region_size, regions);
        let buffer = Buffer::new(device.clone(), BufferUsage::Geometry, layout.total_size())?;

        debug!(
            "Geometry arena created: {} regions of {} bytes",
            layout.regions(),
            layout.region_size()
        );

        Ok(Self {
            device,
            buffer,
            ledger: RingLedger::new(layout),
            retired: Vec::new(),
        })
    }

    /// Starts `slot`'s frame and frees retired buffers no slot can still read.
    ///
    /// Must be called after the slot's fence was waited.
    ///
    /// # Errors
    ///
    /// Returns an error for a slot outside the arena.
    pub fn begin_frame(&mut self, slot: usize) -> RhiResult<()> {
        let now = self.ledger.begin_frame(slot)?;
        let frames_in_flight = self.ledger.layout().regions();

        let before = self.retired.len();
        self.retired
            .retain(|retired| !is_reclaimable(retired.retired_at, now, frames_in_flight));
        if self.retired.len() != before {
            debug!(
                "Released {} retired arena buffer(s)",
                before - self.retired.len()
            );
        }
        Ok(())
    }

    /// Ensures the current slot's region holds `bytes`, growing the arena
    /// if needed. Must precede every write of the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame already wrote data or the new buffer
    /// cannot be created.
    pub fn reserve(&mut self, bytes: vk::DeviceSize) -> RhiResult<()> {
        let Some(layout) = self.ledger.layout().grown_for(bytes) else {
            return Ok(());
        };

        let buffer = Buffer::new(self.device.clone(), BufferUsage::Geometry, layout.total_size())?;
        self.ledger.regrow(layout)?;

        let old = std::mem::replace(&mut self.buffer, buffer);
        self.retired.push(RetiredBuffer {
            buffer: old,
            retired_at: self.ledger.frames_started(),
        });

        debug!(
            "Geometry arena grown to {} bytes per region",
            layout.region_size()
        );
        Ok(())
    }

    /// Copies `bytes` into the current slot's region at the next offset
    /// aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns an error if the region has no room left.
    pub fn push(&mut self, bytes: &[u8], align: vk::DeviceSize) -> RhiResult<ArenaSpan> {
        let span = self.ledger.claim(bytes.len() as vk::DeviceSize, align)?;
        self.buffer.write_data(span.offset, bytes)?;
        Ok(span)
    }

    /// Buffer that holds `span`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::StaleSpan`] if the span's frame is over.
    pub fn buffer_for(&self, span: &ArenaSpan) -> RhiResult<vk::Buffer> {
        self.ledger.validate(span)?;
        Ok(self.buffer.handle())
    }

    /// Current region size in bytes.
    #[inline]
    pub fn region_size(&self) -> vk::DeviceSize {
        self.ledger.layout().region_size()
    }
}
