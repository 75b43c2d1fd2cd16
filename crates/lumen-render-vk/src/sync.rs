// SPDX-License-Identifier: CEPL-1.0
//! Per-slot synchronization objects and the per-image fence table.
//!
//! ```text
//! slot s:  wait in_flight[s] -> acquire (signals image_available[s])
//!          -> submit (waits image_available[s], signals render_finished[s] + in_flight[s])
//!          -> present (waits render_finished[s])
//! ```
//!
//! Slots cycle every frame; image indices come from the platform and cycle
//! independently. [`ImagesInFlight`] bridges the two.

use ash::vk;

use crate::resources::{Device, Fence, Semaphore};

struct FrameSlot {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

/// Fixed ring of frame slots. Owned by the chain; created and destroyed with it.
pub struct FrameSync {
    slots: Vec<FrameSlot>,
}

impl FrameSync {
    pub(crate) fn new(device: &Device, slot_count: usize) -> crate::Result<Self> {
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slots.push(FrameSlot {
                image_available: Semaphore::new(device)?,
                render_finished: Semaphore::new(device)?,
                in_flight: Fence::new(device, true)?,
            });
        }
        Ok(Self { slots })
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn image_available(&self, slot: usize) -> vk::Semaphore {
        self.slots[slot].image_available.handle()
    }

    #[inline]
    pub fn render_finished(&self, slot: usize) -> vk::Semaphore {
        self.slots[slot].render_finished.handle()
    }

    #[inline]
    pub fn in_flight(&self, slot: usize) -> vk::Fence {
        self.slots[slot].in_flight.handle()
    }
}

/// Which slot fence last claimed each presentable image.
///
/// Holds raw handles borrowed from the [`FrameSync`] of the same chain, so
/// it must never outlive it.
#[derive(Debug, Clone)]
pub struct ImagesInFlight {
    fences: Vec<Option<vk::Fence>>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![None; image_count],
        }
    }

    #[inline]
    pub fn get(&self, image_index: usize) -> Option<vk::Fence> {
        self.fences[image_index]
    }

    /// Records `fence` as the current user of `image_index`, returning the
    /// previous one, which must be waited on before the new work is submitted.
    pub fn claim(&mut self, image_index: usize, fence: vk::Fence) -> Option<vk::Fence> {
        self.fences[image_index].replace(fence)
    }
}
