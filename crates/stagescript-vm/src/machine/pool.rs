//! Environment pool allocator
//!
//! A generation-tagged slab of [`Environment`] records. Allocation hands out
//! a [`FrameId`] (slot index + generation); releasing the last reference to
//! a frame wipes its scratch contents, bumps the slot generation and returns
//! the index to the free list. Stale handles are rejected on lookup.
//!
//! References are counted per slot. Holders are thread list entries and
//! child frames (through their parent link); aliases never hold one.

use super::environment::Environment;
use crate::config::MachineConfig;
use crate::error::VmError;
use crate::program::BlockId;
use log::{trace, warn};
use stagescript_types::FrameId;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct PoolSlot {
    env: Environment,
    generation: u32,
    refs: u32,
    live: bool,
}

/// Pooled storage for execution frames
#[derive(Debug)]
pub struct EnvironmentPool {
    slots: Vec<PoolSlot>,
    free: VecDeque<u32>,
    chunk: usize,
    max: Option<usize>,
    live: usize,
}

impl EnvironmentPool {
    /// Create a pool sized by `config`
    pub fn new(config: &MachineConfig) -> Self {
        let mut pool = Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            chunk: config.pool_chunk.max(1),
            max: config.max_environments,
            live: 0,
        };
        if config.initial_environments > 0 {
            if let Err(err) = pool.grow(config.initial_environments) {
                warn!("environment pool preallocation skipped: {}", err);
            }
        }
        pool
    }

    /// Add up to `n` free slots
    fn grow(&mut self, n: usize) -> Result<(), VmError> {
        let current = self.slots.len();
        let n = match self.max {
            Some(max) => n.min(max.saturating_sub(current)),
            None => n,
        };
        if n == 0 {
            return Err(VmError::Internal(format!(
                "environment pool exhausted ({} environments)",
                current
            )));
        }
        if current + n > u32::MAX as usize {
            return Err(VmError::Internal(
                "environment pool index space exhausted".to_string(),
            ));
        }

        self.slots
            .try_reserve(n)
            .map_err(|e| VmError::Internal(format!("environment pool allocation failed: {}", e)))?;
        self.free
            .try_reserve(n)
            .map_err(|e| VmError::Internal(format!("environment pool allocation failed: {}", e)))?;

        for index in current..current + n {
            self.slots.push(PoolSlot::default());
            self.free.push_back(index as u32);
        }
        trace!("environment pool grown to {} slots", self.slots.len());
        Ok(())
    }

    /// Take a free environment for `block`, linked to `parent`
    ///
    /// The new frame starts with one reference, owned by the caller. The
    /// parent gains one reference for the link.
    pub fn allocate(&mut self, parent: Option<FrameId>, block: BlockId) -> Result<FrameId, VmError> {
        if let Some(parent) = parent {
            self.retain(parent)?;
        }

        if self.free.is_empty() {
            if let Err(err) = self.grow(self.chunk) {
                if let Some(parent) = parent {
                    self.release(parent)?;
                }
                return Err(err);
            }
        }

        let index = self
            .free
            .pop_front()
            .ok_or_else(|| VmError::Internal("free list empty after growth".to_string()))?;
        let slot = &mut self.slots[index as usize];
        slot.env.activate(parent, block);
        slot.refs = 1;
        slot.live = true;
        self.live += 1;

        Ok(FrameId {
            index,
            generation: slot.generation,
        })
    }

    /// Add a reference to a live frame
    pub fn retain(&mut self, handle: FrameId) -> Result<(), VmError> {
        self.slot_mut(handle)?.refs += 1;
        Ok(())
    }

    /// Drop a reference; frames reaching zero are recycled, and their
    /// parent link is released in turn
    pub fn release(&mut self, handle: FrameId) -> Result<(), VmError> {
        let mut next = Some(handle);
        while let Some(current) = next {
            let slot = self.slot_mut(current)?;
            slot.refs = slot.refs.saturating_sub(1);
            if slot.refs > 0 {
                break;
            }

            next = slot.env.parent;
            slot.env.clear();
            slot.live = false;
            slot.generation = slot.generation.wrapping_add(1);

            self.free.push_back(current.index);
            self.live -= 1;
        }
        Ok(())
    }

    fn slot(&self, handle: FrameId) -> Result<&PoolSlot, VmError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.live && slot.generation == handle.generation)
            .ok_or_else(|| VmError::DanglingReference(format!("frame {}", handle)))
    }

    fn slot_mut(&mut self, handle: FrameId) -> Result<&mut PoolSlot, VmError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.live && slot.generation == handle.generation)
            .ok_or_else(|| VmError::DanglingReference(format!("frame {}", handle)))
    }

    #[inline]
    pub fn get(&self, handle: FrameId) -> Result<&Environment, VmError> {
        self.slot(handle).map(|slot| &slot.env)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: FrameId) -> Result<&mut Environment, VmError> {
        self.slot_mut(handle).map(|slot| &mut slot.env)
    }

    pub fn is_live(&self, handle: FrameId) -> bool {
        self.slot(handle).is_ok()
    }

    /// Reference count of a live frame, 0 for stale handles
    pub fn ref_count(&self, handle: FrameId) -> u32 {
        self.slot(handle).map(|slot| slot.refs).unwrap_or(0)
    }

    /// Frames currently in use
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Total slots, live or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
