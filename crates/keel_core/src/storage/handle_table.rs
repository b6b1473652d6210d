//! Generational slot allocator.
//!
//! A [`SlotId`] is an `(index, generation)` pair. It resolves only while the
//! generation stored at `index` still matches; freeing a slot bumps the stored
//! generation, so every id previously issued for that slot goes stale.
//!
//! Generation `0` is never issued. When a slot's generation would wrap past
//! `u16::MAX` the slot is retired instead of being put back on the free list,
//! which keeps stale ids from ever aliasing a newer allocation.

use crate::storage::HandleError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw `(index, generation)` pair issued by a [`HandleTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId {
    index: u32,
    generation: u16,
}

impl SlotId {
    /// Never resolves in any table.
    pub const INVALID: SlotId = SlotId {
        index: u32::MAX,
        generation: 0,
    };

    pub const fn new(index: u32, generation: u16) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u16 {
        self.generation
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.generation == 0
    }

    /// Pack into 48 significant bits (for save files and event payloads).
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u16,
        }
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    limit: u32,
    retired: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::with_limit(u32::MAX - 1)
    }

    /// Table that refuses to grow past `limit` slots.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            limit: limit.min(u32::MAX - 1),
            retired: 0,
        }
    }

    /// Store `value` in a free slot, preferring the most recently freed one.
    pub fn allocate(&mut self, value: T) -> Result<SlotId, HandleError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Ok(SlotId::new(index, slot.generation));
        }

        if self.slots.len() as u32 >= self.limit {
            return Err(HandleError::CapacityExceeded { limit: self.limit });
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        self.len += 1;
        Ok(SlotId::new(index, 1))
    }

    #[inline]
    pub fn is_valid(&self, id: SlotId) -> bool {
        self.slots
            .get(id.index as usize)
            .map_or(false, |slot| slot.generation == id.generation && slot.value.is_some())
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Current occupant of `index`, whatever its generation.
    pub fn id_at(&self, index: u32) -> Option<SlotId> {
        let slot = self.slots.get(index as usize)?;
        slot.value.as_ref().map(|_| SlotId::new(index, slot.generation))
    }

    /// Release the slot behind `id`. Stale ids are ignored and return `None`.
    pub fn free(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.len -= 1;

        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(id.index);
            }
            None => {
                slot.generation = 0;
                self.retired += 1;
                tracing::debug!(slot = %id, "retiring slot after generation wraparound");
            }
        }
        Some(value)
    }

    /// Re-create an exact `(index, generation)` pair, e.g. when loading a save.
    ///
    /// Slots skipped over while growing the table become ordinary free slots.
    pub fn restore(&mut self, id: SlotId, value: T) -> Result<(), HandleError> {
        if id.is_invalid() || id.index >= self.limit {
            return Err(HandleError::InvalidHandle(id));
        }

        while self.slots.len() <= id.index as usize {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 1,
                value: None,
            });
            self.free.push(index);
        }

        let slot = &mut self.slots[id.index as usize];
        if slot.value.is_some() {
            return Err(HandleError::SlotOccupied(id));
        }
        if slot.generation == 0 {
            self.retired -= 1;
        } else {
            self.free.retain(|&index| index != id.index);
        }
        slot.generation = id.generation;
        slot.value = Some(value);
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever created, occupied or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots permanently withdrawn after their generation wrapped.
    pub fn retired(&self) -> usize {
        self.retired
    }

    pub fn clear(&mut self) {
        for index in 0..self.slots.len() as u32 {
            if let Some(id) = self.id_at(index) {
                self.free(id);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (SlotId::new(index as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (SlotId::new(index as u32, generation), value))
        })
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
