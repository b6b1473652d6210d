//! Typed handles into a world.
//!
//! Object and component handles wrap the same [`SlotId`] but are distinct
//! types so one can never be passed where the other is expected. A component
//! handle also carries the id of its component type, which routes it to the
//! owning manager without a lookup.

use crate::storage::SlotId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a game object. Goes stale once the object is deleted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(SlotId);

impl ObjectHandle {
    pub const INVALID: ObjectHandle = ObjectHandle(SlotId::INVALID);

    pub(crate) const fn new(slot: SlotId) -> Self {
        Self(slot)
    }

    /// Rebuild a handle from raw parts, e.g. when it crossed a process boundary.
    pub const fn from_raw(index: u32, generation: u16) -> Self {
        Self(SlotId::new(index, generation))
    }

    #[inline]
    pub fn slot(self) -> SlotId {
        self.0
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0.index()
    }

    #[inline]
    pub fn generation(self) -> u16 {
        self.0.generation()
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.0.is_invalid()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object {}", self.0)
    }
}

/// Dense id assigned to a component type when it is registered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(u16);

impl ComponentTypeId {
    pub const INVALID: ComponentTypeId = ComponentTypeId(u16::MAX);

    pub(crate) const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to one component instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentHandle {
    type_id: ComponentTypeId,
    slot: SlotId,
}

impl ComponentHandle {
    pub const INVALID: ComponentHandle = ComponentHandle {
        type_id: ComponentTypeId::INVALID,
        slot: SlotId::INVALID,
    };

    pub(crate) const fn new(type_id: ComponentTypeId, slot: SlotId) -> Self {
        Self { type_id, slot }
    }

    pub const fn from_raw(type_id: u16, index: u32, generation: u16) -> Self {
        Self {
            type_id: ComponentTypeId(type_id),
            slot: SlotId::new(index, generation),
        }
    }

    #[inline]
    pub fn type_id(self) -> ComponentTypeId {
        self.type_id
    }

    #[inline]
    pub fn slot(self) -> SlotId {
        self.slot
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.slot.is_invalid() || self.type_id == ComponentTypeId::INVALID
    }
}

impl Default for ComponentHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component {} of type {}", self.slot, self.type_id)
    }
}

/// Dense id assigned to a world module type when it is registered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleTypeId(u16);

impl ModuleTypeId {
    pub(crate) const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}
