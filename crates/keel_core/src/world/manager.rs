//! Per-type component storage and batch update.
//!
//! A [`ComponentManager<T>`] keeps every `T` in dense block storage next to
//! its bookkeeping record. Handles resolve through a handle table that maps
//! to the dense row, so rows can be compacted by swap-remove without
//! invalidating live handles.
//!
//! Destruction is two-step: `destroy` hides the component at once (it is
//! skipped by updates and lookups) and `reclaim`, run in the world's
//! deletion phase, frees the row and the handle.

use crate::storage::{BlockStorage, HandleError, HandleTable, SlotId};
use crate::world::{
    Component, ComponentHandle, ComponentTypeId, Context, Message, ObjectHandle, UpdatePhase,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;

pub(crate) struct ManagerConfig {
    pub max_components: u32,
    pub rows_per_block: usize,
}

/// Payload encoder/decoder for component types saved in snapshots.
pub(crate) struct Codec<T> {
    encode: fn(&T) -> bincode::Result<Vec<u8>>,
    decode: fn(&[u8]) -> bincode::Result<T>,
}

fn bincode_encode<T: Serialize>(value: &T) -> bincode::Result<Vec<u8>> {
    bincode::serialize(value)
}

fn bincode_decode<T: DeserializeOwned>(bytes: &[u8]) -> bincode::Result<T> {
    bincode::deserialize(bytes)
}

impl<T: Serialize + DeserializeOwned> Codec<T> {
    pub fn bincode() -> Self {
        Self {
            encode: bincode_encode::<T>,
            decode: bincode_decode::<T>,
        }
    }
}

/// One component as stored in a snapshot payload block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncodedComponent {
    pub slot: SlotId,
    pub owner: ObjectHandle,
    pub active_flag: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Record {
    handle: SlotId,
    owner: ObjectHandle,
    active_flag: bool,
    owner_active: bool,
    initialized: bool,
    simulation_started: bool,
    dead: bool,
}

impl Record {
    #[inline]
    fn is_active(&self) -> bool {
        self.active_flag && self.owner_active && self.initialized && !self.dead
    }
}

struct Row<T> {
    record: Record,
    value: T,
}

pub struct ComponentManager<T: Component> {
    type_id: ComponentTypeId,
    rows: BlockStorage<Row<T>>,
    lookup: HandleTable<u32>,
    pending_init: Vec<SlotId>,
    pending_reclaim: Vec<SlotId>,
    default_ctor: Option<fn() -> T>,
    codec: Option<Codec<T>>,
}

impl<T: Component> ComponentManager<T> {
    pub(crate) fn new(
        type_id: ComponentTypeId,
        config: &ManagerConfig,
        default_ctor: Option<fn() -> T>,
        codec: Option<Codec<T>>,
    ) -> Self {
        let rows_per_block = if config.rows_per_block.is_power_of_two() {
            config.rows_per_block
        } else {
            config.rows_per_block.next_power_of_two().max(1)
        };
        Self {
            type_id,
            rows: BlockStorage::with_rows_per_block(rows_per_block),
            lookup: HandleTable::with_limit(config.max_components),
            pending_init: Vec::new(),
            pending_reclaim: Vec::new(),
            default_ctor,
            codec,
        }
    }

    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// Live components, including ones not yet initialized.
    pub fn len(&self) -> usize {
        self.rows.len() - self.pending_reclaim.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row(&self, slot: SlotId) -> Option<&Row<T>> {
        let index = *self.lookup.get(slot)?;
        self.rows
            .get(index as usize)
            .filter(|row| !row.record.dead)
    }

    fn row_mut(&mut self, slot: SlotId) -> Option<&mut Row<T>> {
        let index = *self.lookup.get(slot)?;
        self.rows
            .get_mut(index as usize)
            .filter(|row| !row.record.dead)
    }

    fn owns(&self, handle: ComponentHandle) -> bool {
        handle.type_id() == self.type_id
    }

    pub fn contains(&self, handle: ComponentHandle) -> bool {
        self.owns(handle) && self.row(handle.slot()).is_some()
    }

    pub fn get(&self, handle: ComponentHandle) -> Option<&T> {
        if !self.owns(handle) {
            return None;
        }
        self.row(handle.slot()).map(|row| &row.value)
    }

    pub fn get_mut(&mut self, handle: ComponentHandle) -> Option<&mut T> {
        if !self.owns(handle) {
            return None;
        }
        self.row_mut(handle.slot()).map(|row| &mut row.value)
    }

    pub fn owner(&self, handle: ComponentHandle) -> Option<ObjectHandle> {
        if !self.owns(handle) {
            return None;
        }
        self.row(handle.slot()).map(|row| row.record.owner)
    }

    /// Initialized, enabled and owned by an active object.
    pub fn is_active(&self, handle: ComponentHandle) -> bool {
        self.owns(handle)
            && self
                .row(handle.slot())
                .map_or(false, |row| row.record.is_active())
    }

    pub fn is_initialized(&self, handle: ComponentHandle) -> bool {
        self.owns(handle)
            && self
                .row(handle.slot())
                .map_or(false, |row| row.record.initialized)
    }

    /// Live components in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentHandle, ObjectHandle, &T)> {
        let type_id = self.type_id;
        self.rows.iter().filter(|row| !row.record.dead).map(move |row| {
            (
                ComponentHandle::new(type_id, row.record.handle),
                row.record.owner,
                &row.value,
            )
        })
    }

    /// Active components in storage order.
    pub fn iter_active(&self) -> impl Iterator<Item = (ComponentHandle, &T)> {
        let type_id = self.type_id;
        self.rows
            .iter()
            .filter(|row| row.record.is_active())
            .map(move |row| (ComponentHandle::new(type_id, row.record.handle), &row.value))
    }

    /// Allocate a component. It stays inactive until the world's next
    /// initialization step.
    pub(crate) fn create(
        &mut self,
        owner: ObjectHandle,
        value: T,
        owner_active: bool,
    ) -> Result<SlotId, HandleError> {
        let index = self.rows.len() as u32;
        let slot = self.lookup.allocate(index)?;
        self.rows.push(Row {
            record: Record {
                handle: slot,
                owner,
                active_flag: true,
                owner_active,
                initialized: false,
                simulation_started: false,
                dead: false,
            },
            value,
        });
        self.pending_init.push(slot);
        Ok(slot)
    }

    /// Re-create a component at an exact handle, e.g. from a snapshot.
    pub(crate) fn restore(
        &mut self,
        slot: SlotId,
        owner: ObjectHandle,
        active_flag: bool,
        owner_active: bool,
        value: T,
    ) -> Result<(), HandleError> {
        let index = self.rows.len() as u32;
        self.lookup.restore(slot, index)?;
        self.rows.push(Row {
            record: Record {
                handle: slot,
                owner,
                active_flag,
                owner_active,
                initialized: false,
                simulation_started: false,
                dead: false,
            },
            value,
        });
        self.pending_init.push(slot);
        Ok(())
    }

    fn bind(&self, ctx: &mut Context<'_>, record: &Record) {
        ctx.bind(ComponentHandle::new(self.type_id, record.handle), record.owner);
    }
}

/// Type-erased view of a manager, as held by the world.
pub(crate) trait ErasedManager: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn any_ref(&self) -> &dyn Any;
    fn any_mut(&mut self) -> &mut dyn Any;
    fn contains_slot(&self, slot: SlotId) -> bool;
    fn is_active_slot(&self, slot: SlotId) -> bool;
    fn owner_of(&self, slot: SlotId) -> Option<ObjectHandle>;
    fn live_count(&self) -> usize;
    fn has_pending_init(&self) -> bool;

    /// Activate components created since the last call. Returns how many
    /// were initialized.
    fn initialize_pending(&mut self, ctx: &mut Context<'_>) -> usize;
    /// Call `on_simulation_started` on active components that have not had it.
    fn start_simulation(&mut self, ctx: &mut Context<'_>);
    fn update(&mut self, phase: UpdatePhase, ctx: &mut Context<'_>);
    fn dispatch(&mut self, slot: SlotId, message: &mut dyn Message, ctx: &mut Context<'_>) -> bool;
    fn set_owner_active(&mut self, slot: SlotId, active: bool, ctx: &mut Context<'_>);
    fn set_active_flag(&mut self, slot: SlotId, flag: bool, ctx: &mut Context<'_>) -> bool;
    /// Hide the component and queue it for reclamation. Returns its owner.
    fn destroy(&mut self, slot: SlotId, ctx: &mut Context<'_>) -> Option<ObjectHandle>;
    fn reclaim(&mut self) -> Vec<SlotId>;
    fn create_default(
        &mut self,
        owner: ObjectHandle,
        owner_active: bool,
    ) -> Option<Result<SlotId, HandleError>>;
    fn is_serializable(&self) -> bool;
    fn encode_all(&self) -> bincode::Result<Vec<EncodedComponent>>;
    fn restore_encoded(
        &mut self,
        component: &EncodedComponent,
        owner_active: bool,
    ) -> Result<(), RestoreError>;
    fn clear(&mut self);
}

#[derive(Debug)]
pub(crate) enum RestoreError {
    NotSerializable,
    Decode(bincode::Error),
    Handle(HandleError),
}

impl<T: Component> ErasedManager for ComponentManager<T> {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn any_ref(&self) -> &dyn Any {
        self
    }

    fn any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn contains_slot(&self, slot: SlotId) -> bool {
        self.row(slot).is_some()
    }

    fn is_active_slot(&self, slot: SlotId) -> bool {
        self.row(slot).map_or(false, |row| row.record.is_active())
    }

    fn owner_of(&self, slot: SlotId) -> Option<ObjectHandle> {
        self.row(slot).map(|row| row.record.owner)
    }

    fn live_count(&self) -> usize {
        self.len()
    }

    fn has_pending_init(&self) -> bool {
        !self.pending_init.is_empty()
    }

    fn initialize_pending(&mut self, ctx: &mut Context<'_>) -> usize {
        let pending = std::mem::take(&mut self.pending_init);
        let simulating = ctx.is_simulating();
        let mut count = 0;
        for slot in pending {
            let type_id = self.type_id;
            let Some(row) = self.row_mut(slot) else {
                continue;
            };
            row.record.initialized = true;
            count += 1;
            if !row.record.is_active() {
                continue;
            }
            ctx.bind(ComponentHandle::new(type_id, slot), row.record.owner);
            row.value.on_activated(ctx);
            if simulating {
                row.record.simulation_started = true;
                row.value.on_simulation_started(ctx);
            }
        }
        ctx.unbind();
        count
    }

    fn start_simulation(&mut self, ctx: &mut Context<'_>) {
        let type_id = self.type_id;
        for row in self.rows.iter_mut() {
            if !row.record.is_active() || row.record.simulation_started {
                continue;
            }
            row.record.simulation_started = true;
            ctx.bind(ComponentHandle::new(type_id, row.record.handle), row.record.owner);
            row.value.on_simulation_started(ctx);
        }
        ctx.unbind();
    }

    fn update(&mut self, phase: UpdatePhase, ctx: &mut Context<'_>) {
        let type_id = self.type_id;
        // Rows cannot be added or removed while the loop runs: every
        // structural change goes through the context's command buffer.
        for row in self.rows.iter_mut() {
            if !row.record.is_active() {
                continue;
            }
            ctx.bind(ComponentHandle::new(type_id, row.record.handle), row.record.owner);
            row.value.update(phase, ctx);
        }
        ctx.unbind();
    }

    fn dispatch(&mut self, slot: SlotId, message: &mut dyn Message, ctx: &mut Context<'_>) -> bool {
        let type_id = self.type_id;
        let Some(row) = self.row_mut(slot) else {
            return false;
        };
        if !row.record.is_active() {
            tracing::trace!(
                component = T::TYPE_NAME,
                slot = %slot,
                ?message,
                "message to inactive component dropped"
            );
            return false;
        }
        ctx.bind(ComponentHandle::new(type_id, slot), row.record.owner);
        let handled = row.value.on_message(message, ctx);
        ctx.unbind();
        handled
    }

    fn set_owner_active(&mut self, slot: SlotId, active: bool, ctx: &mut Context<'_>) {
        let type_id = self.type_id;
        let simulating = ctx.is_simulating();
        let Some(row) = self.row_mut(slot) else {
            return;
        };
        let was_active = row.record.is_active();
        row.record.owner_active = active;
        notify_transition(type_id, row, was_active, simulating, ctx);
    }

    fn set_active_flag(&mut self, slot: SlotId, flag: bool, ctx: &mut Context<'_>) -> bool {
        let type_id = self.type_id;
        let simulating = ctx.is_simulating();
        let Some(row) = self.row_mut(slot) else {
            return false;
        };
        let was_active = row.record.is_active();
        row.record.active_flag = flag;
        notify_transition(type_id, row, was_active, simulating, ctx);
        true
    }

    fn destroy(&mut self, slot: SlotId, ctx: &mut Context<'_>) -> Option<ObjectHandle> {
        let type_id = self.type_id;
        let row = self.row_mut(slot)?;
        if row.record.is_active() {
            ctx.bind(ComponentHandle::new(type_id, slot), row.record.owner);
            row.value.on_deactivated(ctx);
            ctx.unbind();
        }
        row.record.dead = true;
        let owner = row.record.owner;
        self.pending_init.retain(|&pending| pending != slot);
        self.pending_reclaim.push(slot);
        Some(owner)
    }

    fn reclaim(&mut self) -> Vec<SlotId> {
        let pending = std::mem::take(&mut self.pending_reclaim);
        for &slot in &pending {
            let Some(&index) = self.lookup.get(slot) else {
                continue;
            };
            let mut relocated = None;
            self.rows
                .swap_remove(index as usize, |from, to| relocated = Some((from, to)));
            if let Some((_, to)) = relocated {
                if let Some(moved) = self.rows.get(to).map(|row| row.record.handle) {
                    if let Some(entry) = self.lookup.get_mut(moved) {
                        *entry = to as u32;
                    }
                }
            }
            self.lookup.free(slot);
        }
        pending
    }

    fn create_default(
        &mut self,
        owner: ObjectHandle,
        owner_active: bool,
    ) -> Option<Result<SlotId, HandleError>> {
        let ctor = self.default_ctor?;
        Some(self.create(owner, ctor(), owner_active))
    }

    fn is_serializable(&self) -> bool {
        self.codec.is_some()
    }

    fn encode_all(&self) -> bincode::Result<Vec<EncodedComponent>> {
        let Some(codec) = &self.codec else {
            return Ok(Vec::new());
        };
        self.rows
            .iter()
            .filter(|row| !row.record.dead)
            .map(|row| {
                Ok(EncodedComponent {
                    slot: row.record.handle,
                    owner: row.record.owner,
                    active_flag: row.record.active_flag,
                    payload: (codec.encode)(&row.value)?,
                })
            })
            .collect()
    }

    fn restore_encoded(
        &mut self,
        component: &EncodedComponent,
        owner_active: bool,
    ) -> Result<(), RestoreError> {
        let codec = self.codec.as_ref().ok_or(RestoreError::NotSerializable)?;
        let value = (codec.decode)(&component.payload).map_err(RestoreError::Decode)?;
        self.restore(
            component.slot,
            component.owner,
            component.active_flag,
            owner_active,
            value,
        )
        .map_err(RestoreError::Handle)
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.lookup.clear();
        self.pending_init.clear();
        self.pending_reclaim.clear();
    }
}

fn notify_transition<T: Component>(
    type_id: ComponentTypeId,
    row: &mut Row<T>,
    was_active: bool,
    simulating: bool,
    ctx: &mut Context<'_>,
) {
    let now_active = row.record.is_active();
    if was_active == now_active {
        return;
    }
    ctx.bind(ComponentHandle::new(type_id, row.record.handle), row.record.owner);
    if now_active {
        row.value.on_activated(ctx);
        if simulating && !row.record.simulation_started {
            row.record.simulation_started = true;
            row.value.on_simulation_started(ctx);
        }
    } else {
        row.value.on_deactivated(ctx);
    }
    ctx.unbind();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Health(u32);

    impl Component for Health {
        const TYPE_NAME: &'static str = "health";
    }

    fn manager(codec: Option<Codec<Health>>) -> ComponentManager<Health> {
        let config = ManagerConfig {
            max_components: 16,
            rows_per_block: 4,
        };
        ComponentManager::new(ComponentTypeId::new(0), &config, Some(Health::default), codec)
    }

    fn owner(index: u32) -> ObjectHandle {
        ObjectHandle::from_raw(index, 1)
    }

    #[test]
    fn components_stay_inactive_until_initialized() {
        let mut manager = manager(None);
        let slot = manager.create(owner(0), Health(5), true).unwrap();
        let handle = ComponentHandle::new(manager.type_id(), slot);
        assert_eq!(manager.get(handle), Some(&Health(5)));
        assert_eq!(manager.owner(handle), Some(owner(0)));
        assert!(!manager.is_active(handle));
        assert!(manager.has_pending_init());
        assert_eq!(manager.iter_active().count(), 0);
    }

    #[test]
    fn reclaim_keeps_moved_rows_addressable() {
        let mut manager = manager(None);
        let slots: Vec<SlotId> = (0..5)
            .map(|i| manager.create(owner(i), Health(i), true).unwrap())
            .collect();
        let type_id = manager.type_id();

        // Hide the first row the way `destroy` does, without a context.
        let index = *manager.lookup.get(slots[0]).unwrap();
        manager.rows.get_mut(index as usize).unwrap().record.dead = true;
        manager.pending_reclaim.push(slots[0]);
        assert_eq!(manager.len(), 4);

        assert_eq!(manager.reclaim(), vec![slots[0]]);
        assert!(!manager.contains(ComponentHandle::new(type_id, slots[0])));
        for (i, &slot) in slots.iter().enumerate().skip(1) {
            let handle = ComponentHandle::new(type_id, slot);
            assert_eq!(manager.get(handle), Some(&Health(i as u32)));
        }

        // The freed slot comes back with a new generation.
        let reused = manager.create(owner(9), Health(9), true).unwrap();
        assert_eq!(reused.index(), slots[0].index());
        assert_ne!(reused.generation(), slots[0].generation());
    }

    #[test]
    fn handles_of_other_types_do_not_resolve() {
        let mut manager = manager(None);
        let slot = manager.create(owner(0), Health(1), true).unwrap();
        let foreign = ComponentHandle::new(ComponentTypeId::new(3), slot);
        assert!(manager.get(foreign).is_none());
        assert!(!manager.contains(foreign));
    }

    #[test]
    fn encoded_components_restore_at_their_handles() {
        let mut source = manager(Some(Codec::bincode()));
        let slot = source.create(owner(2), Health(42), true).unwrap();
        let encoded = source.encode_all().unwrap();
        assert_eq!(encoded.len(), 1);

        let mut target = manager(Some(Codec::bincode()));
        target.restore_encoded(&encoded[0], true).unwrap();
        let handle = ComponentHandle::new(target.type_id(), slot);
        assert_eq!(target.get(handle), Some(&Health(42)));
        assert_eq!(target.owner(handle), Some(owner(2)));

        let mut plain = manager(None);
        assert!(matches!(
            plain.restore_encoded(&encoded[0], true),
            Err(RestoreError::NotSerializable)
        ));
    }

    #[test]
    fn default_construction_uses_registered_constructor() {
        let mut manager = manager(None);
        let slot = manager.create_default(owner(0), true).unwrap().unwrap();
        let handle = ComponentHandle::new(manager.type_id(), slot);
        assert_eq!(manager.get(handle), Some(&Health(0)));
    }
}
