//! Object creation, deletion and the parent/child hierarchy.

use crate::math::{Aabb, Quat, Transform, Vec3};
use crate::world::world::object_storage_error;
use crate::world::{
    DeleteObjectMessage, DeliveryPhase, MessageTarget, ObjectDesc, ObjectHandle,
    TransformPreservation, World, WorldError, WorldEvent,
};
use std::time::Duration;

impl World {
    /// Create an object, optionally below `desc.parent`.
    ///
    /// The global transform is resolved right away, so objects with bounds
    /// are in the spatial index when this returns.
    pub fn create_object(&mut self, desc: ObjectDesc) -> Result<ObjectHandle, WorldError> {
        let parent = match desc.parent {
            Some(parent) => Some(self.live_object(parent)?),
            None => None,
        };
        let (parent_active, parent_level) =
            parent.map_or((true, None), |parent| (parent.active, Some(parent.level)));
        if let Some(key) = &desc.global_key {
            if let Some(owner) = self.objects.object_by_global_key(key) {
                return Err(WorldError::DuplicateGlobalKey {
                    key: key.clone(),
                    owner,
                });
            }
        }

        let inserted = self
            .objects
            .insert(&desc)
            .map_err(|err| object_storage_error(self.desc.max_objects, err));
        let handle = self.check_capacity(inserted)?;

        if let Some(object) = self.objects.get_mut(handle) {
            object.parent = desc.parent;
            object.active = desc.active && parent_active;
            object.level = parent_level.map_or(0, |level| level + 1);
        }
        if let Some(parent) = desc.parent {
            if let Some(object) = self.objects.get_mut(parent) {
                object.children.push(handle);
            }
        }
        if let Some(key) = desc.global_key {
            self.objects.claim_global_key(&key, handle);
            if let Some(object) = self.objects.get_mut(handle) {
                object.global_key = Some(key);
            }
        }

        self.objects.resolve(handle);
        self.sync_moved();

        tracing::debug!(object = %handle, name = %desc.name, "object created");
        self.events.publish(WorldEvent::ObjectCreated(handle));
        keel_metrics::metrics! {
            self.counters.increment("objects_created", 1);
        }
        Ok(handle)
    }

    pub fn delete_object(&mut self, handle: ObjectHandle) -> bool {
        self.delete_object_with(handle, false)
    }

    /// Delete `handle`, its components and all of its descendants.
    ///
    /// Handles become invalid immediately; storage is reclaimed in the next
    /// deletion phase. With `delete_empty_parents` the walk continues up
    /// through every ancestor left without children and components. Deleting
    /// a stale handle is a no-op that returns `false`.
    pub fn delete_object_with(&mut self, handle: ObjectHandle, delete_empty_parents: bool) -> bool {
        let Some(object) = self.objects.get(handle) else {
            tracing::warn!(object = %handle, "delete_object on a stale handle");
            return false;
        };
        let parent = object.parent;

        let subtree = self.objects.subtree(handle);
        for &node in subtree.iter().rev() {
            self.destroy_object(node);
        }
        if let Some(parent) = parent {
            if let Some(object) = self.objects.get_mut(parent) {
                object.children.retain(|&child| child != handle);
            }
        }
        tracing::debug!(object = %handle, count = subtree.len(), "object deleted");
        keel_metrics::metrics! {
            self.counters.increment("objects_deleted", subtree.len() as u64);
        }

        if delete_empty_parents {
            if let Some(parent) = parent {
                let empty = self
                    .objects
                    .get(parent)
                    .map_or(false, |object| object.children.is_empty() && object.components.is_empty());
                if empty {
                    self.delete_object_with(parent, true);
                }
            }
        }
        self.flush_commands();
        true
    }

    fn destroy_object(&mut self, handle: ObjectHandle) {
        let components = match self.objects.get_mut(handle) {
            Some(object) => std::mem::take(&mut object.components),
            None => return,
        };
        for component in components {
            let owner = self
                .with_manager_at(component.type_id().index(), |manager, ctx| {
                    manager.destroy(component.slot(), ctx)
                })
                .flatten();
            if let Some(owner) = owner {
                self.events
                    .publish(WorldEvent::ComponentDeleted { component, owner });
            }
        }
        if let Some(spatial) = &mut self.spatial {
            spatial.remove(handle);
        }
        self.objects.mark_dead(handle);
        self.events.publish(WorldEvent::ObjectDeleted(handle));
    }

    /// Delete `handle` once `delay` has passed, at the start of a frame.
    pub fn delete_object_delayed(&mut self, handle: ObjectHandle, delay: Duration) {
        self.post_message(
            MessageTarget::Object(handle),
            DeleteObjectMessage::default(),
            delay,
            DeliveryPhase::NextFrame,
        );
    }

    /// Move `child` below `parent`, or make it a root with `None`.
    ///
    /// Fails with [`WorldError::CycleDetected`] when `parent` is `child` or
    /// one of its descendants; the hierarchy is left untouched.
    pub fn set_parent(
        &mut self,
        child: ObjectHandle,
        parent: Option<ObjectHandle>,
        preservation: TransformPreservation,
    ) -> Result<(), WorldError> {
        let old_parent = self.live_object(child)?.parent;
        if let Some(parent) = parent {
            self.live_object(parent)?;
            if self.objects.is_ancestor_or_self(child, parent) {
                tracing::warn!(child = %child, parent = %parent, "reparent rejected: cycle");
                return Err(WorldError::CycleDetected { child, parent });
            }
        }
        if old_parent == parent {
            return Ok(());
        }

        let preserved_global = match preservation {
            TransformPreservation::PreserveGlobal => self.global_transform(child),
            TransformPreservation::PreserveLocal => None,
        };
        let new_parent_global = match (preserved_global, parent) {
            (Some(_), Some(parent)) => self.global_transform(parent),
            _ => None,
        };

        if let Some(old) = old_parent {
            if let Some(object) = self.objects.get_mut(old) {
                object.children.retain(|&c| c != child);
            }
        }
        if let Some(parent) = parent {
            if let Some(object) = self.objects.get_mut(parent) {
                object.children.push(child);
            }
        }
        if let Some(object) = self.objects.get_mut(child) {
            object.parent = parent;
            if let Some(global) = preserved_global {
                object.local = match new_parent_global {
                    Some(parent_global) => Transform::relative_to(&global, &parent_global),
                    None => global,
                };
            }
        }
        self.objects.relevel(child);
        self.objects.mark_dirty(child);
        self.refresh_active(child);

        self.events
            .publish(WorldEvent::ParentChanged { object: child, parent });
        self.flush_commands();
        Ok(())
    }

    /// Parent `child` to `parent`, keeping its local transform.
    pub fn add_child(&mut self, parent: ObjectHandle, child: ObjectHandle) -> Result<(), WorldError> {
        self.set_parent(child, Some(parent), TransformPreservation::PreserveLocal)
    }

    /// Make `child` a root again, keeping where it is in the world. Returns
    /// `false` if `child` is not a child of `parent`.
    pub fn detach_child(&mut self, parent: ObjectHandle, child: ObjectHandle) -> Result<bool, WorldError> {
        if self.live_object(child)?.parent != Some(parent) {
            return Ok(false);
        }
        self.set_parent(child, None, TransformPreservation::PreserveGlobal)?;
        Ok(true)
    }

    pub fn find_child_by_name(
        &self,
        parent: ObjectHandle,
        name: &str,
        recursive: bool,
    ) -> Option<ObjectHandle> {
        self.objects.find_child_by_name(parent, name, recursive)
    }

    /// Look up `"a/b/c"` below `parent`.
    pub fn find_child_by_path(&self, parent: ObjectHandle, path: &str) -> Option<ObjectHandle> {
        self.objects.find_child_by_path(parent, path)
    }

    // ---- state ------------------------------------------------------------

    /// Set the object's own active flag. Descendants and components follow
    /// the resulting hierarchical state.
    pub fn set_active(&mut self, handle: ObjectHandle, active: bool) -> Result<(), WorldError> {
        self.live_object(handle)?;
        if let Some(object) = self.objects.get_mut(handle) {
            object.active_flag = active;
        }
        self.refresh_active(handle);
        self.flush_commands();
        Ok(())
    }

    /// Effective state: the object's flag and every ancestor's flag are set.
    pub fn is_active(&self, handle: ObjectHandle) -> bool {
        self.objects.get(handle).map_or(false, |object| object.active)
    }

    fn refresh_active(&mut self, root: ObjectHandle) {
        for node in self.objects.subtree(root) {
            let Some(object) = self.objects.get(node) else {
                continue;
            };
            let parent_active = object
                .parent
                .and_then(|parent| self.objects.get(parent))
                .map_or(true, |parent| parent.active);
            let active = object.active_flag && parent_active;
            if active == object.active {
                continue;
            }
            let components = object.components.clone();
            if let Some(object) = self.objects.get_mut(node) {
                object.active = active;
            }
            for component in components {
                self.with_manager_at(component.type_id().index(), |manager, ctx| {
                    manager.set_owner_active(component.slot(), active, ctx)
                });
            }
            self.events
                .publish(WorldEvent::ActiveChanged { object: node, active });
        }
    }

    /// Set the team of `handle` and all of its descendants.
    pub fn set_team_id(&mut self, handle: ObjectHandle, team_id: u16) -> Result<(), WorldError> {
        self.live_object(handle)?;
        for node in self.objects.subtree(handle) {
            if let Some(object) = self.objects.get_mut(node) {
                object.team_id = team_id;
            }
        }
        Ok(())
    }

    pub fn set_name(&mut self, handle: ObjectHandle, name: impl Into<String>) -> Result<(), WorldError> {
        self.live_object(handle)?;
        if let Some(object) = self.objects.get_mut(handle) {
            object.name = name.into();
        }
        self.events.publish(WorldEvent::NameChanged(handle));
        Ok(())
    }

    /// Give `handle` a world-unique key, or remove its key with `None`.
    pub fn set_global_key(&mut self, handle: ObjectHandle, key: Option<&str>) -> Result<(), WorldError> {
        let previous = self.live_object(handle)?.global_key.clone();
        if let Some(key) = key {
            if !self.objects.claim_global_key(key, handle) {
                let owner = self
                    .objects
                    .object_by_global_key(key)
                    .unwrap_or(ObjectHandle::INVALID);
                tracing::warn!(object = %handle, key, owner = %owner, "duplicate global key");
                return Err(WorldError::DuplicateGlobalKey {
                    key: key.to_owned(),
                    owner,
                });
            }
        }
        if let Some(previous) = previous.as_deref() {
            if key != Some(previous) {
                self.objects.release_global_key(previous, handle);
            }
        }
        if let Some(object) = self.objects.get_mut(handle) {
            object.global_key = key.map(str::to_owned);
        }
        Ok(())
    }

    pub fn object_by_global_key(&self, key: &str) -> Option<ObjectHandle> {
        self.objects.object_by_global_key(key)
    }

    /// Replace the object-space bounds. `None` takes the object out of the
    /// spatial index.
    pub fn set_local_bounds(&mut self, handle: ObjectHandle, bounds: Option<Aabb>) -> Result<(), WorldError> {
        self.live_object(handle)?;
        if let Some(object) = self.objects.get_mut(handle) {
            object.local_bounds = bounds;
            if bounds.is_none() {
                object.global_bounds = None;
            }
        }
        match bounds {
            Some(_) => {
                self.objects.mark_dirty(handle);
                self.objects.resolve(handle);
                self.sync_moved();
            }
            None => {
                if let Some(spatial) = &mut self.spatial {
                    spatial.remove(handle);
                }
            }
        }
        Ok(())
    }

    pub fn set_spatial_category(&mut self, handle: ObjectHandle, category: u32) -> Result<(), WorldError> {
        self.live_object(handle)?;
        if let Some(object) = self.objects.get_mut(handle) {
            object.spatial_category = category;
        }
        if let Some(spatial) = &mut self.spatial {
            spatial.set_category(handle, category);
        }
        Ok(())
    }

    // ---- transforms -------------------------------------------------------

    pub fn local_transform(&self, handle: ObjectHandle) -> Option<Transform> {
        self.objects.get(handle).map(|object| object.local)
    }

    pub fn set_local_transform(&mut self, handle: ObjectHandle, local: Transform) -> Result<(), WorldError> {
        self.live_object(handle)?;
        if let Some(object) = self.objects.get_mut(handle) {
            object.local = local;
        }
        self.objects.mark_dirty(handle);
        Ok(())
    }

    pub fn set_local_position(&mut self, handle: ObjectHandle, position: Vec3) -> Result<(), WorldError> {
        let local = self.live_object(handle)?.local;
        self.set_local_transform(handle, Transform { position, ..local })
    }

    pub fn set_local_rotation(&mut self, handle: ObjectHandle, rotation: Quat) -> Result<(), WorldError> {
        let local = self.live_object(handle)?.local;
        self.set_local_transform(handle, Transform { rotation, ..local })
    }

    pub fn set_local_scale(&mut self, handle: ObjectHandle, scale: Vec3) -> Result<(), WorldError> {
        let local = self.live_object(handle)?.local;
        self.set_local_transform(handle, Transform { scale, ..local })
    }

    /// Global transform of `handle`, recomputing only the dirty ancestors on
    /// its path.
    pub fn global_transform(&mut self, handle: ObjectHandle) -> Option<Transform> {
        let global = self.objects.resolve(handle);
        self.sync_moved();
        global
    }

    /// Recompute `handle` if it is dirty. Returns `false` when it was clean
    /// or stale.
    pub fn update_global_transform(&mut self, handle: ObjectHandle) -> bool {
        let updated = self.objects.update_one(handle);
        self.sync_moved();
        updated
    }

    /// Place `handle` at `global` in world space by solving for its local
    /// transform.
    pub fn set_global_transform(&mut self, handle: ObjectHandle, global: Transform) -> Result<(), WorldError> {
        let parent = self.live_object(handle)?.parent;
        let local = match parent.and_then(|parent| self.global_transform(parent)) {
            Some(parent_global) => Transform::relative_to(&global, &parent_global),
            None => global,
        };
        self.set_local_transform(handle, local)
    }

    pub fn set_global_position(&mut self, handle: ObjectHandle, position: Vec3) -> Result<(), WorldError> {
        let current = self
            .global_transform(handle)
            .ok_or(WorldError::InvalidObjectHandle(handle))?;
        self.set_global_transform(handle, Transform { position, ..current })
    }

    pub fn global_forward(&mut self, handle: ObjectHandle) -> Option<Vec3> {
        let axis = self.desc.coordinate_system.forward;
        self.global_direction(handle, axis)
    }

    pub fn global_right(&mut self, handle: ObjectHandle) -> Option<Vec3> {
        let axis = self.desc.coordinate_system.right;
        self.global_direction(handle, axis)
    }

    pub fn global_up(&mut self, handle: ObjectHandle) -> Option<Vec3> {
        let axis = self.desc.coordinate_system.up;
        self.global_direction(handle, axis)
    }

    fn global_direction(&mut self, handle: ObjectHandle, axis: Vec3) -> Option<Vec3> {
        self.global_transform(handle)
            .map(|global| (global.rotation * axis).normalize_or_zero())
    }

    /// Push recomputed bounds into the spatial index and announce moves.
    pub(crate) fn sync_moved(&mut self) {
        for handle in self.objects.take_moved() {
            let Some(object) = self.objects.get(handle) else {
                continue;
            };
            if let (Some(spatial), Some(bounds)) = (&mut self.spatial, object.global_bounds) {
                if spatial.contains(handle) {
                    spatial.update(handle, bounds);
                } else {
                    spatial.insert(handle, bounds, object.spatial_category);
                }
            }
            self.events.publish(WorldEvent::TransformChanged(handle));
        }
    }
}
