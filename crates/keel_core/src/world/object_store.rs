//! Object table plus the bookkeeping for lazy global transforms.
//!
//! Dirty invariant: a dirty object's descendants are all dirty. Marking an
//! object dirty therefore stops at the first descendant that already is, and
//! resolving an object only has to walk up to its topmost dirty ancestor.

use crate::math::Transform;
use crate::storage::{HandleError, HandleTable};
use crate::world::{GameObject, ObjectDesc, ObjectHandle};
use std::collections::HashMap;

pub struct ObjectStore {
    table: HandleTable<GameObject>,
    dirty_roots: Vec<ObjectHandle>,
    moved: Vec<ObjectHandle>,
    global_keys: HashMap<String, ObjectHandle>,
    pending_reclaim: Vec<ObjectHandle>,
    recomputed: u64,
}

impl ObjectStore {
    pub(crate) fn with_limit(limit: u32) -> Self {
        Self {
            table: HandleTable::with_limit(limit),
            dirty_roots: Vec::new(),
            moved: Vec::new(),
            global_keys: HashMap::new(),
            pending_reclaim: Vec::new(),
            recomputed: 0,
        }
    }

    /// Live objects. Objects queued for deletion are no longer counted.
    pub fn len(&self) -> usize {
        self.table.len() - self.pending_reclaim.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `handle` refers to a live object.
    pub fn is_valid(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&GameObject> {
        self.table.get(handle.slot()).filter(|object| !object.dead)
    }

    pub(crate) fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut GameObject> {
        self.table.get_mut(handle.slot()).filter(|object| !object.dead)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.table
            .iter()
            .map(|(_, object)| object)
            .filter(|object| !object.dead)
    }

    /// Live objects without a parent, in slot order.
    pub fn roots(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.iter()
            .filter(|object| object.parent.is_none())
            .map(|object| object.handle)
    }

    pub fn object_by_global_key(&self, key: &str) -> Option<ObjectHandle> {
        self.global_keys
            .get(key)
            .copied()
            .filter(|&handle| self.is_valid(handle))
    }

    /// Number of global transforms computed so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputed
    }

    /// `true` if `ancestor` is `node` or one of its parents.
    pub fn is_ancestor_or_self(&self, ancestor: ObjectHandle, node: ObjectHandle) -> bool {
        let mut current = Some(node);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.get(handle).and_then(|object| object.parent);
        }
        false
    }

    /// Global transform without touching the cache. Used where the store is
    /// only borrowed shared, e.g. from component updates.
    pub fn compute_global(&self, handle: ObjectHandle) -> Option<Transform> {
        let object = self.get(handle)?;
        if !object.dirty {
            return Some(object.global);
        }
        let parent = match object.parent {
            Some(parent) => self.compute_global(parent)?,
            None => Transform::IDENTITY,
        };
        Some(parent * object.local)
    }

    pub fn find_child_by_name(
        &self,
        parent: ObjectHandle,
        name: &str,
        recursive: bool,
    ) -> Option<ObjectHandle> {
        let object = self.get(parent)?;
        if let Some(&found) = object
            .children
            .iter()
            .find(|&&child| self.get(child).map_or(false, |c| c.name == name))
        {
            return Some(found);
        }
        if !recursive {
            return None;
        }
        object
            .children
            .iter()
            .find_map(|&child| self.find_child_by_name(child, name, true))
    }

    /// Resolve `"a/b/c"` one level at a time below `parent`. Empty segments
    /// are skipped.
    pub fn find_child_by_path(&self, parent: ObjectHandle, path: &str) -> Option<ObjectHandle> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(parent, |current, segment| {
                self.find_child_by_name(current, segment, false)
            })
    }

    /// Every live object in the subtree below `root`, parents first.
    pub fn subtree(&self, root: ObjectHandle) -> Vec<ObjectHandle> {
        let mut out = Vec::new();
        if !self.is_valid(root) {
            return out;
        }
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if let Some(object) = self.get(handle) {
                out.push(handle);
                stack.extend(object.children.iter().rev());
            }
        }
        out
    }

    pub(crate) fn insert(&mut self, desc: &ObjectDesc) -> Result<ObjectHandle, HandleError> {
        let slot = self
            .table
            .allocate(GameObject::from_desc(ObjectHandle::INVALID, desc))?;
        let handle = ObjectHandle::new(slot);
        if let Some(object) = self.table.get_mut(slot) {
            object.handle = handle;
        }
        self.dirty_roots.push(handle);
        Ok(handle)
    }

    pub(crate) fn restore(&mut self, handle: ObjectHandle, object: GameObject) -> Result<(), HandleError> {
        self.table.restore(handle.slot(), object)?;
        self.dirty_roots.push(handle);
        Ok(())
    }

    pub(crate) fn claim_global_key(&mut self, key: &str, handle: ObjectHandle) -> bool {
        match self.object_by_global_key(key) {
            Some(owner) if owner != handle => false,
            _ => {
                self.global_keys.insert(key.to_owned(), handle);
                true
            }
        }
    }

    pub(crate) fn release_global_key(&mut self, key: &str, handle: ObjectHandle) {
        if self.global_keys.get(key) == Some(&handle) {
            self.global_keys.remove(key);
        }
    }

    /// Mark `handle` and its descendants dirty. An already-dirty object is
    /// still queued as a root, since a reparent can move it out from under
    /// the root that covered it.
    pub(crate) fn mark_dirty(&mut self, handle: ObjectHandle) {
        match self.get(handle) {
            Some(object) if object.dirty => {
                self.dirty_roots.push(handle);
                return;
            }
            Some(_) => {}
            None => return,
        }
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(object) = self.get_mut(current) {
                if current != handle && object.dirty {
                    continue;
                }
                object.dirty = true;
                stack.extend(object.children.iter().copied());
            }
        }
        self.dirty_roots.push(handle);
    }

    /// Resolve the global transform of `handle`, recomputing only the dirty
    /// ancestors on its path.
    pub(crate) fn resolve(&mut self, handle: ObjectHandle) -> Option<Transform> {
        let mut chain = Vec::new();
        let mut current = Some(handle);
        while let Some(node) = current {
            let object = self.get(node)?;
            if !object.dirty {
                break;
            }
            chain.push(node);
            current = object.parent;
        }

        for &node in chain.iter().rev() {
            self.recompute(node);
            // Siblings off the resolved path stay dirty; the transform phase
            // picks them up from here.
            self.push_children_as_roots(node);
        }
        self.get(handle).map(|object| object.global)
    }

    /// Recompute every dirty object. Returns how many were recomputed.
    pub(crate) fn update_all(&mut self) -> usize {
        let mut roots = std::mem::take(&mut self.dirty_roots);
        roots.sort_by_key(|&handle| self.get(handle).map_or(u32::MAX, |object| object.level));

        let mut count = 0;
        let mut stack = Vec::new();
        for root in roots {
            if !self.get(root).map_or(false, |object| object.dirty) {
                continue;
            }
            stack.push(root);
            while let Some(node) = stack.pop() {
                self.recompute(node);
                count += 1;
                if let Some(object) = self.get(node) {
                    stack.extend(
                        object
                            .children
                            .iter()
                            .copied()
                            .filter(|&child| self.get(child).map_or(false, |c| c.dirty)),
                    );
                }
            }
        }
        count
    }

    /// `UpdateGlobalTransform` for a single node: a no-op when clean.
    pub(crate) fn update_one(&mut self, handle: ObjectHandle) -> bool {
        let Some(object) = self.get(handle) else {
            return false;
        };
        if !object.dirty {
            return false;
        }
        if let Some(parent) = object.parent {
            self.resolve(parent);
        }
        self.recompute(handle);
        self.push_children_as_roots(handle);
        true
    }

    fn push_children_as_roots(&mut self, handle: ObjectHandle) {
        if let Some(object) = self.table.get(handle.slot()) {
            self.dirty_roots.extend(object.children.iter().copied());
        }
    }

    fn recompute(&mut self, handle: ObjectHandle) {
        let parent_global = self
            .get(handle)
            .and_then(|object| object.parent)
            .and_then(|parent| self.get(parent))
            .map(|parent| parent.global);
        let Some(object) = self.get_mut(handle) else {
            return;
        };
        object.global = match parent_global {
            Some(parent) => parent * object.local,
            None => object.local,
        };
        object.dirty = false;
        object.global_bounds = object
            .local_bounds
            .map(|bounds| bounds.transformed(&object.global));
        self.recomputed += 1;
        self.moved.push(handle);
    }

    /// Objects whose global transform changed since the last call.
    pub(crate) fn take_moved(&mut self) -> Vec<ObjectHandle> {
        std::mem::take(&mut self.moved)
    }

    /// Hide `handle` from lookups; its slot is released by [`reclaim`](Self::reclaim).
    pub(crate) fn mark_dead(&mut self, handle: ObjectHandle) -> bool {
        let Some(object) = self.get_mut(handle) else {
            return false;
        };
        object.dead = true;
        let key = object.global_key.take();
        if let Some(key) = key {
            self.release_global_key(&key, handle);
        }
        self.pending_reclaim.push(handle);
        true
    }

    pub(crate) fn has_pending_reclaim(&self) -> bool {
        !self.pending_reclaim.is_empty()
    }

    /// Free the slots of every object marked dead.
    pub(crate) fn reclaim(&mut self) -> Vec<ObjectHandle> {
        let pending = std::mem::take(&mut self.pending_reclaim);
        for &handle in &pending {
            self.table.free(handle.slot());
        }
        pending
    }

    /// Update `handle`'s level and all of its descendants' after a reparent.
    pub(crate) fn relevel(&mut self, handle: ObjectHandle) {
        let base = self
            .get(handle)
            .and_then(|object| object.parent)
            .and_then(|parent| self.get(parent))
            .map_or(0, |parent| parent.level + 1);
        let mut stack = vec![(handle, base)];
        while let Some((node, level)) = stack.pop() {
            if let Some(object) = self.get_mut(node) {
                object.level = level;
                stack.extend(object.children.iter().map(|&child| (child, level + 1)));
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.table.clear();
        self.dirty_roots.clear();
        self.moved.clear();
        self.global_keys.clear();
        self.pending_reclaim.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    fn link(store: &mut ObjectStore, parent: ObjectHandle, child: ObjectHandle) {
        store.get_mut(parent).unwrap().children.push(child);
        store.get_mut(child).unwrap().parent = Some(parent);
        store.relevel(child);
        store.mark_dirty(child);
    }

    fn chain(store: &mut ObjectStore, depth: usize) -> Vec<ObjectHandle> {
        let mut handles = Vec::new();
        for i in 0..depth {
            let desc = ObjectDesc::new(format!("n{i}")).with_position(Vec3::X);
            let handle = store.insert(&desc).unwrap();
            if let Some(&parent) = handles.last() {
                link(store, parent, handle);
            }
            handles.push(handle);
        }
        handles
    }

    #[test]
    fn resolve_recomputes_only_the_dirty_path() {
        let mut store = ObjectStore::with_limit(64);
        let nodes = chain(&mut store, 4);
        store.update_all();
        let before = store.recompute_count();

        let root = nodes[0];
        store.get_mut(root).unwrap().local.position = Vec3::new(10.0, 0.0, 0.0);
        store.mark_dirty(root);
        assert!(nodes.iter().all(|&n| store.get(n).unwrap().is_dirty()));

        let leaf = store.resolve(nodes[3]).unwrap();
        assert_eq!(leaf.position, Vec3::new(13.0, 0.0, 0.0));
        assert_eq!(store.recompute_count() - before, 4);

        // Nothing left to do for an already-resolved path.
        store.resolve(nodes[3]);
        assert_eq!(store.update_all(), 0);
        assert_eq!(store.recompute_count() - before, 4);
    }

    #[test]
    fn update_all_picks_up_siblings_left_dirty_by_resolve() {
        let mut store = ObjectStore::with_limit(64);
        let root = store.insert(&ObjectDesc::new("root")).unwrap();
        let a = store.insert(&ObjectDesc::new("a").with_position(Vec3::Y)).unwrap();
        let b = store.insert(&ObjectDesc::new("b").with_position(Vec3::Z)).unwrap();
        link(&mut store, root, a);
        link(&mut store, root, b);
        store.update_all();

        store.get_mut(root).unwrap().local.position = Vec3::X;
        store.mark_dirty(root);
        store.resolve(a);
        assert!(store.get(b).unwrap().is_dirty());

        assert_eq!(store.update_all(), 1);
        assert_eq!(
            store.get(b).unwrap().cached_global_transform().position,
            Vec3::new(1.0, 0.0, 1.0)
        );
    }

    #[test]
    fn compute_global_matches_resolve_without_caching() {
        let mut store = ObjectStore::with_limit(64);
        let nodes = chain(&mut store, 3);
        let before = store.recompute_count();
        let computed = store.compute_global(nodes[2]).unwrap();
        assert_eq!(store.recompute_count(), before);
        assert_eq!(computed, store.resolve(nodes[2]).unwrap());
    }

    #[test]
    fn path_lookup_walks_names() {
        let mut store = ObjectStore::with_limit(64);
        let nodes = chain(&mut store, 3);
        assert_eq!(store.find_child_by_path(nodes[0], "n1/n2"), Some(nodes[2]));
        assert_eq!(store.find_child_by_path(nodes[0], "n2"), None);
        assert_eq!(store.find_child_by_name(nodes[0], "n2", true), Some(nodes[2]));
    }

    #[test]
    fn dead_objects_vanish_before_reclaim() {
        let mut store = ObjectStore::with_limit(64);
        let a = store.insert(&ObjectDesc::new("a")).unwrap();
        assert!(store.claim_global_key("player", a));
        store.get_mut(a).unwrap().global_key = Some("player".into());
        assert!(store.mark_dead(a));
        assert!(!store.is_valid(a));
        assert_eq!(store.object_by_global_key("player"), None);
        assert_eq!(store.len(), 0);
        assert_eq!(store.reclaim(), vec![a]);
        assert!(!store.mark_dead(a));
    }
}
