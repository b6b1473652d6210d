//! Scene-graph nodes.

use crate::math::{Aabb, Quat, Transform, Vec3};
use crate::spatial::ALL_CATEGORIES;
use crate::world::{ComponentHandle, ObjectHandle};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Everything needed to create a [`GameObject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDesc {
    pub name: String,
    #[serde(skip)]
    pub parent: Option<ObjectHandle>,
    pub local: Transform,
    pub active: bool,
    pub team_id: u16,
    pub global_key: Option<String>,
    /// Bounds in object space. Objects without bounds stay out of the
    /// spatial index.
    pub local_bounds: Option<Aabb>,
    pub spatial_category: u32,
}

impl ObjectDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: ObjectHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_transform(mut self, local: Transform) -> Self {
        self.local = local;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.local.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.local.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.local.scale = scale;
        self
    }

    pub fn with_bounds(mut self, local_bounds: Aabb) -> Self {
        self.local_bounds = Some(local_bounds);
        self
    }

    pub fn with_category(mut self, category: u32) -> Self {
        self.spatial_category = category;
        self
    }

    pub fn with_global_key(mut self, key: impl Into<String>) -> Self {
        self.global_key = Some(key.into());
        self
    }

    pub fn with_team(mut self, team_id: u16) -> Self {
        self.team_id = team_id;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

impl Default for ObjectDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: None,
            local: Transform::IDENTITY,
            active: true,
            team_id: 0,
            global_key: None,
            local_bounds: None,
            spatial_category: ALL_CATEGORIES,
        }
    }
}

/// A node in a world's hierarchy.
///
/// Objects are owned by the world's object table. Parent and child links are
/// plain handles; the world keeps them acyclic.
#[derive(Debug, Clone)]
pub struct GameObject {
    pub(crate) handle: ObjectHandle,
    pub(crate) name: String,
    pub(crate) global_key: Option<String>,
    pub(crate) parent: Option<ObjectHandle>,
    pub(crate) children: Vec<ObjectHandle>,
    pub(crate) components: SmallVec<[ComponentHandle; 4]>,
    pub(crate) local: Transform,
    pub(crate) global: Transform,
    pub(crate) dirty: bool,
    pub(crate) active_flag: bool,
    pub(crate) active: bool,
    pub(crate) team_id: u16,
    pub(crate) local_bounds: Option<Aabb>,
    pub(crate) global_bounds: Option<Aabb>,
    pub(crate) spatial_category: u32,
    pub(crate) level: u32,
    pub(crate) dead: bool,
}

impl GameObject {
    pub(crate) fn from_desc(handle: ObjectHandle, desc: &ObjectDesc) -> Self {
        Self {
            handle,
            name: desc.name.clone(),
            global_key: None,
            parent: None,
            children: Vec::new(),
            components: SmallVec::new(),
            local: desc.local,
            global: desc.local,
            dirty: true,
            active_flag: desc.active,
            active: desc.active,
            team_id: desc.team_id,
            local_bounds: desc.local_bounds,
            global_bounds: None,
            spatial_category: desc.spatial_category,
            level: 0,
            dead: false,
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn global_key(&self) -> Option<&str> {
        self.global_key.as_deref()
    }

    pub fn parent(&self) -> Option<ObjectHandle> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectHandle] {
        &self.children
    }

    /// Attached components in attach order.
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Cached global transform. Stale while [`is_dirty`](Self::is_dirty).
    pub fn cached_global_transform(&self) -> &Transform {
        &self.global
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The object's own flag, regardless of its parents.
    pub fn active_flag(&self) -> bool {
        self.active_flag
    }

    /// Whether the object and all of its ancestors are active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn team_id(&self) -> u16 {
        self.team_id
    }

    pub fn local_bounds(&self) -> Option<Aabb> {
        self.local_bounds
    }

    pub fn global_bounds(&self) -> Option<Aabb> {
        self.global_bounds
    }

    pub fn spatial_category(&self) -> u32 {
        self.spatial_category
    }

    /// Depth in the hierarchy; roots are level 0.
    pub fn hierarchy_level(&self) -> u32 {
        self.level
    }
}
