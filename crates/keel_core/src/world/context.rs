//! What a component or module sees while it runs.
//!
//! A `Context` gives shared access to the rest of the world and a command
//! buffer for everything that changes structure. Commands are applied by the
//! world once the current update function (or message delivery) returns.

use crate::math::{CoordinateSystem, Transform, Vec3};
use crate::spatial::{Region, SpatialSystem};
use crate::time::Clock;
use crate::world::command::{Command, CommandBuffer};
use crate::world::manager::ErasedManager;
use crate::world::module::ModuleSlot;
use crate::world::{
    Component, ComponentHandle, ComponentManager, DeliveryPhase, GameObject, Message,
    MessageTarget, ObjectHandle, ObjectStore, TransformPreservation, TypeRegistry, World,
    WorldError, WorldModule,
};
use std::time::Duration;

pub struct Context<'a> {
    pub(crate) objects: &'a ObjectStore,
    pub(crate) spatial: Option<&'a SpatialSystem>,
    pub(crate) clock: &'a Clock,
    pub(crate) registry: &'a TypeRegistry,
    pub(crate) managers: &'a [Option<Box<dyn ErasedManager>>],
    pub(crate) modules: &'a [Option<ModuleSlot>],
    pub(crate) coordinates: &'a CoordinateSystem,
    pub(crate) commands: &'a mut CommandBuffer,
    pub(crate) simulating: bool,
    this: Option<ComponentHandle>,
    owner: Option<ObjectHandle>,
}

impl<'a> Context<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        objects: &'a ObjectStore,
        spatial: Option<&'a SpatialSystem>,
        clock: &'a Clock,
        registry: &'a TypeRegistry,
        managers: &'a [Option<Box<dyn ErasedManager>>],
        modules: &'a [Option<ModuleSlot>],
        coordinates: &'a CoordinateSystem,
        commands: &'a mut CommandBuffer,
        simulating: bool,
    ) -> Self {
        Self {
            objects,
            spatial,
            clock,
            registry,
            managers,
            modules,
            coordinates,
            commands,
            simulating,
            this: None,
            owner: None,
        }
    }

    #[inline]
    pub(crate) fn bind(&mut self, this: ComponentHandle, owner: ObjectHandle) {
        self.this = Some(this);
        self.owner = Some(owner);
    }

    #[inline]
    pub(crate) fn unbind(&mut self) {
        self.this = None;
        self.owner = None;
    }

    /// The component currently being called, if any.
    pub fn this(&self) -> Option<ComponentHandle> {
        self.this
    }

    /// Owner of the component currently being called.
    pub fn owner(&self) -> Option<ObjectHandle> {
        self.owner
    }

    pub fn objects(&self) -> &'a ObjectStore {
        self.objects
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&'a GameObject> {
        self.objects.get(handle)
    }

    /// Current global transform. Pending transform commands from this update
    /// are not visible yet.
    pub fn global_transform(&self, handle: ObjectHandle) -> Option<Transform> {
        self.objects.compute_global(handle)
    }

    /// Forward axis of `handle` in world space.
    pub fn global_forward(&self, handle: ObjectHandle) -> Option<Vec3> {
        self.global_transform(handle)
            .map(|global| global.transform_direction(self.coordinates.forward))
    }

    /// Manager of `T`. `None` for the type currently being updated.
    pub fn manager<T: Component>(&self) -> Option<&'a ComponentManager<T>> {
        let id = self.registry.component_id::<T>()?;
        self.managers
            .get(id.index())?
            .as_ref()?
            .any_ref()
            .downcast_ref::<ComponentManager<T>>()
    }

    pub fn component<T: Component>(&self, handle: ComponentHandle) -> Option<&'a T> {
        self.managers
            .get(handle.type_id().index())?
            .as_ref()?
            .any_ref()
            .downcast_ref::<ComponentManager<T>>()?
            .get(handle)
    }

    /// First `T` attached to `object`.
    pub fn component_of<T: Component>(
        &self,
        object: ObjectHandle,
    ) -> Option<(ComponentHandle, &'a T)> {
        let id = self.registry.component_id::<T>()?;
        let manager = self.manager::<T>()?;
        self.objects
            .get(object)?
            .components()
            .iter()
            .filter(|handle| handle.type_id() == id)
            .find_map(|&handle| manager.get(handle).map(|value| (handle, value)))
    }

    /// The world's instance of `M`, if it was created and is not the module
    /// currently being updated.
    pub fn module<M: WorldModule>(&self) -> Option<&'a M> {
        let id = self.registry.module_id::<M>()?;
        self.modules
            .get(id.index())?
            .as_ref()?
            .module
            .any_ref()
            .downcast_ref::<M>()
    }

    /// Objects whose bounds intersect `region`. Empty for worlds created
    /// without a spatial index.
    pub fn find_in_region(
        &self,
        region: &Region,
        category_mask: u32,
    ) -> impl Iterator<Item = ObjectHandle> + Clone + 'a {
        self.spatial
            .map(|spatial| spatial.find_in_region(region, category_mask))
            .into_iter()
            .flatten()
    }

    pub fn clock(&self) -> &'a Clock {
        self.clock
    }

    pub fn delta_seconds(&self) -> f32 {
        self.clock.delta_seconds()
    }

    pub fn coordinate_system(&self) -> &'a CoordinateSystem {
        self.coordinates
    }

    pub fn is_simulating(&self) -> bool {
        self.simulating
    }

    /// Deliver `message` once the current update function returns.
    pub fn send_message(&mut self, target: impl Into<MessageTarget>, message: impl Message) {
        self.commands
            .push(Command::Send(target.into(), Box::new(message)));
    }

    pub fn post_message(
        &mut self,
        target: impl Into<MessageTarget>,
        message: impl Message,
        delay: Duration,
        phase: DeliveryPhase,
    ) {
        self.commands.push(Command::Post {
            target: target.into(),
            message: Box::new(message),
            delay,
            phase,
        });
    }

    pub fn delete_object(&mut self, handle: ObjectHandle) {
        self.delete_object_with(handle, false);
    }

    /// Delete `handle`, then every ancestor left without children or
    /// components if `delete_empty_parents` is set.
    pub fn delete_object_with(&mut self, handle: ObjectHandle, delete_empty_parents: bool) {
        self.commands.push(Command::DeleteObject {
            handle,
            delete_empty_parents,
        });
    }

    pub fn delete_component(&mut self, handle: ComponentHandle) {
        self.commands.push(Command::DeleteComponent(handle));
    }

    pub fn set_local_transform(&mut self, handle: ObjectHandle, local: Transform) {
        self.commands.push(Command::SetLocalTransform(handle, local));
    }

    /// Move `handle` relative to its parent, keeping rotation and scale.
    pub fn set_local_position(&mut self, handle: ObjectHandle, position: Vec3) {
        let Some(object) = self.objects.get(handle) else {
            tracing::warn!(object = %handle, "set_local_position on a stale handle");
            return;
        };
        let local = Transform {
            position,
            ..*object.local_transform()
        };
        self.commands.push(Command::SetLocalTransform(handle, local));
    }

    pub fn set_global_transform(&mut self, handle: ObjectHandle, global: Transform) {
        self.commands.push(Command::SetGlobalTransform(handle, global));
    }

    pub fn set_active(&mut self, handle: ObjectHandle, active: bool) {
        self.commands.push(Command::SetActive(handle, active));
    }

    pub fn set_component_active(&mut self, handle: ComponentHandle, active: bool) {
        self.commands.push(Command::SetComponentActive(handle, active));
    }

    pub fn set_parent(
        &mut self,
        child: ObjectHandle,
        parent: Option<ObjectHandle>,
        preservation: TransformPreservation,
    ) {
        self.commands.push(Command::SetParent {
            child,
            parent,
            preservation,
        });
    }

    /// Run arbitrary world code at the next command flush, e.g. to create
    /// objects or components.
    pub fn defer<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> Result<(), WorldError> + Send + 'static,
    {
        self.commands.push(Command::Deferred(Box::new(f)));
    }
}
