// world.rs - World: objects, component managers, modules and the frame loop

use crate::spatial::{Region, SpatialSystem};
use crate::storage::HandleError;
use crate::time::Clock;
use crate::world::command::{Command, CommandBuffer};
use crate::world::manager::{ErasedManager, ManagerConfig};
use crate::world::messaging::Envelope;
use crate::world::module::ModuleSlot;
use crate::world::queue::MessageQueues;
use crate::world::{
    Component, ComponentHandle, ComponentManager, ComponentTypeId, Context, EventBus,
    GameObject, ModuleTypeId, ObjectHandle, ObjectStore, Schedule, TypeRegistry,
    UpdateDescriptor, UpdateOwner, UpdatePhase, WorldDesc, WorldError, WorldEvent, WorldModule,
};
use crossbeam_channel::{Receiver, Sender};
use keel_metrics::{Counter, PhaseProfiler};
use std::sync::Arc;

/// Commands applied in one flush can queue more commands; give up after
/// this many rounds instead of spinning forever.
const MAX_FLUSH_ROUNDS: usize = 64;

/// Samples kept per phase by the world's profiler.
const PROFILER_WINDOW: usize = 120;

/// Which transform survives a reparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformPreservation {
    /// Keep the local transform; the object moves with its new parent.
    #[default]
    PreserveLocal,
    /// Keep the global transform; the local transform is recomputed.
    PreserveGlobal,
}

/// Build a [`Context`] from a world's fields, leaving the manager or module
/// being called free to borrow mutably.
macro_rules! context {
    ($world:ident, $commands:expr) => {
        Context::new(
            &$world.objects,
            $world.spatial.as_ref(),
            &$world.clock,
            &$world.registry,
            &$world.managers,
            &$world.modules,
            &$world.desc.coordinate_system,
            $commands,
            $world.simulating,
        )
    };
}

/// One independent simulation.
///
/// A world owns its objects, one manager per registered component type,
/// the spatial index and its module instances. Worlds share nothing mutable
/// and can be driven from different threads at the same time.
pub struct World {
    pub(crate) desc: WorldDesc,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) objects: ObjectStore,
    pub(crate) spatial: Option<SpatialSystem>,
    pub(crate) managers: Vec<Option<Box<dyn ErasedManager>>>,
    pub(crate) modules: Vec<Option<ModuleSlot>>,
    pub(crate) modules_created: u64,
    pub(crate) schedule: Schedule,
    pub(crate) queues: MessageQueues,
    pub(crate) clock: Clock,
    pub(crate) deferred: CommandBuffer,
    pub(crate) flushing: bool,
    pub(crate) events: EventBus,
    pub(crate) inbox: Receiver<Envelope>,
    pub(crate) inbox_sender: Sender<Envelope>,
    pub(crate) pool: Option<rayon::ThreadPool>,
    pub(crate) profiler: PhaseProfiler,
    pub(crate) counters: Counter,
    pub(crate) halted: bool,
    pub(crate) simulating: bool,
    pub(crate) update_counter: u64,
}

impl World {
    /// Create a world for every type in `registry`.
    ///
    /// Fails if the update functions declared by the registered types cannot
    /// be ordered, or if a dedicated worker pool cannot be started.
    pub fn new(desc: WorldDesc, registry: Arc<TypeRegistry>) -> Result<Self, WorldError> {
        let config = ManagerConfig {
            max_components: desc.max_components_per_type,
            rows_per_block: desc.component_block_size,
        };
        let managers = registry
            .components()
            .iter()
            .map(|info| Some(info.create_manager(&config)))
            .collect();
        let modules = registry.modules().iter().map(|_| None).collect();
        let schedule = build_schedule(&registry)?;

        let pool = if desc.parallel_async && desc.worker_threads > 0 {
            let name = desc.name.clone();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(desc.worker_threads)
                .thread_name(move |index| format!("{name}-worker-{index}"))
                .build()
                .map_err(|err| WorldError::ThreadPool(err.to_string()))?;
            Some(pool)
        } else {
            None
        };

        let (inbox_sender, inbox) = crossbeam_channel::unbounded();
        let mut world = Self {
            objects: ObjectStore::with_limit(desc.max_objects),
            spatial: desc.spatial.map(SpatialSystem::new),
            clock: Clock::new(desc.time_step),
            simulating: desc.simulate,
            desc,
            registry: Arc::clone(&registry),
            managers,
            modules,
            modules_created: 0,
            schedule,
            queues: MessageQueues::default(),
            deferred: CommandBuffer::default(),
            flushing: false,
            events: EventBus::default(),
            inbox,
            inbox_sender,
            pool,
            profiler: PhaseProfiler::new(PROFILER_WINDOW),
            counters: Counter::default(),
            halted: false,
            update_counter: 0,
        };

        for info in registry.modules() {
            if world.desc.eager_modules || info.is_eager() {
                world.create_module(info.id());
            }
        }

        tracing::debug!(
            world = %world.desc.name,
            component_types = world.managers.len(),
            module_types = world.modules.len(),
            update_functions = world.schedule.len(),
            "world created"
        );
        Ok(world)
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn desc(&self) -> &WorldDesc {
        &self.desc
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// Completed calls to [`update`](Self::update).
    pub fn update_counter(&self) -> u64 {
        self.update_counter
    }

    /// A fatal error (storage exhausted) stopped this world.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn profiler(&self) -> &PhaseProfiler {
        &self.profiler
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&GameObject> {
        self.objects.get(handle)
    }

    pub fn is_valid(&self, handle: ObjectHandle) -> bool {
        self.objects.is_valid(handle)
    }

    pub fn spatial(&self) -> Option<&SpatialSystem> {
        self.spatial.as_ref()
    }

    /// Objects whose last indexed bounds intersect `region`. Transforms
    /// changed since the last transform update are not reflected yet.
    pub fn find_in_region(
        &self,
        region: &Region,
        category_mask: u32,
    ) -> impl Iterator<Item = ObjectHandle> + Clone + '_ {
        self.spatial
            .as_ref()
            .map(|spatial| spatial.find_in_region(region, category_mask))
            .into_iter()
            .flatten()
    }

    /// Receive every [`WorldEvent`] from now on. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_events(&mut self) -> Receiver<WorldEvent> {
        self.events.subscribe()
    }

    pub fn is_simulating(&self) -> bool {
        self.simulating
    }

    /// Switch between simulating and editing. Entering simulation calls
    /// `on_simulation_started` on every active component and created module
    /// that has not had it yet.
    pub fn set_simulating(&mut self, simulating: bool) {
        if self.simulating == simulating {
            return;
        }
        self.simulating = simulating;
        if !simulating {
            return;
        }
        for index in 0..self.managers.len() {
            self.with_manager_at(index, |manager, ctx| manager.start_simulation(ctx));
        }
        for index in 0..self.modules.len() {
            self.with_module_at(index, |slot, ctx| {
                if !slot.simulation_started {
                    slot.simulation_started = true;
                    slot.module.on_simulation_started(ctx);
                }
            });
        }
        self.flush_commands();
    }

    // ---- components -------------------------------------------------------

    /// Attach `value` to `owner`. The component becomes active at the next
    /// initialization step (see [`initialize_components`](Self::initialize_components)).
    pub fn create_component<T: Component>(
        &mut self,
        owner: ObjectHandle,
        value: T,
    ) -> Result<ComponentHandle, WorldError> {
        let type_id = self
            .registry
            .component_id::<T>()
            .ok_or(WorldError::UnregisteredComponent(T::TYPE_NAME))?;
        let owner_active = self.live_object(owner)?.active;
        let limit = self.desc.max_components_per_type;
        let slot = self
            .typed_manager_mut::<T>(type_id)?
            .create(owner, value, owner_active)
            .map_err(|err| component_storage_error(type_id, limit, err));
        let slot = self.check_capacity(slot)?;
        Ok(self.attach_component(owner, ComponentHandle::new(type_id, slot)))
    }

    /// Attach a default-constructed component of a registered type.
    pub fn create_component_by_type(
        &mut self,
        owner: ObjectHandle,
        type_id: ComponentTypeId,
    ) -> Result<ComponentHandle, WorldError> {
        let owner_active = self.live_object(owner)?.active;
        let limit = self.desc.max_components_per_type;
        let manager = self
            .managers
            .get_mut(type_id.index())
            .and_then(Option::as_mut)
            .ok_or(WorldError::UnknownComponentType(type_id))?;
        let created = manager
            .create_default(owner, owner_active)
            .ok_or(WorldError::NoDefaultConstructor(manager.type_name()))?
            .map_err(|err| component_storage_error(type_id, limit, err));
        let slot = self.check_capacity(created)?;
        Ok(self.attach_component(owner, ComponentHandle::new(type_id, slot)))
    }

    fn attach_component(&mut self, owner: ObjectHandle, handle: ComponentHandle) -> ComponentHandle {
        if let Some(object) = self.objects.get_mut(owner) {
            object.components.push(handle);
        }
        tracing::debug!(component = %handle, owner = %owner, "component created");
        self.events.publish(WorldEvent::ComponentCreated {
            component: handle,
            owner,
        });
        keel_metrics::metrics! {
            self.counters.increment("components_created", 1);
        }
        handle
    }

    /// Deactivate `handle` and queue its slot for reclamation. Returns
    /// `false` for stale handles.
    pub fn delete_component(&mut self, handle: ComponentHandle) -> bool {
        let owner = self
            .with_manager_at(handle.type_id().index(), |manager, ctx| {
                manager.destroy(handle.slot(), ctx)
            })
            .flatten();
        let Some(owner) = owner else {
            tracing::warn!(component = %handle, "delete_component on a stale handle");
            return false;
        };
        if let Some(object) = self.objects.get_mut(owner) {
            object.components.retain(|attached| *attached != handle);
        }
        self.events.publish(WorldEvent::ComponentDeleted {
            component: handle,
            owner,
        });
        self.flush_commands();
        true
    }

    pub fn is_component_valid(&self, handle: ComponentHandle) -> bool {
        self.erased_manager(handle.type_id())
            .map_or(false, |manager| manager.contains_slot(handle.slot()))
    }

    /// Initialized, enabled and owned by an active object.
    pub fn is_component_active(&self, handle: ComponentHandle) -> bool {
        self.erased_manager(handle.type_id())
            .map_or(false, |manager| manager.is_active_slot(handle.slot()))
    }

    pub fn component_owner(&self, handle: ComponentHandle) -> Option<ObjectHandle> {
        self.erased_manager(handle.type_id())?
            .owner_of(handle.slot())
    }

    pub fn component<T: Component>(&self, handle: ComponentHandle) -> Option<&T> {
        self.erased_manager(handle.type_id())?
            .any_ref()
            .downcast_ref::<ComponentManager<T>>()?
            .get(handle)
    }

    pub fn component_mut<T: Component>(&mut self, handle: ComponentHandle) -> Option<&mut T> {
        self.managers
            .get_mut(handle.type_id().index())?
            .as_mut()?
            .any_mut()
            .downcast_mut::<ComponentManager<T>>()?
            .get_mut(handle)
    }

    /// First `T` attached to `object`.
    pub fn component_of<T: Component>(&self, object: ObjectHandle) -> Option<(ComponentHandle, &T)> {
        let type_id = self.registry.component_id::<T>()?;
        let manager = self.manager::<T>()?;
        self.objects
            .get(object)?
            .components()
            .iter()
            .filter(|handle| handle.type_id() == type_id)
            .find_map(|&handle| manager.get(handle).map(|value| (handle, value)))
    }

    pub fn manager<T: Component>(&self) -> Option<&ComponentManager<T>> {
        let type_id = self.registry.component_id::<T>()?;
        self.erased_manager(type_id)?
            .any_ref()
            .downcast_ref::<ComponentManager<T>>()
    }

    /// Set a component's own enabled flag.
    pub fn set_component_active(
        &mut self,
        handle: ComponentHandle,
        active: bool,
    ) -> Result<(), WorldError> {
        let found = self
            .with_manager_at(handle.type_id().index(), |manager, ctx| {
                manager.set_active_flag(handle.slot(), active, ctx)
            })
            .unwrap_or(false);
        if !found {
            tracing::warn!(component = %handle, "set_component_active on a stale handle");
            return Err(WorldError::InvalidComponentHandle(handle));
        }
        self.flush_commands();
        Ok(())
    }

    /// Activate every component created since the last call, then run the
    /// commands their `on_activated` hooks queued. Components created by
    /// those commands are activated too. Returns how many were initialized.
    pub fn initialize_components(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_FLUSH_ROUNDS {
            let mut round = 0;
            for index in 0..self.managers.len() {
                let pending = self.managers[index]
                    .as_ref()
                    .map_or(false, |manager| manager.has_pending_init());
                if pending {
                    round += self
                        .with_manager_at(index, |manager, ctx| manager.initialize_pending(ctx))
                        .unwrap_or(0);
                }
            }
            self.flush_commands();
            if round == 0 {
                break;
            }
            total += round;
        }
        total
    }

    fn typed_manager_mut<T: Component>(
        &mut self,
        type_id: ComponentTypeId,
    ) -> Result<&mut ComponentManager<T>, WorldError> {
        self.managers
            .get_mut(type_id.index())
            .and_then(Option::as_mut)
            .and_then(|manager| manager.any_mut().downcast_mut::<ComponentManager<T>>())
            .ok_or(WorldError::UnregisteredComponent(T::TYPE_NAME))
    }

    fn erased_manager(&self, type_id: ComponentTypeId) -> Option<&dyn ErasedManager> {
        self.managers
            .get(type_id.index())?
            .as_deref()
    }

    /// Run `f` on a manager taken out of the world, with a context over the
    /// rest of it. `None` if there is no manager at `index`.
    pub(crate) fn with_manager_at<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut dyn ErasedManager, &mut Context<'_>) -> R,
    ) -> Option<R> {
        let mut manager = self.managers.get_mut(index)?.take()?;
        let result = {
            let mut ctx = context!(self, &mut self.deferred);
            f(manager.as_mut(), &mut ctx)
        };
        self.managers[index] = Some(manager);
        Some(result)
    }

    // ---- modules ----------------------------------------------------------

    pub fn module<M: WorldModule>(&self) -> Option<&M> {
        let id = self.registry.module_id::<M>()?;
        self.modules
            .get(id.index())?
            .as_ref()?
            .module
            .any_ref()
            .downcast_ref::<M>()
    }

    pub fn module_mut<M: WorldModule>(&mut self) -> Option<&mut M> {
        let id = self.registry.module_id::<M>()?;
        self.modules
            .get_mut(id.index())?
            .as_mut()?
            .module
            .any_mut()
            .downcast_mut::<M>()
    }

    /// The world's instance of `M`, created and initialized on first use.
    pub fn get_or_create_module<M: WorldModule>(&mut self) -> Result<&mut M, WorldError> {
        let id = self
            .registry
            .module_id::<M>()
            .ok_or(WorldError::UnregisteredModule(M::TYPE_NAME))?;
        if !self.registry.is_module_type::<M>(id) {
            return Err(WorldError::UnregisteredModule(M::TYPE_NAME));
        }
        let exists = self
            .modules
            .get(id.index())
            .map_or(false, Option::is_some);
        if !exists {
            self.create_module(id);
        }
        self.module_mut::<M>()
            .ok_or(WorldError::UnregisteredModule(M::TYPE_NAME))
    }

    /// Deinitialize and drop the world's instance of `M`.
    pub fn delete_module<M: WorldModule>(&mut self) -> bool {
        let Some(id) = self.registry.module_id::<M>() else {
            return false;
        };
        self.destroy_module(id)
    }

    pub(crate) fn create_module(&mut self, id: ModuleTypeId) {
        let registry = Arc::clone(&self.registry);
        let Some(info) = registry.module(id) else {
            return;
        };
        let mut slot = ModuleSlot {
            module: info.create(),
            simulation_started: self.simulating,
            created: self.modules_created,
        };
        self.modules_created += 1;
        {
            let mut ctx = context!(self, &mut self.deferred);
            slot.module.initialize(&mut ctx);
            if slot.simulation_started {
                slot.module.on_simulation_started(&mut ctx);
            }
        }
        if let Some(entry) = self.modules.get_mut(id.index()) {
            *entry = Some(slot);
        }
        tracing::debug!(module = info.name(), world = %self.desc.name, "module created");
        self.flush_commands();
    }

    fn destroy_module(&mut self, id: ModuleTypeId) -> bool {
        let Some(mut slot) = self.modules.get_mut(id.index()).and_then(Option::take) else {
            return false;
        };
        {
            let mut ctx = context!(self, &mut self.deferred);
            slot.module.deinitialize(&mut ctx);
        }
        tracing::debug!(module = slot.module.type_name(), world = %self.desc.name, "module deleted");
        self.flush_commands();
        true
    }

    pub(crate) fn with_module_at<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut ModuleSlot, &mut Context<'_>) -> R,
    ) -> Option<R> {
        let mut slot = self.modules.get_mut(index)?.take()?;
        let result = {
            let mut ctx = context!(self, &mut self.deferred);
            f(&mut slot, &mut ctx)
        };
        self.modules[index] = Some(slot);
        Some(result)
    }

    // ---- lifetime ---------------------------------------------------------

    /// Delete every object and component, drop pending messages and tell
    /// modules about it. Modules themselves stay.
    pub fn clear(&mut self) {
        self.delete_all_objects();
        self.queues.clear();
        for slot in self.modules.iter_mut().flatten() {
            slot.module.world_clear();
        }
        tracing::debug!(world = %self.desc.name, "world cleared");
    }

    fn delete_all_objects(&mut self) {
        let roots: Vec<ObjectHandle> = self.objects.roots().collect();
        for root in roots {
            self.delete_object(root);
        }
        self.reclaim_deleted();
        self.deferred.clear();
        if let Some(spatial) = &mut self.spatial {
            spatial.clear();
        }
    }

    // ---- commands ---------------------------------------------------------

    /// Apply commands queued through contexts, including the ones those
    /// commands queue in turn. Nested calls return at once; the outermost
    /// flush picks up their work.
    pub(crate) fn flush_commands(&mut self) {
        if self.flushing {
            return;
        }
        self.flushing = true;
        for round in 0.. {
            let commands = self.deferred.take();
            if commands.is_empty() {
                break;
            }
            if round == MAX_FLUSH_ROUNDS {
                tracing::warn!(
                    world = %self.desc.name,
                    dropped = commands.len(),
                    "commands keep queueing more commands, dropping the rest"
                );
                break;
            }
            for command in commands {
                if let Err(error) = self.apply(command) {
                    self.report(error);
                }
            }
        }
        self.flushing = false;
    }

    fn apply(&mut self, command: Command) -> Result<(), WorldError> {
        match command {
            Command::SetLocalTransform(handle, local) => self.set_local_transform(handle, local),
            Command::SetGlobalTransform(handle, global) => {
                self.set_global_transform(handle, global)
            }
            Command::SetActive(handle, active) => self.set_active(handle, active),
            Command::SetComponentActive(handle, active) => {
                self.set_component_active(handle, active)
            }
            Command::SetParent {
                child,
                parent,
                preservation,
            } => self.set_parent(child, parent, preservation),
            Command::DeleteObject {
                handle,
                delete_empty_parents,
            } => {
                self.delete_object_with(handle, delete_empty_parents);
                Ok(())
            }
            Command::DeleteComponent(handle) => {
                self.delete_component(handle);
                Ok(())
            }
            Command::Send(target, mut message) => {
                self.send_message(target, message.as_mut());
                Ok(())
            }
            Command::Post {
                target,
                message,
                delay,
                phase,
            } => {
                self.post_boxed(target, message, delay, phase);
                Ok(())
            }
            Command::Deferred(f) => f(self),
        }
    }

    pub(crate) fn report(&mut self, error: WorldError) {
        match error {
            WorldError::CapacityExceeded { .. } => self.halt(&error),
            _ => tracing::warn!(world = %self.desc.name, %error, "deferred command failed"),
        }
    }

    pub(crate) fn halt(&mut self, error: &WorldError) {
        if !self.halted {
            tracing::error!(world = %self.desc.name, %error, "world halted");
        }
        self.halted = true;
    }

    pub(crate) fn check_capacity<T>(&mut self, result: Result<T, WorldError>) -> Result<T, WorldError> {
        if let Err(error @ WorldError::CapacityExceeded { .. }) = &result {
            self.halt(error);
        }
        result
    }

    pub(crate) fn live_object(&self, handle: ObjectHandle) -> Result<&GameObject, WorldError> {
        self.objects.get(handle).ok_or_else(|| {
            tracing::warn!(object = %handle, "stale object handle");
            WorldError::InvalidObjectHandle(handle)
        })
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.delete_all_objects();
        let mut created: Vec<(u64, usize)> = self
            .modules
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|slot| (slot.created, index)))
            .collect();
        created.sort_unstable_by(|a, b| b.cmp(a));
        for (_, index) in created {
            let Some(mut slot) = self.modules[index].take() else {
                continue;
            };
            let mut ctx = context!(self, &mut self.deferred);
            slot.module.deinitialize(&mut ctx);
        }
        self.deferred.clear();
        tracing::debug!(world = %self.desc.name, "world destroyed");
    }
}

fn build_schedule(registry: &TypeRegistry) -> Result<Schedule, WorldError> {
    let mut schedule = Schedule::new();
    for info in registry.components() {
        for &phase in info.update_phases() {
            schedule.register(descriptor(
                info.name(),
                phase,
                UpdateOwner::Manager(info.id()),
                info.dependencies(),
                info.only_when_simulating(),
            ))?;
        }
    }
    for info in registry.modules() {
        for &phase in info.update_phases() {
            schedule.register(descriptor(
                info.name(),
                phase,
                UpdateOwner::Module(info.id()),
                info.dependencies(),
                info.only_when_simulating(),
            ))?;
        }
    }
    schedule.build()?;
    Ok(schedule)
}

// Dependencies only order the synchronous phases; async functions all run
// as one parallel batch.
fn descriptor(
    name: &'static str,
    phase: UpdatePhase,
    owner: UpdateOwner,
    dependencies: &'static [&'static str],
    only_when_simulating: bool,
) -> UpdateDescriptor {
    let dependencies = if phase == UpdatePhase::Async {
        &[][..]
    } else {
        dependencies
    };
    UpdateDescriptor::new(name, phase, owner)
        .depends_on(dependencies.iter().copied())
        .only_when_simulating(only_when_simulating)
}

pub(crate) fn object_storage_error(limit: u32, error: HandleError) -> WorldError {
    match error {
        HandleError::CapacityExceeded { limit } => WorldError::CapacityExceeded {
            what: "object",
            limit,
        },
        HandleError::InvalidHandle(slot) | HandleError::SlotOccupied(slot) => {
            tracing::warn!(%slot, limit, "object slot rejected");
            WorldError::InvalidObjectHandle(ObjectHandle::new(slot))
        }
    }
}

pub(crate) fn component_storage_error(
    type_id: ComponentTypeId,
    limit: u32,
    error: HandleError,
) -> WorldError {
    match error {
        HandleError::CapacityExceeded { limit } => WorldError::CapacityExceeded {
            what: "component",
            limit,
        },
        HandleError::InvalidHandle(slot) | HandleError::SlotOccupied(slot) => {
            tracing::warn!(%slot, limit, "component slot rejected");
            WorldError::InvalidComponentHandle(ComponentHandle::new(type_id, slot))
        }
    }
}
