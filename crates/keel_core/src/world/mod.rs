//! Objects, components, modules and the world that owns them.
//!
//! A [`World`] holds a forest of [`GameObject`]s addressed by generational
//! [`ObjectHandle`]s. Behavior lives in [`Component`]s, stored per type in a
//! [`ComponentManager`] and updated in batch during the named phases of
//! [`World::update`]. Per-world services implement [`WorldModule`].
//!
//! Component and module types are listed in a [`TypeRegistry`] built at
//! startup and shared by the worlds that use it; there is no global type
//! state, so independent worlds can run side by side.

mod command;
mod component;
mod context;
mod desc;
mod error;
mod events;
mod handle;
mod hierarchy;
pub(crate) mod manager;
mod message;
mod messaging;
mod module;
mod object;
mod object_store;
mod queue;
mod registry;
mod schedule;
mod update;
#[allow(clippy::module_inception)]
mod world;

pub use component::{Component, UpdatePhase};
pub use context::Context;
pub use desc::WorldDesc;
pub use error::WorldError;
pub(crate) use events::EventBus;
pub use events::WorldEvent;
pub use handle::{ComponentHandle, ComponentTypeId, ModuleTypeId, ObjectHandle};
pub use manager::ComponentManager;
pub use message::{AsAny, DeleteObjectMessage, DeliveryPhase, Message, MessageTarget};
pub use messaging::MessageSender;
pub use module::WorldModule;
pub use object::{GameObject, ObjectDesc};
pub use object_store::ObjectStore;
pub use registry::{ComponentTypeInfo, ModuleTypeInfo, RegistryError, TypeRegistry};
pub use schedule::{Schedule, ScheduleError, UpdateDescriptor, UpdateFunctionId, UpdateOwner};
pub use world::{TransformPreservation, World};
