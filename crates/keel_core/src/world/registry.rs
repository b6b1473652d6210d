//! Explicit component and module type registry.
//!
//! Built once at startup and shared (behind an `Arc`) by every world that
//! should know these types. Worlds created from different registries are
//! fully independent.

use crate::world::manager::{Codec, ComponentManager, ErasedManager, ManagerConfig};
use crate::world::module::ErasedModule;
use crate::world::{Component, ComponentTypeId, ModuleTypeId, UpdatePhase, WorldModule};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;
use thiserror::Error;

type ManagerFactory = fn(ComponentTypeId, &ManagerConfig) -> Box<dyn ErasedManager>;
type ModuleFactory = fn() -> Box<dyn ErasedModule>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("type name '{name}' is already used by another type")]
    DuplicateTypeName { name: &'static str },

    #[error("too many registered types")]
    TooManyTypes,
}

/// What the registry knows about one component type.
pub struct ComponentTypeInfo {
    id: ComponentTypeId,
    name: &'static str,
    rust_type: TypeId,
    phases: &'static [UpdatePhase],
    depends_on: &'static [&'static str],
    only_when_simulating: bool,
    default_constructible: bool,
    serializable: bool,
    factory: ManagerFactory,
}

impl ComponentTypeInfo {
    pub fn id(&self) -> ComponentTypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn update_phases(&self) -> &'static [UpdatePhase] {
        self.phases
    }

    pub fn dependencies(&self) -> &'static [&'static str] {
        self.depends_on
    }

    pub fn only_when_simulating(&self) -> bool {
        self.only_when_simulating
    }

    pub fn is_default_constructible(&self) -> bool {
        self.default_constructible
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    pub(crate) fn create_manager(&self, config: &ManagerConfig) -> Box<dyn ErasedManager> {
        (self.factory)(self.id, config)
    }
}

/// What the registry knows about one module type.
pub struct ModuleTypeInfo {
    id: ModuleTypeId,
    name: &'static str,
    rust_type: TypeId,
    phases: &'static [UpdatePhase],
    depends_on: &'static [&'static str],
    only_when_simulating: bool,
    eager: bool,
    factory: ModuleFactory,
}

impl ModuleTypeInfo {
    pub fn id(&self) -> ModuleTypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn update_phases(&self) -> &'static [UpdatePhase] {
        self.phases
    }

    pub fn dependencies(&self) -> &'static [&'static str] {
        self.depends_on
    }

    pub fn only_when_simulating(&self) -> bool {
        self.only_when_simulating
    }

    /// Created together with the world instead of on first request.
    pub fn is_eager(&self) -> bool {
        self.eager
    }

    pub(crate) fn create(&self) -> Box<dyn ErasedModule> {
        (self.factory)()
    }
}

#[derive(Default)]
pub struct TypeRegistry {
    components: Vec<ComponentTypeInfo>,
    component_lookup: HashMap<TypeId, ComponentTypeId>,
    modules: Vec<ModuleTypeInfo>,
    module_lookup: HashMap<TypeId, ModuleTypeId>,
}

fn plain_manager<T: Component>(id: ComponentTypeId, config: &ManagerConfig) -> Box<dyn ErasedManager> {
    Box::new(ComponentManager::<T>::new(id, config, None, None))
}

fn default_manager<T: Component + Default>(
    id: ComponentTypeId,
    config: &ManagerConfig,
) -> Box<dyn ErasedManager> {
    Box::new(ComponentManager::<T>::new(id, config, Some(T::default), None))
}

fn serializable_manager<T>(id: ComponentTypeId, config: &ManagerConfig) -> Box<dyn ErasedManager>
where
    T: Component + Default + Serialize + DeserializeOwned,
{
    Box::new(ComponentManager::<T>::new(
        id,
        config,
        Some(T::default),
        Some(Codec::bincode()),
    ))
}

fn module_factory<M: WorldModule + Default>() -> Box<dyn ErasedModule> {
    Box::new(M::default())
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type created only from explicit values.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentTypeId, RegistryError> {
        self.add_component::<T>(plain_manager::<T>, false, false)
    }

    /// Register a component type that can also be created by type id alone.
    pub fn register_default_component<T: Component + Default>(
        &mut self,
    ) -> Result<ComponentTypeId, RegistryError> {
        self.add_component::<T>(default_manager::<T>, true, false)
    }

    /// Register a component type whose instances are written to snapshots.
    pub fn register_serializable_component<T>(&mut self) -> Result<ComponentTypeId, RegistryError>
    where
        T: Component + Default + Serialize + DeserializeOwned,
    {
        self.add_component::<T>(serializable_manager::<T>, true, true)
    }

    fn add_component<T: Component>(
        &mut self,
        factory: ManagerFactory,
        default_constructible: bool,
        serializable: bool,
    ) -> Result<ComponentTypeId, RegistryError> {
        let rust_type = TypeId::of::<T>();
        if let Some(&id) = self.component_lookup.get(&rust_type) {
            return Ok(id);
        }
        if self.name_taken(T::TYPE_NAME) {
            return Err(RegistryError::DuplicateTypeName { name: T::TYPE_NAME });
        }
        let raw = u16::try_from(self.components.len())
            .ok()
            .filter(|&raw| raw < u16::MAX)
            .ok_or(RegistryError::TooManyTypes)?;

        let id = ComponentTypeId::new(raw);
        self.components.push(ComponentTypeInfo {
            id,
            name: T::TYPE_NAME,
            rust_type,
            phases: T::UPDATE_PHASES,
            depends_on: T::DEPENDS_ON,
            only_when_simulating: T::ONLY_WHEN_SIMULATING,
            default_constructible,
            serializable,
            factory,
        });
        self.component_lookup.insert(rust_type, id);
        tracing::debug!(component = T::TYPE_NAME, id = raw, "registered component type");
        Ok(id)
    }

    /// Register a module created on first request.
    pub fn register_module<M: WorldModule + Default>(&mut self) -> Result<ModuleTypeId, RegistryError> {
        self.add_module::<M>(false)
    }

    /// Register a module created together with every world.
    pub fn register_eager_module<M: WorldModule + Default>(
        &mut self,
    ) -> Result<ModuleTypeId, RegistryError> {
        self.add_module::<M>(true)
    }

    fn add_module<M: WorldModule + Default>(&mut self, eager: bool) -> Result<ModuleTypeId, RegistryError> {
        let rust_type = TypeId::of::<M>();
        if let Some(&id) = self.module_lookup.get(&rust_type) {
            return Ok(id);
        }
        if self.name_taken(M::TYPE_NAME) {
            return Err(RegistryError::DuplicateTypeName { name: M::TYPE_NAME });
        }
        let raw = u16::try_from(self.modules.len()).map_err(|_| RegistryError::TooManyTypes)?;

        let id = ModuleTypeId::new(raw);
        self.modules.push(ModuleTypeInfo {
            id,
            name: M::TYPE_NAME,
            rust_type,
            phases: M::UPDATE_PHASES,
            depends_on: M::DEPENDS_ON,
            only_when_simulating: M::ONLY_WHEN_SIMULATING,
            eager,
            factory: module_factory::<M>,
        });
        self.module_lookup.insert(rust_type, id);
        tracing::debug!(module = M::TYPE_NAME, id = raw, "registered world module");
        Ok(id)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.components.iter().any(|info| info.name == name)
            || self.modules.iter().any(|info| info.name == name)
    }

    pub fn component_id<T: Component>(&self) -> Option<ComponentTypeId> {
        self.component_lookup.get(&TypeId::of::<T>()).copied()
    }

    pub fn component_id_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.components
            .iter()
            .find(|info| info.name == name)
            .map(|info| info.id)
    }

    pub fn component(&self, id: ComponentTypeId) -> Option<&ComponentTypeInfo> {
        self.components.get(id.index())
    }

    pub fn components(&self) -> &[ComponentTypeInfo] {
        &self.components
    }

    pub fn module_id<M: WorldModule>(&self) -> Option<ModuleTypeId> {
        self.module_lookup.get(&TypeId::of::<M>()).copied()
    }

    pub fn module(&self, id: ModuleTypeId) -> Option<&ModuleTypeInfo> {
        self.modules.get(id.index())
    }

    pub fn modules(&self) -> &[ModuleTypeInfo] {
        &self.modules
    }

    #[cfg(test)]
    pub(crate) fn is_component_type<T: Component>(&self, id: ComponentTypeId) -> bool {
        self.component(id)
            .map_or(false, |info| info.rust_type == TypeId::of::<T>())
    }

    pub(crate) fn is_module_type<M: WorldModule>(&self, id: ModuleTypeId) -> bool {
        self.module(id)
            .map_or(false, |info| info.rust_type == TypeId::of::<M>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Health;
    impl Component for Health {
        const TYPE_NAME: &'static str = "health";
    }

    #[derive(Default)]
    struct OtherHealth;
    impl Component for OtherHealth {
        const TYPE_NAME: &'static str = "health";
    }

    #[derive(Default)]
    struct Navigation;
    impl WorldModule for Navigation {
        const TYPE_NAME: &'static str = "navigation";
    }

    #[test]
    fn ids_are_dense_and_stable() {
        let mut registry = TypeRegistry::new();
        let health = registry.register_component::<Health>().unwrap();
        assert_eq!(health.raw(), 0);
        assert_eq!(registry.register_component::<Health>().unwrap(), health);
        assert_eq!(registry.component_id::<Health>(), Some(health));
        assert_eq!(registry.component_id_by_name("health"), Some(health));
        assert!(registry.is_component_type::<Health>(health));
        assert!(!registry.component(health).unwrap().is_default_constructible());
    }

    #[test]
    fn names_must_be_unique_across_kinds() {
        let mut registry = TypeRegistry::new();
        registry.register_component::<Health>().unwrap();
        assert_eq!(
            registry.register_default_component::<OtherHealth>(),
            Err(RegistryError::DuplicateTypeName { name: "health" })
        );

        let nav = registry.register_eager_module::<Navigation>().unwrap();
        assert!(registry.module(nav).unwrap().is_eager());
        assert_eq!(registry.module_id::<Navigation>(), Some(nav));
    }
}
