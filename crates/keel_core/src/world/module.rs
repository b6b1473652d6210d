//! Per-world singleton services.

use crate::world::{Context, UpdatePhase};
use std::any::Any;

/// A service scoped to exactly one world, such as navigation or a physics
/// bridge. At most one instance per type exists in a world.
pub trait WorldModule: Send + Sync + 'static {
    const TYPE_NAME: &'static str;
    const UPDATE_PHASES: &'static [UpdatePhase] = &[];
    const DEPENDS_ON: &'static [&'static str] = &[];
    const ONLY_WHEN_SIMULATING: bool = true;

    fn initialize(&mut self, _ctx: &mut Context<'_>) {}

    fn deinitialize(&mut self, _ctx: &mut Context<'_>) {}

    fn on_simulation_started(&mut self, _ctx: &mut Context<'_>) {}

    fn update(&mut self, _phase: UpdatePhase, _ctx: &mut Context<'_>) {}

    /// The world deleted all of its objects.
    fn world_clear(&mut self) {}
}

pub(crate) trait ErasedModule: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn any_ref(&self) -> &dyn Any;
    fn any_mut(&mut self) -> &mut dyn Any;
    fn initialize(&mut self, ctx: &mut Context<'_>);
    fn deinitialize(&mut self, ctx: &mut Context<'_>);
    fn on_simulation_started(&mut self, ctx: &mut Context<'_>);
    fn update(&mut self, phase: UpdatePhase, ctx: &mut Context<'_>);
    fn world_clear(&mut self);
}

impl<M: WorldModule> ErasedModule for M {
    fn type_name(&self) -> &'static str {
        M::TYPE_NAME
    }

    fn any_ref(&self) -> &dyn Any {
        self
    }

    fn any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn initialize(&mut self, ctx: &mut Context<'_>) {
        WorldModule::initialize(self, ctx)
    }

    fn deinitialize(&mut self, ctx: &mut Context<'_>) {
        WorldModule::deinitialize(self, ctx)
    }

    fn on_simulation_started(&mut self, ctx: &mut Context<'_>) {
        WorldModule::on_simulation_started(self, ctx)
    }

    fn update(&mut self, phase: UpdatePhase, ctx: &mut Context<'_>) {
        WorldModule::update(self, phase, ctx)
    }

    fn world_clear(&mut self) {
        WorldModule::world_clear(self)
    }
}

pub(crate) struct ModuleSlot {
    pub module: Box<dyn ErasedModule>,
    pub simulation_started: bool,
    /// Creation order, used to deinitialize in reverse.
    pub created: u64,
}
