//! Component behavior interface.

use crate::world::{Context, Message};
use serde::{Deserialize, Serialize};

/// Named stages of a frame that managers and modules can update in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdatePhase {
    PreAsync,
    /// May run on worker threads, in parallel with other async updates.
    Async,
    PostAsync,
    /// Runs after global transforms have been propagated.
    PostTransform,
}

impl UpdatePhase {
    pub const ALL: [UpdatePhase; 4] = [
        UpdatePhase::PreAsync,
        UpdatePhase::Async,
        UpdatePhase::PostAsync,
        UpdatePhase::PostTransform,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UpdatePhase::PreAsync => "pre_async",
            UpdatePhase::Async => "async",
            UpdatePhase::PostAsync => "post_async",
            UpdatePhase::PostTransform => "post_transform",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// A unit of behavior attached to one game object.
///
/// Each component type gets its own manager holding every instance in dense
/// storage; the manager calls these hooks in batch, so dispatch happens once
/// per type rather than per instance.
///
/// All structural changes made through the [`Context`] (deleting objects,
/// moving them, sending messages) are deferred until the current update
/// function has finished.
pub trait Component: Send + Sync + 'static {
    /// Unique name, used for update ordering and in save files.
    const TYPE_NAME: &'static str;

    /// Phases in which [`update`](Component::update) is called.
    const UPDATE_PHASES: &'static [UpdatePhase] = &[];

    /// Update functions (component or module type names) that must run
    /// before this type's update in the same phase.
    const DEPENDS_ON: &'static [&'static str] = &[];

    /// Skip updates while the world is not simulating (editor mode).
    const ONLY_WHEN_SIMULATING: bool = true;

    /// The component became active: it is initialized, its own flag is set
    /// and its owner is active.
    fn on_activated(&mut self, _ctx: &mut Context<'_>) {}

    fn on_deactivated(&mut self, _ctx: &mut Context<'_>) {}

    /// Called once for active components when the world starts simulating.
    fn on_simulation_started(&mut self, _ctx: &mut Context<'_>) {}

    fn update(&mut self, _phase: UpdatePhase, _ctx: &mut Context<'_>) {}

    /// Return `true` if the message was handled.
    fn on_message(&mut self, _message: &mut dyn Message, _ctx: &mut Context<'_>) -> bool {
        false
    }
}
