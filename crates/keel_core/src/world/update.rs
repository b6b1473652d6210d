//! The per-frame phase sequence.
//!
//! 1. initialize new components, deliver `AfterInitialized` messages
//! 2. pre-async: `NextFrame` messages, then update functions in order
//! 3. async: update functions fanned out over worker threads
//! 4. post-async: `PostAsync` messages, then update functions
//! 5. deletion: reclaim component and object slots
//! 6. transform: recompute every dirty global transform
//! 7. post-transform: `PostTransform` messages, then update functions
//! 8. initialize components created during the frame
//!
//! Structural changes queued by a function are applied before the next one
//! runs. Every phase of frame N finishes before frame N+1 starts.

use crate::world::command::CommandBuffer;
use crate::world::manager::ErasedManager;
use crate::world::module::ModuleSlot;
use crate::world::{Context, DeliveryPhase, UpdateOwner, UpdatePhase, World, WorldError};
use rayon::prelude::*;

/// Work taken out of the world for the async phase.
enum AsyncJob {
    Manager(usize, Box<dyn ErasedManager>),
    Module(usize, ModuleSlot),
}

impl AsyncJob {
    fn run(&mut self, ctx: &mut Context<'_>) {
        match self {
            AsyncJob::Manager(_, manager) => manager.update(UpdatePhase::Async, ctx),
            AsyncJob::Module(_, slot) => slot.module.update(UpdatePhase::Async, ctx),
        }
    }
}

impl World {
    /// Run one frame.
    ///
    /// Returns [`WorldError::Halted`] if a fatal error happened during this
    /// frame or an earlier one; a halted world no longer updates.
    pub fn update(&mut self) -> Result<(), WorldError> {
        if self.halted {
            return Err(WorldError::Halted {
                name: self.desc.name.clone(),
            });
        }
        let frame = self.update_counter + 1;
        let span = tracing::debug_span!("world_update", world = %self.desc.name, frame);
        let _enter = span.enter();
        let frame_timer = self.profiler.begin();

        self.clock.advance();
        self.absorb_inbox();

        self.timed("initialize", |world| world.run_initialization());
        self.timed(UpdatePhase::PreAsync.name(), |world| {
            world.deliver_phase(DeliveryPhase::NextFrame);
            world.run_phase(UpdatePhase::PreAsync);
        });
        self.timed(UpdatePhase::Async.name(), |world| world.run_async_phase());
        self.timed(UpdatePhase::PostAsync.name(), |world| {
            world.deliver_phase(DeliveryPhase::PostAsync);
            world.run_phase(UpdatePhase::PostAsync);
        });
        self.timed("deletion", |world| world.reclaim_deleted());
        self.timed("transform", |world| world.update_transforms());
        self.timed(UpdatePhase::PostTransform.name(), |world| {
            world.deliver_phase(DeliveryPhase::PostTransform);
            world.run_phase(UpdatePhase::PostTransform);
        });
        self.run_initialization();

        self.update_counter = frame;
        self.profiler.record("frame", frame_timer);

        if self.halted {
            return Err(WorldError::Halted {
                name: self.desc.name.clone(),
            });
        }
        Ok(())
    }

    fn timed(&mut self, phase: &'static str, f: impl FnOnce(&mut World)) {
        let timer = self.profiler.begin();
        let span = tracing::trace_span!("phase", phase).entered();
        f(self);
        drop(span);
        self.profiler.record(phase, timer);
    }

    fn run_initialization(&mut self) {
        let initialized = self.initialize_components();
        if initialized > 0 {
            tracing::trace!(count = initialized, "components initialized");
        }
        self.deliver_phase(DeliveryPhase::AfterInitialized);
    }

    fn run_phase(&mut self, phase: UpdatePhase) {
        let functions: Vec<(UpdateOwner, bool)> = self
            .schedule
            .phase(phase)
            .map(|descriptor| (descriptor.owner(), descriptor.runs_only_when_simulating()))
            .collect();
        for (owner, only_when_simulating) in functions {
            if only_when_simulating && !self.simulating {
                continue;
            }
            match owner {
                UpdateOwner::Manager(id) => {
                    self.with_manager_at(id.index(), |manager, ctx| manager.update(phase, ctx));
                }
                UpdateOwner::Module(id) => {
                    self.with_module_at(id.index(), |slot, ctx| slot.module.update(phase, ctx));
                }
            }
            self.flush_commands();
        }
    }

    fn run_async_phase(&mut self) {
        let mut jobs = Vec::new();
        let functions: Vec<(UpdateOwner, bool)> = self
            .schedule
            .phase(UpdatePhase::Async)
            .map(|descriptor| (descriptor.owner(), descriptor.runs_only_when_simulating()))
            .collect();
        for (owner, only_when_simulating) in functions {
            if only_when_simulating && !self.simulating {
                continue;
            }
            match owner {
                UpdateOwner::Manager(id) => {
                    if let Some(manager) = self.managers.get_mut(id.index()).and_then(Option::take) {
                        jobs.push(AsyncJob::Manager(id.index(), manager));
                    }
                }
                UpdateOwner::Module(id) => {
                    if let Some(slot) = self.modules.get_mut(id.index()).and_then(Option::take) {
                        jobs.push(AsyncJob::Module(id.index(), slot));
                    }
                }
            }
        }
        if jobs.is_empty() {
            return;
        }

        let parallel = self.desc.parallel_async && jobs.len() > 1;
        let finished: Vec<(AsyncJob, CommandBuffer)> = {
            let objects = &self.objects;
            let spatial = self.spatial.as_ref();
            let clock = &self.clock;
            let registry = &*self.registry;
            let managers = &self.managers[..];
            let modules = &self.modules[..];
            let coordinates = &self.desc.coordinate_system;
            let simulating = self.simulating;

            let run = |mut job: AsyncJob| {
                let mut commands = CommandBuffer::default();
                {
                    let mut ctx = Context::new(
                        objects,
                        spatial,
                        clock,
                        registry,
                        managers,
                        modules,
                        coordinates,
                        &mut commands,
                        simulating,
                    );
                    job.run(&mut ctx);
                }
                (job, commands)
            };

            match (&self.pool, parallel) {
                (Some(pool), true) => pool.install(|| jobs.into_par_iter().map(run).collect()),
                (None, true) => jobs.into_par_iter().map(run).collect(),
                (_, false) => jobs.into_iter().map(run).collect(),
            }
        };

        // Merge in schedule order so command application is deterministic.
        for (job, mut commands) in finished {
            match job {
                AsyncJob::Manager(index, manager) => self.managers[index] = Some(manager),
                AsyncJob::Module(index, slot) => self.modules[index] = Some(slot),
            }
            self.deferred.append(&mut commands);
        }
        self.flush_commands();
    }

    /// Free the slots of everything deleted since the last deletion phase.
    pub(crate) fn reclaim_deleted(&mut self) {
        let mut components = 0;
        for manager in self.managers.iter_mut().flatten() {
            components += manager.reclaim().len();
        }
        let objects = if self.objects.has_pending_reclaim() {
            self.objects.reclaim().len()
        } else {
            0
        };
        if components + objects > 0 {
            tracing::debug!(world = %self.desc.name, objects, components, "reclaimed deleted slots");
        }
    }

    fn update_transforms(&mut self) {
        let recomputed = self.objects.update_all();
        self.sync_moved();
        if recomputed > 0 {
            tracing::trace!(recomputed, "global transforms updated");
        }
    }
}
