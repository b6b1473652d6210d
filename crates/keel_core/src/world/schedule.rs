//! Ordered update functions per phase.
//!
//! Every manager and module contributes one update function per phase it
//! takes part in. Within a phase functions run in registration order, except
//! that a function is moved after every function it depends on.

use crate::world::{ComponentTypeId, ModuleTypeId, UpdatePhase};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// What an update function drives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UpdateOwner {
    Manager(ComponentTypeId),
    Module(ModuleTypeId),
}

/// Handle assigned to each registered update function.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UpdateFunctionId(u32);

impl UpdateFunctionId {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for UpdateFunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration record for one update function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateDescriptor {
    name: String,
    phase: UpdatePhase,
    owner: UpdateOwner,
    depends_on: Vec<String>,
    only_when_simulating: bool,
}

impl UpdateDescriptor {
    pub fn new(name: impl Into<String>, phase: UpdatePhase, owner: UpdateOwner) -> Self {
        Self {
            name: name.into(),
            phase,
            owner,
            depends_on: Vec::new(),
            only_when_simulating: true,
        }
    }

    /// Replace the dependency list. Duplicates are removed.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = names.into_iter().map(Into::into).collect();
        list.sort_unstable();
        list.dedup();
        self.depends_on = list;
        self
    }

    pub fn only_when_simulating(mut self, only: bool) -> Self {
        self.only_when_simulating = only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn owner(&self) -> UpdateOwner {
        self.owner
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn runs_only_when_simulating(&self) -> bool {
        self.only_when_simulating
    }
}

/// Errors that can occur while building a world's update schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("update function '{name}' is already registered for {phase:?}")]
    DuplicateName { name: String, phase: UpdatePhase },

    #[error("update function '{name}' depends on unknown function '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    #[error("async update function '{name}' cannot declare dependencies")]
    AsyncDependency { name: String },

    #[error("update functions in {phase:?} depend on each other in a cycle: {names:?}")]
    DependencyCycle {
        phase: UpdatePhase,
        names: Vec<String>,
    },
}

#[derive(Default)]
pub struct Schedule {
    functions: Vec<UpdateDescriptor>,
    name_lookup: HashMap<(UpdatePhase, String), UpdateFunctionId>,
    order: [Vec<UpdateFunctionId>; 4],
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: UpdateDescriptor,
    ) -> Result<UpdateFunctionId, ScheduleError> {
        let key = (descriptor.phase, descriptor.name.clone());
        if self.name_lookup.contains_key(&key) {
            return Err(ScheduleError::DuplicateName {
                name: descriptor.name,
                phase: descriptor.phase,
            });
        }
        if descriptor.phase == UpdatePhase::Async && !descriptor.depends_on.is_empty() {
            return Err(ScheduleError::AsyncDependency {
                name: descriptor.name,
            });
        }

        let id = UpdateFunctionId(self.functions.len() as u32);
        self.name_lookup.insert(key, id);
        self.functions.push(descriptor);
        Ok(id)
    }

    /// Resolve dependencies and compute the run order of every phase.
    ///
    /// A dependency only orders functions that share a phase; naming a
    /// function that exists in some other phase is allowed, naming one that
    /// exists nowhere is not.
    pub fn build(&mut self) -> Result<(), ScheduleError> {
        for descriptor in &self.functions {
            for dependency in &descriptor.depends_on {
                if !self.functions.iter().any(|other| other.name == *dependency) {
                    return Err(ScheduleError::UnknownDependency {
                        name: descriptor.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        for phase in UpdatePhase::ALL {
            self.order[phase.index()] = self.order_phase(phase)?;
        }
        Ok(())
    }

    fn order_phase(&self, phase: UpdatePhase) -> Result<Vec<UpdateFunctionId>, ScheduleError> {
        let mut pending: Vec<UpdateFunctionId> = (0..self.functions.len() as u32)
            .map(UpdateFunctionId)
            .filter(|id| self.functions[id.0 as usize].phase == phase)
            .collect();
        let mut placed: Vec<UpdateFunctionId> = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = pending.iter().position(|id| {
                self.functions[id.0 as usize]
                    .depends_on
                    .iter()
                    .all(|dependency| {
                        self.name_lookup
                            .get(&(phase, dependency.clone()))
                            .map_or(true, |dep| placed.contains(dep))
                    })
            });
            match ready {
                Some(pos) => placed.push(pending.remove(pos)),
                None => {
                    return Err(ScheduleError::DependencyCycle {
                        phase,
                        names: pending
                            .iter()
                            .map(|id| self.functions[id.0 as usize].name.clone())
                            .collect(),
                    })
                }
            }
        }
        Ok(placed)
    }

    pub fn descriptor(&self, id: UpdateFunctionId) -> Option<&UpdateDescriptor> {
        self.functions.get(id.0 as usize)
    }

    /// Functions of `phase` in run order. Empty until [`build`](Self::build).
    pub fn phase(&self, phase: UpdatePhase) -> impl Iterator<Item = &UpdateDescriptor> {
        self.order[phase.index()]
            .iter()
            .filter_map(|id| self.functions.get(id.0 as usize))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(i: u16) -> UpdateOwner {
        UpdateOwner::Manager(ComponentTypeId::new(i))
    }

    fn names(schedule: &Schedule, phase: UpdatePhase) -> Vec<String> {
        schedule.phase(phase).map(|d| d.name().to_owned()).collect()
    }

    #[test]
    fn dependencies_move_functions_later() {
        let mut schedule = Schedule::new();
        schedule
            .register(UpdateDescriptor::new("a", UpdatePhase::PreAsync, owner(0)).depends_on(["c"]))
            .unwrap();
        schedule
            .register(UpdateDescriptor::new("b", UpdatePhase::PreAsync, owner(1)))
            .unwrap();
        schedule
            .register(UpdateDescriptor::new("c", UpdatePhase::PreAsync, owner(2)))
            .unwrap();
        schedule.build().unwrap();
        assert_eq!(names(&schedule, UpdatePhase::PreAsync), vec!["b", "c", "a"]);
    }

    #[test]
    fn same_name_in_different_phases_is_allowed() {
        let mut schedule = Schedule::new();
        schedule
            .register(UpdateDescriptor::new("mover", UpdatePhase::PreAsync, owner(0)))
            .unwrap();
        schedule
            .register(UpdateDescriptor::new("mover", UpdatePhase::PostAsync, owner(0)))
            .unwrap();
        let err = schedule
            .register(UpdateDescriptor::new("mover", UpdatePhase::PostAsync, owner(1)))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::DuplicateName { .. }));
    }

    #[test]
    fn async_functions_cannot_depend() {
        let mut schedule = Schedule::new();
        let err = schedule
            .register(UpdateDescriptor::new("job", UpdatePhase::Async, owner(0)).depends_on(["x"]))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::AsyncDependency { .. }));
    }

    #[test]
    fn unknown_dependency_and_cycles_are_rejected() {
        let mut schedule = Schedule::new();
        schedule
            .register(UpdateDescriptor::new("a", UpdatePhase::PostAsync, owner(0)).depends_on(["ghost"]))
            .unwrap();
        assert!(matches!(
            schedule.build(),
            Err(ScheduleError::UnknownDependency { .. })
        ));

        let mut schedule = Schedule::new();
        schedule
            .register(UpdateDescriptor::new("a", UpdatePhase::PostAsync, owner(0)).depends_on(["b"]))
            .unwrap();
        schedule
            .register(UpdateDescriptor::new("b", UpdatePhase::PostAsync, owner(1)).depends_on(["a"]))
            .unwrap();
        assert!(matches!(
            schedule.build(),
            Err(ScheduleError::DependencyCycle { .. })
        ));
    }
}
