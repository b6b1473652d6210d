use crate::world::{ComponentHandle, ComponentTypeId, ObjectHandle, ScheduleError};
use thiserror::Error;

/// Failures reported by [`World`](crate::world::World) operations.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("{0} is stale or was never issued")]
    InvalidObjectHandle(ObjectHandle),

    #[error("{0} is stale or was never issued")]
    InvalidComponentHandle(ComponentHandle),

    #[error("parenting {child} under {parent} would create a cycle")]
    CycleDetected {
        child: ObjectHandle,
        parent: ObjectHandle,
    },

    #[error("{what} storage is full ({limit} slots)")]
    CapacityExceeded { what: &'static str, limit: u32 },

    #[error("global key '{key}' is already used by {owner}")]
    DuplicateGlobalKey { key: String, owner: ObjectHandle },

    #[error("component type '{0}' is not registered")]
    UnregisteredComponent(&'static str),

    #[error("component type {0} is not registered")]
    UnknownComponentType(ComponentTypeId),

    #[error("component type '{0}' has no default constructor")]
    NoDefaultConstructor(&'static str),

    #[error("world module '{0}' is not registered")]
    UnregisteredModule(&'static str),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("world '{name}' halted after a fatal error")]
    Halted { name: String },
}
