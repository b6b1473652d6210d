//! Structural changes recorded during updates and applied at the next
//! phase boundary.

use crate::math::Transform;
use crate::world::{
    ComponentHandle, DeliveryPhase, Message, MessageTarget, ObjectHandle, TransformPreservation,
    World, WorldError,
};
use std::time::Duration;

pub(crate) type DeferredFn = Box<dyn FnOnce(&mut World) -> Result<(), WorldError> + Send>;

pub(crate) enum Command {
    SetLocalTransform(ObjectHandle, Transform),
    SetGlobalTransform(ObjectHandle, Transform),
    SetActive(ObjectHandle, bool),
    SetComponentActive(ComponentHandle, bool),
    SetParent {
        child: ObjectHandle,
        parent: Option<ObjectHandle>,
        preservation: TransformPreservation,
    },
    DeleteObject {
        handle: ObjectHandle,
        delete_empty_parents: bool,
    },
    DeleteComponent(ComponentHandle),
    Send(MessageTarget, Box<dyn Message>),
    Post {
        target: MessageTarget,
        message: Box<dyn Message>,
        delay: Duration,
        phase: DeliveryPhase,
    },
    Deferred(DeferredFn),
}

#[derive(Default)]
pub(crate) struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn append(&mut self, other: &mut CommandBuffer) {
        self.commands.append(&mut other.commands);
    }

    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
