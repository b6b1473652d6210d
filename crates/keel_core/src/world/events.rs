//! Outbound change notifications for observers such as an editor mirror.

use crate::world::{ComponentHandle, ObjectHandle};
use crossbeam_channel::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    ObjectCreated(ObjectHandle),
    ObjectDeleted(ObjectHandle),
    ParentChanged {
        object: ObjectHandle,
        parent: Option<ObjectHandle>,
    },
    ComponentCreated {
        component: ComponentHandle,
        owner: ObjectHandle,
    },
    ComponentDeleted {
        component: ComponentHandle,
        owner: ObjectHandle,
    },
    /// The object's global transform was recomputed.
    TransformChanged(ObjectHandle),
    ActiveChanged {
        object: ObjectHandle,
        active: bool,
    },
    NameChanged(ObjectHandle),
}

/// Fan-out of [`WorldEvent`]s to any number of channel subscribers.
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<WorldEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<WorldEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Send to every subscriber, dropping those whose receiver is gone.
    pub fn publish(&mut self, event: WorldEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut bus = EventBus::default();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        let handle = ObjectHandle::from_raw(1, 1);
        bus.publish(WorldEvent::ObjectCreated(handle));
        assert_eq!(kept.try_recv(), Ok(WorldEvent::ObjectCreated(handle)));
        assert_eq!(bus.subscribers.len(), 1);
    }
}
