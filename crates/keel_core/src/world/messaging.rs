//! Immediate and posted message delivery.

use crate::world::{
    DeleteObjectMessage, DeliveryPhase, Message, MessageTarget, ObjectHandle, World,
};
use crossbeam_channel::Sender;
use std::time::Duration;

/// A message posted from another thread, waiting to be queued.
pub(crate) struct Envelope {
    target: MessageTarget,
    message: Box<dyn Message>,
    delay: Duration,
    phase: DeliveryPhase,
}

/// Posts messages into a world from any thread.
///
/// Messages are picked up at the world's next phase boundary and then
/// behave exactly like [`World::post_message`], with the delay counted from
/// that point.
#[derive(Clone)]
pub struct MessageSender {
    sender: Sender<Envelope>,
}

impl MessageSender {
    /// Returns `false` once the world has been dropped.
    pub fn post(
        &self,
        target: impl Into<MessageTarget>,
        message: impl Message,
        delay: Duration,
        phase: DeliveryPhase,
    ) -> bool {
        self.sender
            .send(Envelope {
                target: target.into(),
                message: Box::new(message),
                delay,
                phase,
            })
            .is_ok()
    }
}

impl World {
    /// Deliver `message` now and return whether any receiver handled it.
    ///
    /// Receivers run before this returns. Commands they queue are applied
    /// afterwards, still within this call.
    pub fn send_message(&mut self, target: impl Into<MessageTarget>, message: &mut dyn Message) -> bool {
        let target = target.into();
        let handled = match target {
            MessageTarget::Component(handle) => self
                .with_manager_at(handle.type_id().index(), |manager, ctx| {
                    manager.dispatch(handle.slot(), message, ctx)
                })
                .unwrap_or(false),
            MessageTarget::Object(object) => self.deliver_to_object(object, message),
            MessageTarget::ObjectRecursive(root) => {
                if message.is::<DeleteObjectMessage>() {
                    self.deliver_to_object(root, message)
                } else {
                    let mut handled = false;
                    for node in self.objects.subtree(root) {
                        handled |= self.deliver_to_object(node, message);
                    }
                    handled
                }
            }
            MessageTarget::Event(object) => self.deliver_event(object, message),
        };
        keel_metrics::metrics! {
            self.counters.increment("messages_delivered", 1);
        }
        if !handled {
            tracing::trace!(?target, ?message, "message not handled");
        }
        self.flush_commands();
        handled
    }

    /// Send to the first object, walking up from `object`, that has a
    /// component handling `message`.
    pub fn send_event_message(&mut self, object: ObjectHandle, message: &mut dyn Message) -> bool {
        self.send_message(MessageTarget::Event(object), message)
    }

    /// Queue `message` for delivery during `phase`, once `delay` has passed.
    ///
    /// Messages with the same due time and phase are delivered in post
    /// order. A message posted for the phase that is currently delivering is
    /// delivered the next time that phase runs.
    pub fn post_message(
        &mut self,
        target: impl Into<MessageTarget>,
        message: impl Message,
        delay: Duration,
        phase: DeliveryPhase,
    ) {
        self.post_boxed(target.into(), Box::new(message), delay, phase);
    }

    pub(crate) fn post_boxed(
        &mut self,
        target: MessageTarget,
        message: Box<dyn Message>,
        delay: Duration,
        phase: DeliveryPhase,
    ) {
        let due = self.clock.now() + delay;
        self.queues.push(phase, due, target, message);
    }

    /// A handle other threads can use to post into this world.
    pub fn message_sender(&self) -> MessageSender {
        MessageSender {
            sender: self.inbox_sender.clone(),
        }
    }

    /// Messages still waiting in `phase`'s queue.
    pub fn pending_messages(&self, phase: DeliveryPhase) -> usize {
        self.queues.len(phase)
    }

    pub(crate) fn absorb_inbox(&mut self) {
        let now = self.clock.now();
        for envelope in self.inbox.try_iter() {
            self.queues.push(
                envelope.phase,
                now + envelope.delay,
                envelope.target,
                envelope.message,
            );
        }
    }

    /// Deliver every message of `phase` that is due.
    pub(crate) fn deliver_phase(&mut self, phase: DeliveryPhase) {
        self.absorb_inbox();
        let ready = self.queues.drain_ready(phase, self.clock.now());
        if ready.is_empty() {
            return;
        }
        tracing::trace!(?phase, count = ready.len(), "delivering posted messages");
        for queued in ready {
            let mut message = queued.message;
            self.send_message(queued.target, message.as_mut());
        }
    }

    fn deliver_to_object(&mut self, object: ObjectHandle, message: &mut dyn Message) -> bool {
        if let Some(request) = message.downcast_ref::<DeleteObjectMessage>() {
            let delete_empty_parents = request.delete_empty_parents;
            return self.delete_object_with(object, delete_empty_parents);
        }
        let Some(components) = self.objects.get(object).map(|o| o.components.clone()) else {
            tracing::warn!(object = %object, ?message, "message to a stale object dropped");
            return false;
        };
        let mut handled = false;
        for component in components {
            handled |= self
                .with_manager_at(component.type_id().index(), |manager, ctx| {
                    manager.dispatch(component.slot(), message, ctx)
                })
                .unwrap_or(false);
        }
        handled
    }

    fn deliver_event(&mut self, object: ObjectHandle, message: &mut dyn Message) -> bool {
        let mut current = Some(object);
        while let Some(node) = current {
            if self.deliver_to_object(node, message) {
                return true;
            }
            current = self.objects.get(node).and_then(|object| object.parent);
        }
        false
    }
}
