//! Time-ordered message queues, one per delivery phase.

use crate::world::{DeliveryPhase, Message, MessageTarget};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

pub(crate) struct QueuedMessage {
    pub due: Duration,
    pub seq: u64,
    pub target: MessageTarget,
    pub message: Box<dyn Message>,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    // Reversed so the max-heap pops the earliest (due, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
pub(crate) struct MessageQueues {
    queues: [BinaryHeap<QueuedMessage>; 4],
    next_seq: u64,
}

impl MessageQueues {
    pub fn push(
        &mut self,
        phase: DeliveryPhase,
        due: Duration,
        target: MessageTarget,
        message: Box<dyn Message>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queues[phase.index()].push(QueuedMessage {
            due,
            seq,
            target,
            message,
        });
    }

    /// Pop every message of `phase` that is due at `now`, in `(due, seq)`
    /// order. Messages pushed while the caller works through the returned
    /// batch wait for the next drain.
    pub fn drain_ready(&mut self, phase: DeliveryPhase, now: Duration) -> Vec<QueuedMessage> {
        let queue = &mut self.queues[phase.index()];
        let mut ready = Vec::new();
        while queue.peek().map_or(false, |next| next.due <= now) {
            if let Some(message) = queue.pop() {
                ready.push(message);
            }
        }
        ready
    }

    pub fn len(&self, phase: DeliveryPhase) -> usize {
        self.queues[phase.index()].len()
    }

    pub fn clear(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ObjectHandle;

    #[derive(Debug)]
    struct Tag(u32);
    crate::impl_message!(Tag);

    fn tag(message: &QueuedMessage) -> u32 {
        message.message.downcast_ref::<Tag>().map_or(u32::MAX, |t| t.0)
    }

    #[test]
    fn equal_due_keeps_post_order() {
        let mut queues = MessageQueues::default();
        let target = MessageTarget::Object(ObjectHandle::from_raw(0, 1));
        for i in 0..5 {
            queues.push(DeliveryPhase::PostAsync, Duration::ZERO, target, Box::new(Tag(i)));
        }
        let order: Vec<_> = queues
            .drain_ready(DeliveryPhase::PostAsync, Duration::ZERO)
            .iter()
            .map(tag)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn messages_wait_until_due() {
        let mut queues = MessageQueues::default();
        let target = MessageTarget::Object(ObjectHandle::from_raw(0, 1));
        queues.push(DeliveryPhase::NextFrame, Duration::from_millis(30), target, Box::new(Tag(1)));
        queues.push(DeliveryPhase::NextFrame, Duration::from_millis(10), target, Box::new(Tag(0)));

        assert!(queues.drain_ready(DeliveryPhase::NextFrame, Duration::from_millis(5)).is_empty());
        let first = queues.drain_ready(DeliveryPhase::NextFrame, Duration::from_millis(10));
        assert_eq!(first.iter().map(tag).collect::<Vec<_>>(), vec![0]);
        assert_eq!(queues.len(DeliveryPhase::NextFrame), 1);
        assert_eq!(queues.drain_ready(DeliveryPhase::PostAsync, Duration::MAX).len(), 0);
    }
}
