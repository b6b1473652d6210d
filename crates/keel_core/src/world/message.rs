//! Typed messages and where they go.

use crate::world::{ComponentHandle, ObjectHandle};
use std::any::Any;
use std::fmt;

/// Object-safe access to `Any`, implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Marker for types that can be sent to components.
///
/// Receivers get `&mut dyn Message` and downcast to the types they handle,
/// so a handler can also write a reply into the message.
pub trait Message: AsAny + Send + fmt::Debug {}

impl dyn Message {
    pub fn is<T: Message>(&self) -> bool {
        <dyn Message as AsAny>::as_any(self).is::<T>()
    }

    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        <dyn Message as AsAny>::as_any(self).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Message>(&mut self) -> Option<&mut T> {
        <dyn Message as AsAny>::as_any_mut(self).downcast_mut::<T>()
    }
}

/// Implement [`Message`] for one or more types.
///
/// ```ignore
/// #[derive(Debug)]
/// struct Damage { amount: f32 }
/// impl_message!(Damage);
/// ```
#[macro_export]
macro_rules! impl_message {
    ($($ty:ty),+ $(,)?) => {
        $(impl $crate::world::Message for $ty {})+
    };
}

/// Who receives a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    /// One component.
    Component(ComponentHandle),
    /// Every component of one object, in attach order.
    Object(ObjectHandle),
    /// The object and all of its descendants, parents first.
    ObjectRecursive(ObjectHandle),
    /// The first object, walking up from this one, that has a component
    /// handling the message.
    Event(ObjectHandle),
}

impl From<ComponentHandle> for MessageTarget {
    fn from(handle: ComponentHandle) -> Self {
        MessageTarget::Component(handle)
    }
}

impl From<ObjectHandle> for MessageTarget {
    fn from(handle: ObjectHandle) -> Self {
        MessageTarget::Object(handle)
    }
}

/// Point in the frame at which a posted message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryPhase {
    /// Start of the next frame, before any pre-async update.
    NextFrame,
    /// After the async phase, before the post-async updates.
    PostAsync,
    /// After transforms were propagated.
    PostTransform,
    /// Right after newly created components were activated.
    AfterInitialized,
}

impl DeliveryPhase {
    pub const ALL: [DeliveryPhase; 4] = [
        DeliveryPhase::NextFrame,
        DeliveryPhase::PostAsync,
        DeliveryPhase::PostTransform,
        DeliveryPhase::AfterInitialized,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            DeliveryPhase::NextFrame => 0,
            DeliveryPhase::PostAsync => 1,
            DeliveryPhase::PostTransform => 2,
            DeliveryPhase::AfterInitialized => 3,
        }
    }
}

/// Built-in request to delete the receiving object. The world handles it
/// itself instead of forwarding it to components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteObjectMessage {
    pub delete_empty_parents: bool,
}

impl Message for DeleteObjectMessage {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    crate::impl_message!(Ping, Pong);

    #[test]
    fn downcast_through_trait_object() {
        let mut boxed: Box<dyn Message> = Box::new(Ping(3));
        assert!(boxed.is::<Ping>());
        assert!(!boxed.is::<Pong>());
        assert_eq!(boxed.downcast_ref::<Ping>(), Some(&Ping(3)));

        if let Some(ping) = boxed.downcast_mut::<Ping>() {
            ping.0 += 1;
        }
        assert_eq!(boxed.downcast_ref::<Ping>(), Some(&Ping(4)));
        assert!(boxed.downcast_ref::<Pong>().is_none());
    }
}
