// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Events, the cancellable capability, and the subtype relation between event types.
//!
//! ## Overview
//!
//! An event is any `'static` type implementing [`Event`].
//! Events form hierarchies by composition: a derived event embeds its parent event in a
//! field and reports it through [`Event::parent`]. A handler declared for a parent type
//! can then receive the derived event, viewed as the parent.
//!
//! Cancellation is a type-level capability. An event type opts in by exposing a
//! [`Cancellable`] view (usually an embedded [`Cancellation`]) and by answering `true`
//! from [`Event::is_cancellable_type`]. Derived events inherit the capability of their parent.
//!
//! The [`event!`](crate::event!) macro writes these impls for the common shapes:
//!
//! ```
//! use tiered_bus::event::{Cancellable, Cancellation, Event, EventType};
//!
//! #[derive(Default)]
//! struct Message {
//!     text: String,
//!     flags: Cancellation,
//! }
//! tiered_bus::event!(Message, cancellable(flags));
//!
//! #[derive(Default)]
//! struct DirectMessage {
//!     base: Message,
//!     to: String,
//! }
//! tiered_bus::event!(DirectMessage: Message => base);
//!
//! let mut dm = DirectMessage::default();
//! let erased: &mut dyn Event = &mut dm;
//! assert!(erased.is_instance_of(&EventType::of::<Message>()));
//! assert!(DirectMessage::is_cancellable_type());
//!
//! erased.cancellable_mut().unwrap().cancel();
//! assert!(dm.base.flags.is_cancelled());
//! ```

use core::any::{Any, TypeId};
use core::hash::{Hash, Hasher};

/// Identity of an event type, captured once at declaration time.
///
/// Two `EventType`s are equal when they describe the same Rust type.
#[derive(Copy, Clone, Debug)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
    cancellable: bool,
}

impl EventType {
    /// Describe the event type `E`.
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: core::any::type_name::<E>(),
            cancellable: E::is_cancellable_type(),
        }
    }

    /// The [`TypeId`] of the described type.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The Rust type name of the described type.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether events of this type carry cancellation state.
    #[inline]
    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Mutable delivery flags of a cancellable event.
///
/// The two flags are independent:
/// - *cancelled* tells the code that fired the event not to perform its action, and
///   suppresses handlers declared with `ignore_cancelled`. Dispatch continues otherwise.
/// - *propagation stopped* suppresses every later handler except
///   [`Monitor`](crate::priority::Priority::Monitor) ones. It says nothing about the action.
pub trait Cancellable {
    /// Whether the event is cancelled.
    fn is_cancelled(&self) -> bool;

    /// Set the cancelled flag.
    fn set_cancelled(&mut self, cancelled: bool);

    /// Whether delivery to further non-monitor handlers is stopped.
    fn is_propagation_stopped(&self) -> bool;

    /// Set the stop-propagation flag.
    fn set_propagation_stopped(&mut self, stopped: bool);

    /// Mark the event cancelled.
    fn cancel(&mut self) {
        self.set_cancelled(true);
    }

    /// Stop delivery to further non-monitor handlers. The cancelled flag is left as is.
    fn stop_propagation(&mut self) {
        self.set_propagation_stopped(true);
    }
}

/// A ready-made pair of delivery flags, both `false` on construction.
///
/// Embed it in an event type and name the field in
/// [`event!`](crate::event!)`(Type, cancellable(field))`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Cancellation {
    cancelled: bool,
    propagation_stopped: bool,
}

impl Cancellation {
    /// Fresh flags: not cancelled, propagating.
    pub const fn new() -> Self {
        Self {
            cancelled: false,
            propagation_stopped: false,
        }
    }
}

impl Cancellable for Cancellation {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    fn set_propagation_stopped(&mut self, stopped: bool) {
        self.propagation_stopped = stopped;
    }
}

/// A value that can be fired through a [`Bus`](crate::bus::Bus).
///
/// Prefer the [`event!`](crate::event!) macro over writing this by hand; a manual
/// impl must keep [`Event::is_cancellable_type`] consistent with [`Event::cancellable`].
pub trait Event: Any {
    /// The runtime type of this event.
    fn event_type(&self) -> EventType;

    /// This event as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// This event as mutable [`Any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The embedded parent event, if this event type derives from another.
    fn parent(&self) -> Option<&dyn Event> {
        None
    }

    /// Mutable access to the embedded parent event.
    fn parent_mut(&mut self) -> Option<&mut dyn Event> {
        None
    }

    /// The cancellable view of this event, for cancellable event types.
    fn cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }

    /// The mutable cancellable view of this event, for cancellable event types.
    fn cancellable_mut(&mut self) -> Option<&mut dyn Cancellable> {
        None
    }

    /// Whether this event type supports the cancellable capability.
    fn is_cancellable_type() -> bool
    where
        Self: Sized,
    {
        false
    }
}

impl dyn Event {
    /// Whether this event is of type `ty` or derives from it.
    pub fn is_instance_of(&self, ty: &EventType) -> bool {
        let mut current: Option<&dyn Event> = Some(self);
        while let Some(event) = current {
            if event.event_type().id() == ty.id() {
                return true;
            }
            current = event.parent();
        }
        false
    }

    /// Reborrow this event as `ty`, walking up the parent chain.
    ///
    /// Returns `None` when `ty` is neither the runtime type nor an ancestor.
    pub fn view_mut(&mut self, ty: &EventType) -> Option<&mut dyn Any> {
        if self.event_type().id() == ty.id() {
            return Some(self.as_any_mut());
        }
        self.parent_mut()?.view_mut(ty)
    }

    /// Whether this event exposes the cancellable capability.
    #[inline]
    pub fn is_cancellable(&self) -> bool {
        self.cancellable().is_some()
    }

    /// Downcast to the concrete runtime type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref()
    }

    /// Mutably downcast to the concrete runtime type.
    pub fn downcast_mut<E: Event>(&mut self) -> Option<&mut E> {
        self.as_any_mut().downcast_mut()
    }
}

/// Implement [`Event`](crate::event::Event) for a type.
///
/// Shapes:
/// - `event!(Name)`: a plain event.
/// - `event!(Name, cancellable)`: `Name` itself implements [`Cancellable`](crate::event::Cancellable).
/// - `event!(Name, cancellable(field))`: the named field implements `Cancellable`
///   (usually a [`Cancellation`](crate::event::Cancellation)).
/// - `event!(Name: Parent => field)`: `Name` derives from the event stored in `field`;
///   it inherits the parent's cancellable capability.
/// - `event!(Name: Parent => field, cancellable(flags))`: as above, but `Name` is cancellable
///   through its own `flags` field whatever the parent is. Use it to make a cancellable
///   event from a plain one.
///
/// ```
/// use tiered_bus::event::Event;
///
/// struct Tick;
/// tiered_bus::event!(Tick);
///
/// assert!(!Tick::is_cancellable_type());
/// ```
#[macro_export]
macro_rules! event {
    ($name:ident : $parent:ty => $field:ident, cancellable($flags:ident)) => {
        impl $crate::event::Event for $name {
            fn event_type(&self) -> $crate::event::EventType {
                $crate::event::EventType::of::<Self>()
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            fn parent(&self) -> ::core::option::Option<&dyn $crate::event::Event> {
                ::core::option::Option::Some(&self.$field)
            }

            fn parent_mut(&mut self) -> ::core::option::Option<&mut dyn $crate::event::Event> {
                ::core::option::Option::Some(&mut self.$field)
            }

            fn cancellable(&self) -> ::core::option::Option<&dyn $crate::event::Cancellable> {
                ::core::option::Option::Some(&self.$flags)
            }

            fn cancellable_mut(
                &mut self,
            ) -> ::core::option::Option<&mut dyn $crate::event::Cancellable> {
                ::core::option::Option::Some(&mut self.$flags)
            }

            fn is_cancellable_type() -> bool {
                true
            }
        }
    };
    ($name:ident : $parent:ty => $field:ident) => {
        impl $crate::event::Event for $name {
            fn event_type(&self) -> $crate::event::EventType {
                $crate::event::EventType::of::<Self>()
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            fn parent(&self) -> ::core::option::Option<&dyn $crate::event::Event> {
                ::core::option::Option::Some(&self.$field)
            }

            fn parent_mut(&mut self) -> ::core::option::Option<&mut dyn $crate::event::Event> {
                ::core::option::Option::Some(&mut self.$field)
            }

            fn cancellable(&self) -> ::core::option::Option<&dyn $crate::event::Cancellable> {
                $crate::event::Event::cancellable(&self.$field)
            }

            fn cancellable_mut(
                &mut self,
            ) -> ::core::option::Option<&mut dyn $crate::event::Cancellable> {
                $crate::event::Event::cancellable_mut(&mut self.$field)
            }

            fn is_cancellable_type() -> bool {
                <$parent as $crate::event::Event>::is_cancellable_type()
            }
        }
    };
    ($name:ident, cancellable($field:ident)) => {
        impl $crate::event::Event for $name {
            fn event_type(&self) -> $crate::event::EventType {
                $crate::event::EventType::of::<Self>()
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            fn cancellable(&self) -> ::core::option::Option<&dyn $crate::event::Cancellable> {
                ::core::option::Option::Some(&self.$field)
            }

            fn cancellable_mut(
                &mut self,
            ) -> ::core::option::Option<&mut dyn $crate::event::Cancellable> {
                ::core::option::Option::Some(&mut self.$field)
            }

            fn is_cancellable_type() -> bool {
                true
            }
        }
    };
    ($name:ident, cancellable) => {
        impl $crate::event::Event for $name {
            fn event_type(&self) -> $crate::event::EventType {
                $crate::event::EventType::of::<Self>()
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            fn cancellable(&self) -> ::core::option::Option<&dyn $crate::event::Cancellable> {
                ::core::option::Option::Some(self)
            }

            fn cancellable_mut(
                &mut self,
            ) -> ::core::option::Option<&mut dyn $crate::event::Cancellable> {
                ::core::option::Option::Some(self)
            }

            fn is_cancellable_type() -> bool {
                true
            }
        }
    };
    ($name:ident) => {
        impl $crate::event::Event for $name {
            fn event_type(&self) -> $crate::event::EventType {
                $crate::event::EventType::of::<Self>()
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }
        }
    };
}
