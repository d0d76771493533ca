// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handler declarations and descriptors.
//!
//! ## Overview
//!
//! A listener type declares its handlers once, in [`Listener::declare`](crate::listener::Listener::declare),
//! by filling a [`HandlerTable`]. Each entry names a method, the event type it accepts, its
//! [`HandlerOptions`], and the callable that runs it.
//!
//! Discovery ([`HandlerSet`](crate::index::HandlerSet)) turns those entries into immutable
//! [`HandlerDescriptor`]s. Preferences are read there, once, and never again during dispatch.
//!
//! ## Defaults
//!
//! - priority: [`Priority::Normal`]
//! - derivatives handled: yes
//! - cancelled events ignored: no

use core::any::{Any, type_name};
use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

use crate::event::{Event, EventType};
use crate::listener::{Listener, ListenerType};
use crate::priority::Priority;

/// What a handler returns. Any error aborts the fire that invoked it.
pub type HandlerResult = anyhow::Result<()>;

pub(crate) type Invoker = Arc<dyn Fn(&dyn Any, &mut dyn Any) -> HandlerResult + Send + Sync>;

bitflags::bitflags! {
    /// Boolean handler preferences.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HandlerFlags: u8 {
        /// Also receive events whose runtime type derives from the declared type.
        const HANDLE_DERIVATIVES = 0b0000_0001;
        /// Skip the handler once the event is cancelled.
        const IGNORE_CANCELLED   = 0b0000_0010;
    }
}

impl Default for HandlerFlags {
    fn default() -> Self {
        Self::HANDLE_DERIVATIVES
    }
}

/// Declared preferences of one handler.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HandlerOptions {
    /// Dispatch tier.
    pub priority: Priority,
    /// Derivative matching and cancellation preferences.
    pub flags: HandlerFlags,
}

/// One declared handler method, as listed by a [`HandlerTable`].
#[derive(Clone)]
pub struct HandlerMethod {
    name: &'static str,
    param: EventType,
    options: HandlerOptions,
    invoke: Invoker,
}

impl HandlerMethod {
    /// Method name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The event type of the method's single parameter.
    pub fn param(&self) -> EventType {
        self.param
    }

    /// Declared preferences.
    pub fn options(&self) -> HandlerOptions {
        self.options
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("param", &self.param.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Handler declarations of one listener type, in declaration order.
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use tiered_bus::handler::{HandlerResult, HandlerTable};
/// use tiered_bus::listener::Listener;
/// use tiered_bus::priority::Priority;
///
/// struct Joined;
/// tiered_bus::event!(Joined);
///
/// #[derive(Default)]
/// struct Greeter {
///     greeted: AtomicU32,
/// }
///
/// impl Greeter {
///     fn greet(&self, _event: &mut Joined) -> HandlerResult {
///         self.greeted.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
///
/// impl Listener for Greeter {
///     fn declare(handlers: &mut HandlerTable<Self>) {
///         handlers.on("greet", Self::greet).priority(Priority::High);
///     }
/// }
///
/// let mut table = HandlerTable::<Greeter>::new();
/// Greeter::declare(&mut table);
/// assert_eq!(table.methods().len(), 1);
/// assert_eq!(table.methods()[0].options().priority, Priority::High);
/// ```
pub struct HandlerTable<L> {
    methods: Vec<HandlerMethod>,
    _listener: PhantomData<fn(&L)>,
}

impl<L> HandlerTable<L> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
            _listener: PhantomData,
        }
    }

    /// Declared methods, in declaration order.
    pub fn methods(&self) -> &[HandlerMethod] {
        &self.methods
    }
}

impl<L: Listener> HandlerTable<L> {
    /// Declare `handler` as the method `name`, accepting events of type `E`.
    ///
    /// The returned [`HandlerDecl`] adjusts the method's preferences.
    pub fn on<E, F>(&mut self, name: &'static str, handler: F) -> HandlerDecl<'_>
    where
        E: Event,
        F: Fn(&L, &mut E) -> HandlerResult + Send + Sync + 'static,
    {
        let invoke: Invoker = Arc::new(move |listener: &dyn Any, event: &mut dyn Any| {
            let Some(listener) = listener.downcast_ref::<L>() else {
                anyhow::bail!("listener is not a `{}`", type_name::<L>());
            };
            let Some(event) = event.downcast_mut::<E>() else {
                anyhow::bail!("event is not a `{}`", type_name::<E>());
            };
            handler(listener, event)
        });
        self.methods.push(HandlerMethod {
            name,
            param: EventType::of::<E>(),
            options: HandlerOptions::default(),
            invoke,
        });
        let last = self.methods.len() - 1;
        HandlerDecl {
            options: &mut self.methods[last].options,
        }
    }
}

impl<L> Default for HandlerTable<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> fmt::Debug for HandlerTable<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("listener", &type_name::<L>())
            .field("methods", &self.methods)
            .finish()
    }
}

/// Preference builder returned by [`HandlerTable::on`].
#[derive(Debug)]
pub struct HandlerDecl<'a> {
    options: &'a mut HandlerOptions,
}

impl HandlerDecl<'_> {
    /// Set the dispatch tier.
    pub fn priority(self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    /// Choose whether events deriving from the declared type are delivered too.
    pub fn handle_derivatives(self, handle: bool) -> Self {
        self.options
            .flags
            .set(HandlerFlags::HANDLE_DERIVATIVES, handle);
        self
    }

    /// Only deliver events whose runtime type is exactly the declared type.
    pub fn exact(self) -> Self {
        self.handle_derivatives(false)
    }

    /// Skip this handler for events that are already cancelled.
    pub fn ignore_cancelled(self) -> Self {
        self.ignore_cancelled_if(true)
    }

    /// Set whether this handler skips cancelled events.
    pub fn ignore_cancelled_if(self, ignore: bool) -> Self {
        self.options.flags.set(HandlerFlags::IGNORE_CANCELLED, ignore);
        self
    }

    /// Preferences declared so far.
    pub fn options(&self) -> HandlerOptions {
        *self.options
    }
}

/// Immutable record of one discovered handler.
#[derive(Clone)]
pub struct HandlerDescriptor {
    listener: ListenerType,
    name: &'static str,
    event: EventType,
    priority: Priority,
    flags: HandlerFlags,
    invoke: Invoker,
}

impl HandlerDescriptor {
    pub(crate) fn new(listener: ListenerType, method: &HandlerMethod) -> Self {
        Self {
            listener,
            name: method.name,
            event: method.param,
            priority: method.options.priority,
            flags: method.options.flags,
            invoke: Arc::clone(&method.invoke),
        }
    }

    /// The declaring listener type.
    pub fn listener(&self) -> ListenerType {
        self.listener
    }

    /// Method name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared event type.
    pub fn event_type(&self) -> EventType {
        self.event
    }

    /// Dispatch tier.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Raw preference flags.
    pub fn flags(&self) -> HandlerFlags {
        self.flags
    }

    /// Whether derived events are delivered.
    #[inline]
    pub fn handles_derivatives(&self) -> bool {
        self.flags.contains(HandlerFlags::HANDLE_DERIVATIVES)
    }

    /// Whether cancelled events are skipped.
    #[inline]
    pub fn ignores_cancelled(&self) -> bool {
        self.flags.contains(HandlerFlags::IGNORE_CANCELLED)
    }

    /// Whether `event` passes this handler's type-match rule.
    pub fn accepts(&self, event: &dyn Event) -> bool {
        if self.handles_derivatives() {
            event.is_instance_of(&self.event)
        } else {
            event.event_type() == self.event
        }
    }

    /// Borrow `event` as this handler's declared type, if it passes the type-match rule.
    pub fn view<'e>(&self, event: &'e mut dyn Event) -> Option<&'e mut dyn Any> {
        if self.handles_derivatives() {
            event.view_mut(&self.event)
        } else if event.event_type() == self.event {
            Some(event.as_any_mut())
        } else {
            None
        }
    }

    pub(crate) fn invoke(&self, listener: &dyn Any, event: &mut dyn Any) -> HandlerResult {
        (self.invoke)(listener, event)
    }
}

impl fmt::Display for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.listener.name(),
            self.name,
            self.event.name()
        )
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("listener", &self.listener.name())
            .field("name", &self.name)
            .field("event", &self.event.name())
            .field("priority", &self.priority)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
