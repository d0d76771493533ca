// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Listeners and their registration entries.

use core::any::{Any, TypeId, type_name};
use std::sync::{Arc, Weak};

use crate::handler::HandlerTable;
use crate::index::HandlerIndex;

/// A type whose methods receive events.
///
/// Implementors list their handlers in [`Listener::declare`]. The declaration is
/// read once per listener type and cached; it must not depend on instance state.
///
/// Handlers receive `&self`, so listeners that record state use interior mutability.
pub trait Listener: Any + Send + Sync {
    /// Declare this type's handlers, in the order they should run within a tier.
    fn declare(handlers: &mut HandlerTable<Self>)
    where
        Self: Sized;
}

/// Identity of a listener type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ListenerType {
    id: TypeId,
    name: &'static str,
}

impl ListenerType {
    /// Describe the listener type `L`.
    pub fn of<L: Listener>() -> Self {
        Self {
            id: TypeId::of::<L>(),
            name: type_name::<L>(),
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
}

/// A registered listener instance paired with its type's handler index.
///
/// The bus only holds a weak reference; the caller owns the listener.
#[derive(Clone, Debug)]
pub(crate) struct ListenerEntry {
    listener: Weak<dyn Any + Send + Sync>,
    index: Arc<HandlerIndex>,
}

impl ListenerEntry {
    pub(crate) fn new<L: Listener>(listener: &Arc<L>, index: Arc<HandlerIndex>) -> Self {
        let listener: Arc<dyn Any + Send + Sync> = listener.clone();
        Self {
            listener: Arc::downgrade(&listener),
            index,
        }
    }

    /// The listener, unless it has been dropped.
    pub(crate) fn listener(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.listener.upgrade()
    }

    pub(crate) fn index(&self) -> &HandlerIndex {
        &self.index
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.listener.strong_count() > 0
    }

    /// Whether this entry refers to the same allocation as `listener`.
    pub(crate) fn is<L: Listener>(&self, listener: &Arc<L>) -> bool {
        core::ptr::addr_eq(self.listener.as_ptr(), Arc::as_ptr(listener))
    }

    pub(crate) fn is_type(&self, ty: ListenerType) -> bool {
        self.index.listener() == ty
    }
}
