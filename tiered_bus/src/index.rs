// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handler discovery and the per-type handler index.
//!
//! ## Overview
//!
//! A [`HandlerIndex`] holds the handlers of one listener type, split into two disjoint
//! [`HandlerSet`]s by [`Partition`]: handlers whose declared event type is cancellable,
//! and handlers whose declared event type is not. A fire consults only the set matching
//! the event, so the cancellation checks never run for events that cannot be cancelled.
//!
//! ## Discovery
//!
//! Scanning walks the listener's declared methods in declaration order, keeps those whose
//! parameter belongs to the set's partition, captures each as a [`HandlerDescriptor`], and
//! stable-sorts the result by [`Priority`]. Equal tiers keep declaration order.
//! Tier boundaries are located once, so dispatch reads each tier as a contiguous slice.
//!
//! A set is scanned exactly once. Scanning it again fails with
//! [`Error::AlreadyScanned`] and leaves the set untouched.
//!
//! ## Caching
//!
//! [`IndexCache`] memoizes one index per listener type. Concurrent first use of a type
//! may build the index more than once; the first insert wins and every caller gets that one.

use core::any::TypeId;
use core::fmt;
use core::ops::Range;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::event::{Event, EventType};
use crate::handler::{HandlerDescriptor, HandlerMethod, HandlerTable};
use crate::listener::{Listener, ListenerType};
use crate::priority::Priority;

/// Which of a listener's two handler sets an event type belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Partition {
    /// Handlers for event types without the cancellable capability.
    Regular,
    /// Handlers for cancellable event types.
    Cancellable,
}

impl Partition {
    /// The partition of a declared event type.
    #[inline]
    pub fn of_type(ty: &EventType) -> Self {
        if ty.is_cancellable() {
            Self::Cancellable
        } else {
            Self::Regular
        }
    }

    /// The partition of a runtime event.
    #[inline]
    pub fn of_event(event: &dyn Event) -> Self {
        if event.is_cancellable() {
            Self::Cancellable
        } else {
            Self::Regular
        }
    }

    /// Returns `true` for [`Partition::Cancellable`].
    #[inline]
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Cancellable)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regular => "regular",
            Self::Cancellable => "cancellable",
        })
    }
}

/// Priority-sorted handlers of one listener type for one [`Partition`].
pub struct HandlerSet {
    listener: ListenerType,
    partition: Partition,
    handlers: Option<Box<[HandlerDescriptor]>>,
    tiers: [Range<usize>; Priority::COUNT],
}

impl HandlerSet {
    /// Create an unscanned set.
    pub fn new(listener: ListenerType, partition: Partition) -> Self {
        Self {
            listener,
            partition,
            handlers: None,
            tiers: core::array::from_fn(|_| 0..0),
        }
    }

    /// Create a set and scan `methods` into it.
    pub fn scanned(listener: ListenerType, partition: Partition, methods: &[HandlerMethod]) -> Self {
        let mut set = Self::new(listener, partition);
        set.fill(methods);
        set
    }

    /// Discover the handlers in `methods` that belong to this set.
    ///
    /// Fails with [`Error::AlreadyScanned`] if the set was scanned before; the set is not modified.
    pub fn scan(&mut self, methods: &[HandlerMethod]) -> Result<()> {
        if self.was_scanned() {
            return Err(Error::AlreadyScanned {
                listener: self.listener.name(),
                partition: self.partition,
            });
        }
        self.fill(methods);
        Ok(())
    }

    fn fill(&mut self, methods: &[HandlerMethod]) {
        let listener = self.listener;
        let partition = self.partition;
        let mut handlers: Vec<HandlerDescriptor> = methods
            .iter()
            .filter(|m| Partition::of_type(&m.param()) == partition)
            .map(|m| HandlerDescriptor::new(listener, m))
            .collect();
        // `sort_by_key` is stable: equal tiers keep declaration order.
        handlers.sort_by_key(HandlerDescriptor::priority);

        for p in Priority::ALL {
            let start = handlers.partition_point(|h| h.priority() < p);
            let end = handlers.partition_point(|h| h.priority() <= p);
            self.tiers[p.index()] = start..end;
        }
        self.handlers = Some(handlers.into_boxed_slice());
    }

    /// Whether this set has been scanned.
    pub fn was_scanned(&self) -> bool {
        self.handlers.is_some()
    }

    /// The listener type this set belongs to.
    pub fn listener(&self) -> ListenerType {
        self.listener
    }

    /// The partition this set admits.
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// All handlers, in dispatch order. Empty before the set is scanned.
    pub fn handlers(&self) -> &[HandlerDescriptor] {
        self.handlers.as_deref().unwrap_or(&[])
    }

    /// The contiguous run of handlers in tier `priority`.
    pub fn tier(&self, priority: Priority) -> &[HandlerDescriptor] {
        &self.handlers()[self.tiers[priority.index()].clone()]
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers().len()
    }

    /// Whether the set holds no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers().is_empty()
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("listener", &self.listener.name())
            .field("partition", &self.partition)
            .field("handlers", &self.handlers)
            .field("tiers", &self.tiers)
            .finish()
    }
}

/// Both handler sets of one listener type.
#[derive(Debug)]
pub struct HandlerIndex {
    listener: ListenerType,
    regular: HandlerSet,
    cancellable: HandlerSet,
}

impl HandlerIndex {
    /// Read `L`'s declarations and scan them into a new index.
    pub fn build<L: Listener>() -> Self {
        let mut table = HandlerTable::<L>::new();
        L::declare(&mut table);
        Self::from_table(&table)
    }

    /// Scan an already filled declaration table.
    pub fn from_table<L: Listener>(table: &HandlerTable<L>) -> Self {
        let listener = ListenerType::of::<L>();
        let methods = table.methods();
        let index = Self {
            listener,
            regular: HandlerSet::scanned(listener, Partition::Regular, methods),
            cancellable: HandlerSet::scanned(listener, Partition::Cancellable, methods),
        };
        tracing::debug!(
            listener = listener.name(),
            regular = index.regular.len(),
            cancellable = index.cancellable.len(),
            "built handler index"
        );
        index
    }

    /// The listener type this index describes.
    pub fn listener(&self) -> ListenerType {
        self.listener
    }

    /// The handler set for `partition`.
    #[inline]
    pub fn handlers(&self, partition: Partition) -> &HandlerSet {
        match partition {
            Partition::Regular => &self.regular,
            Partition::Cancellable => &self.cancellable,
        }
    }

    /// Total number of handlers across both sets.
    pub fn len(&self) -> usize {
        self.regular.len() + self.cancellable.len()
    }

    /// Whether the listener type declares no handlers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memoized [`HandlerIndex`]es, one per listener type.
///
/// Share one cache between several buses with [`Bus::with_cache`](crate::bus::Bus::with_cache)
/// to pay discovery once per type across all of them.
#[derive(Default)]
pub struct IndexCache {
    indexes: Mutex<HashMap<TypeId, Arc<HandlerIndex>>>,
}

impl IndexCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The index for `L`, building it on first use.
    pub fn get_or_build<L: Listener>(&self) -> Arc<HandlerIndex> {
        let id = TypeId::of::<L>();
        let cached = self.indexes.lock().get(&id).cloned();
        if let Some(index) = cached {
            return index;
        }
        // Built outside the lock: `declare` is user code.
        let built = Arc::new(HandlerIndex::build::<L>());
        let mut indexes = self.indexes.lock();
        Arc::clone(indexes.entry(id).or_insert(built))
    }

    /// Whether an index for `L` has been built.
    pub fn contains<L: Listener>(&self) -> bool {
        self.indexes.lock().contains_key(&TypeId::of::<L>())
    }

    /// Number of cached listener types.
    pub fn len(&self) -> usize {
        self.indexes.lock().len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.indexes.lock().is_empty()
    }
}

impl fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCache")
            .field("listener_types", &self.len())
            .finish_non_exhaustive()
    }
}
