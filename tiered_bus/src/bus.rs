// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dispatcher.
//!
//! ## Overview
//!
//! A [`Bus`] keeps an ordered list of registered listeners and fires events at them.
//! Registration pairs the listener with its type's [`HandlerIndex`], built once per type.
//!
//! ## Firing
//!
//! For each [`Priority`] tier in ascending order, for each registered listener in
//! registration order, for each of that listener's handlers in the tier (declaration order):
//!
//! 1. Cancellable events only: skip when the event is cancelled and the handler ignores cancelled events.
//! 2. Cancellable events only: skip when propagation is stopped, unless the tier is [`Priority::Monitor`].
//! 3. Skip unless the event's runtime type is the declared type, or derives from it when
//!    the handler handles derivatives.
//! 4. Invoke.
//!
//! The flags are read again before every handler, so a handler sees the state left by the one before it.
//! A handler error abandons the rest of the fire, monitor tier included, and is returned as
//! [`Error::HandlerInvocationFailure`]. Panics are not caught; they unwind through the fire.
//!
//! ## Concurrency
//!
//! Registration and firing may happen from several threads. A fire works on a snapshot of the
//! registration list taken under a short read lock; no lock is held while handlers run, so a
//! handler may register or unregister listeners. Such changes apply from the next fire.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use tiered_bus::bus::Bus;
//! use tiered_bus::event::{Cancellable, Cancellation};
//! use tiered_bus::handler::{HandlerResult, HandlerTable};
//! use tiered_bus::listener::Listener;
//! use tiered_bus::priority::Priority;
//!
//! #[derive(Default)]
//! struct Withdraw {
//!     amount: u64,
//!     flags: Cancellation,
//! }
//! tiered_bus::event!(Withdraw, cancellable(flags));
//!
//! #[derive(Default)]
//! struct Limits {
//!     audited: AtomicBool,
//! }
//!
//! impl Limits {
//!     fn check(&self, event: &mut Withdraw) -> HandlerResult {
//!         if event.amount > 100 {
//!             event.flags.cancel();
//!         }
//!         Ok(())
//!     }
//!
//!     fn audit(&self, _event: &mut Withdraw) -> HandlerResult {
//!         self.audited.store(true, Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//!
//! impl Listener for Limits {
//!     fn declare(handlers: &mut HandlerTable<Self>) {
//!         handlers.on("check", Self::check).priority(Priority::High);
//!         handlers.on("audit", Self::audit).priority(Priority::Monitor);
//!     }
//! }
//!
//! let bus = Bus::new();
//! let limits = Arc::new(Limits::default());
//! bus.register(&limits);
//!
//! let event = bus.fire(Withdraw { amount: 500, ..Withdraw::default() }).unwrap();
//! assert!(event.flags.is_cancelled());
//! assert!(limits.audited.load(Ordering::Relaxed));
//! ```

use core::any::type_name;
use core::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::index::{HandlerIndex, IndexCache, Partition};
use crate::listener::{Listener, ListenerEntry, ListenerType};
use crate::priority::Priority;

/// What [`Bus::register`] does with an instance that is already registered.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DuplicatePolicy {
    /// Add another entry; the instance then receives each event once per entry.
    #[default]
    Allow,
    /// Keep the existing entry and do nothing.
    Ignore,
}

/// In-process event dispatcher.
///
/// ## Usage
///
/// - Construct with [`Bus::new`], or with [`Bus::with_cache`] to share discovered handler
///   indexes with other buses.
/// - Optionally set a [`DuplicatePolicy`] with [`Bus::set_duplicate_policy`].
/// - [`Bus::register`] listeners, then [`Bus::fire`] events.
///
/// The bus holds listeners weakly: dropping the last `Arc` of a listener ends its
/// subscription without an explicit [`Bus::unregister`].
pub struct Bus {
    entries: RwLock<Arc<Vec<ListenerEntry>>>,
    cache: Arc<IndexCache>,
    duplicates: DuplicatePolicy,
}

impl Bus {
    /// Create a bus with its own index cache.
    pub fn new() -> Self {
        Self::with_cache(Arc::new(IndexCache::new()))
    }

    /// Create a bus that takes handler indexes from `cache`.
    pub fn with_cache(cache: Arc<IndexCache>) -> Self {
        Self {
            entries: RwLock::new(Arc::default()),
            cache,
            duplicates: DuplicatePolicy::default(),
        }
    }

    /// Set how repeated registration of the same instance is handled.
    pub fn set_duplicate_policy(&mut self, policy: DuplicatePolicy) {
        self.duplicates = policy;
    }

    /// The current duplicate policy.
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicates
    }

    /// The index cache this bus draws from.
    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    /// Register `listener`. Returns the bus for chaining.
    ///
    /// The handler index for `L` is built on the first registration of that type and reused after.
    pub fn register<L: Listener>(&self, listener: &Arc<L>) -> &Self {
        let index = self.cache.get_or_build::<L>();
        let mut guard = self.entries.write();
        let entries = Arc::make_mut(&mut *guard);
        entries.retain(ListenerEntry::is_alive);
        if self.duplicates == DuplicatePolicy::Ignore && entries.iter().any(|e| e.is(listener)) {
            tracing::debug!(
                listener = type_name::<L>(),
                "listener already registered, ignored"
            );
            return self;
        }
        entries.push(ListenerEntry::new(listener, index));
        tracing::debug!(
            listener = type_name::<L>(),
            entries = entries.len(),
            "registered listener"
        );
        self
    }

    /// Remove every entry for this instance. Returns how many were removed.
    pub fn unregister<L: Listener>(&self, listener: &Arc<L>) -> usize {
        self.remove_where(|e| e.is(listener))
    }

    /// Remove every registered instance of `L`. Returns how many were removed.
    pub fn unregister_type<L: Listener>(&self) -> usize {
        self.unregister_listener_type(ListenerType::of::<L>())
    }

    /// Remove every registered instance of the listener type `ty`. Returns how many were removed.
    pub fn unregister_listener_type(&self, ty: ListenerType) -> usize {
        self.remove_where(|e| e.is_type(ty))
    }

    fn remove_where(&self, matches: impl Fn(&ListenerEntry) -> bool) -> usize {
        let mut guard = self.entries.write();
        let removed = guard
            .iter()
            .filter(|e| e.is_alive() && matches(e))
            .count();
        let stale = guard.iter().any(|e| !e.is_alive());
        if removed == 0 && !stale {
            return 0;
        }
        Arc::make_mut(&mut *guard).retain(|e| e.is_alive() && !matches(e));
        tracing::debug!(removed, entries = guard.len(), "unregistered listeners");
        removed
    }

    /// Whether this instance is registered.
    pub fn is_registered<L: Listener>(&self, listener: &Arc<L>) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.is_alive() && e.is(listener))
    }

    /// Number of live registration entries.
    pub fn len(&self) -> usize {
        self.entries.read().iter().filter(|e| e.is_alive()).count()
    }

    /// Whether no live listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all registrations.
    pub fn clear(&self) {
        *self.entries.write() = Arc::default();
    }

    /// Fire `event` and hand it back, possibly modified by handlers.
    ///
    /// Only errors returned by handlers become [`Error::HandlerInvocationFailure`].
    /// A panicking handler unwinds through `fire` unwrapped.
    pub fn fire<E: Event>(&self, mut event: E) -> Result<E> {
        self.fire_dyn(&mut event)?;
        Ok(event)
    }

    /// Fire a type-erased event in place.
    ///
    /// Same semantics as [`Bus::fire`], panics included.
    pub fn fire_dyn(&self, event: &mut dyn Event) -> Result<()> {
        let entries = Arc::clone(&*self.entries.read());
        let event_type = event.event_type();
        let partition = Partition::of_event(event);
        let _span = tracing::trace_span!("fire", event = event_type.name(), %partition).entered();

        for priority in Priority::ALL {
            for entry in entries.iter() {
                let handlers = entry.index().handlers(partition).tier(priority);
                if handlers.is_empty() {
                    continue;
                }
                let Some(listener) = entry.listener() else {
                    continue;
                };
                for handler in handlers {
                    if let Some(flags) = event.cancellable() {
                        if flags.is_cancelled() && handler.ignores_cancelled() {
                            continue;
                        }
                        if flags.is_propagation_stopped() && !priority.is_monitor() {
                            continue;
                        }
                    }
                    let Some(view) = handler.view(event) else {
                        continue;
                    };
                    tracing::trace!(handler = %handler, %priority, "invoking handler");
                    if let Err(source) = handler.invoke(&*listener, view) {
                        return Err(Error::HandlerInvocationFailure {
                            handler: handler.to_string(),
                            event: event_type.name(),
                            source,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// The handler index registered for `L`, if `L` has been registered on this bus's cache.
    pub fn index_of<L: Listener>(&self) -> Option<Arc<HandlerIndex>> {
        self.cache
            .contains::<L>()
            .then(|| self.cache.get_or_build::<L>())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("entries", &self.len())
            .field("duplicates", &self.duplicates)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Cancellable, Cancellation};
    use crate::handler::{HandlerResult, HandlerTable};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Ping {
        hops: u32,
    }
    crate::event!(Ping);

    #[derive(Default)]
    struct PingChild {
        base: Ping,
    }
    crate::event!(PingChild: Ping => base);

    #[derive(Default)]
    struct Guarded {
        flags: Cancellation,
        monitored: bool,
    }
    crate::event!(Guarded, cancellable(flags));

    #[derive(Default)]
    struct GuardedChild {
        base: Guarded,
    }
    crate::event!(GuardedChild: Guarded => base);

    #[derive(Default)]
    struct Urgent {
        base: Ping,
        flags: Cancellation,
    }
    crate::event!(Urgent: Ping => base, cancellable(flags));

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<&'static str>>>);

    impl Log {
        fn push(&self, entry: &'static str) {
            self.0.lock().push(entry);
        }

        fn take(&self) -> Vec<&'static str> {
            core::mem::take(&mut *self.0.lock())
        }
    }

    struct Tiers {
        log: Log,
    }

    impl Listener for Tiers {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("monitor", |l: &Self, _: &mut Ping| {
                l.log.push("tiers.monitor");
                Ok(())
            })
            .priority(Priority::Monitor);
            h.on("high", |l: &Self, _: &mut Ping| {
                l.log.push("tiers.high");
                Ok(())
            })
            .priority(Priority::High);
            h.on("low", |l: &Self, _: &mut Ping| {
                l.log.push("tiers.low");
                Ok(())
            })
            .priority(Priority::Low);
        }
    }

    struct Normals {
        log: Log,
    }

    impl Listener for Normals {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("first", |l: &Self, _: &mut Ping| {
                l.log.push("normals.first");
                Ok(())
            });
            h.on("low", |l: &Self, _: &mut Ping| {
                l.log.push("normals.low");
                Ok(())
            })
            .priority(Priority::Low);
            h.on("second", |l: &Self, _: &mut Ping| {
                l.log.push("normals.second");
                Ok(())
            });
        }
    }

    /// Stops propagation at NORMAL; HIGH must never run; MONITOR marks the event.
    struct Stopper;

    impl Listener for Stopper {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("propagation_stopper", |_: &Self, e: &mut Guarded| {
                if e.flags.is_propagation_stopped() {
                    return Err(anyhow::anyhow!("propagation already stopped"));
                }
                e.flags.set_propagation_stopped(true);
                Ok(())
            });
            h.on("second_propagation", |_: &Self, e: &mut Guarded| {
                Err(anyhow::anyhow!(
                    "propagation should have been stopped; flag: {}",
                    e.flags.is_propagation_stopped()
                ))
            })
            .priority(Priority::High);
            h.on("monitor", |_: &Self, e: &mut Guarded| {
                e.monitored = true;
                Ok(())
            })
            .priority(Priority::Monitor);
        }
    }

    struct Watcher {
        log: Log,
    }

    impl Listener for Watcher {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("lowest", |l: &Self, _: &mut Guarded| {
                l.log.push("watcher.lowest");
                Ok(())
            })
            .priority(Priority::Lowest);
            h.on("normal", |l: &Self, _: &mut Guarded| {
                l.log.push("watcher.normal");
                Ok(())
            });
            h.on("highest", |l: &Self, _: &mut Guarded| {
                l.log.push("watcher.highest");
                Ok(())
            })
            .priority(Priority::Highest);
            h.on("monitor", |l: &Self, _: &mut Guarded| {
                l.log.push("watcher.monitor");
                Ok(())
            })
            .priority(Priority::Monitor);
        }
    }

    struct Canceller {
        log: Log,
    }

    impl Listener for Canceller {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("lowest_picky", |l: &Self, _: &mut Guarded| {
                l.log.push("lowest_picky");
                Ok(())
            })
            .priority(Priority::Lowest)
            .ignore_cancelled();
            h.on("cancel", |l: &Self, e: &mut Guarded| {
                l.log.push("cancel");
                e.flags.cancel();
                Ok(())
            })
            .priority(Priority::Low);
            h.on("normal_picky", |l: &Self, _: &mut Guarded| {
                l.log.push("normal_picky");
                Ok(())
            })
            .ignore_cancelled();
            h.on("normal_tolerant", |l: &Self, _: &mut Guarded| {
                l.log.push("normal_tolerant");
                Ok(())
            });
            h.on("monitor_picky", |l: &Self, _: &mut Guarded| {
                l.log.push("monitor_picky");
                Ok(())
            })
            .priority(Priority::Monitor)
            .ignore_cancelled();
            h.on("monitor", |l: &Self, _: &mut Guarded| {
                l.log.push("monitor");
                Ok(())
            })
            .priority(Priority::Monitor);
        }
    }

    /// Cancels at LOW and revives at NORMAL.
    struct Reviver {
        log: Log,
    }

    impl Listener for Reviver {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("cancel", |_: &Self, e: &mut Guarded| {
                e.flags.cancel();
                Ok(())
            })
            .priority(Priority::Low);
            h.on("revive", |_: &Self, e: &mut Guarded| {
                e.flags.set_cancelled(false);
                Ok(())
            });
            h.on("high_picky", |l: &Self, _: &mut Guarded| {
                l.log.push("high_picky");
                Ok(())
            })
            .priority(Priority::High)
            .ignore_cancelled();
        }
    }

    struct Exacting {
        log: Log,
    }

    impl Listener for Exacting {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("base_exact", |l: &Self, _: &mut Ping| {
                l.log.push("base_exact");
                Ok(())
            })
            .exact();
            h.on("base_any", |l: &Self, e: &mut Ping| {
                l.log.push("base_any");
                e.hops += 1;
                Ok(())
            });
            h.on("child_exact", |l: &Self, _: &mut PingChild| {
                l.log.push("child_exact");
                Ok(())
            })
            .exact();
        }
    }

    struct Mixed {
        log: Log,
    }

    impl Listener for Mixed {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("ping", |l: &Self, _: &mut Ping| {
                l.log.push("mixed.ping");
                Ok(())
            });
            h.on("guarded", |l: &Self, _: &mut Guarded| {
                l.log.push("mixed.guarded");
                Ok(())
            });
        }
    }

    struct Escalation {
        log: Log,
    }

    impl Listener for Escalation {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("ping", |l: &Self, e: &mut Ping| {
                l.log.push("escalation.ping");
                e.hops += 1;
                Ok(())
            });
            h.on("urgent", |l: &Self, e: &mut Urgent| {
                l.log.push("escalation.urgent");
                e.flags.cancel();
                Ok(())
            })
            .priority(Priority::Low);
            h.on("urgent_picky", |l: &Self, _: &mut Urgent| {
                l.log.push("escalation.urgent_picky");
                Ok(())
            })
            .ignore_cancelled();
            h.on("urgent_monitor", |l: &Self, _: &mut Urgent| {
                l.log.push("escalation.urgent_monitor");
                Ok(())
            })
            .priority(Priority::Monitor);
        }
    }

    struct Panicky;

    impl Listener for Panicky {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("explode", |_: &Self, _: &mut Ping| -> HandlerResult {
                panic!("handler panicked");
            });
        }
    }

    struct Faulty {
        log: Log,
    }

    impl Listener for Faulty {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("explode", |_: &Self, _: &mut Ping| Err(anyhow::anyhow!("boom")))
                .priority(Priority::Low);
            h.on("after", |l: &Self, _: &mut Ping| {
                l.log.push("faulty.after");
                Ok(())
            })
            .priority(Priority::Low);
            h.on("monitor", |l: &Self, _: &mut Ping| {
                l.log.push("faulty.monitor");
                Ok(())
            })
            .priority(Priority::Monitor);
        }
    }

    struct Recruiter {
        bus: Arc<Bus>,
        recruit: Arc<Tiers>,
        log: Log,
    }

    impl Listener for Recruiter {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("recruit", |l: &Self, _: &mut Ping| {
                l.log.push("recruit");
                l.bus.register(&l.recruit);
                Ok(())
            })
            .priority(Priority::Lowest);
        }
    }

    #[derive(Default)]
    struct Counting {
        hits: AtomicUsize,
    }

    impl Listener for Counting {
        fn declare(h: &mut HandlerTable<Self>) {
            h.on("count", |l: &Self, _: &mut Ping| {
                l.hits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }
    }

    #[test]
    fn unregistered_listener_receives_nothing() {
        let log = Log::default();
        let bus = Bus::new();
        let tiers = Arc::new(Tiers { log: log.clone() });
        bus.register(&tiers);
        assert_eq!(bus.unregister(&tiers), 1);
        bus.fire(Ping::default()).unwrap();
        assert!(log.take().is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn tier_is_the_primary_order_across_listeners() {
        let log = Log::default();
        let bus = Bus::new();
        let tiers = Arc::new(Tiers { log: log.clone() });
        let normals = Arc::new(Normals { log: log.clone() });
        bus.register(&tiers).register(&normals);
        bus.fire(Ping::default()).unwrap();
        assert_eq!(
            log.take(),
            vec![
                "tiers.low",
                "normals.low",
                "normals.first",
                "normals.second",
                "tiers.high",
                "tiers.monitor",
            ]
        );
    }

    #[test]
    fn registration_order_breaks_ties_within_a_tier() {
        let log = Log::default();
        let bus = Bus::new();
        let tiers = Arc::new(Tiers { log: log.clone() });
        let normals = Arc::new(Normals { log: log.clone() });
        bus.register(&normals).register(&tiers);
        bus.fire(Ping::default()).unwrap();
        assert_eq!(
            log.take(),
            vec![
                "normals.low",
                "tiers.low",
                "normals.first",
                "normals.second",
                "tiers.high",
                "tiers.monitor",
            ]
        );
    }

    #[test]
    fn stop_propagation_still_reaches_monitor() {
        let bus = Bus::new();
        let stopper = Arc::new(Stopper);
        bus.register(&stopper);
        let event = bus.fire(Guarded::default()).unwrap();
        assert!(event.flags.is_propagation_stopped());
        assert!(!event.flags.is_cancelled());
        assert!(event.monitored);
    }

    #[test]
    fn stop_propagation_skips_later_handlers_of_every_listener() {
        let log = Log::default();
        let bus = Bus::new();
        let stopper = Arc::new(Stopper);
        let watcher = Arc::new(Watcher { log: log.clone() });
        bus.register(&stopper).register(&watcher);
        let event = bus.fire(Guarded::default()).unwrap();
        assert_eq!(log.take(), vec!["watcher.lowest", "watcher.monitor"]);
        assert!(event.monitored);
    }

    #[test]
    fn stopped_before_fire_only_reaches_monitor() {
        let log = Log::default();
        let bus = Bus::new();
        let watcher = Arc::new(Watcher { log: log.clone() });
        bus.register(&watcher);
        let mut event = Guarded::default();
        event.flags.stop_propagation();
        bus.fire(event).unwrap();
        assert_eq!(log.take(), vec!["watcher.monitor"]);
    }

    #[test]
    fn cancelled_only_skips_handlers_that_ignore_it() {
        let log = Log::default();
        let bus = Bus::new();
        let canceller = Arc::new(Canceller { log: log.clone() });
        bus.register(&canceller);
        let event = bus.fire(Guarded::default()).unwrap();
        assert_eq!(
            log.take(),
            vec!["lowest_picky", "cancel", "normal_tolerant", "monitor"]
        );
        assert!(event.flags.is_cancelled());
        assert!(!event.flags.is_propagation_stopped());
    }

    #[test]
    fn cancelled_before_fire_skips_from_the_start() {
        let log = Log::default();
        let bus = Bus::new();
        let canceller = Arc::new(Canceller { log: log.clone() });
        bus.register(&canceller);
        let mut event = Guarded::default();
        event.flags.cancel();
        bus.fire(event).unwrap();
        assert_eq!(log.take(), vec!["cancel", "normal_tolerant", "monitor"]);
    }

    #[test]
    fn cancellation_is_read_when_each_handler_is_reached() {
        let log = Log::default();
        let bus = Bus::new();
        let reviver = Arc::new(Reviver { log: log.clone() });
        bus.register(&reviver);
        let event = bus.fire(Guarded::default()).unwrap();
        assert_eq!(log.take(), vec!["high_picky"]);
        assert!(!event.flags.is_cancelled());
    }

    #[test]
    fn exact_handlers_ignore_derived_events() {
        let log = Log::default();
        let bus = Bus::new();
        let exacting = Arc::new(Exacting { log: log.clone() });
        bus.register(&exacting);

        let child = bus.fire(PingChild::default()).unwrap();
        assert_eq!(log.take(), vec!["base_any", "child_exact"]);
        assert_eq!(child.base.hops, 1);

        bus.fire(Ping::default()).unwrap();
        assert_eq!(log.take(), vec!["base_exact", "base_any"]);
    }

    #[test]
    fn partitions_keep_regular_and_cancellable_apart() {
        let log = Log::default();
        let bus = Bus::new();
        let mixed = Arc::new(Mixed { log: log.clone() });
        bus.register(&mixed);

        bus.fire(Ping::default()).unwrap();
        assert_eq!(log.take(), vec!["mixed.ping"]);
        bus.fire(Guarded::default()).unwrap();
        assert_eq!(log.take(), vec!["mixed.guarded"]);
    }

    #[test]
    fn derived_events_inherit_cancellation() {
        let log = Log::default();
        let bus = Bus::new();
        let stopper = Arc::new(Stopper);
        let watcher = Arc::new(Watcher { log: log.clone() });
        bus.register(&stopper).register(&watcher);
        let event = bus.fire(GuardedChild::default()).unwrap();
        assert!(event.base.flags.is_propagation_stopped());
        assert!(event.base.monitored);
        assert_eq!(log.take(), vec!["watcher.lowest", "watcher.monitor"]);
    }

    #[test]
    fn cancellable_child_skips_handlers_of_its_plain_parent() {
        let log = Log::default();
        let bus = Bus::new();
        let escalation = Arc::new(Escalation { log: log.clone() });
        bus.register(&escalation);

        let urgent = bus.fire(Urgent::default()).unwrap();
        assert_eq!(
            log.take(),
            vec!["escalation.urgent", "escalation.urgent_monitor"]
        );
        assert!(urgent.flags.is_cancelled());
        assert_eq!(urgent.base.hops, 0);

        let ping = bus.fire(Ping::default()).unwrap();
        assert_eq!(log.take(), vec!["escalation.ping"]);
        assert_eq!(ping.hops, 1);
    }

    #[test]
    fn handler_error_aborts_the_fire() {
        let log = Log::default();
        let bus = Bus::new();
        let tiers = Arc::new(Tiers { log: log.clone() });
        let faulty = Arc::new(Faulty { log: log.clone() });
        bus.register(&tiers).register(&faulty);

        let err = bus.fire(Ping::default()).unwrap_err();
        assert_eq!(log.take(), vec!["tiers.low"]);
        assert!(!err.is_already_scanned());

        let Error::HandlerInvocationFailure { handler, event, .. } = &err else {
            panic!("expected an invocation failure, got {err:?}");
        };
        assert!(handler.contains("Faulty::explode("));
        assert!(event.ends_with("Ping"));

        let message = err.to_string();
        assert!(message.contains("Faulty::explode("));
        assert!(message.contains("Ping"));

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "boom");
        assert_eq!(err.handler_error().unwrap().to_string(), "boom");
    }

    #[test]
    #[should_panic(expected = "handler panicked")]
    fn handler_panics_unwind_through_fire() {
        let bus = Bus::new();
        let panicky = Arc::new(Panicky);
        bus.register(&panicky);
        let _ = bus.fire(Ping::default());
    }

    #[test]
    fn firing_without_listeners_is_a_no_op() {
        let bus = Bus::new();
        let event = bus.fire(Ping { hops: 7 }).unwrap();
        assert_eq!(event.hops, 7);
        bus.fire(Guarded::default()).unwrap();
    }

    #[test]
    fn duplicate_registration_delivers_twice_by_default() {
        let log = Log::default();
        let bus = Bus::new();
        let tiers = Arc::new(Tiers { log: log.clone() });
        bus.register(&tiers).register(&tiers);
        assert_eq!(bus.len(), 2);
        bus.fire(Ping::default()).unwrap();
        assert_eq!(
            log.take(),
            vec![
                "tiers.low",
                "tiers.low",
                "tiers.high",
                "tiers.high",
                "tiers.monitor",
                "tiers.monitor",
            ]
        );
        assert_eq!(bus.unregister(&tiers), 2);
        assert!(!bus.is_registered(&tiers));
    }

    #[test]
    fn duplicate_registration_can_be_ignored() {
        let log = Log::default();
        let mut bus = Bus::new();
        bus.set_duplicate_policy(DuplicatePolicy::Ignore);
        assert_eq!(bus.duplicate_policy(), DuplicatePolicy::Ignore);
        let tiers = Arc::new(Tiers { log: log.clone() });
        let other = Arc::new(Tiers { log: log.clone() });
        bus.register(&tiers).register(&tiers).register(&other);
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn unregister_by_type_removes_every_instance() {
        let log = Log::default();
        let bus = Bus::new();
        let a = Arc::new(Tiers { log: log.clone() });
        let b = Arc::new(Tiers { log: log.clone() });
        let normals = Arc::new(Normals { log: log.clone() });
        bus.register(&a).register(&normals).register(&b);

        assert_eq!(bus.unregister_type::<Faulty>(), 0);
        assert_eq!(bus.unregister_type::<Tiers>(), 2);
        assert_eq!(bus.len(), 1);
        assert!(bus.is_registered(&normals));

        bus.fire(Ping::default()).unwrap();
        assert_eq!(
            log.take(),
            vec!["normals.low", "normals.first", "normals.second"]
        );
    }

    #[test]
    fn unregistering_a_stranger_is_a_no_op() {
        let log = Log::default();
        let bus = Bus::new();
        let registered = Arc::new(Tiers { log: log.clone() });
        let stranger = Arc::new(Tiers { log: log.clone() });
        bus.register(&registered);
        assert_eq!(bus.unregister(&stranger), 0);
        assert_eq!(
            bus.unregister_listener_type(ListenerType::of::<Normals>()),
            0
        );
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn dropped_listeners_are_skipped_and_pruned() {
        let log = Log::default();
        let bus = Bus::new();
        let gone = Arc::new(Tiers { log: log.clone() });
        bus.register(&gone);
        drop(gone);

        assert!(bus.is_empty());
        bus.fire(Ping::default()).unwrap();
        assert!(log.take().is_empty());

        let normals = Arc::new(Normals { log: log.clone() });
        bus.register(&normals);
        assert_eq!(bus.entries.read().len(), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let log = Log::default();
        let bus = Bus::new();
        let tiers = Arc::new(Tiers { log: log.clone() });
        bus.register(&tiers);
        bus.clear();
        bus.fire(Ping::default()).unwrap();
        assert!(log.take().is_empty());
    }

    #[test]
    fn buses_can_share_an_index_cache() {
        let cache = Arc::new(IndexCache::new());
        let first = Bus::with_cache(Arc::clone(&cache));
        let second = Bus::with_cache(Arc::clone(&cache));
        let counting = Arc::new(Counting::default());
        first.register(&counting);
        second.register(&counting);
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(first.cache(), second.cache()));
        assert!(first.index_of::<Counting>().is_some());
        assert!(first.index_of::<Tiers>().is_none());

        first.fire(Ping::default()).unwrap();
        second.fire(Ping::default()).unwrap();
        assert_eq!(counting.hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn handlers_may_register_during_a_fire() {
        let log = Log::default();
        let bus = Arc::new(Bus::new());
        let recruiter = Arc::new(Recruiter {
            bus: Arc::clone(&bus),
            recruit: Arc::new(Tiers { log: log.clone() }),
            log: log.clone(),
        });
        bus.register(&recruiter);

        bus.fire(Ping::default()).unwrap();
        assert_eq!(log.take(), vec!["recruit"]);

        bus.fire(Ping::default()).unwrap();
        assert_eq!(
            log.take(),
            vec!["recruit", "tiers.low", "tiers.high", "tiers.monitor"]
        );
    }

    #[test]
    fn fire_dyn_dispatches_on_the_runtime_type() {
        let log = Log::default();
        let bus = Bus::new();
        let exacting = Arc::new(Exacting { log: log.clone() });
        bus.register(&exacting);

        let mut child = PingChild::default();
        let erased: &mut dyn Event = &mut child;
        bus.fire_dyn(erased).unwrap();
        assert_eq!(log.take(), vec!["base_any", "child_exact"]);
        assert_eq!(child.base.hops, 1);
    }

    #[test]
    fn bus_fires_from_many_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Bus>();

        let bus = Bus::new();
        let counting = Arc::new(Counting::default());
        bus.register(&counting);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..25 {
                        bus.fire(Ping::default()).unwrap();
                    }
                });
            }
        });
        assert_eq!(counting.hits.load(Ordering::Relaxed), 100);
    }
}
