// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=tiered_bus --heading-base-level=0

//! Tiered Bus: a deterministic, in-process publish/subscribe dispatcher.
//!
//! ## Overview
//!
//! Listeners declare handler methods, each bound to one event type and one [`Priority`](crate::priority::Priority) tier.
//! A [`Bus`](crate::bus::Bus) delivers every fired event to the matching handlers of its registered listeners,
//! lowest tier first, ending with the [`Monitor`](crate::priority::Priority::Monitor) tier.
//!
//! ## Events
//!
//! Any `'static` type becomes an event through the [`event!`] macro.
//! An event may extend a parent event by embedding it; handlers declared for the parent receive the child too,
//! unless they opt out with [`exact`](crate::handler::HandlerDecl::exact).
//! Cancellable events carry a [`Cancellation`](crate::event::Cancellation) state with two flags:
//!
//! - cancelled: handlers marked [`ignore_cancelled`](crate::handler::HandlerDecl::ignore_cancelled) are skipped.
//! - propagation stopped: every later handler is skipped, except those in the monitor tier.
//!
//! Both flags are read before each handler, so they act immediately.
//!
//! ## Ordering
//!
//! Tier is the primary order. Within a tier, listeners run in registration order, and a listener's handlers
//! run in the order its [`declare`](crate::listener::Listener::declare) lists them.
//!
//! ## Discovery
//!
//! [`Listener::declare`](crate::listener::Listener::declare) runs once per listener type.
//! The result is split into regular and cancellable [`HandlerSet`](crate::index::HandlerSet)s, sorted by tier, and cached
//! in an [`IndexCache`](crate::index::IndexCache) that several buses may share.
//!
//! ## Errors
//!
//! Handlers return [`HandlerResult`](crate::handler::HandlerResult). The first failure aborts the fire and comes back as
//! [`Error::HandlerInvocationFailure`](crate::error::Error::HandlerInvocationFailure), naming the handler and the event.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use tiered_bus::{Bus, HandlerResult, HandlerTable, Listener, Priority};
//!
//! #[derive(Default)]
//! struct Tick {
//!     seen: Vec<&'static str>,
//! }
//! tiered_bus::event!(Tick);
//!
//! #[derive(Default)]
//! struct Clock {
//!     ticks: AtomicU32,
//! }
//!
//! impl Clock {
//!     fn early(&self, tick: &mut Tick) -> HandlerResult {
//!         tick.seen.push("early");
//!         Ok(())
//!     }
//!
//!     fn count(&self, tick: &mut Tick) -> HandlerResult {
//!         tick.seen.push("count");
//!         self.ticks.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//!
//! impl Listener for Clock {
//!     fn declare(handlers: &mut HandlerTable<Self>) {
//!         handlers.on("count", Self::count).priority(Priority::Monitor);
//!         handlers.on("early", Self::early).priority(Priority::Lowest);
//!     }
//! }
//!
//! let bus = Bus::new();
//! let clock = Arc::new(Clock::default());
//! bus.register(&clock);
//!
//! let tick = bus.fire(Tick::default()).unwrap();
//! assert_eq!(tick.seen, ["early", "count"]);
//! assert_eq!(clock.ticks.load(Ordering::Relaxed), 1);
//! ```
//!
//! Run the demos in `demos/` for cancellation and event hierarchies.

pub mod bus;
pub mod error;
pub mod event;
pub mod handler;
pub mod index;
pub mod listener;
pub mod priority;

pub use bus::{Bus, DuplicatePolicy};
pub use error::{Error, Result};
pub use event::{Cancellable, Cancellation, Event, EventType};
pub use handler::{HandlerResult, HandlerTable};
pub use listener::Listener;
pub use priority::Priority;
