// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cancellation and stop-propagation.
//!
//! A guard cancels oversized transfers, a fee handler skips cancelled transfers,
//! a fraud check stops propagation outright, and an auditor in the monitor tier
//! sees every transfer regardless.
//!
//! Run:
//! - `RUST_LOG=tiered_bus=debug cargo run -p tiered_bus_demos --example bus_cancellation`

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tiered_bus::{Bus, Cancellable, Cancellation, HandlerResult, HandlerTable, Listener, Priority};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Transfer {
    amount: u64,
    fee: u64,
    flagged: bool,
    flags: Cancellation,
}
tiered_bus::event!(Transfer, cancellable(flags));

struct Guard {
    limit: u64,
}

impl Listener for Guard {
    fn declare(handlers: &mut HandlerTable<Self>) {
        handlers
            .on("fraud", |_: &Self, t: &mut Transfer| {
                if t.flagged {
                    t.flags.cancel();
                    t.flags.stop_propagation();
                }
                Ok(())
            })
            .priority(Priority::Lowest);
        handlers
            .on("limit", |guard: &Self, t: &mut Transfer| {
                if t.amount > guard.limit {
                    t.flags.cancel();
                }
                Ok(())
            })
            .priority(Priority::Low);
    }
}

struct Fees;

impl Fees {
    fn charge(&self, t: &mut Transfer) -> HandlerResult {
        t.fee = t.amount / 100;
        Ok(())
    }
}

impl Listener for Fees {
    fn declare(handlers: &mut HandlerTable<Self>) {
        handlers.on("charge", Self::charge).ignore_cancelled();
    }
}

#[derive(Default)]
struct Auditor {
    seen: AtomicU32,
}

impl Listener for Auditor {
    fn declare(handlers: &mut HandlerTable<Self>) {
        handlers
            .on("audit", |a: &Self, _: &mut Transfer| {
                a.seen.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .priority(Priority::Monitor);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bus = Bus::new();
    let guard = Arc::new(Guard { limit: 1_000 });
    let fees = Arc::new(Fees);
    let auditor = Arc::new(Auditor::default());
    bus.register(&guard).register(&fees).register(&auditor);

    let small = bus.fire(Transfer {
        amount: 500,
        ..Transfer::default()
    })?;
    println!("== Small ==\n  {small:?}");
    assert!(!small.flags.is_cancelled());
    assert_eq!(small.fee, 5);

    let large = bus.fire(Transfer {
        amount: 5_000,
        ..Transfer::default()
    })?;
    println!("== Large ==\n  {large:?}");
    assert!(large.flags.is_cancelled());
    assert_eq!(large.fee, 0);

    let flagged = bus.fire(Transfer {
        amount: 10,
        flagged: true,
        ..Transfer::default()
    })?;
    println!("== Flagged ==\n  {flagged:?}");
    assert!(flagged.flags.is_propagation_stopped());

    assert_eq!(auditor.seen.load(Ordering::Relaxed), 3);
    Ok(())
}
