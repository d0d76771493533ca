// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bus basics.
//!
//! This minimal example registers two listeners and shows that the priority tier
//! orders handlers before registration order does.
//!
//! Run:
//! - `RUST_LOG=tiered_bus=trace cargo run -p tiered_bus_demos --example bus_basics`

use std::sync::Arc;

use tiered_bus::{Bus, HandlerResult, HandlerTable, Listener, Priority};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Greeting {
    trail: Vec<String>,
}
tiered_bus::event!(Greeting);

struct Named(&'static str);

impl Named {
    fn early(&self, event: &mut Greeting) -> HandlerResult {
        event.trail.push(format!("{} (low)", self.0));
        Ok(())
    }

    fn late(&self, event: &mut Greeting) -> HandlerResult {
        event.trail.push(format!("{} (high)", self.0));
        Ok(())
    }
}

impl Listener for Named {
    fn declare(handlers: &mut HandlerTable<Self>) {
        handlers.on("late", Self::late).priority(Priority::High);
        handlers.on("early", Self::early).priority(Priority::Low);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bus = Bus::new();
    let alice = Arc::new(Named("alice"));
    let bob = Arc::new(Named("bob"));
    bus.register(&alice).register(&bob);

    let greeting = bus.fire(Greeting::default())?;
    println!("== Delivery order ==");
    for step in &greeting.trail {
        println!("  {step}");
    }
    assert_eq!(
        greeting.trail,
        ["alice (low)", "bob (low)", "alice (high)", "bob (high)"]
    );

    // Dropping the last handle ends the subscription.
    drop(bob);
    let greeting = bus.fire(Greeting::default())?;
    println!("== After dropping bob ==\n  {:?}", greeting.trail);
    assert_eq!(greeting.trail, ["alice (low)", "alice (high)"]);
    Ok(())
}
