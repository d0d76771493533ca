// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event hierarchies.
//!
//! `KeyPress` extends `Input`. A handler declared for `Input` receives both, an
//! exact handler for `Input` only the base event, and a failing handler shows how
//! errors come back from `fire`.
//!
//! Run:
//! - `cargo run -p tiered_bus_demos --example bus_derivatives`

use std::sync::Arc;

use tiered_bus::{Bus, Error, HandlerTable, Listener, Priority};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Input {
    handled_by: Vec<&'static str>,
}
tiered_bus::event!(Input);

#[derive(Default)]
struct KeyPress {
    input: Input,
    key: char,
}
tiered_bus::event!(KeyPress: Input => input);

struct Console;

impl Listener for Console {
    fn declare(handlers: &mut HandlerTable<Self>) {
        handlers.on("any_input", |_: &Self, e: &mut Input| {
            e.handled_by.push("any_input");
            Ok(())
        });
        handlers
            .on("raw_input", |_: &Self, e: &mut Input| {
                e.handled_by.push("raw_input");
                Ok(())
            })
            .exact();
        handlers
            .on("key", |_: &Self, e: &mut KeyPress| {
                if e.key == '\0' {
                    anyhow::bail!("no key code");
                }
                e.input.handled_by.push("key");
                Ok(())
            })
            .priority(Priority::High);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bus = Bus::new();
    let console = Arc::new(Console);
    bus.register(&console);

    let input = bus.fire(Input::default())?;
    println!("== Input ==\n  {:?}", input.handled_by);
    assert_eq!(input.handled_by, ["any_input", "raw_input"]);

    let press = bus.fire(KeyPress {
        key: 'q',
        ..KeyPress::default()
    })?;
    println!("== KeyPress ==\n  {:?}", press.input.handled_by);
    assert_eq!(press.input.handled_by, ["any_input", "key"]);

    let err = bus
        .fire(KeyPress::default())
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected the key handler to fail"))?;
    println!("== Failure ==\n  {err}");
    assert!(matches!(err, Error::HandlerInvocationFailure { .. }));
    Ok(())
}
