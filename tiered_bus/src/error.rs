// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use crate::index::Partition;

/// Result alias for bus operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors raised by discovery and dispatch.
///
/// Neither kind is retried by the bus.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A handler set was asked to discover handlers a second time.
    ///
    /// This is a programming error; the set keeps its first scan.
    #[error("handlers of `{listener}` were already scanned for {partition} events")]
    AlreadyScanned {
        /// Rust type name of the listener.
        listener: &'static str,
        /// The partition that was scanned twice.
        partition: Partition,
    },

    /// A handler failed during a fire. The rest of that fire was abandoned.
    #[error("an error occurred executing handler `{handler}`\nevent: {event}")]
    HandlerInvocationFailure {
        /// The failing handler, rendered as `Listener::method(Event)`.
        handler: String,
        /// Rust type name of the fired event.
        event: &'static str,
        /// What the handler returned.
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Whether this is [`Error::AlreadyScanned`].
    pub fn is_already_scanned(&self) -> bool {
        matches!(self, Self::AlreadyScanned { .. })
    }

    /// The error a failing handler returned, for [`Error::HandlerInvocationFailure`].
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::HandlerInvocationFailure { source, .. } => Some(source),
            Self::AlreadyScanned { .. } => None,
        }
    }
}
