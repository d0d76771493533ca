// Copyright 2025 the Tiered Bus Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dispatch tiers.
//!
//! ## Overview
//!
//! Every handler belongs to exactly one [`Priority`] tier.
//! A fire walks the tiers in ascending declaration order, from [`Priority::Lowest`]
//! to [`Priority::Monitor`], and finishes a tier across *all* listeners before the next one begins.
//! The tier says when a handler gets its say on the outcome, not how important the event is.

/// Ordered dispatch tier of a handler.
///
/// Tiers compare by declaration order, so `Lowest < Low < Normal < High < Highest < Monitor`.
/// Lower tiers run first; later tiers see (and may override) what earlier tiers did.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Priority {
    /// Runs first.
    Lowest,
    /// Runs after [`Priority::Lowest`].
    Low,
    /// The default tier.
    #[default]
    Normal,
    /// Runs after [`Priority::Normal`].
    High,
    /// Last tier allowed to influence the outcome.
    Highest,
    /// Observation tier.
    ///
    /// Monitor handlers run after every other tier and are never suppressed by
    /// stop-propagation. By convention they must not change delivery-affecting
    /// state; this is not enforced.
    Monitor,
}

impl Priority {
    /// Number of tiers.
    pub const COUNT: usize = 6;

    /// All tiers in dispatch order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Lowest,
        Self::Low,
        Self::Normal,
        Self::High,
        Self::Highest,
        Self::Monitor,
    ];

    /// Position of this tier in [`Priority::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` for [`Priority::Monitor`].
    #[inline]
    pub const fn is_monitor(self) -> bool {
        matches!(self, Self::Monitor)
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Lowest => "LOWEST",
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Highest => "HIGHEST",
            Self::Monitor => "MONITOR",
        };
        f.write_str(name)
    }
}
