/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Clock abstraction.
//!
//! Every timestamp the scheduler persists is resolved through [`Clock::now`]
//! at the moment of the transition — never a deferred "database now" marker.
//! Production uses [`SystemClock`]; tests inject a manual clock to exercise
//! aging without sleeping.

use chrono::{DateTime, Utc};

/// Source of the current instant.  `now()` must be monotonically
/// non-decreasing for aging arithmetic to behave.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Test support ──────────────────────────────────────────────────────────────
