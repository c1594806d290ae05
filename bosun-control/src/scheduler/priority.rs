//! Priority scoring — static tier plus bounded aging.
//!
//! `score = 1000 · tier + min(10 · age_hours, 100)`
//!
//! The tier contribution dominates: adjacent tiers are 1000 points apart
//! while the aging bonus is capped at 100, so a deployment can never age its
//! way into a higher tier.  Within a tier, one point per six minutes of queue
//! age guarantees eventual progress.  Scores are recomputed at every
//! (re-)enqueue; stale scores already in the queue are tolerated because the
//! scheduler revalidates entries on pop.

use chrono::{DateTime, Utc};

use crate::deployment::Deployment;

/// Gap between adjacent tiers.
pub const TIER_WEIGHT: f64 = 1000.0;

/// Aging bonus per hour of age.
pub const AGING_RATE_PER_HOUR: f64 = 10.0;

/// Upper bound on the aging bonus — strictly below `TIER_WEIGHT` so aging
/// never crosses tiers.
pub const AGING_CAP: f64 = 100.0;

/// Priority score of `deployment` at instant `now`; higher runs first.
pub fn priority_score(deployment: &Deployment, now: DateTime<Utc>) -> f64 {
    let base = f64::from(deployment.priority.ordinal()) * TIER_WEIGHT;
    let bonus = (deployment.age_hours(now) * AGING_RATE_PER_HOUR).min(AGING_CAP);
    base + bonus
}

// ── Tests ─────────────────────────────────────────────────────────────────────
