/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Preemption planning.
//!
//! Given the RUNNING set of one cluster and a demand vector, pick victims
//! whose eviction frees enough capacity.  Only strictly lower tiers are
//! eligible — a demander never preempts equal-or-higher priority work.
//! Candidates are taken lowest tier first, newest start first within a tier
//! (least sunk work), and accumulated greedily until the demand is covered.
//!
//! This is a deterministic approximation, not an optimal knapsack: it may
//! evict one deployment more than strictly necessary, but it never reports a
//! plan that does not cover the demand.
//!
//! The planner is a pure function over a snapshot; the scheduler core holds
//! the cluster lock across plan and execution so the snapshot stays valid.

use chrono::{DateTime, Utc};

use crate::deployment::{Deployment, DeploymentId, PriorityTier};
use crate::resources::ResourceVector;

/// A feasible victim set, in eviction order.
#[derive(Debug, Clone)]
pub struct PreemptionPlan {
    pub victims: Vec<DeploymentId>,
    /// Total requirements of the victims; what the ledger gains back.
    pub freed: ResourceVector,
}

/// Compute a victim set out of `running` so that `available + freed` covers
/// `demand`, or `None` when no eligible combination suffices.
pub fn plan_victims(
    running: &[Deployment],
    available: &ResourceVector,
    demand: &ResourceVector,
    demander_tier: PriorityTier,
) -> Option<PreemptionPlan> {
    if available.covers(demand) {
        // Nothing to evict; callers only plan after a failed debit, but the
        // contract holds regardless.
        return Some(PreemptionPlan {
            victims: Vec::new(),
            freed: ResourceVector::ZERO,
        });
    }

    let mut candidates: Vec<&Deployment> = running
        .iter()
        .filter(|d| d.priority < demander_tier)
        .collect();

    // Lowest tier first; within a tier the newest start goes first.
    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(started_key(b).cmp(&started_key(a)))
            .then(a.id.cmp(&b.id))
    });

    let mut victims = Vec::new();
    let mut freed = ResourceVector::ZERO;
    for candidate in candidates {
        victims.push(candidate.id);
        freed = freed.plus(&candidate.requirements);
        if available.plus(&freed).covers(demand) {
            return Some(PreemptionPlan { victims, freed });
        }
    }

    None
}

/// RUNNING deployments always carry `started_at`; a missing one sorts as the
/// epoch (oldest, evicted last).
fn started_key(d: &Deployment) -> DateTime<Utc> {
    d.started_at.unwrap_or(DateTime::UNIX_EPOCH)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
