/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Core deployment data structures for the Bosun control plane.
//!
//! A [`Deployment`] is one containerized job request targeted at exactly one
//! cluster.  Its lifecycle is a small state machine owned by the scheduler:
//!
//! ```text
//! PENDING ──admit──► RUNNING ──finish──► COMPLETED
//!    │                  │ │
//!    │defer             │ └─fail/cancel─► FAILED
//!    ▼                  ▼
//! QUEUED ◄─reenqueue─ PREEMPTED
//!    │
//!    └──admit──► RUNNING          (COMPLETED and FAILED are terminal)
//! ```
//!
//! Cancellation maps every non-terminal state to FAILED.  The transition
//! matrix is encoded in [`DeploymentStatus::can_transition_to`] so an illegal
//! move is rejected before any state is persisted.
//!
//! # Working copies
//! Deployments reference their cluster, owner and optional predecessor by id
//! only.  The scheduler loads a working copy from the store, mutates it under
//! the cluster lock, and saves it back — there is never a live object graph
//! with cycles.

use chrono::{DateTime, Utc};

use crate::cluster::ClusterId;
use crate::resources::ResourceVector;

pub type DeploymentId = u64;
pub type UserId = u64;

// ── Priority tier ─────────────────────────────────────────────────────────────

/// Static priority tier of a deployment.
///
/// The explicit ordinals (LOW=1 … CRITICAL=4) are load-bearing: the priority
/// score in `scheduler/priority.rs` multiplies the ordinal by 1000, and the
/// preemption planner compares tiers numerically.  `Ord` follows declaration
/// order, so `PriorityTier::High >= PriorityTier::Medium` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl PriorityTier {
    /// Numeric ordinal used by the score arithmetic.
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::Low => write!(f, "low"),
            PriorityTier::Medium => write!(f, "medium"),
            PriorityTier::High => write!(f, "high"),
            PriorityTier::Critical => write!(f, "critical"),
        }
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentStatus {
    /// Created but not yet examined by the scheduler.
    Pending,
    /// Waiting in the per-cluster pending queue.
    Queued,
    /// Admitted; its requirements are debited from the cluster ledger.
    Running,
    /// Finished successfully.  Terminal.
    Completed,
    /// Finished unsuccessfully, or cancelled.  Terminal.
    Failed,
    /// Forcibly evicted by a higher-priority demand.  Transient — the
    /// scheduler immediately re-enqueues, so a persisted PREEMPTED is only
    /// ever observed mid-transition.
    Preempted,
}

impl DeploymentStatus {
    /// `true` for the two states no deployment ever leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Completed | DeploymentStatus::Failed)
    }

    /// The legal-transition matrix of the scheduler state machine.
    ///
    /// Everything not listed here is a programming error and is refused by
    /// the scheduler before any write happens.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Queued)
                | (Pending, Failed)
                | (Queued, Running)
                | (Queued, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Preempted)
                | (Preempted, Queued)
                | (Preempted, Failed)
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Pending => write!(f, "pending"),
            DeploymentStatus::Queued => write!(f, "queued"),
            DeploymentStatus::Running => write!(f, "running"),
            DeploymentStatus::Completed => write!(f, "completed"),
            DeploymentStatus::Failed => write!(f, "failed"),
            DeploymentStatus::Preempted => write!(f, "preempted"),
        }
    }
}

// ── Completion outcome ────────────────────────────────────────────────────────

/// Terminal outcome reported by the external job-runtime agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    Failed,
}

impl CompletionOutcome {
    pub fn status(self) -> DeploymentStatus {
        match self {
            CompletionOutcome::Completed => DeploymentStatus::Completed,
            CompletionOutcome::Failed => DeploymentStatus::Failed,
        }
    }
}

// ── Deployment ────────────────────────────────────────────────────────────────

/// One container job request and its scheduling state.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub id: DeploymentId,
    pub name: String,
    pub image: String,
    pub cluster_id: ClusterId,
    pub user_id: UserId,

    /// Declared resource demand; debited while RUNNING.
    pub requirements: ResourceVector,
    pub priority: PriorityTier,
    pub status: DeploymentStatus,

    /// Optional predecessor: this deployment may not run until the
    /// predecessor's status is COMPLETED.  A FAILED or deleted predecessor
    /// blocks it permanently (until cancelled).
    pub depends_on: Option<DeploymentId>,

    /// Set once at insertion; immutable.  Also the basis for the aging bonus
    /// — preemption does not reset it.
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Age in (fractional) hours at instant `now`, floored at zero so a
    /// clock step backwards can never produce a negative aging bonus.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 3600.0
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
