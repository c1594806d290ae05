/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Error type for the deployment scheduler.
//!
//! Each variant names the ids and values involved, so a failure can be
//! logged with full context and translated to the right `tonic::Status` at
//! the transport edge without string parsing.  Scheduler paths return this
//! enum rather than `anyhow::Error` on purpose: callers match on variants.

use thiserror::Error;

use crate::cluster::ClusterId;
use crate::deployment::{DeploymentId, DeploymentStatus};

/// Error type returned by the scheduler entry points and the submission
/// service.
///
/// The last three variants are invariant breaches: they indicate a bug, the
/// offending operation is aborted before any write, and tests assert they
/// surface (never silently self-heal).
///
/// | Variant | gRPC status |
/// |---|---|
/// | `ClusterMissing` / `DeploymentMissing` | `NotFound` |
/// | `InvalidRequirements` / `PredecessorMissing` | `InvalidArgument` |
/// | `IllegalTransition` | `Internal` |
/// | `OverCredit` | `Internal` |
/// | `PreemptionShortfall` | `Internal` |
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The target cluster is not registered in the directory/ledger.
    #[error("cluster {cluster_id} is not registered")]
    ClusterMissing { cluster_id: ClusterId },

    /// No deployment row exists for this id.
    #[error("deployment {deployment_id} not found")]
    DeploymentMissing { deployment_id: DeploymentId },

    /// A submitted requirement is negative or non-finite.  GPU counts are
    /// unsigned and cannot trip this.
    #[error("invalid resource requirements: ram={ram_gb} cpu={cpu_cores} (must be finite and non-negative)")]
    InvalidRequirements { ram_gb: f64, cpu_cores: f64 },

    /// The submission names a predecessor that does not exist.
    #[error("predecessor deployment {predecessor_id} does not exist")]
    PredecessorMissing { predecessor_id: DeploymentId },

    /// An attempted move not present in the state graph.
    #[error("illegal status transition for deployment {deployment_id}: {from} → {to}")]
    IllegalTransition {
        deployment_id: DeploymentId,
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// Crediting these requirements would push availability past the
    /// cluster's fixed total — a double credit or an unmatched credit.
    #[error("ledger over-credit on cluster {cluster_id}: {axis} would reach {attempted} of {total}")]
    OverCredit {
        cluster_id: ClusterId,
        axis: &'static str,
        attempted: f64,
        total: f64,
    },

    /// A preemption plan reported feasible did not free enough resources for
    /// the debit that followed it.
    #[error("preemption for deployment {deployment_id} freed insufficient resources on cluster {cluster_id}")]
    PreemptionShortfall {
        deployment_id: DeploymentId,
        cluster_id: ClusterId,
    },
}
