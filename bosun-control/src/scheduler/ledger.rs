/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Per-cluster resource accounting.
//!
//! The ledger owns the live [`Cluster`] records and is the only place the
//! `available` vector is mutated.  It doubles as the cluster directory of the
//! external-interface contract: the scheduler and the API read cluster state
//! through [`ResourceLedger::get`].
//!
//! Accounting is strictly per-cluster; there are no cross-cluster
//! transactions.  Check-then-debit is atomic because every caller holds the
//! owning cluster's scheduling lock across the call — the internal `RwLock`
//! only protects the map itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;

use crate::cluster::{Cluster, ClusterId};
use crate::resources::ResourceVector;

use super::error::ScheduleError;

/// Tolerance for floating-point drift when crediting fractional axes back.
/// Anything past this is a genuine double credit and is refused.
const CREDIT_EPSILON: f64 = 1e-9;

/// Result of a debit attempt.  Insufficiency is an ordinary outcome, not an
/// error — the scheduler reacts by queueing or preempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited,
    Insufficient,
}

#[derive(Debug, Default)]
pub struct ResourceLedger {
    clusters: RwLock<HashMap<ClusterId, Cluster>>,
    next_id: AtomicU64,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self {
            clusters: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a cluster with a fixed total capacity; everything starts
    /// available.  Returns the assigned id.
    pub fn register(
        &self,
        name: impl Into<String>,
        organization: impl Into<String>,
        total: ResourceVector,
    ) -> ClusterId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cluster = Cluster::new(id, name, organization, total);
        self.clusters
            .write()
            .expect("cluster map poisoned")
            .insert(id, cluster);
        id
    }

    pub fn contains(&self, id: ClusterId) -> bool {
        self.clusters
            .read()
            .expect("cluster map poisoned")
            .contains_key(&id)
    }

    /// Directory read: a copy of the cluster record.
    pub fn get(&self, id: ClusterId) -> Option<Cluster> {
        self.clusters
            .read()
            .expect("cluster map poisoned")
            .get(&id)
            .cloned()
    }

    /// All clusters sorted by id.
    pub fn all(&self) -> Vec<Cluster> {
        let map = self.clusters.read().expect("cluster map poisoned");
        let mut out: Vec<Cluster> = map.values().cloned().collect();
        out.sort_by_key(|c| c.id);
        out
    }

    /// Consistent read of `(available, total)`.
    pub fn snapshot(&self, id: ClusterId) -> Option<(ResourceVector, ResourceVector)> {
        self.get(id).map(|c| (c.available, c.total))
    }

    /// If availability covers `req` on every axis, subtract it and return
    /// [`DebitOutcome::Debited`]; otherwise leave the cluster untouched.
    pub fn try_debit(
        &self,
        id: ClusterId,
        req: &ResourceVector,
    ) -> Result<DebitOutcome, ScheduleError> {
        let mut map = self.clusters.write().expect("cluster map poisoned");
        let cluster = map
            .get_mut(&id)
            .ok_or(ScheduleError::ClusterMissing { cluster_id: id })?;

        if !cluster.available.covers(req) {
            return Ok(DebitOutcome::Insufficient);
        }

        cluster.available = cluster.available.minus(req);
        debug!(
            cluster = cluster.id,
            debited = %req,
            available = %cluster.available,
            "ledger debit"
        );
        Ok(DebitOutcome::Debited)
    }

    /// Add `req` back.  Float drift within [`CREDIT_EPSILON`] is clamped to
    /// the total; anything past it means a credit with no matching debit and
    /// is refused with the cluster left untouched.
    pub fn credit(&self, id: ClusterId, req: &ResourceVector) -> Result<(), ScheduleError> {
        let mut map = self.clusters.write().expect("cluster map poisoned");
        let cluster = map
            .get_mut(&id)
            .ok_or(ScheduleError::ClusterMissing { cluster_id: id })?;

        let attempted = cluster.available.plus(req);
        if attempted.ram_gb > cluster.total.ram_gb + CREDIT_EPSILON {
            return Err(ScheduleError::OverCredit {
                cluster_id: id,
                axis: "ram_gb",
                attempted: attempted.ram_gb,
                total: cluster.total.ram_gb,
            });
        }
        if attempted.cpu_cores > cluster.total.cpu_cores + CREDIT_EPSILON {
            return Err(ScheduleError::OverCredit {
                cluster_id: id,
                axis: "cpu_cores",
                attempted: attempted.cpu_cores,
                total: cluster.total.cpu_cores,
            });
        }
        if attempted.gpu_count > cluster.total.gpu_count {
            return Err(ScheduleError::OverCredit {
                cluster_id: id,
                axis: "gpu_count",
                attempted: attempted.gpu_count as f64,
                total: cluster.total.gpu_count as f64,
            });
        }

        cluster.available = ResourceVector {
            ram_gb: attempted.ram_gb.min(cluster.total.ram_gb),
            cpu_cores: attempted.cpu_cores.min(cluster.total.cpu_cores),
            gpu_count: attempted.gpu_count.min(cluster.total.gpu_count),
        };
        debug!(
            cluster = cluster.id,
            credited = %req,
            available = %cluster.available,
            "ledger credit"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
