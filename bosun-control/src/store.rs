/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Deployment table.
//!
//! The store is the source of truth for deployment records: queue entries are
//! advisory and the ledger only tracks aggregates, but a deployment's
//! `status` field here is what every disagreement resolves to.  The in-memory
//! table deliberately keeps the interface shape of a persisted one — id
//! allocation at insert, load/save of whole rows, and the bounded scans the
//! scheduler needs (`by_user`, `by_cluster`, `running_on`, `queued_on`,
//! `dependents_of`).
//!
//! Scheduler calls mutate rows only under the owning cluster's lock, so the
//! table-level `RwLock` is held just long enough to copy a row in or out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::cluster::ClusterId;
use crate::deployment::{Deployment, DeploymentId, DeploymentStatus, PriorityTier, UserId};
use crate::resources::ResourceVector;

/// Caller-supplied fields of a submission; everything else (id, status,
/// timestamps) is assigned by [`DeploymentStore::insert`].
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub name: String,
    pub image: String,
    pub cluster_id: ClusterId,
    pub user_id: UserId,
    pub requirements: ResourceVector,
    pub priority: PriorityTier,
    pub depends_on: Option<DeploymentId>,
}

#[derive(Debug, Default)]
pub struct DeploymentStore {
    rows: RwLock<HashMap<DeploymentId, Deployment>>,
    next_id: AtomicU64,
}

impl DeploymentStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a new PENDING deployment.  `created_at` is resolved here, once,
    /// and never changes afterwards.
    pub fn insert(&self, new: NewDeployment, now: DateTime<Utc>) -> Deployment {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deployment = Deployment {
            id,
            name: new.name,
            image: new.image,
            cluster_id: new.cluster_id,
            user_id: new.user_id,
            requirements: new.requirements,
            priority: new.priority,
            status: DeploymentStatus::Pending,
            depends_on: new.depends_on,
            created_at: now,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
        };
        self.rows
            .write()
            .expect("deployment table poisoned")
            .insert(id, deployment.clone());
        deployment
    }

    /// Load a copy of one row.
    pub fn get(&self, id: DeploymentId) -> Option<Deployment> {
        self.rows
            .read()
            .expect("deployment table poisoned")
            .get(&id)
            .cloned()
    }

    /// Write a mutated working copy back.
    pub fn save(&self, deployment: &Deployment) {
        self.rows
            .write()
            .expect("deployment table poisoned")
            .insert(deployment.id, deployment.clone());
    }

    pub fn by_user(&self, user_id: UserId) -> Vec<Deployment> {
        self.scan(|d| d.user_id == user_id)
    }

    pub fn by_cluster(&self, cluster_id: ClusterId) -> Vec<Deployment> {
        self.scan(|d| d.cluster_id == cluster_id)
    }

    /// Deployments currently holding resources on `cluster_id`.
    pub fn running_on(&self, cluster_id: ClusterId) -> Vec<Deployment> {
        self.scan(|d| d.cluster_id == cluster_id && d.status == DeploymentStatus::Running)
    }

    /// QUEUED rows for `cluster_id` — the recovery source when the pending
    /// queue cache is lost.
    pub fn queued_on(&self, cluster_id: ClusterId) -> Vec<Deployment> {
        self.scan(|d| d.cluster_id == cluster_id && d.status == DeploymentStatus::Queued)
    }

    /// Deployments that declared `id` as their predecessor.
    pub fn dependents_of(&self, id: DeploymentId) -> Vec<Deployment> {
        self.scan(|d| d.depends_on == Some(id))
    }

    /// Filtered scan, sorted by id so results are deterministic and insertion
    /// order is recoverable.
    fn scan(&self, keep: impl Fn(&Deployment) -> bool) -> Vec<Deployment> {
        let rows = self.rows.read().expect("deployment table poisoned");
        let mut out: Vec<Deployment> = rows.values().filter(|d| keep(d)).cloned().collect();
        out.sort_by_key(|d| d.id);
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
