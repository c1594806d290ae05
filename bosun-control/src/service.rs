/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Deployment service — the event-handler layer in front of the scheduler.
//!
//! Three trigger points: submission, completion report, cancellation.  The
//! service validates inputs, creates rows, and delegates every scheduling
//! decision to [`DeploymentScheduler`]; the drain on completion is what keeps
//! queue latency bounded — no background sweeper exists.

use std::sync::Arc;

use tracing::info;

use crate::cluster::ClusterId;
use crate::deployment::{
    CompletionOutcome, Deployment, DeploymentId, PriorityTier, UserId,
};
use crate::resources::ResourceVector;
use crate::scheduler::{DeploymentScheduler, ResourceLedger, ScheduleError};
use crate::store::{DeploymentStore, NewDeployment};

/// Caller-facing submission parameters.  `user_id` is the already
/// authenticated identity of the caller; authorization happened upstream.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub name: String,
    pub image: String,
    pub cluster_id: ClusterId,
    pub user_id: UserId,
    pub requirements: ResourceVector,
    pub priority: PriorityTier,
    pub depends_on: Option<DeploymentId>,
}

pub struct DeploymentService {
    store: Arc<DeploymentStore>,
    ledger: Arc<ResourceLedger>,
    scheduler: Arc<DeploymentScheduler>,
}

impl DeploymentService {
    pub fn new(
        store: Arc<DeploymentStore>,
        ledger: Arc<ResourceLedger>,
        scheduler: Arc<DeploymentScheduler>,
    ) -> Self {
        Self {
            store,
            ledger,
            scheduler,
        }
    }

    /// Validate, persist and immediately try to schedule a new deployment.
    ///
    /// Returns the refreshed row: RUNNING when admitted, QUEUED when
    /// deferred, FAILED when the cluster vanished between validation and
    /// scheduling.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Deployment, ScheduleError> {
        if !request.requirements.is_well_formed() {
            return Err(ScheduleError::InvalidRequirements {
                ram_gb: request.requirements.ram_gb,
                cpu_cores: request.requirements.cpu_cores,
            });
        }
        if !self.ledger.contains(request.cluster_id) {
            return Err(ScheduleError::ClusterMissing {
                cluster_id: request.cluster_id,
            });
        }
        if let Some(predecessor_id) = request.depends_on {
            if self.store.get(predecessor_id).is_none() {
                return Err(ScheduleError::PredecessorMissing { predecessor_id });
            }
        }

        let deployment = self.store.insert(
            NewDeployment {
                name: request.name,
                image: request.image,
                cluster_id: request.cluster_id,
                user_id: request.user_id,
                requirements: request.requirements,
                priority: request.priority,
                depends_on: request.depends_on,
            },
            self.scheduler.now(),
        );
        info!(
            deployment = deployment.id,
            cluster = deployment.cluster_id,
            user = deployment.user_id,
            tier = %deployment.priority,
            requirements = %deployment.requirements,
            "deployment submitted"
        );

        self.scheduler.schedule(deployment.id).await?;
        Ok(self.store.get(deployment.id).unwrap_or(deployment))
    }

    /// Completion callback from the job-runtime agent.
    pub async fn report_completion(
        &self,
        deployment_id: DeploymentId,
        outcome: CompletionOutcome,
    ) -> Result<Deployment, ScheduleError> {
        self.scheduler.report_completion(deployment_id, outcome).await
    }

    /// Cancel a deployment the caller owns.  `false` when the deployment is
    /// unknown, terminal, or owned by somebody else — cancellation never
    /// errors.
    pub async fn cancel(
        &self,
        deployment_id: DeploymentId,
        user_id: UserId,
    ) -> Result<bool, ScheduleError> {
        match self.store.get(deployment_id) {
            Some(d) if d.user_id == user_id => self.scheduler.cancel(deployment_id).await,
            _ => Ok(false),
        }
    }

    pub fn get(&self, deployment_id: DeploymentId) -> Option<Deployment> {
        self.store.get(deployment_id)
    }

    pub fn list_by_user(&self, user_id: UserId) -> Vec<Deployment> {
        self.store.by_user(user_id)
    }

    pub fn list_by_cluster(&self, cluster_id: ClusterId) -> Vec<Deployment> {
        self.store.by_cluster(cluster_id)
    }

    /// Directory read: one cluster with its live availability.
    pub fn get_cluster(&self, cluster_id: ClusterId) -> Option<crate::cluster::Cluster> {
        self.ledger.get(cluster_id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
