/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! gRPC surface of the control plane.
//!
//! A thin translation layer: proto messages in, [`DeploymentService`] calls,
//! proto messages out.  No scheduling logic lives here — the only decisions
//! made are how to map domain enums and [`ScheduleError`] variants onto the
//! wire (see [`status_for`] for the error table).

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::cluster::Cluster;
use crate::deployment::{CompletionOutcome, Deployment, DeploymentStatus, PriorityTier};
use crate::proto::bosun_v1 as pb;
use crate::resources::ResourceVector;
use crate::scheduler::ScheduleError;
use crate::service::{DeploymentService, SubmitRequest};

pub use pb::deployment_control_server::DeploymentControlServer;

/// Implements `bosun.v1.DeploymentControl`.
pub struct DeploymentControlApi {
    service: Arc<DeploymentService>,
}

impl DeploymentControlApi {
    pub fn new(service: Arc<DeploymentService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl pb::deployment_control_server::DeploymentControl for DeploymentControlApi {
    async fn submit_deployment(
        &self,
        request: Request<pb::SubmitDeploymentRequest>,
    ) -> Result<Response<pb::Deployment>, Status> {
        let req = request.into_inner();
        debug!(name = %req.name, cluster = req.cluster_id, "SubmitDeployment");

        let submit = SubmitRequest {
            name: req.name,
            image: req.image,
            cluster_id: req.cluster_id,
            user_id: req.user_id,
            requirements: ResourceVector::new(req.ram_gb, req.cpu_cores, req.gpu_count),
            priority: tier_from_proto(req.priority)?,
            depends_on: req.depends_on_id,
        };

        let deployment = self.service.submit(submit).await.map_err(status_for)?;
        Ok(Response::new(deployment_to_proto(&deployment)))
    }

    async fn report_completion(
        &self,
        request: Request<pb::ReportCompletionRequest>,
    ) -> Result<Response<pb::Deployment>, Status> {
        let req = request.into_inner();
        let outcome = outcome_from_proto(req.outcome)?;
        let deployment = self
            .service
            .report_completion(req.deployment_id, outcome)
            .await
            .map_err(status_for)?;
        Ok(Response::new(deployment_to_proto(&deployment)))
    }

    async fn cancel_deployment(
        &self,
        request: Request<pb::CancelDeploymentRequest>,
    ) -> Result<Response<pb::CancelDeploymentReply>, Status> {
        let req = request.into_inner();
        let cancelled = self
            .service
            .cancel(req.deployment_id, req.user_id)
            .await
            .map_err(status_for)?;
        Ok(Response::new(pb::CancelDeploymentReply { cancelled }))
    }

    async fn get_deployment(
        &self,
        request: Request<pb::GetDeploymentRequest>,
    ) -> Result<Response<pb::Deployment>, Status> {
        let req = request.into_inner();
        let deployment = self
            .service
            .get(req.deployment_id)
            .ok_or_else(|| Status::not_found(format!("deployment {} not found", req.deployment_id)))?;
        Ok(Response::new(deployment_to_proto(&deployment)))
    }

    async fn list_user_deployments(
        &self,
        request: Request<pb::ListUserDeploymentsRequest>,
    ) -> Result<Response<pb::DeploymentList>, Status> {
        let req = request.into_inner();
        let deployments = self
            .service
            .list_by_user(req.user_id)
            .iter()
            .map(deployment_to_proto)
            .collect();
        Ok(Response::new(pb::DeploymentList { deployments }))
    }

    async fn list_cluster_deployments(
        &self,
        request: Request<pb::ListClusterDeploymentsRequest>,
    ) -> Result<Response<pb::DeploymentList>, Status> {
        let req = request.into_inner();
        let deployments = self
            .service
            .list_by_cluster(req.cluster_id)
            .iter()
            .map(deployment_to_proto)
            .collect();
        Ok(Response::new(pb::DeploymentList { deployments }))
    }

    async fn get_cluster(
        &self,
        request: Request<pb::GetClusterRequest>,
    ) -> Result<Response<pb::Cluster>, Status> {
        let req = request.into_inner();
        let cluster = self
            .service
            .get_cluster(req.cluster_id)
            .ok_or_else(|| Status::not_found(format!("cluster {} not found", req.cluster_id)))?;
        Ok(Response::new(cluster_to_proto(&cluster)))
    }
}

// ── Error mapping ─────────────────────────────────────────────────────────────

/// Map scheduler errors onto gRPC statuses.
///
/// | Variant | Status |
/// |---|---|
/// | `ClusterMissing`, `DeploymentMissing` | `NotFound` |
/// | `InvalidRequirements`, `PredecessorMissing` | `InvalidArgument` |
/// | `IllegalTransition`, `OverCredit`, `PreemptionShortfall` | `Internal` |
fn status_for(err: ScheduleError) -> Status {
    match &err {
        ScheduleError::ClusterMissing { .. } | ScheduleError::DeploymentMissing { .. } => {
            Status::not_found(err.to_string())
        }
        ScheduleError::InvalidRequirements { .. } | ScheduleError::PredecessorMissing { .. } => {
            Status::invalid_argument(err.to_string())
        }
        ScheduleError::IllegalTransition { .. }
        | ScheduleError::OverCredit { .. }
        | ScheduleError::PreemptionShortfall { .. } => Status::internal(err.to_string()),
    }
}

// ── Proto conversions ─────────────────────────────────────────────────────────

fn tier_from_proto(value: i32) -> Result<PriorityTier, Status> {
    match pb::PriorityTier::try_from(value) {
        Ok(pb::PriorityTier::Low) => Ok(PriorityTier::Low),
        Ok(pb::PriorityTier::Medium) => Ok(PriorityTier::Medium),
        Ok(pb::PriorityTier::High) => Ok(PriorityTier::High),
        Ok(pb::PriorityTier::Critical) => Ok(PriorityTier::Critical),
        Ok(pb::PriorityTier::Unspecified) | Err(_) => {
            Err(Status::invalid_argument("priority tier must be specified"))
        }
    }
}

fn tier_to_proto(tier: PriorityTier) -> pb::PriorityTier {
    match tier {
        PriorityTier::Low => pb::PriorityTier::Low,
        PriorityTier::Medium => pb::PriorityTier::Medium,
        PriorityTier::High => pb::PriorityTier::High,
        PriorityTier::Critical => pb::PriorityTier::Critical,
    }
}

fn status_to_proto(status: DeploymentStatus) -> pb::DeploymentStatus {
    match status {
        DeploymentStatus::Pending => pb::DeploymentStatus::Pending,
        DeploymentStatus::Queued => pb::DeploymentStatus::Queued,
        DeploymentStatus::Running => pb::DeploymentStatus::Running,
        DeploymentStatus::Completed => pb::DeploymentStatus::Completed,
        DeploymentStatus::Failed => pb::DeploymentStatus::Failed,
        DeploymentStatus::Preempted => pb::DeploymentStatus::Preempted,
    }
}

fn outcome_from_proto(value: i32) -> Result<CompletionOutcome, Status> {
    match pb::CompletionOutcome::try_from(value) {
        Ok(pb::CompletionOutcome::Completed) => Ok(CompletionOutcome::Completed),
        Ok(pb::CompletionOutcome::Failed) => Ok(CompletionOutcome::Failed),
        Ok(pb::CompletionOutcome::Unspecified) | Err(_) => {
            Err(Status::invalid_argument("completion outcome must be specified"))
        }
    }
}

fn deployment_to_proto(d: &Deployment) -> pb::Deployment {
    pb::Deployment {
        id: d.id,
        name: d.name.clone(),
        image: d.image.clone(),
        cluster_id: d.cluster_id,
        user_id: d.user_id,
        ram_gb: d.requirements.ram_gb,
        cpu_cores: d.requirements.cpu_cores,
        gpu_count: d.requirements.gpu_count,
        priority: tier_to_proto(d.priority) as i32,
        status: status_to_proto(d.status) as i32,
        depends_on_id: d.depends_on,
        created_at: d.created_at.timestamp(),
        scheduled_at: d.scheduled_at.map(|t| t.timestamp()),
        started_at: d.started_at.map(|t| t.timestamp()),
        completed_at: d.completed_at.map(|t| t.timestamp()),
    }
}

fn cluster_to_proto(c: &Cluster) -> pb::Cluster {
    pb::Cluster {
        id: c.id,
        name: c.name.clone(),
        organization: c.organization.clone(),
        total_ram_gb: c.total.ram_gb,
        total_cpu_cores: c.total.cpu_cores,
        total_gpu_count: c.total.gpu_count,
        available_ram_gb: c.available.ram_gb,
        available_cpu_cores: c.available.cpu_cores,
        available_gpu_count: c.available.gpu_count,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
