/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Control-plane server binary.
//!
//! Loads the cluster fleet from YAML, seeds the resource ledger, rebuilds the
//! pending queues from the deployment table, and serves the
//! `bosun.v1.DeploymentControl` gRPC service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bosun_control::clock::SystemClock;
use bosun_control::config::ClusterFleet;
use bosun_control::grpc::{DeploymentControlApi, DeploymentControlServer};
use bosun_control::scheduler::{DeploymentScheduler, PendingQueues, ResourceLedger};
use bosun_control::service::DeploymentService;
use bosun_control::store::DeploymentStore;

#[derive(Debug, Parser)]
#[command(name = "bosun-control", about = "Bosun deployment control plane")]
struct Args {
    /// Path to the cluster fleet YAML file.
    #[arg(short, long)]
    config: PathBuf,

    /// Address the gRPC server listens on.
    #[arg(short, long, default_value = "0.0.0.0:50061")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut fleet = ClusterFleet::new();
    fleet
        .load_from_file(&args.config)
        .with_context(|| format!("loading fleet file {}", args.config.display()))?;

    let ledger = Arc::new(ResourceLedger::new());
    for spec in fleet.specs_sorted() {
        let id = ledger.register(spec.name.clone(), spec.organization.clone(), spec.total);
        info!(cluster = id, name = %spec.name, capacity = %spec.total, "cluster registered");
    }

    let store = Arc::new(DeploymentStore::new());
    let queues = Arc::new(PendingQueues::new());
    let clock = Arc::new(SystemClock);
    let scheduler = Arc::new(DeploymentScheduler::new(
        store.clone(),
        ledger.clone(),
        queues,
        clock,
    ));
    scheduler.recover_queues().await;

    let service = Arc::new(DeploymentService::new(store, ledger, scheduler));
    let api = DeploymentControlApi::new(service);

    info!(listen = %args.listen, "control plane listening");
    tonic::transport::Server::builder()
        .add_service(DeploymentControlServer::new(api))
        .serve(args.listen)
        .await
        .context("gRPC server terminated")?;

    Ok(())
}
