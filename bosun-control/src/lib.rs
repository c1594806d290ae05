/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

//! Bosun – multi-tenant compute-job control plane
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── proto/          – wire types generated from controlplane.proto
//! ├── config/         – YAML cluster fleet configuration
//! ├── resources       – ResourceVector (ram / cpu / gpu axes)
//! ├── cluster         – cluster records
//! ├── deployment      – deployment records, status state machine, tiers
//! ├── clock           – time source abstraction
//! ├── store           – deployment table (source of truth)
//! ├── scheduler/      – admission, ledger, queue, preemption, priority
//! ├── service         – event handlers (submit / completion / cancel)
//! └── grpc/           – gRPC server wiring
//! ```

pub mod clock;
pub mod cluster;
pub mod config;
pub mod deployment;
pub mod grpc;
pub mod proto;
pub mod resources;
pub mod scheduler;
pub mod service;
pub mod store;
