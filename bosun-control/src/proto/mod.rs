/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

/// Wire types and service stubs generated from `proto/controlplane.proto`.
///
/// The build script writes the generated source for the `bosun.v1` proto
/// package into `OUT_DIR`; this wrapper pulls it in so the rest of the crate
/// can refer to it as `crate::proto::bosun_v1`.
pub mod bosun_v1 {
    tonic::include_proto!("bosun.v1");
}
