/*
SPDX-FileCopyrightText: Copyright 2026 Bosun Authors
SPDX-License-Identifier: MIT
*/

/// Compiles `proto/controlplane.proto` at build time.
///
/// tonic-build emits the prost message types plus the `DeploymentControl`
/// server and client stubs into `OUT_DIR`; `src/proto/mod.rs` includes them
/// from there.  Building requires `protoc` on `$PATH` (or pointed to by the
/// `PROTOC` env var) — `apt install protobuf-compiler` / `brew install
/// protobuf`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "proto";
    let proto_file = format!("{}/controlplane.proto", proto_root);

    println!("cargo:rerun-if-changed={}", proto_file);

    tonic_build::configure()
        // Server stubs for the control plane; client stubs for the completion
        // agent and for integration tooling.
        .build_server(true)
        .build_client(true)
        // Serde derives on the generated messages — the wire types show up in
        // structured logs and test fixtures.
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .compile_protos(&[proto_file.as_str()], &[proto_root])?;

    Ok(())
}
