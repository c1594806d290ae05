//! Cluster fleet configuration.
//!
//! Cluster records are created externally during organization onboarding and
//! the scheduler only reads them; at process start the fleet is declared in a
//! YAML file and seeded into the resource ledger.
//!
//! A fleet file:
//! ```yaml
//! clusters:
//!   gpu-east:
//!     total_ram_gb: 256
//!     total_cpu_cores: 64
//!     total_gpu_count: 8
//!     organization: "acme"
//!     description: "A100 training pool"
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::resources::ResourceVector;

// ── File-layout types (serde targets) ─────────────────────────────────────────

/// Raw file layout.  Deserialization target only; everything public goes
/// through [`ClusterSpec`].
#[derive(Debug, Deserialize)]
struct ClusterFleetFile {
    clusters: HashMap<String, ClusterSpecEntry>,
}

/// One cluster as written in YAML.  Capacity fields are mandatory — a
/// cluster with unknown capacity cannot be scheduled against — while
/// `organization` and `description` default to empty.
#[derive(Debug, Deserialize)]
struct ClusterSpecEntry {
    total_ram_gb: f64,
    total_cpu_cores: f64,
    #[serde(default)]
    total_gpu_count: u32,
    organization: Option<String>,
    description: Option<String>,
}

// ── Public fleet types ────────────────────────────────────────────────────────

/// Declared capacity and ownership of a single cluster.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub name: String,
    pub organization: String,
    pub description: String,
    pub total: ResourceVector,
}

// ── ClusterFleet ──────────────────────────────────────────────────────────────

/// Parsed cluster fleet, keyed by cluster name.
#[derive(Debug, Default)]
pub struct ClusterFleet {
    specs: HashMap<String, ClusterSpec>,

    /// Tracks whether a file has been parsed successfully.
    loaded: bool,
}

impl ClusterFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `path` into the fleet map, discarding whatever was loaded
    /// before.
    ///
    /// # Errors
    /// Fails when the file is unreadable, the YAML does not match the
    /// expected layout, or a declared capacity is negative or non-finite.
    /// On error the fleet is left empty and unloaded.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Reading cluster fleet file: {}", path.display());

        self.specs.clear();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open fleet file: {}", path.display()))?;

        let file: ClusterFleetFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Cannot parse fleet YAML: {}", path.display()))?;

        for (name, entry) in file.clusters {
            let total = ResourceVector::new(
                entry.total_ram_gb,
                entry.total_cpu_cores,
                entry.total_gpu_count,
            );
            if !total.is_well_formed() {
                bail!(
                    "cluster '{}' declares invalid capacity ({})",
                    name,
                    total
                );
            }

            let spec = ClusterSpec {
                name: name.clone(),
                organization: entry.organization.unwrap_or_default(),
                description: entry.description.unwrap_or_default(),
                total,
            };

            debug!(
                "  Cluster: {} | {} | Org: {}",
                spec.name, spec.total, spec.organization,
            );

            self.specs.insert(name, spec);
        }

        if self.specs.is_empty() {
            warn!("Fleet file declares no clusters — submissions will be rejected until one is registered");
        }

        self.loaded = true;

        info!("Fleet loaded: {} cluster(s)", self.specs.len());
        for spec in self.specs.values() {
            info!("  Cluster: {} | {} | Org: {}", spec.name, spec.total, spec.organization);
        }

        Ok(())
    }

    /// Look up one cluster's spec by name.
    pub fn get_spec(&self, name: &str) -> Option<&ClusterSpec> {
        self.specs.get(name)
    }

    /// All specs sorted by cluster name, so id assignment at registration is
    /// deterministic across restarts.
    pub fn specs_sorted(&self) -> Vec<&ClusterSpec> {
        let mut out: Vec<&ClusterSpec> = self.specs.values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// `true` once a file has been parsed without error.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// A fleet file on disk with the given contents.
    fn fleet_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn full_fleet_parses_with_all_fields() {
        let yaml = r#"
clusters:
  gpu-east:
    total_ram_gb: 256
    total_cpu_cores: 64
    total_gpu_count: 8
    organization: "acme"
    description: "A100 training pool"
  cpu-batch:
    total_ram_gb: 512
    total_cpu_cores: 128
    organization: "acme"
"#;
        let f = fleet_file(yaml);
        let mut fleet = ClusterFleet::new();
        fleet.load_from_file(f.path()).unwrap();

        assert!(fleet.is_loaded());
        assert_eq!(fleet.specs_sorted().len(), 2);

        let east = fleet.get_spec("gpu-east").unwrap();
        assert_eq!(east.total, ResourceVector::new(256.0, 64.0, 8));
        assert_eq!(east.organization, "acme");
        assert_eq!(east.description, "A100 training pool");

        let batch = fleet.get_spec("cpu-batch").unwrap();
        assert_eq!(batch.total.gpu_count, 0, "gpu count defaults to zero");
        assert_eq!(batch.description, "");
    }

    #[test]
    fn specs_sorted_is_alphabetical() {
        let yaml = r#"
clusters:
  zeta:
    total_ram_gb: 1
    total_cpu_cores: 1
  alpha:
    total_ram_gb: 1
    total_cpu_cores: 1
"#;
        let f = fleet_file(yaml);
        let mut fleet = ClusterFleet::new();
        fleet.load_from_file(f.path()).unwrap();

        let names: Vec<&str> = fleet.specs_sorted().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn negative_capacity_is_rejected() {
        let yaml = r#"
clusters:
  broken:
    total_ram_gb: -4
    total_cpu_cores: 8
"#;
        let f = fleet_file(yaml);
        let mut fleet = ClusterFleet::new();
        assert!(fleet.load_from_file(f.path()).is_err());
        assert!(!fleet.is_loaded());
    }

    #[test]
    fn missing_capacity_field_is_rejected() {
        let yaml = r#"
clusters:
  broken:
    total_ram_gb: 4
"#;
        let f = fleet_file(yaml);
        let mut fleet = ClusterFleet::new();
        assert!(fleet.load_from_file(f.path()).is_err());
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let mut fleet = ClusterFleet::new();
        let result = fleet.load_from_file(Path::new("/nonexistent/path/fleet.yaml"));
        assert!(result.is_err());
        assert!(!fleet.is_loaded());
    }

    #[test]
    fn non_fleet_yaml_is_an_error() {
        let f = fleet_file("clusters: [not, a, map]\n");
        let mut fleet = ClusterFleet::new();
        assert!(fleet.load_from_file(f.path()).is_err());
        assert!(!fleet.is_loaded());
    }

    #[test]
    fn empty_fleet_loads_with_no_clusters() {
        let f = fleet_file("clusters: {}\n");
        let mut fleet = ClusterFleet::new();
        fleet.load_from_file(f.path()).unwrap();
        assert!(fleet.is_loaded());
        assert!(fleet.specs_sorted().is_empty());
    }

    #[test]
    fn reloading_discards_previous_fleet() {
        let yaml1 = "clusters:\n  one:\n    total_ram_gb: 1\n    total_cpu_cores: 1\n";
        let yaml2 = "clusters:\n  two:\n    total_ram_gb: 2\n    total_cpu_cores: 2\n";

        let f1 = fleet_file(yaml1);
        let f2 = fleet_file(yaml2);

        let mut fleet = ClusterFleet::new();
        fleet.load_from_file(f1.path()).unwrap();
        assert!(fleet.get_spec("one").is_some());

        fleet.load_from_file(f2.path()).unwrap();
        assert!(fleet.get_spec("one").is_none(), "first fleet fully replaced");
        assert!(fleet.get_spec("two").is_some());
    }
}
