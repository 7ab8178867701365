//! Devicetree Node Labeller for Kubernetes
//!
//! Discovers device tree `compatible` strings on the local machine,
//! normalizes them into vendor-qualified identifiers, and publishes them
//! either as labels on the local Kubernetes node or as a node-feature-discovery
//! feature file.
//!
//! # Architecture
//!
//! ```text
//! Scanner → Normalizer → Label Generator ─┬→ Node Controller (labels on Node)
//!                                         └→ Feature File (NFD features.d)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - `NodeStore` implementations (Kubernetes, in-memory)
//! - [`config`] - Labeller configuration
//! - [`controller`] - Event filtering and the node label reconciliation loop
//! - [`domain`] - `NodeStore` port and node events
//! - [`error`] - Error types
//! - [`features`] - NFD feature file and display output
//! - [`hardware`] - Device tree loading, scanning and normalization
//! - [`labels`] - Label key construction and grouped labels
//! - [`metrics`] - Prometheus metrics

pub mod adapters;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod features;
pub mod hardware;
pub mod labels;
pub mod metrics;

// Re-export commonly used types
pub use config::LabellerConfig;
pub use error::{Error, Result};
pub use hardware::{CompatScanner, CompatibilityMap, DeviceTree, NodeSpecifier};
pub use labels::{GroupAliases, LabelNamespace, LabelSet};

use hardware::CompatNormalizer;

/// Load the device tree and scan it for every configured node name.
///
/// Fails before any label computation if the device tree is unavailable.
pub fn discover(config: &LabellerConfig) -> Result<CompatibilityMap> {
    let specifiers = NodeSpecifier::parse_all(config.node_names.iter().cloned())?;
    let tree = DeviceTree::load(&config.device_tree_path)?;

    let scanner = CompatScanner::new(CompatNormalizer::new(config.vendor_aliases.clone()));
    let compat = scanner.scan(&tree, &specifiers);

    metrics::set_discovered_identifiers(compat.len());
    Ok(compat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_discover_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = LabellerConfig {
            device_tree_path: dir.path().join("device-tree"),
            ..Default::default()
        };
        assert_matches!(discover(&config), Err(Error::DescriptorUnavailable { .. }));
    }

    #[test]
    fn test_discover_root_compatible() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("compatible"),
            b"xlnx,zynq-zc702\0xlnx,zynq-7000\0",
        )
        .unwrap();
        let config = LabellerConfig {
            device_tree_path: dir.path().to_path_buf(),
            ..Default::default()
        };

        let compat = discover(&config).unwrap();
        assert_eq!(compat.get("xilinx-zynq-zc702"), Some(&1));
        assert_eq!(compat.get("xilinx-zynq-7000"), Some(&1));
    }
}
