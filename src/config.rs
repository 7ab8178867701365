//! Labeller Configuration
//!
//! Built-in defaults can be overridden with a YAML file:
//!
//! ```yaml
//! labels:
//!   namespace: adaptant.io
//!   experimental: true
//!   deviceTreeInfix: true
//! vendorAliases:
//!   xlnx: xilinx
//!   fsl: nxp
//! groups:
//!   accelerator:
//!     gpu: [nvidia-tegra210]
//!     fpga: [xilinx-zynq7000]
//! nodeNames: ["/", "gpu"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::features::DEFAULT_FEATURES_DIR;
use crate::hardware::devicetree::ROOT_NODE_NAME;
use crate::hardware::{VendorAliases, DEFAULT_DEVICE_TREE_PATH};
use crate::labels::{GroupAliases, LabelNamespace};

/// Configuration for discovery and labelling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabellerConfig {
    /// Label key construction
    pub labels: LabelNamespace,

    /// Vendor prefix rewrites applied to compatible strings
    pub vendor_aliases: VendorAliases,

    /// Grouped summary labels
    pub groups: GroupAliases,

    /// Device tree node names to scan
    pub node_names: Vec<String>,

    /// Root of the device tree
    pub device_tree_path: PathBuf,

    /// NFD features directory
    pub features_dir: PathBuf,
}

impl Default for LabellerConfig {
    fn default() -> Self {
        Self {
            labels: LabelNamespace::default(),
            vendor_aliases: VendorAliases::default(),
            groups: GroupAliases::default(),
            node_names: vec![ROOT_NODE_NAME.to_string()],
            device_tree_path: PathBuf::from(DEFAULT_DEVICE_TREE_PATH),
            features_dir: PathBuf::from(DEFAULT_FEATURES_DIR),
        }
    }
}

impl LabellerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&yaml)?;
        debug!(path = %path.display(), "Loaded labeller configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let namespace = &self.labels.namespace;
        if namespace.is_empty() {
            return Err(Error::Config("label namespace must not be empty".to_string()));
        }
        if namespace.contains('/') {
            return Err(Error::Config(format!(
                "label namespace '{}' must not contain '/'",
                namespace
            )));
        }
        if self.node_names.iter().any(String::is_empty) {
            return Err(Error::Config("node names must not be empty".to_string()));
        }
        Ok(())
    }
}
