//! Label Generation
//!
//! Turns a [`CompatibilityMap`] into Kubernetes node labels under a managed
//! namespace, and into grouped summary labels such as
//! `accelerator=gpu,fpga gpu=nvidia-tegra210 fpga=xilinx-zynq7000`.
//! Grouping lets workloads select either on the class of device or on a
//! specific model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hardware::CompatibilityMap;

/// Label key → value
pub type LabelSet = BTreeMap<String, String>;

/// Default label namespace
pub const DEFAULT_NAMESPACE: &str = "devicetree.org";

/// Prefix marking experimental labels
pub const EXPERIMENTAL_PREFIX: &str = "beta.";

/// Infix marking labels sourced from the device tree
pub const DEVICE_TREE_INFIX: &str = "dt.";

/// Separator for grouped members in node label values.
///
/// Kubernetes label values may not contain `,`.
pub const LABEL_VALUE_SEPARATOR: &str = "_";

// =============================================================================
// Namespace
// =============================================================================

/// Label key construction and ownership rules.
///
/// Keys have the form `[beta.]<namespace>/[dt.]<name>`. Every key under
/// `<namespace>/` or `beta.<namespace>/` is owned by the labeller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelNamespace {
    /// DNS-style label prefix
    pub namespace: String,
    /// Emit `beta.`-prefixed keys
    pub experimental: bool,
    /// Insert the `dt.` infix before label names
    pub device_tree_infix: bool,
}

impl Default for LabelNamespace {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            experimental: true,
            device_tree_infix: false,
        }
    }
}

impl LabelNamespace {
    pub fn new(namespace: impl Into<String>, experimental: bool) -> Self {
        Self {
            namespace: namespace.into(),
            experimental,
            device_tree_infix: false,
        }
    }

    pub fn with_device_tree_infix(mut self, enabled: bool) -> Self {
        self.device_tree_infix = enabled;
        self
    }

    /// Full label key for `name`
    pub fn label_key(&self, name: &str) -> String {
        let beta = if self.experimental {
            EXPERIMENTAL_PREFIX
        } else {
            ""
        };
        let infix = if self.device_tree_infix {
            DEVICE_TREE_INFIX
        } else {
            ""
        };
        format!("{}{}/{}{}", beta, self.namespace, infix, name)
    }

    /// Whether `key` belongs to the managed namespace, experimental or not
    pub fn is_managed(&self, key: &str) -> bool {
        let key = key.strip_prefix(EXPERIMENTAL_PREFIX).unwrap_or(key);
        key.strip_prefix(self.namespace.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// One label per identifier, valued with its occurrence count
    pub fn generate_labels(&self, compat: &CompatibilityMap) -> LabelSet {
        compat
            .iter()
            .map(|(id, count)| (self.label_key(id), count.to_string()))
            .collect()
    }

    /// Labels applied to the node: per-identifier labels plus grouped labels.
    ///
    /// A grouped label never replaces a per-identifier label of the same key.
    pub fn desired_labels(&self, compat: &CompatibilityMap, groups: &GroupAliases) -> LabelSet {
        let mut labels = self.generate_labels(compat);
        for grouped in groups.generate(compat) {
            let key = self.label_key(&grouped.name);
            if labels.contains_key(&key) {
                warn!(
                    label = %key,
                    group = %grouped,
                    "Grouped label shadowed by identifier, skipping"
                );
                continue;
            }
            labels.insert(key, grouped.members.join(LABEL_VALUE_SEPARATOR));
        }
        labels
    }
}

// =============================================================================
// Grouped Labels
// =============================================================================

/// Group name → member type → recognized identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupAliases(BTreeMap<String, BTreeMap<String, Vec<String>>>);

impl Default for GroupAliases {
    fn default() -> Self {
        Self::empty()
            .with_member("accelerator", "gpu", ["nvidia-tegra210"])
            .with_member("accelerator", "fpga", ["xilinx-zynq7000"])
    }
}

impl GroupAliases {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Register the identifiers recognized as `member_type` within `group`
    pub fn with_member<I, S>(mut self, group: &str, member_type: &str, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(group.to_string())
            .or_default()
            .entry(member_type.to_string())
            .or_default()
            .extend(identifiers.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Grouped labels for the identifiers present in `compat`.
    ///
    /// Each matched member type yields `member=<ids>` and contributes to
    /// `group=<member types>`. Unmatched member types and groups are omitted.
    pub fn generate(&self, compat: &CompatibilityMap) -> Vec<GroupedLabel> {
        let mut labels = Vec::new();

        for (group, members) in &self.0 {
            let mut matched_types = Vec::new();

            for (member_type, known) in members {
                let present: Vec<String> = known
                    .iter()
                    .filter(|id| compat.contains_key(id.as_str()))
                    .cloned()
                    .collect();

                if !present.is_empty() {
                    matched_types.push(member_type.clone());
                    labels.push(GroupedLabel::new(member_type.clone(), present));
                }
            }

            if !matched_types.is_empty() {
                labels.push(GroupedLabel::new(group.clone(), matched_types));
            }
        }

        labels
    }
}

/// A summary label listing its members, rendered as `name=a,b`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedLabel {
    pub name: String,
    pub members: Vec<String>,
}

impl GroupedLabel {
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }
}

impl fmt::Display for GroupedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.members.join(","))
    }
}
