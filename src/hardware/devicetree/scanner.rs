//! Compatible String Scanner
//!
//! Collects `compatible` strings from every device tree node selected by a
//! list of node-name specifiers and tallies their normalized identifiers.

use regex::Regex;
use tracing::{debug, info};

use super::{DeviceTree, DtNode, ROOT_NODE_NAME};
use crate::error::Result;
use crate::hardware::compat::{CompatNormalizer, CompatibilityMap};

/// Property holding the NUL-separated compatible strings
pub const COMPATIBLE_PROPERTY: &str = "compatible";

// =============================================================================
// Node Specifier
// =============================================================================

/// Selects device tree nodes by name.
///
/// A specifier `gpu` matches a node named exactly `gpu` as well as any node
/// named `gpu@<addr>` or `gpu<N>@<addr>`.
#[derive(Debug, Clone)]
pub struct NodeSpecifier {
    name: String,
    pattern: Regex,
}

impl NodeSpecifier {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(&format!("^({})([0-9]+|)@.*$", regex::escape(&name)))?;
        Ok(Self { name, pattern })
    }

    /// Specifier for the root node
    pub fn root() -> Result<Self> {
        Self::new(ROOT_NODE_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a node name is selected by this specifier
    pub fn matches(&self, node_name: &str) -> bool {
        node_name == self.name || self.pattern.is_match(node_name)
    }

    /// Build specifiers from a list of names
    pub fn parse_all<I, S>(names: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(Self::new).collect()
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// Split a `compatible` property into its strings.
///
/// The property is a sequence of NUL-terminated strings; the empty segment
/// after the final terminator is dropped.
pub fn compatible_strings(value: &[u8]) -> Vec<String> {
    let mut strings: Vec<String> = value
        .split(|b| *b == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect();
    strings.pop();
    strings
}

/// Walks a device tree and builds a [`CompatibilityMap`]
#[derive(Debug, Clone, Default)]
pub struct CompatScanner {
    normalizer: CompatNormalizer,
}

impl CompatScanner {
    pub fn new(normalizer: CompatNormalizer) -> Self {
        Self { normalizer }
    }

    /// Scan `tree` for every specifier.
    ///
    /// Each specifier is matched independently, so a node selected by two
    /// specifiers is counted twice.
    pub fn scan(&self, tree: &DeviceTree, specifiers: &[NodeSpecifier]) -> CompatibilityMap {
        let mut compat = CompatibilityMap::new();

        for spec in specifiers {
            let mut matched = 0usize;

            tree.match_node(spec.name(), |node| {
                matched += 1;
                self.tally(node, &mut compat);
            });
            tree.match_node_regex(&spec.pattern, |node| {
                matched += 1;
                self.tally(node, &mut compat);
            });

            debug!(specifier = %spec.name(), matched, "Scanned device tree nodes");
        }

        info!(identifiers = compat.len(), "Device tree scan complete");
        compat
    }

    fn tally(&self, node: &DtNode, compat: &mut CompatibilityMap) {
        let Some(value) = node.property(COMPATIBLE_PROPERTY) else {
            return;
        };

        for raw in compatible_strings(value) {
            *compat.entry(self.normalizer.normalize(&raw)).or_insert(0) += 1;
        }
    }
}
