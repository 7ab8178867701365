//! Compatible String Normalization
//!
//! Device tree `compatible` strings are conventionally `"<vendor>,<model>"`.
//! They are rewritten to `"<vendor>-<model>"` so they can be used as label
//! names, with well-known vendor prefixes mapped to their canonical names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Occurrence count per canonical identifier, produced by a single scan
pub type CompatibilityMap = BTreeMap<String, u32>;

// =============================================================================
// Vendor Aliases
// =============================================================================

/// Mapping from a vendor prefix to its canonical vendor name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorAliases(BTreeMap<String, String>);

impl VendorAliases {
    /// Create an empty alias table
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Add an alias
    pub fn with_alias(mut self, vendor: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.0.insert(vendor.into(), canonical.into());
        self
    }

    /// Canonical vendor name; unknown vendors pass through unchanged
    pub fn resolve<'a>(&'a self, vendor: &'a str) -> &'a str {
        self.0.get(vendor).map(String::as_str).unwrap_or(vendor)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for VendorAliases {
    fn default() -> Self {
        Self::empty().with_alias("xlnx", "xilinx")
    }
}

impl FromIterator<(String, String)> for VendorAliases {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Normalizer
// =============================================================================

/// Rewrites raw compatible strings into canonical identifiers
#[derive(Debug, Clone, Default)]
pub struct CompatNormalizer {
    aliases: VendorAliases,
}

impl CompatNormalizer {
    pub fn new(aliases: VendorAliases) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &VendorAliases {
        &self.aliases
    }

    /// Normalize `vendor,model` to `vendor-model`.
    ///
    /// Only the first comma separates the vendor; tokens without a comma are
    /// returned as-is.
    pub fn normalize(&self, token: &str) -> String {
        match token.split_once(',') {
            Some((vendor, model)) => format!("{}-{}", self.aliases.resolve(vendor), model),
            None => token.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_applies_vendor_alias() {
        let normalizer = CompatNormalizer::default();
        assert_eq!(normalizer.normalize("xlnx,zynq-7000"), "xilinx-zynq-7000");
    }

    #[test]
    fn test_normalize_unknown_vendor_passes_through() {
        let normalizer = CompatNormalizer::default();
        assert_eq!(normalizer.normalize("nvidia,tegra210"), "nvidia-tegra210");
    }

    #[test]
    fn test_normalize_without_comma() {
        let normalizer = CompatNormalizer::default();
        assert_eq!(normalizer.normalize("simple-bus"), "simple-bus");
        assert_eq!(normalizer.normalize(""), "");
    }

    #[test]
    fn test_normalize_splits_on_first_comma_only() {
        let normalizer = CompatNormalizer::default();
        assert_eq!(normalizer.normalize("xlnx,zynq,rev2"), "xilinx-zynq,rev2");
    }

    #[test]
    fn test_alias_only_rewrites_vendor_segment() {
        let normalizer = CompatNormalizer::default();
        assert_eq!(normalizer.normalize("acme,xlnx"), "acme-xlnx");
    }

    #[test]
    fn test_custom_aliases() {
        let aliases = VendorAliases::empty().with_alias("fsl", "nxp");
        let normalizer = CompatNormalizer::new(aliases);
        assert_eq!(normalizer.normalize("fsl,imx8mq"), "nxp-imx8mq");
        assert_eq!(normalizer.normalize("xlnx,zynqmp"), "xlnx-zynqmp");
    }

    proptest! {
        #[test]
        fn prop_tokens_without_comma_are_unchanged(token in "[^,]*") {
            let normalizer = CompatNormalizer::default();
            prop_assert_eq!(normalizer.normalize(&token), token);
        }

        #[test]
        fn prop_vendor_model_joined_with_hyphen(
            vendor in "[a-z0-9]{1,12}",
            model in "[a-z0-9,.-]{0,24}",
        ) {
            let normalizer = CompatNormalizer::default();
            let expected = format!("{}-{}", normalizer.aliases().resolve(&vendor), model);
            prop_assert_eq!(normalizer.normalize(&format!("{},{}", vendor, model)), expected);
        }
    }
}
