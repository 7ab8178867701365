//! Hardware Discovery Module
//!
//! Discovery of platform hardware from the device tree.
//!
//! # Features
//!
//! - Device tree loading from `/proc/device-tree`
//! - Node selection by exact name or `name<N>@addr` pattern
//! - `compatible` string extraction and vendor normalization
//!
//! # Example
//!
//! ```no_run
//! use dt_node_labeller::hardware::{CompatScanner, DeviceTree, NodeSpecifier};
//!
//! # fn example() -> dt_node_labeller::Result<()> {
//! let tree = DeviceTree::load("/proc/device-tree")?;
//! let specifiers = NodeSpecifier::parse_all(["/", "gpu"])?;
//! let compat = CompatScanner::default().scan(&tree, &specifiers);
//!
//! for (identifier, count) in &compat {
//!     println!("{}: {}", identifier, count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod compat;
pub mod devicetree;

pub use compat::{CompatNormalizer, CompatibilityMap, VendorAliases};
pub use devicetree::{
    scanner::{compatible_strings, CompatScanner, NodeSpecifier},
    DeviceTree, DtNode, DEFAULT_DEVICE_TREE_PATH,
};
