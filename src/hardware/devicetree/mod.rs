//! Device Tree Access
//!
//! Loads the kernel's view of the flattened device tree. Under
//! `/proc/device-tree` every directory is a node and every regular file is a
//! property holding raw bytes.
//!
//! ```text
//! /proc/device-tree/
//! ├── compatible            "xlnx,zynq-7000\0"
//! ├── model
//! └── amba@f8000000/
//!     ├── compatible        "simple-bus\0"
//!     └── gpu@57000000/
//!         └── compatible    "nvidia,tegra210-gm20b\0nvidia,gm20b\0"
//! ```

pub mod scanner;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Default location of the live device tree
pub const DEFAULT_DEVICE_TREE_PATH: &str = "/proc/device-tree";

/// Name of the root node
pub const ROOT_NODE_NAME: &str = "/";

// =============================================================================
// Node
// =============================================================================

/// A device tree node with its properties and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtNode {
    name: String,
    properties: BTreeMap<String, Vec<u8>>,
    children: Vec<DtNode>,
}

impl DtNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Add a property with raw bytes
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Add a `compatible` property encoded as NUL-terminated strings
    pub fn with_compatible(self, values: &[&str]) -> Self {
        let mut encoded = Vec::new();
        for value in values {
            encoded.extend_from_slice(value.as_bytes());
            encoded.push(0);
        }
        self.with_property("compatible", encoded)
    }

    pub fn with_child(mut self, child: DtNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw bytes of a property
    pub fn property(&self, name: &str) -> Option<&[u8]> {
        self.properties.get(name).map(Vec::as_slice)
    }

    pub fn children(&self) -> &[DtNode] {
        &self.children
    }

    /// Visit this node and all descendants, parents before children
    pub fn walk<'a, F>(&'a self, visitor: &mut F)
    where
        F: FnMut(&'a DtNode),
    {
        visitor(self);
        for child in &self.children {
            child.walk(visitor);
        }
    }
}

// =============================================================================
// Tree
// =============================================================================

/// A parsed device tree
#[derive(Debug, Clone)]
pub struct DeviceTree {
    root: DtNode,
}

impl DeviceTree {
    /// Wrap an existing root node; it is renamed to `/`
    pub fn from_root(mut root: DtNode) -> Self {
        root.name = ROOT_NODE_NAME.to_string();
        Self { root }
    }

    /// Load the tree exposed by the kernel under `path`.
    ///
    /// Fails with [`Error::DescriptorUnavailable`] when the path is missing,
    /// is not a directory, or any part of it cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let unavailable = |reason: String| Error::DescriptorUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let meta = fs::metadata(path).map_err(|e| unavailable(e.to_string()))?;
        if !meta.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }

        let root = load_node(path, ROOT_NODE_NAME.to_string())
            .map_err(|(at, e)| unavailable(format!("{}: {}", at.display(), e)))?;

        debug!(path = %path.display(), "Loaded device tree");
        Ok(Self { root })
    }

    pub fn root(&self) -> &DtNode {
        &self.root
    }

    /// Invoke `visitor` for every node whose name equals `name`
    pub fn match_node<'a, F>(&'a self, name: &str, mut visitor: F)
    where
        F: FnMut(&'a DtNode),
    {
        self.root.walk(&mut |node| {
            if node.name == name {
                visitor(node);
            }
        });
    }

    /// Invoke `visitor` for every node whose name matches `pattern`
    pub fn match_node_regex<'a, F>(&'a self, pattern: &Regex, mut visitor: F)
    where
        F: FnMut(&'a DtNode),
    {
        self.root.walk(&mut |node| {
            if pattern.is_match(&node.name) {
                visitor(node);
            }
        });
    }
}

type LoadError = (PathBuf, std::io::Error);

fn load_node(dir: &Path, name: String) -> std::result::Result<DtNode, LoadError> {
    let mut node = DtNode::new(name);

    let entries = fs::read_dir(dir).map_err(|e| (dir.to_path_buf(), e))?;
    let mut entries = entries
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| (dir.to_path_buf(), e))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let entry_path = entry.path();
        let file_type = entry.file_type().map_err(|e| (entry_path.clone(), e))?;
        let entry_name = entry.file_name().to_string_lossy().into_owned();

        if file_type.is_dir() {
            node.children.push(load_node(&entry_path, entry_name)?);
        } else if file_type.is_file() {
            let value = fs::read(&entry_path).map_err(|e| (entry_path.clone(), e))?;
            trace!(property = %entry_path.display(), len = value.len(), "Read property");
            node.properties.insert(entry_name, value);
        }
    }

    Ok(node)
}
