//! Feature Output
//!
//! Renders discovered identifiers for node-feature-discovery's local
//! feature source and for the display-only dump.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::hardware::CompatibilityMap;
use crate::labels::LabelNamespace;

/// Directory scanned by NFD's local feature source
pub const DEFAULT_FEATURES_DIR: &str = "/etc/kubernetes/node-feature-discovery/features.d";

/// Name of the feature file written into the features directory
pub const FEATURE_FILE_NAME: &str = "devicetree";

/// Render feature lines, one `<label-key>=<count>` per identifier
pub fn render_features(compat: &CompatibilityMap, namespace: &LabelNamespace) -> String {
    compat
        .iter()
        .map(|(id, count)| format!("{}={}\n", namespace.label_key(id), count))
        .collect()
}

/// Render the human-readable dump printed in display mode
pub fn render_display(compat: &CompatibilityMap, namespace: &LabelNamespace) -> String {
    let mut out = String::from("Discovered the following devicetree properties:\n\n");
    for (id, count) in compat {
        out.push_str(&format!("{}: {}\n", namespace.label_key(id), count));
    }
    out
}

/// Writes the flat feature file consumed by NFD
#[derive(Debug, Clone)]
pub struct FeatureFileWriter {
    dir: PathBuf,
    file_name: String,
}

impl Default for FeatureFileWriter {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURES_DIR)
    }
}

impl FeatureFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: FEATURE_FILE_NAME.to_string(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Full path of the feature file
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Create the directory if needed and replace the feature file.
    ///
    /// The file is flushed and synced before it is closed.
    pub fn write(&self, compat: &CompatibilityMap, namespace: &LabelNamespace) -> Result<PathBuf> {
        let path = self.path();
        let wrap = |at: &Path, source: std::io::Error| Error::FeatureFile {
            path: at.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(|e| wrap(&self.dir, e))?;

        let file = File::create(&path).map_err(|e| wrap(&path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(render_features(compat, namespace).as_bytes())
            .map_err(|e| wrap(&path, e))?;
        writer.flush().map_err(|e| wrap(&path, e))?;
        writer.get_ref().sync_all().map_err(|e| wrap(&path, e))?;

        info!(path = %path.display(), features = compat.len(), "Wrote feature file");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample() -> CompatibilityMap {
        let mut map = CompatibilityMap::new();
        map.insert("xilinx-zynq-7000".to_string(), 1);
        map.insert("arm-cortex-a9".to_string(), 2);
        map
    }

    #[test]
    fn test_render_features() {
        let ns = LabelNamespace::new("devicetree.org", true);
        assert_eq!(
            render_features(&sample(), &ns),
            "beta.devicetree.org/arm-cortex-a9=2\nbeta.devicetree.org/xilinx-zynq-7000=1\n"
        );
    }

    #[test]
    fn test_render_display() {
        let ns = LabelNamespace::new("devicetree.org", true);
        let out = render_display(&sample(), &ns);
        assert!(out.starts_with("Discovered the following devicetree properties:\n\n"));
        assert!(out.contains("beta.devicetree.org/xilinx-zynq-7000: 1\n"));
    }

    #[test]
    fn test_write_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let features_dir = dir.path().join("features.d");
        let writer = FeatureFileWriter::new(&features_dir);
        let ns = LabelNamespace::new("devicetree.org", false);

        let path = writer.write(&sample(), &ns).unwrap();

        assert_eq!(path, features_dir.join(FEATURE_FILE_NAME));
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "devicetree.org/arm-cortex-a9=2\ndevicetree.org/xilinx-zynq-7000=1\n"
        );
    }

    #[test]
    fn test_write_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FeatureFileWriter::new(dir.path()).with_file_name("dt");
        let ns = LabelNamespace::new("devicetree.org", false);

        writer.write(&sample(), &ns).unwrap();
        writer.write(&CompatibilityMap::new(), &ns).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("dt")).unwrap(), "");
    }

    #[test]
    fn test_write_fails_when_directory_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("features.d");
        fs::write(&blocker, b"").unwrap();

        let writer = FeatureFileWriter::new(&blocker);
        let result = writer.write(&sample(), &LabelNamespace::default());
        assert_matches!(result, Err(Error::FeatureFile { .. }));
    }
}
