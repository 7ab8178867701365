//! Devicetree Node Labeller Integration Tests
//!
//! Exercises the full pipeline against a device tree laid out on disk:
//! - Discovery and normalization
//! - Label and feature file generation
//! - Node label reconciliation through the in-memory store

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dt_node_labeller::adapters::InMemoryNodeStore;
use dt_node_labeller::controller::{self, ControllerContext, RetryPolicy};
use dt_node_labeller::features::FeatureFileWriter;
use dt_node_labeller::{discover, GroupAliases, LabelNamespace, LabellerConfig};
use tokio_util::sync::CancellationToken;

/// Jetson Nano style tree: board at the root, GPU as a child node
fn write_tree(root: &Path) {
    fs::write(
        root.join("compatible"),
        b"nvidia,p3450-0000\0nvidia,tegra210\0",
    )
    .unwrap();
    fs::write(root.join("model"), b"NVIDIA Jetson Nano Developer Kit\0").unwrap();

    let gpu = root.join("gpu@57000000");
    fs::create_dir(&gpu).unwrap();
    fs::write(gpu.join("compatible"), b"nvidia,gm20b\0").unwrap();

    let cpus = root.join("cpus");
    fs::create_dir_all(cpus.join("cpu@0")).unwrap();
    fs::write(cpus.join("cpu@0").join("compatible"), b"arm,cortex-a57\0").unwrap();
}

fn config(tree: &Path) -> LabellerConfig {
    LabellerConfig {
        labels: LabelNamespace::new("devicetree.org", false),
        groups: GroupAliases::empty().with_member("accelerator", "gpu", ["nvidia-tegra210"]),
        device_tree_path: tree.to_path_buf(),
        ..Default::default()
    }
}

mod discovery_tests {
    use super::*;

    #[test]
    fn test_root_only_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());

        let compat = discover(&config(dir.path())).unwrap();

        assert_eq!(compat.len(), 2);
        assert_eq!(compat.get("nvidia-p3450-0000"), Some(&1));
        assert_eq!(compat.get("nvidia-tegra210"), Some(&1));
    }

    #[test]
    fn test_additional_node_names() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let mut config = config(dir.path());
        config.node_names.extend(["gpu".to_string(), "cpu".to_string()]);

        let compat = discover(&config).unwrap();

        assert_eq!(compat.get("nvidia-gm20b"), Some(&1));
        assert_eq!(compat.get("arm-cortex-a57"), Some(&1));
        assert_eq!(compat.len(), 4);
    }

    #[test]
    fn test_unknown_node_name_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let mut config = config(dir.path());
        config.node_names.push("fpga".to_string());

        assert_eq!(discover(&config).unwrap().len(), 2);
    }
}

mod output_tests {
    use super::*;

    #[test]
    fn test_desired_labels_include_groups() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let config = config(dir.path());

        let compat = discover(&config).unwrap();
        let labels = config.labels.desired_labels(&compat, &config.groups);

        let expected: BTreeMap<String, String> = [
            ("devicetree.org/accelerator", "gpu"),
            ("devicetree.org/gpu", "nvidia-tegra210"),
            ("devicetree.org/nvidia-p3450-0000", "1"),
            ("devicetree.org/nvidia-tegra210", "1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn test_feature_file() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let config = config(dir.path());
        let features_dir = dir.path().join("features.d");

        let compat = discover(&config).unwrap();
        let path = FeatureFileWriter::new(&features_dir)
            .write(&compat, &config.labels)
            .unwrap();

        assert_eq!(path, features_dir.join("devicetree"));
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "devicetree.org/nvidia-p3450-0000=1\ndevicetree.org/nvidia-tegra210=1\n"
        );
    }
}

mod controller_tests {
    use super::*;

    #[tokio::test]
    async fn test_discovered_labels_reach_node() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let config = config(dir.path());
        let compat = discover(&config).unwrap();
        let desired = config.labels.desired_labels(&compat, &config.groups);

        let store = Arc::new(InMemoryNodeStore::new());
        let mut existing = BTreeMap::new();
        existing.insert("kubernetes.io/hostname".to_string(), "nano".to_string());
        existing.insert("devicetree.org/retired-board".to_string(), "1".to_string());
        store.insert(InMemoryNodeStore::node("nano", existing));

        let ctx = ControllerContext::with_retry(
            store.clone(),
            "nano",
            config.labels.clone(),
            desired.clone(),
            RetryPolicy {
                base: Duration::from_millis(10),
                max: Duration::from_millis(50),
            },
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(controller::run(ctx, shutdown.clone()));

        for _ in 0..200 {
            if store.update_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        let mut expected = desired;
        expected.insert("kubernetes.io/hostname".to_string(), "nano".to_string());
        assert_eq!(store.labels("nano").unwrap(), expected);
    }
}
