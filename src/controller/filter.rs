//! Event Filtering
//!
//! Decides which watch events trigger a reconciliation and resolves the
//! identity of the node the labeller runs on.

use std::fs;
use std::path::Path;

use crate::domain::NodeEvent;
use crate::error::{Error, Result};

/// Environment variable carrying the local node name (usually from the downward API)
pub const NODE_NAME_ENV: &str = "NODE_NAME";

const HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";

/// Only the creation of the local node triggers a reconciliation.
pub fn should_reconcile(local_node: &str, event: &NodeEvent) -> bool {
    matches!(event, NodeEvent::Create(name) if name == local_node)
}

/// Local node name: the override when set, otherwise the machine hostname.
pub fn resolve_local_node(override_name: Option<&str>) -> Result<String> {
    resolve_local_node_from(override_name, Path::new(HOSTNAME_PATH))
}

fn resolve_local_node_from(override_name: Option<&str>, hostname_path: &Path) -> Result<String> {
    if let Some(name) = override_name.map(str::trim).filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }

    let hostname = fs::read_to_string(hostname_path)
        .map_err(|e| Error::Hostname(format!("{}: {}", hostname_path.display(), e)))?;
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return Err(Error::Hostname("hostname is empty".to_string()));
    }
    Ok(hostname.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_only_local_create_events_pass() {
        let local = "worker-1";
        assert!(should_reconcile(local, &NodeEvent::Create("worker-1".to_string())));
        assert!(!should_reconcile(local, &NodeEvent::Create("worker-2".to_string())));
        assert!(!should_reconcile(local, &NodeEvent::Update("worker-1".to_string())));
        assert!(!should_reconcile(local, &NodeEvent::Delete("worker-1".to_string())));
        assert!(!should_reconcile(local, &NodeEvent::Generic("worker-1".to_string())));
    }

    #[test]
    fn test_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostname");
        fs::write(&path, "machine\n").unwrap();

        assert_eq!(
            resolve_local_node_from(Some("worker-1"), &path).unwrap(),
            "worker-1"
        );
    }

    #[test]
    fn test_blank_override_falls_back_to_hostname() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostname");
        fs::write(&path, "machine\n").unwrap();

        assert_eq!(resolve_local_node_from(Some("  "), &path).unwrap(), "machine");
        assert_eq!(resolve_local_node_from(None, &path).unwrap(), "machine");
    }

    #[test]
    fn test_missing_hostname() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_local_node_from(None, &dir.path().join("absent"));
        assert_matches!(result, Err(Error::Hostname(_)));
    }
}
