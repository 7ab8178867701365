//! In-Memory Node Store
//!
//! A `NodeStore` holding nodes in a map, with resource-version checks and a
//! broadcast watch. Used by tests and local dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::domain::events::NodeEvent;
use crate::domain::ports::{NodeEventStream, NodeStore};
use crate::error::{Error, Result};

const EVENT_BUFFER: usize = 64;

/// In-memory node store.
#[derive(Debug)]
pub struct InMemoryNodeStore {
    nodes: RwLock<HashMap<String, Node>>,
    events: broadcast::Sender<NodeEvent>,
    updates: AtomicUsize,
    pending_conflicts: AtomicU32,
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            nodes: RwLock::new(HashMap::new()),
            events,
            updates: AtomicUsize::new(0),
            pending_conflicts: AtomicU32::new(0),
        }
    }
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bare node with the given labels
    pub fn node(name: &str, labels: BTreeMap<String, String>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Store a node, emitting a create or update event
    pub fn insert(&self, mut node: Node) {
        let name = node.name_any();
        let event = {
            let mut nodes = self.nodes.write();
            let version = nodes
                .get(&name)
                .map(|n| next_version(&n.metadata))
                .unwrap_or(1);
            node.metadata.resource_version = Some(version.to_string());
            match nodes.insert(name.clone(), node) {
                Some(_) => NodeEvent::Update(name),
                None => NodeEvent::Create(name),
            }
        };
        let _ = self.events.send(event);
    }

    /// Remove a node, emitting a delete event
    pub fn remove(&self, name: &str) -> Option<Node> {
        let removed = self.nodes.write().remove(name);
        if removed.is_some() {
            let _ = self.events.send(NodeEvent::Delete(name.to_string()));
        }
        removed
    }

    /// Broadcast an arbitrary event to watchers
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }

    /// Current labels of a node
    pub fn labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.nodes
            .read()
            .get(name)
            .map(|n| n.metadata.labels.clone().unwrap_or_default())
    }

    /// Number of successful updates
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make the next `count` updates fail as if another writer got there first
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn next_version(meta: &ObjectMeta) -> u64 {
    meta.resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get_node(&self, name: &str) -> Result<Node> {
        self.nodes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }

    async fn update_node(&self, node: &Node) -> Result<Node> {
        let name = node.name_any();
        let mut nodes = self.nodes.write();
        let stored = nodes
            .get_mut(&name)
            .ok_or_else(|| Error::NodeNotFound(name.clone()))?;

        if self.take_conflict() {
            stored.metadata.resource_version = Some(next_version(&stored.metadata).to_string());
            return Err(Error::Conflict(name));
        }
        if stored.metadata.resource_version != node.metadata.resource_version {
            return Err(Error::Conflict(name));
        }

        let mut updated = node.clone();
        updated.metadata.resource_version = Some(next_version(&stored.metadata).to_string());
        *stored = updated.clone();
        drop(nodes);

        self.updates.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(NodeEvent::Update(name));
        Ok(updated)
    }

    fn watch(&self) -> NodeEventStream {
        let rx = self.events.subscribe();
        let existing: Vec<Result<NodeEvent>> = self
            .nodes
            .read()
            .keys()
            .map(|name| Ok(NodeEvent::Create(name.clone())))
            .collect();

        let live = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        futures::stream::iter(existing).chain(live).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_get_missing_node() {
        let store = InMemoryNodeStore::new();
        assert_matches!(store.get_node("absent").await, Err(Error::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_bumps_resource_version() {
        let store = InMemoryNodeStore::new();
        store.insert(InMemoryNodeStore::node("worker-1", labels(&[("a", "1")])));

        let node = store.get_node("worker-1").await.unwrap();
        assert_eq!(node.metadata.resource_version.as_deref(), Some("1"));

        let updated = store.update_node(&node).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryNodeStore::new();
        store.insert(InMemoryNodeStore::node("worker-1", labels(&[])));

        let stale = store.get_node("worker-1").await.unwrap();
        store.update_node(&stale).await.unwrap();

        assert_matches!(store.update_node(&stale).await, Err(Error::Conflict(_)));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_conflict() {
        let store = InMemoryNodeStore::new();
        store.insert(InMemoryNodeStore::node("worker-1", labels(&[])));
        store.inject_conflicts(1);

        let node = store.get_node("worker-1").await.unwrap();
        assert_matches!(store.update_node(&node).await, Err(Error::Conflict(_)));

        let fresh = store.get_node("worker-1").await.unwrap();
        assert!(store.update_node(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_watch_replays_existing_nodes() {
        let store = InMemoryNodeStore::new();
        store.insert(InMemoryNodeStore::node("worker-1", labels(&[])));

        let mut events = store.watch();
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            NodeEvent::Create("worker-1".to_string())
        );

        store.remove("worker-1");
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            NodeEvent::Delete("worker-1".to_string())
        );
    }
}
