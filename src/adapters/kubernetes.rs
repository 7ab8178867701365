//! Kubernetes Node Store Adapter
//!
//! Implements the `NodeStore` port with the kube-rs client and watcher.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tracing::{debug, instrument};

use crate::domain::events::NodeEvent;
use crate::domain::ports::{NodeEventStream, NodeStore};
use crate::error::{Error, Result};

/// Kubernetes-backed node store.
#[derive(Clone)]
pub struct KubeNodeStore {
    client: Client,
    field_selector: Option<String>,
}

impl KubeNodeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_selector: None,
        }
    }

    /// Restrict the watch to a single node.
    pub fn watching_node(mut self, name: &str) -> Self {
        self.field_selector = Some(format!("metadata.name={}", name));
        self
    }

    fn nodes_api(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

impl std::fmt::Debug for KubeNodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeNodeStore")
            .field("field_selector", &self.field_selector)
            .finish()
    }
}

/// Map API status codes onto the store's error contract
fn map_api_error(name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(e) if e.code == 404 => Error::NodeNotFound(name.to_string()),
        kube::Error::Api(e) if e.code == 409 => Error::Conflict(name.to_string()),
        other => Error::Kube(other),
    }
}

#[async_trait]
impl NodeStore for KubeNodeStore {
    #[instrument(skip(self))]
    async fn get_node(&self, name: &str) -> Result<Node> {
        self.nodes_api()
            .get(name)
            .await
            .map_err(|e| map_api_error(name, e))
    }

    #[instrument(skip(self, node), fields(node = %node.name_any()))]
    async fn update_node(&self, node: &Node) -> Result<Node> {
        let name = node.name_any();
        let updated = self
            .nodes_api()
            .replace(&name, &PostParams::default(), node)
            .await
            .map_err(|e| map_api_error(&name, e))?;

        debug!(
            resource_version = ?updated.metadata.resource_version,
            "Replaced Node"
        );
        Ok(updated)
    }

    fn watch(&self) -> NodeEventStream {
        let mut config = watcher::Config::default();
        if let Some(selector) = &self.field_selector {
            config = config.fields(selector);
        }

        let mut tracker = EventTracker::default();
        watcher(self.nodes_api(), config)
            .default_backoff()
            .filter_map(move |event| {
                let translated = match event {
                    Ok(event) => tracker.translate(event).map(Ok),
                    Err(e) => Some(Err(Error::Watch(e))),
                };
                futures::future::ready(translated)
            })
            .boxed()
    }
}

// =============================================================================
// Event Translation
// =============================================================================

/// Turns watcher events into create/update/delete events.
///
/// The watcher reports every observed state as an apply; the first sighting
/// of a name is a create, later ones are updates.
#[derive(Debug, Default)]
struct EventTracker {
    known: HashSet<String>,
}

impl EventTracker {
    fn translate(&mut self, event: watcher::Event<Node>) -> Option<NodeEvent> {
        match event {
            watcher::Event::Apply(node) | watcher::Event::InitApply(node) => {
                let name = node.name_any();
                if self.known.insert(name.clone()) {
                    Some(NodeEvent::Create(name))
                } else {
                    Some(NodeEvent::Update(name))
                }
            }
            watcher::Event::Delete(node) => {
                let name = node.name_any();
                self.known.remove(&name);
                Some(NodeEvent::Delete(name))
            }
            watcher::Event::Init | watcher::Event::InitDone => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_first_sighting_is_create() {
        let mut tracker = EventTracker::default();
        assert_eq!(
            tracker.translate(watcher::Event::InitApply(node("worker-1"))),
            Some(NodeEvent::Create("worker-1".to_string()))
        );
        assert_eq!(
            tracker.translate(watcher::Event::Apply(node("worker-1"))),
            Some(NodeEvent::Update("worker-1".to_string()))
        );
    }

    #[test]
    fn test_recreated_node_is_create_again() {
        let mut tracker = EventTracker::default();
        tracker.translate(watcher::Event::Apply(node("worker-1")));
        assert_eq!(
            tracker.translate(watcher::Event::Delete(node("worker-1"))),
            Some(NodeEvent::Delete("worker-1".to_string()))
        );
        assert_eq!(
            tracker.translate(watcher::Event::Apply(node("worker-1"))),
            Some(NodeEvent::Create("worker-1".to_string()))
        );
    }

    #[test]
    fn test_init_markers_are_dropped() {
        let mut tracker = EventTracker::default();
        assert_eq!(tracker.translate(watcher::Event::Init), None);
        assert_eq!(tracker.translate(watcher::Event::InitDone), None);
    }
}
