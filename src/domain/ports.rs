//! Domain Ports (Port/Adapter Pattern)
//!
//! The reconciler talks to the cluster only through [`NodeStore`]. The
//! Kubernetes adapter implements it on top of kube-rs; the in-memory adapter
//! backs tests.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Controller (reconcile)          │
//! └──────────────────────┬───────────────────────┘
//!                        │ NodeStore { get, update, watch }
//!            ┌───────────┴────────────┐
//!            ▼                        ▼
//!     KubeNodeStore            InMemoryNodeStore
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Node;

use super::events::NodeEvent;
use crate::error::Result;

/// Stream of node events
pub type NodeEventStream = BoxStream<'static, Result<NodeEvent>>;

/// Port for reading, writing and watching Node objects.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch a node by name.
    ///
    /// Fails with `Error::NodeNotFound` when the node does not exist.
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Replace a node.
    ///
    /// The node's `resourceVersion` must match the stored object; otherwise
    /// the update fails with `Error::Conflict`.
    async fn update_node(&self, node: &Node) -> Result<Node>;

    /// Subscribe to node events.
    ///
    /// Nodes that already exist are delivered as `Create` events first.
    fn watch(&self) -> NodeEventStream;
}
