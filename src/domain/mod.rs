//! Domain Layer
//!
//! - **Ports** (`ports.rs`) - the [`NodeStore`] capability the reconciler depends on
//! - **Events** (`events.rs`) - node watch events
//!
//! # Usage
//!
//! ```ignore
//! use dt_node_labeller::domain::{NodeEvent, NodeStore};
//!
//! async fn labels_of<S: NodeStore>(store: &S, name: &str) -> Result<usize> {
//!     let node = store.get_node(name).await?;
//!     Ok(node.metadata.labels.map(|l| l.len()).unwrap_or(0))
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::NodeEvent;
pub use ports::{NodeEventStream, NodeStore};
