//! Infrastructure Adapters
//!
//! Implementations of the domain [`NodeStore`](crate::domain::NodeStore) port.
//!
//! - [`KubeNodeStore`] - Kubernetes API via kube-rs
//! - [`InMemoryNodeStore`] - in-process map for tests and dry runs

mod kubernetes;
mod memory;

pub use kubernetes::KubeNodeStore;
pub use memory::InMemoryNodeStore;
