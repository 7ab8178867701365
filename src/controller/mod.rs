//! Controller module
//!
//! Implements the reconciliation loop that keeps the local node's
//! devicetree labels in sync.

pub mod filter;
mod node_labels;

pub use filter::{resolve_local_node, should_reconcile, NODE_NAME_ENV};
pub use node_labels::{
    error_policy, reconcile, replace_managed_labels, run, ControllerContext, ReconcileOutcome,
    RetryPolicy,
};
