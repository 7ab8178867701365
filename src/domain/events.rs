//! Node Watch Events
//!
//! Events delivered by a [`NodeStore`](super::ports::NodeStore) watch. Each
//! carries the name of the node it concerns.

use std::fmt;

/// A change observed on a Node object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The node was observed for the first time
    Create(String),
    /// An already known node changed
    Update(String),
    /// The node was deleted
    Delete(String),
    /// Any other trigger, e.g. a resync
    Generic(String),
}

impl NodeEvent {
    /// Name of the node this event concerns
    pub fn name(&self) -> &str {
        match self {
            NodeEvent::Create(name)
            | NodeEvent::Update(name)
            | NodeEvent::Delete(name)
            | NodeEvent::Generic(name) => name,
        }
    }

    /// Event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            NodeEvent::Create(_) => "create",
            NodeEvent::Update(_) => "update",
            NodeEvent::Delete(_) => "delete",
            NodeEvent::Generic(_) => "generic",
        }
    }
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.event_type(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_and_type() {
        let event = NodeEvent::Update("worker-1".to_string());
        assert_eq!(event.name(), "worker-1");
        assert_eq!(event.event_type(), "update");
        assert_eq!(event.to_string(), "update(worker-1)");
    }
}
