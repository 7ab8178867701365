//! Node Label Controller
//!
//! Keeps the managed labels of the local node equal to the label set
//! computed at startup.
//!
//! ```text
//! NodeStore::watch ──▶ should_reconcile ──▶ work queue ──▶ reconcile ──▶ NodeStore::update
//!                                               ▲                │
//!                                               └── backoff ◀────┘ (on error)
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::filter::should_reconcile;
use crate::domain::{NodeEventStream, NodeStore};
use crate::error::{Error, Result};
use crate::labels::{LabelNamespace, LabelSet};
use crate::metrics;

const QUEUE_CAPACITY: usize = 16;

// =============================================================================
// Retry Policy
// =============================================================================

/// Exponential backoff between failed reconciliations of the same node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound on the delay
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay after `failures` consecutive failures (1-based)
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}

/// Delay before a failed key is retried.
///
/// Conflicts are retried immediately against a fresh copy of the node.
pub fn error_policy(error: &Error, failures: u32, retry: &RetryPolicy) -> Duration {
    if error.is_conflict() {
        Duration::ZERO
    } else {
        retry.delay(failures)
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared context for the node label controller
pub struct ControllerContext {
    /// Access to Node objects
    pub store: Arc<dyn NodeStore>,

    /// Name of the node this process labels
    pub local_node: String,

    /// Ownership rules for label keys
    pub namespace: LabelNamespace,

    /// Labels the node must carry, fixed for the process lifetime
    pub desired: LabelSet,

    /// Backoff for failed reconciliations
    pub retry: RetryPolicy,
}

impl ControllerContext {
    pub fn new(
        store: Arc<dyn NodeStore>,
        local_node: impl Into<String>,
        namespace: LabelNamespace,
        desired: LabelSet,
    ) -> Arc<Self> {
        Self::with_retry(store, local_node, namespace, desired, RetryPolicy::default())
    }

    pub fn with_retry(
        store: Arc<dyn NodeStore>,
        local_node: impl Into<String>,
        namespace: LabelNamespace,
        desired: LabelSet,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            local_node: local_node.into(),
            namespace,
            desired,
            retry,
        })
    }
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("local_node", &self.local_node)
            .field("namespace", &self.namespace)
            .field("desired", &self.desired.len())
            .finish()
    }
}

// =============================================================================
// Reconcile
// =============================================================================

/// Result of a successful reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Labels were written back
    Updated { removed: usize, applied: usize },
    /// The node does not exist; nothing to do
    NodeMissing,
}

/// Drop every managed label and insert the desired set.
///
/// Returns how many managed labels were removed.
pub fn replace_managed_labels(
    labels: &mut BTreeMap<String, String>,
    namespace: &LabelNamespace,
    desired: &LabelSet,
) -> usize {
    let before = labels.len();
    labels.retain(|key, _| !namespace.is_managed(key));
    let removed = before - labels.len();

    labels.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    removed
}

/// Reconcile the labels of node `name`
#[instrument(skip_all, fields(node = %name))]
pub async fn reconcile(name: &str, ctx: &ControllerContext) -> Result<ReconcileOutcome> {
    let mut node = match ctx.store.get_node(name).await {
        Ok(node) => node,
        Err(Error::NodeNotFound(_)) => {
            warn!("Could not find Node");
            return Ok(ReconcileOutcome::NodeMissing);
        }
        Err(e) => {
            error!(error = %e, "Could not fetch Node");
            return Err(e);
        }
    };

    let labels = node.metadata.labels.get_or_insert_with(BTreeMap::new);
    let removed = replace_managed_labels(labels, &ctx.namespace, &ctx.desired);

    if let Err(e) = ctx.store.update_node(&node).await {
        error!(error = %e, "Could not write Node");
        return Err(e);
    }

    debug!(removed, applied = ctx.desired.len(), "Node labels updated");
    Ok(ReconcileOutcome::Updated {
        removed,
        applied: ctx.desired.len(),
    })
}

// =============================================================================
// Work Queue
// =============================================================================

/// Node keys awaiting reconciliation; a key is queued at most once
#[derive(Clone)]
struct WorkQueue {
    tx: mpsc::Sender<String>,
    queued: Arc<Mutex<HashSet<String>>>,
}

impl WorkQueue {
    fn new() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let queue = Self {
            tx,
            queued: Arc::new(Mutex::new(HashSet::new())),
        };
        (queue, rx)
    }

    async fn enqueue(&self, key: String) {
        let inserted = self.queued.lock().insert(key.clone());
        if !inserted {
            debug!(node = %key, "Already queued");
            return;
        }
        if self.tx.send(key).await.is_err() {
            debug!("Work queue closed");
        }
    }

    fn dequeued(&self, key: &str) {
        self.queued.lock().remove(key);
    }

    fn requeue_after(&self, key: String, delay: Duration, shutdown: CancellationToken) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.enqueue(key).await,
            }
        });
    }
}

async fn feed_queue(
    mut events: NodeEventStream,
    local_node: String,
    queue: WorkQueue,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return,
            event = events.next() => event,
        };

        match event {
            Some(Ok(event)) if should_reconcile(&local_node, &event) => {
                debug!(%event, "Queueing node");
                queue.enqueue(event.name().to_string()).await;
            }
            Some(Ok(event)) => debug!(%event, "Ignoring event"),
            Some(Err(e)) => warn!(error = %e, "Node watch error"),
            None => {
                info!("Node watch stream ended");
                return;
            }
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Run the node label controller until `shutdown` is cancelled.
///
/// A single consumer drains the work queue, so at most one reconciliation is
/// in flight. Keys failing with a retryable error are re-enqueued after
/// [`error_policy`]'s delay; other failures drop the key.
pub async fn run(ctx: Arc<ControllerContext>, shutdown: CancellationToken) -> Result<()> {
    info!(
        node = %ctx.local_node,
        labels = ctx.desired.len(),
        "Starting node label controller"
    );

    let (queue, mut rx) = WorkQueue::new();
    let feeder = tokio::spawn(feed_queue(
        ctx.store.watch(),
        ctx.local_node.clone(),
        queue.clone(),
        shutdown.clone(),
    ));

    let mut failures: HashMap<String, u32> = HashMap::new();

    loop {
        let key = tokio::select! {
            _ = shutdown.cancelled() => break,
            key = rx.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };
        queue.dequeued(&key);

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = reconcile(&key, &ctx) => result,
        };

        match result {
            Ok(outcome) => {
                failures.remove(&key);
                match outcome {
                    ReconcileOutcome::Updated { .. } => {
                        metrics::record_reconcile(metrics::result::UPDATED);
                        info!(node = %key, ?outcome, "Reconciled Node");
                    }
                    ReconcileOutcome::NodeMissing => {
                        metrics::record_reconcile(metrics::result::NODE_MISSING);
                    }
                }
            }
            Err(e) if !e.is_retryable() => {
                failures.remove(&key);
                metrics::record_reconcile(metrics::result::ERROR);
                error!(node = %key, error = %e, "Reconcile failed, dropping node");
            }
            Err(e) => {
                let count = failures.entry(key.clone()).or_insert(0);
                *count += 1;
                let delay = error_policy(&e, *count, &ctx.retry);

                if e.is_conflict() {
                    metrics::record_reconcile(metrics::result::CONFLICT);
                } else {
                    metrics::record_reconcile(metrics::result::ERROR);
                }
                error!(
                    node = %key,
                    error = %e,
                    attempt = *count,
                    retry_in = ?delay,
                    "Reconcile failed"
                );
                queue.requeue_after(key, delay, shutdown.clone());
            }
        }
    }

    feeder.abort();
    info!("Node label controller shutdown complete");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
