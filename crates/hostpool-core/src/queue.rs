//! Pending operations, at most one per host.

use tracing::debug;

use crate::types::Operation;

/// Insertion-ordered set of pending operations keyed by host.
///
/// The queue does no I/O: operations arrive already previewed and planned.
#[derive(Debug, Clone, Default)]
pub struct OperationQueue {
    ops: Vec<Operation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an operation, replacing whatever was pending for the same host.
    ///
    /// A replacement keeps the original queue position.
    pub fn add(&mut self, op: Operation) {
        match self.ops.iter_mut().find(|o| o.host() == op.host()) {
            Some(existing) => {
                debug!(host = %op.host(), kind = op.kind.label(), "replacing pending operation");
                *existing = op;
            }
            None => {
                debug!(host = %op.host(), kind = op.kind.label(), "queued operation");
                self.ops.push(op);
            }
        }
    }

    /// Drop the pending operation for `host`, returning it if there was one.
    pub fn remove(&mut self, host: &str) -> Option<Operation> {
        let idx = self.ops.iter().position(|o| o.host() == host)?;
        Some(self.ops.remove(idx))
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn get(&self, host: &str) -> Option<&Operation> {
        self.ops.iter().find(|o| o.host() == host)
    }

    /// Owned copy in insertion order; later queue changes do not affect it.
    pub fn snapshot(&self) -> Vec<Operation> {
        self.ops.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
