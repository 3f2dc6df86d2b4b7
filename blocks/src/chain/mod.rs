pub mod proximity;

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::block::BlockId;

pub use proximity::Proximity;

/// Snap distance in host pixels.
pub const DEFAULT_TOLERANCE: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("block {0} cannot follow itself")]
    SelfConnection(BlockId),
    #[error("connecting {from} -> {to} would form a cycle")]
    WouldCycle { from: BlockId, to: BlockId },
}

/// Records which block runs immediately after which.
///
/// Edges are keyed by id only; the registry never owns blocks. Each block
/// has at most one successor and at most one predecessor, and cycles are
/// refused, so every chain is a simple list.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    successors: HashMap<BlockId, BlockId>,
    predecessors: HashMap<BlockId, BlockId>,
    tolerance: f64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        ConnectionRegistry::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry::with_tolerance(DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ConnectionRegistry {
            successors: HashMap::new(),
            predecessors: HashMap::new(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn can_connect(&self, proximity: Proximity) -> bool {
        proximity.within(self.tolerance)
    }

    /// Record `from -> to`, replacing any previous successor of `from`
    /// (which is returned) and any previous predecessor of `to`.
    pub fn connect(&mut self, from: BlockId, to: BlockId) -> Result<Option<BlockId>, ConnectError> {
        if from == to {
            return Err(ConnectError::SelfConnection(from));
        }
        if self.chain_from(to).contains(&from) {
            return Err(ConnectError::WouldCycle { from, to });
        }

        let previous = self.disconnect(from);
        if let Some(old_pred) = self.predecessors.remove(&to) {
            self.successors.remove(&old_pred);
            debug!(block = %to, previous = %old_pred, "moved block to a new predecessor");
        }

        self.successors.insert(from, to);
        self.predecessors.insert(to, from);
        debug!(%from, %to, "connected");
        Ok(previous)
    }

    /// Remove the edge leading out of `block`, returning its old successor.
    pub fn disconnect(&mut self, block: BlockId) -> Option<BlockId> {
        let next = self.successors.remove(&block)?;
        self.predecessors.remove(&next);
        Some(next)
    }

    /// Remove every edge touching `block`.
    pub fn detach(&mut self, block: BlockId) {
        self.disconnect(block);
        if let Some(pred) = self.predecessors.remove(&block) {
            self.successors.remove(&pred);
        }
    }

    pub fn successor(&self, block: BlockId) -> Option<BlockId> {
        self.successors.get(&block).copied()
    }

    pub fn predecessor(&self, block: BlockId) -> Option<BlockId> {
        self.predecessors.get(&block).copied()
    }

    pub fn is_successor(&self, block: BlockId) -> bool {
        self.predecessors.contains_key(&block)
    }

    /// Follow successor edges from `start`. Stops at the first repeated id,
    /// so a corrupted graph still yields a finite chain.
    pub fn chain_from(&self, start: BlockId) -> Vec<BlockId> {
        let mut chain = vec![start];
        let mut seen = HashSet::from([start]);
        let mut current = start;
        while let Some(next) = self.successor(current) {
            if !seen.insert(next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// All edges as `(predecessor, successor)`, ordered by predecessor.
    pub fn edges(&self) -> Vec<(BlockId, BlockId)> {
        let mut edges: Vec<_> = self.successors.iter().map(|(a, b)| (*a, *b)).collect();
        edges.sort();
        edges
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }
}
