//! Dependency Graph
//!
//! This module implements the graph that connects mutable state to the
//! computations reading it, and the scheduler that batches re-execution.
//!
//! # Overview
//!
//! The graph is a two-level index: target identity, then key, then a
//! [`DepCell`] holding the subscribers that read that exact slot.
//!
//! - Cells are created lazily, the first time a slot is read under tracking.
//! - A cell is pruned as soon as its last subscriber detaches.
//! - Subscribers link to cells strongly and cells link back weakly, so
//!   dropping or disposing a subscriber detaches both directions.
//!
//! # Trigger Fan-out
//!
//! A write reports the key it touched and the kind of change. Besides the
//! key's own cell, structural changes (add/delete) also notify the target's
//! iteration cell, so subscribers that only iterated a container see new and
//! removed keys. Arrays iterate through their `length` cell; maps
//! additionally have a key-only iteration cell that value updates skip.

mod dep;
mod scheduler;

pub use dep::{DepCell, TrackKey, TriggerOp};
pub use scheduler::Scheduler;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::target::{Shape, TargetId};

/// Index from `(target, key)` to dependency cells.
#[derive(Default)]
pub struct DepGraph {
    targets: Mutex<HashMap<TargetId, HashMap<TrackKey, Arc<DepCell>>>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cell for a slot, creating it if needed.
    pub fn cell(&self, target: TargetId, key: TrackKey) -> Arc<DepCell> {
        let mut targets = self.targets.lock();
        let keys = targets.entry(target).or_default();
        Arc::clone(
            keys.entry(key.clone())
                .or_insert_with(|| Arc::new(DepCell::new(target, key))),
        )
    }

    /// Get the cell for a slot, if one exists.
    pub fn get(&self, target: TargetId, key: &TrackKey) -> Option<Arc<DepCell>> {
        self.targets
            .lock()
            .get(&target)
            .and_then(|keys| keys.get(key))
            .cloned()
    }

    /// Cells affected by a change, in notification order.
    pub fn cells_for(
        &self,
        target: TargetId,
        shape: Option<Shape>,
        op: TriggerOp,
        key: Option<&TrackKey>,
    ) -> Vec<Arc<DepCell>> {
        let targets = self.targets.lock();
        let Some(keys) = targets.get(&target) else {
            return Vec::new();
        };

        if op == TriggerOp::Clear {
            return keys.values().cloned().collect();
        }

        let mut cells = Vec::with_capacity(3);
        if let Some(cell) = key.and_then(|k| keys.get(k)) {
            cells.push(Arc::clone(cell));
        }

        let iterates = op.is_structural() || (op == TriggerOp::Set && shape == Some(Shape::Map));
        if iterates {
            let iteration_key = match shape {
                Some(Shape::Array) => TrackKey::Length,
                _ => TrackKey::Iterate,
            };
            if key != Some(&iteration_key) {
                cells.extend(keys.get(&iteration_key).cloned());
            }
        }
        if op.is_structural() && shape == Some(Shape::Map) {
            cells.extend(keys.get(&TrackKey::KeyIterate).cloned());
        }

        cells
    }

    /// Cells affected by an array shrinking to `len`: the length cell plus
    /// every index cell at or past the new end.
    pub fn cells_from_index(&self, target: TargetId, len: usize) -> Vec<Arc<DepCell>> {
        let targets = self.targets.lock();
        let Some(keys) = targets.get(&target) else {
            return Vec::new();
        };

        keys.iter()
            .filter(|(key, _)| match key {
                TrackKey::Length => true,
                TrackKey::Index(i) => *i >= len,
                _ => false,
            })
            .map(|(_, cell)| Arc::clone(cell))
            .collect()
    }

    /// Remove `cell` from the index if nobody subscribes to it anymore.
    pub fn prune(&self, cell: &DepCell) {
        let mut targets = self.targets.lock();
        let Some(keys) = targets.get_mut(&cell.target()) else {
            return;
        };
        let removable = keys
            .get(cell.key())
            .map(|existing| std::ptr::eq(Arc::as_ptr(existing), cell) && existing.is_empty())
            .unwrap_or(false);
        if removable {
            keys.remove(cell.key());
            if keys.is_empty() {
                targets.remove(&cell.target());
            }
        }
    }

    /// Total number of live cells.
    pub fn cell_count(&self) -> usize {
        self.targets.lock().values().map(HashMap::len).sum()
    }

    /// Number of targets with at least one cell.
    pub fn target_count(&self) -> usize {
        self.targets.lock().len()
    }
}

impl std::fmt::Debug for DepGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepGraph")
            .field("targets", &self.target_count())
            .field("cells", &self.cell_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_of(cells: &[Arc<DepCell>]) -> Vec<TrackKey> {
        cells.iter().map(|c| c.key().clone()).collect()
    }

    #[test]
    fn cells_are_created_once() {
        let graph = DepGraph::new();
        let target = TargetId::new();

        let a = graph.cell(target, TrackKey::Field("x".into()));
        let b = graph.cell(target, TrackKey::Field("x".into()));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(graph.cell_count(), 1);
    }

    #[test]
    fn set_notifies_only_the_key() {
        let graph = DepGraph::new();
        let target = TargetId::new();
        graph.cell(target, TrackKey::Field("x".into()));
        graph.cell(target, TrackKey::Iterate);

        let cells = graph.cells_for(
            target,
            Some(Shape::Object),
            TriggerOp::Set,
            Some(&TrackKey::Field("x".into())),
        );
        assert_eq!(keys_of(&cells), vec![TrackKey::Field("x".into())]);
    }

    #[test]
    fn add_also_notifies_iteration() {
        let graph = DepGraph::new();
        let target = TargetId::new();
        graph.cell(target, TrackKey::Iterate);

        let cells = graph.cells_for(
            target,
            Some(Shape::Object),
            TriggerOp::Add,
            Some(&TrackKey::Field("y".into())),
        );
        assert_eq!(keys_of(&cells), vec![TrackKey::Iterate]);
    }

    #[test]
    fn array_iteration_goes_through_length() {
        let graph = DepGraph::new();
        let target = TargetId::new();
        graph.cell(target, TrackKey::Length);
        graph.cell(target, TrackKey::Iterate);

        let cells = graph.cells_for(
            target,
            Some(Shape::Array),
            TriggerOp::Add,
            Some(&TrackKey::Index(4)),
        );
        assert_eq!(keys_of(&cells), vec![TrackKey::Length]);
    }

    #[test]
    fn map_value_update_skips_key_iteration() {
        let graph = DepGraph::new();
        let target = TargetId::new();
        graph.cell(target, TrackKey::Iterate);
        graph.cell(target, TrackKey::KeyIterate);

        let set = graph.cells_for(target, Some(Shape::Map), TriggerOp::Set, None);
        assert_eq!(keys_of(&set), vec![TrackKey::Iterate]);

        let add = graph.cells_for(target, Some(Shape::Map), TriggerOp::Add, None);
        assert_eq!(keys_of(&add), vec![TrackKey::Iterate, TrackKey::KeyIterate]);
    }

    #[test]
    fn clear_notifies_everything() {
        let graph = DepGraph::new();
        let target = TargetId::new();
        graph.cell(target, TrackKey::Field("a".into()));
        graph.cell(target, TrackKey::Field("b".into()));
        graph.cell(target, TrackKey::Iterate);

        let cells = graph.cells_for(target, Some(Shape::Object), TriggerOp::Clear, None);
        assert_eq!(cells.len(), 3);
    }

    #[test]
    fn truncation_hits_tail_indices() {
        let graph = DepGraph::new();
        let target = TargetId::new();
        for i in 0..4 {
            graph.cell(target, TrackKey::Index(i));
        }
        graph.cell(target, TrackKey::Length);

        let mut keys = keys_of(&graph.cells_from_index(target, 2));
        keys.sort_by_key(|k| k.to_string());
        assert_eq!(keys, vec![TrackKey::Index(2), TrackKey::Index(3), TrackKey::Length]);
    }

    #[test]
    fn prune_removes_empty_cells() {
        let graph = DepGraph::new();
        let target = TargetId::new();
        let cell = graph.cell(target, TrackKey::Value);

        graph.prune(&cell);
        assert_eq!(graph.cell_count(), 0);
        assert_eq!(graph.target_count(), 0);
        assert!(graph.get(target, &TrackKey::Value).is_none());
    }

    #[test]
    fn untouched_targets_trigger_nothing() {
        let graph = DepGraph::new();
        let cells = graph.cells_for(TargetId::new(), None, TriggerOp::Set, Some(&TrackKey::Value));
        assert!(cells.is_empty());
    }
}
