//! Bounded undo/redo over snapshots of the stroke list.
//!
//! Only `paths` is snapshotted. Sticky notes are outside undo entirely.

use crate::board::Stroke;
use std::collections::VecDeque;

/// Default number of snapshots kept in `past`.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// A snapshot of every stroke on the board.
pub type PathsSnapshot = Vec<Stroke>;

/// Undo/redo stacks.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    /// Snapshots to restore on undo, oldest at the front.
    past: VecDeque<PathsSnapshot>,
    /// Snapshots to restore on redo, most recent undo at the back.
    future: Vec<PathsSnapshot>,
    limit: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryManager {
    /// Create an empty history keeping at most `limit` undo snapshots.
    pub fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record the state before a local drawing action.
    /// Clears the redo stack.
    pub fn record_before_mutation(&mut self, current: &[Stroke]) {
        self.push_past(current.to_vec());
        self.future.clear();
    }

    /// Step back. Returns the paths to restore, or `None` if there is nothing
    /// to undo.
    pub fn undo(&mut self, current: &[Stroke]) -> Option<PathsSnapshot> {
        let previous = self.past.pop_back()?;
        self.future.push(current.to_vec());
        Some(previous)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: &[Stroke]) -> Option<PathsSnapshot> {
        let next = self.future.pop()?;
        self.push_past(current.to_vec());
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Number of undo steps available.
    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    /// Number of redo steps available.
    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    /// Drop both stacks.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    fn push_past(&mut self, snapshot: PathsSnapshot) {
        self.past.push_back(snapshot);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
    }
}
