//! Undo/redo history over immutable snapshots
//!
//! The history is a list of `Arc` snapshots plus a cursor. Committing a new
//! state drops everything after the cursor, so undoing and then editing
//! abandons the old redo branch for good.
//!
//! Only durable edits belong here: table structure, notes and note positions.
//! Table positions are recomputed by the layout on every commit and are never
//! recorded, which makes dragging a table a view-only action.

use std::sync::Arc;

/// Ordered snapshots with a cursor pointing at the current one
#[derive(Debug, Clone)]
pub struct History<T> {
    snapshots: Vec<Arc<T>>,
    cursor: usize,
    /// Oldest snapshots are dropped beyond this many
    limit: Option<usize>,
}

// Never empty: there is always a current snapshot
#[allow(clippy::len_without_is_empty)]
impl<T> History<T> {
    pub fn new(initial: T) -> Self {
        Self {
            snapshots: vec![Arc::new(initial)],
            cursor: 0,
            limit: None,
        }
    }

    /// History that keeps at most `limit` snapshots (at least one)
    pub fn with_limit(initial: T, limit: usize) -> Self {
        Self {
            limit: Some(limit.max(1)),
            ..Self::new(initial)
        }
    }

    /// Current snapshot
    pub fn state(&self) -> &Arc<T> {
        &self.snapshots[self.cursor]
    }

    /// Commit a new snapshot, discarding the redo branch
    pub fn set(&mut self, state: T) -> &Arc<T> {
        self.set_shared(Arc::new(state))
    }

    pub fn set_shared(&mut self, state: Arc<T>) -> &Arc<T> {
        let discarded = self.snapshots.len() - self.cursor - 1;
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(state);

        // Keep only the latest snapshots
        if let Some(limit) = self.limit {
            if self.snapshots.len() > limit {
                let to_remove = self.snapshots.len() - limit;
                self.snapshots.drain(0..to_remove);
            }
        }
        self.cursor = self.snapshots.len() - 1;

        if discarded > 0 {
            tracing::debug!("History: discarded {} redo snapshots", discarded);
        }
        self.state()
    }

    /// Step back; `None` when already at the oldest snapshot
    pub fn undo(&mut self) -> Option<&Arc<T>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        tracing::info!("History: undo to {}/{}", self.cursor + 1, self.snapshots.len());
        Some(self.state())
    }

    /// Step forward; `None` when already at the newest snapshot
    pub fn redo(&mut self) -> Option<&Arc<T>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        tracing::info!("History: redo to {}/{}", self.cursor + 1, self.snapshots.len());
        Some(self.state())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Number of snapshots held, including the current one
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Drop all snapshots and start over from `state`
    pub fn reset(&mut self, state: T) {
        self.snapshots.clear();
        self.snapshots.push(Arc::new(state));
        self.cursor = 0;
    }
}
