//! Durable position store.
//!
//! The whole map is written as one JSON document on every flush. Reads hand
//! out clones, so callers can iterate a snapshot while the monitor or the
//! service mutates the store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use sentinel_core::PositionId;
use sentinel_persistence::{JsonDocument, PersistenceResult};
use sentinel_telemetry::Metrics;

use crate::position::Position;

pub struct PositionStore {
    positions: RwLock<BTreeMap<PositionId, Position>>,
    document: JsonDocument<BTreeMap<PositionId, Position>>,
    /// Set by every mutation, cleared by a successful flush.
    dirty: AtomicBool,
    /// Serializes writers of the backing file.
    flush_lock: Mutex<()>,
}

impl PositionStore {
    /// Open the store. An absent or unreadable document yields an empty store.
    pub fn load(document: JsonDocument<BTreeMap<PositionId, Position>>) -> Self {
        let positions = document.load_or_default();
        info!(
            path = %document.path().display(),
            positions = positions.len(),
            active = positions.values().filter(|p| p.is_active()).count(),
            "Position store loaded"
        );
        Self {
            positions: RwLock::new(positions),
            document,
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    /// Insert or replace a record.
    pub fn put(&self, position: Position) {
        self.positions.write().insert(position.id.clone(), position);
        self.mark_dirty();
    }

    /// Replace a record only if the stored one is still ACTIVE.
    ///
    /// Returns false when the record was removed or converted in the
    /// meantime; the update is then discarded.
    pub fn replace_if_active(&self, position: Position) -> bool {
        let mut positions = self.positions.write();
        match positions.get_mut(&position.id) {
            Some(current) if current.is_active() => {
                *current = position;
                drop(positions);
                self.mark_dirty();
                true
            }
            _ => false,
        }
    }

    /// Remove a record only if it is still ACTIVE.
    pub fn remove_if_active(&self, id: &PositionId) -> Option<Position> {
        let mut positions = self.positions.write();
        if !positions.get(id).is_some_and(Position::is_active) {
            return None;
        }
        let removed = positions.remove(id);
        drop(positions);
        self.mark_dirty();
        removed
    }

    pub fn delete(&self, id: &PositionId) -> Option<Position> {
        let removed = self.positions.write().remove(id);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    pub fn get(&self, id: &PositionId) -> Option<Position> {
        self.positions.read().get(id).cloned()
    }

    /// Every record in id order.
    pub fn all(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }

    /// ACTIVE records in id order.
    pub fn active(&self) -> Vec<Position> {
        self.positions
            .read()
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.positions.read().values().filter(|p| p.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.positions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.read().is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Persist the whole store.
    ///
    /// On failure the store stays dirty so the next [`flush_if_dirty`]
    /// retries.
    ///
    /// [`flush_if_dirty`]: Self::flush_if_dirty
    pub fn flush(&self) -> PersistenceResult<()> {
        let _guard = self.flush_lock.lock();
        self.dirty.store(false, Ordering::Release);
        let snapshot = self.positions.read().clone();

        match self.document.save(&snapshot) {
            Ok(()) => {
                debug!(positions = snapshot.len(), "Position store flushed");
                Ok(())
            }
            Err(e) => {
                self.mark_dirty();
                Metrics::persistence_failure();
                warn!(error = %e, "Position store flush failed, will retry");
                Err(e)
            }
        }
    }

    /// Flush if any mutation is unpersisted.
    pub fn flush_if_dirty(&self) -> PersistenceResult<()> {
        if self.is_dirty() {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}
