use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{RosterError, RosterResult};
use crate::models::{StudentId, StudentRecord};

/// Proof that the holder is the only writer talking to the backend.
pub struct WriteLane {
    _guard: OwnedMutexGuard<()>,
}

/// Roster of the open category. Reads take a snapshot under a short lock
/// that is never held across an await; writers that talk to the backend
/// first take the write lane.
#[derive(Clone, Default)]
pub struct RosterStore {
    inner: Arc<RwLock<Vec<StudentRecord>>>,
    lane: Arc<Mutex<()>>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<StudentRecord>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<StudentRecord>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_lane(&self) -> RosterResult<WriteLane> {
        self.lane
            .clone()
            .try_lock_owned()
            .map(|guard| WriteLane { _guard: guard })
            .map_err(|_| RosterError::Busy)
    }

    pub fn snapshot(&self) -> Vec<StudentRecord> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn get(&self, id: &StudentId) -> Option<StudentRecord> {
        self.read().iter().find(|s| &s.id == id).cloned()
    }

    pub fn load(&self, _lane: &WriteLane, students: Vec<StudentRecord>) {
        debug!(count = students.len(), "roster replaced");
        *self.write() = students;
    }

    /// Swaps in a fresh snapshot for `record.id`, keeping its position.
    /// Returns false (and changes nothing) for an id not in the roster.
    pub fn replace_one(&self, _lane: &WriteLane, record: StudentRecord) -> bool {
        let mut roster = self.write();
        match roster.iter_mut().find(|s| s.id == record.id) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => {
                warn!(id = %record.id, "refreshed record is not in the roster; ignoring");
                false
            }
        }
    }

    pub fn clear(&self, _lane: &WriteLane) {
        self.write().clear();
    }
}
