//! Player reassignment effector (consumed interface)
//!
//! The workflow invokes [`PlayerAssignment::apply`] exactly once per request
//! that reaches `Approved`, synchronously, before the approved status
//! becomes visible. A [`EffectorError::Recoverable`] return rolls the
//! transition back so the caller can retry the action.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::error::EffectorError;

pub trait PlayerAssignment: Send + Sync {
    fn apply(
        &self,
        transfer_id: &str,
        player_id: &str,
        to_club_id: &str,
    ) -> Result<(), EffectorError>;
}

/// Reference implementation backing the player register with an in-process
/// map. Idempotent on `transfer_id`: re-applying a transfer that already
/// went through is a no-op, never a second move.
#[derive(Default)]
pub struct InMemoryAssignments {
    inner: Mutex<AssignmentsInner>,
}

#[derive(Default)]
struct AssignmentsInner {
    club_by_player: HashMap<String, String>,
    applied: HashSet<String>, // transfer ids already acted on
}

impl InMemoryAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current club of a player, if any transfer has placed them.
    pub fn club_of(&self, player_id: &str) -> Option<String> {
        self.inner
            .lock()
            .expect("assignments lock poisoned")
            .club_by_player
            .get(player_id)
            .cloned()
    }

    pub fn applied_count(&self) -> usize {
        self.inner
            .lock()
            .expect("assignments lock poisoned")
            .applied
            .len()
    }
}

impl PlayerAssignment for InMemoryAssignments {
    fn apply(
        &self,
        transfer_id: &str,
        player_id: &str,
        to_club_id: &str,
    ) -> Result<(), EffectorError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EffectorError::Recoverable("assignments lock poisoned".into()))?;

        if inner.applied.contains(transfer_id) {
            return Ok(());
        }
        inner
            .club_by_player
            .insert(player_id.to_owned(), to_club_id.to_owned());
        inner.applied.insert(transfer_id.to_owned());

        Ok(())
    }
}
