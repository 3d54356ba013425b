//! Open-session tracking and set logging.
//!
//! The [`SessionManager`] keeps a workout -> open session map. Logging a set
//! for a workout without an open session starts one; closing it stamps the
//! end time and duration. Volume is maintained incrementally and every
//! mutation is committed to the store or rolled back as a whole.

use crate::clock::Clock;
use crate::types::*;
use crate::{Error, Result, Store};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What to do with sessions left open by a previous process
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Adopt the newest open session of each workout
    #[default]
    Resume,
    /// Close every open session at its last activity
    AutoClose,
}

/// Owns the mapping from workout to its currently open session
pub struct SessionManager {
    open: HashMap<WorkoutId, SessionId>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            open: HashMap::new(),
            clock,
        }
    }

    /// Number of workouts with a cached open session
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Whether the workout has a cached open session, ignoring staleness
    pub fn is_cached(&self, workout_id: WorkoutId) -> bool {
        self.open.contains_key(&workout_id)
    }

    /// Rebuild the cache from sessions the store still has open
    ///
    /// Returns the number of sessions that were closed.
    pub fn recover(&mut self, store: &mut dyn Store, policy: RecoveryPolicy) -> Result<usize> {
        self.open.clear();

        let mut seen = HashMap::new();
        let mut to_close = Vec::new();
        for session in store.ledger().open_sessions() {
            let adopt = policy == RecoveryPolicy::Resume && !seen.contains_key(&session.workout_id);
            if adopt {
                seen.insert(session.workout_id, session.id);
            } else {
                to_close.push(session.id);
            }
        }

        if to_close.is_empty() {
            self.open = seen;
            tracing::debug!("Recovered {} open sessions", self.open.len());
            return Ok(0);
        }

        let mut previous = Vec::with_capacity(to_close.len());
        for session_id in &to_close {
            let end = last_activity(store, *session_id);
            if let Some(session) = store.ledger_mut().session_mut(*session_id) {
                previous.push(session.clone());
                session.close_at(end);
            }
        }

        if let Err(e) = store.save() {
            for session in previous {
                store.ledger_mut().insert_session(session);
            }
            tracing::error!("Failed to save recovered sessions: {}", e);
            return Err(e);
        }

        self.open = seen;
        tracing::info!(
            "Recovered {} open sessions, closed {} stale ones",
            self.open.len(),
            to_close.len()
        );
        Ok(to_close.len())
    }

    /// The workout's open session, if one is cached and still open in the store
    pub fn open_session(&mut self, store: &dyn Store, workout_id: WorkoutId) -> Option<SessionId> {
        let session_id = *self.open.get(&workout_id)?;
        match store.ledger().session(session_id) {
            Some(session) if session.is_open() => Some(session_id),
            _ => {
                tracing::debug!("Dropping stale open session {} for {}", session_id, workout_id);
                self.open.remove(&workout_id);
                None
            }
        }
    }

    /// Return the workout's open session, starting and persisting a new one if needed
    pub fn get_or_create_open_session(
        &mut self,
        store: &mut dyn Store,
        workout_id: WorkoutId,
    ) -> Result<SessionId> {
        if let Some(session_id) = self.open_session(store, workout_id) {
            return Ok(session_id);
        }

        let session_id = self.start_session(store, workout_id)?;
        if let Err(e) = store.save() {
            store.ledger_mut().remove_session(session_id);
            self.open.remove(&workout_id);
            tracing::error!("Failed to save new session: {}", e);
            return Err(e);
        }
        Ok(session_id)
    }

    /// Create and cache a session without committing it
    fn start_session(&mut self, store: &mut dyn Store, workout_id: WorkoutId) -> Result<SessionId> {
        let session_id = store
            .ledger_mut()
            .create_session(workout_id, self.clock.now())?;
        self.open.insert(workout_id, session_id);
        tracing::info!("Started session {} for workout {}", session_id, workout_id);
        Ok(session_id)
    }

    /// Close the workout's open session, if any
    ///
    /// Returns the closed session's id, or `None` when nothing was open.
    pub fn close_session(
        &mut self,
        store: &mut dyn Store,
        workout_id: WorkoutId,
    ) -> Result<Option<SessionId>> {
        let Some(session_id) = self.open_session(store, workout_id) else {
            return Ok(None);
        };

        let now = self.clock.now();
        let previous = match store.ledger_mut().session_mut(session_id) {
            Some(session) => {
                let previous = session.clone();
                session.close_at(now);
                previous
            }
            None => return Ok(None),
        };
        self.open.remove(&workout_id);

        if let Err(e) = store.save() {
            store.ledger_mut().insert_session(previous);
            self.open.insert(workout_id, session_id);
            tracing::error!("Failed to save session end: {}", e);
            return Err(e);
        }

        tracing::info!("Closed session {} for workout {}", session_id, workout_id);
        Ok(Some(session_id))
    }

    /// Close a specific session, whether or not it is cached
    pub fn finish_session(&mut self, store: &mut dyn Store, session_id: SessionId) -> Result<()> {
        let now = self.clock.now();
        let session = store
            .ledger_mut()
            .session_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        if !session.is_open() {
            return Ok(());
        }
        let previous = session.clone();
        session.close_at(now);

        let workout_id = previous.workout_id;
        let was_cached = self.open.get(&workout_id) == Some(&session_id);
        if was_cached {
            self.open.remove(&workout_id);
        }

        if let Err(e) = store.save() {
            store.ledger_mut().insert_session(previous);
            if was_cached {
                self.open.insert(workout_id, session_id);
            }
            tracing::error!("Failed to finish session: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Delete a session together with its member sets
    pub fn delete_session(&mut self, store: &mut dyn Store, session_id: SessionId) -> Result<()> {
        let snapshot = store
            .ledger()
            .session(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        let members: Vec<SetEntry> = store
            .ledger()
            .sets_of_session(session_id)
            .into_iter()
            .cloned()
            .collect();

        store.ledger_mut().delete_session(session_id);
        let was_cached = self.open.get(&snapshot.workout_id) == Some(&session_id);
        if was_cached {
            self.open.remove(&snapshot.workout_id);
        }

        if let Err(e) = store.save() {
            let workout_id = snapshot.workout_id;
            store.ledger_mut().insert_session(snapshot);
            for set in members {
                store.ledger_mut().insert_set(set);
            }
            if was_cached {
                self.open.insert(workout_id, session_id);
            }
            tracing::error!("Failed to delete session: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Log a set for an exercise in its workout's open session
    pub fn add_set(
        &mut self,
        store: &mut dyn Store,
        exercise_id: ExerciseId,
        weight: f64,
        reps: u32,
    ) -> Result<SetEntry> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::Validation(format!("invalid weight: {}", weight)));
        }

        let exercise = store
            .ledger()
            .exercise(exercise_id)
            .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise_id)))?;
        let workout_id = match exercise.workout_id {
            Some(w) if store.ledger().workout(w).is_some() => w,
            _ => {
                tracing::warn!("Exercise '{}' has no associated workout", exercise.name);
                return Err(Error::Integrity(format!(
                    "exercise '{}' has no workout",
                    exercise.name
                )));
            }
        };

        let (session_id, created) = match self.open_session(store, workout_id) {
            Some(id) => (id, false),
            None => (self.start_session(store, workout_id)?, true),
        };

        let entry = SetEntry {
            id: SetEntryId::new(),
            exercise_id,
            session_id: Some(session_id),
            weight,
            reps,
            timestamp: self.clock.now(),
            seq: store.ledger().next_set_seq(),
        };

        let ledger = store.ledger_mut();
        let previous_volume = match ledger.session_mut(session_id) {
            Some(session) => {
                let previous = session.total_volume;
                session.total_volume += entry.volume();
                previous
            }
            None => {
                return Err(Error::Integrity(format!("session {} vanished", session_id)));
            }
        };
        ledger.insert_set(entry.clone());

        if let Err(e) = store.save() {
            let ledger = store.ledger_mut();
            ledger.remove_set(entry.id);
            if created {
                ledger.remove_session(session_id);
                self.open.remove(&workout_id);
            } else if let Some(session) = ledger.session_mut(session_id) {
                session.total_volume = previous_volume;
            }
            tracing::error!("Failed to save set entry: {}", e);
            return Err(e);
        }

        tracing::debug!(
            "Logged {} kg x {} in session {} (volume now {})",
            weight,
            reps,
            session_id,
            previous_volume + entry.volume()
        );
        Ok(entry)
    }

    /// Delete a set and withdraw its volume from its session
    ///
    /// A set without a session is left alone.
    pub fn remove_set(&mut self, store: &mut dyn Store, set_id: SetEntryId) -> Result<()> {
        let entry = store
            .ledger()
            .set(set_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("set {}", set_id)))?;

        let Some(session_id) = entry.session_id else {
            tracing::warn!("Set {} has no session, not removing", set_id);
            return Ok(());
        };

        let ledger = store.ledger_mut();
        let previous_volume = ledger.session(session_id).map(|s| s.total_volume);
        ledger.withdraw_volume(session_id, entry.volume());
        ledger.remove_set(set_id);

        if let Err(e) = store.save() {
            let ledger = store.ledger_mut();
            ledger.insert_set(entry);
            if let (Some(volume), Some(session)) = (previous_volume, ledger.session_mut(session_id)) {
                session.total_volume = volume;
            }
            tracing::error!("Failed to remove set entry: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Delete an exercise and its sets, withdrawing their volume from their sessions
    ///
    /// Returns the number of sets removed.
    pub fn delete_exercise(
        &mut self,
        store: &mut dyn Store,
        exercise_id: ExerciseId,
    ) -> Result<usize> {
        let ledger = store.ledger();
        let exercise = ledger
            .exercise(exercise_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise_id)))?;
        let sets: Vec<SetEntry> = ledger
            .sets_of_exercise(exercise_id)
            .into_iter()
            .cloned()
            .collect();
        let mut volumes: HashMap<SessionId, f64> = HashMap::new();
        for session_id in sets.iter().filter_map(|s| s.session_id) {
            if let Some(session) = ledger.session(session_id) {
                volumes.insert(session_id, session.total_volume);
            }
        }

        let removed = store.ledger_mut().delete_exercise(exercise_id);

        if let Err(e) = store.save() {
            let ledger = store.ledger_mut();
            ledger.insert_exercise(exercise);
            for set in sets {
                ledger.insert_set(set);
            }
            for (session_id, volume) in volumes {
                if let Some(session) = ledger.session_mut(session_id) {
                    session.total_volume = volume;
                }
            }
            tracing::error!("Failed to delete exercise: {}", e);
            return Err(e);
        }

        tracing::info!("Deleted exercise '{}' with {} sets", exercise.name, removed);
        Ok(removed)
    }

    /// Replace an exercise's free-text note
    pub fn update_note(
        &mut self,
        store: &mut dyn Store,
        exercise_id: ExerciseId,
        note: impl Into<String>,
    ) -> Result<()> {
        let exercise = store
            .ledger_mut()
            .exercise_mut(exercise_id)
            .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise_id)))?;
        let previous = std::mem::replace(&mut exercise.note, note.into());

        if let Err(e) = store.save() {
            if let Some(exercise) = store.ledger_mut().exercise_mut(exercise_id) {
                exercise.note = previous;
            }
            tracing::error!("Failed to autosave note: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

/// Timestamp of a session's newest set, or its start when it has none
fn last_activity(store: &dyn Store, session_id: SessionId) -> DateTime<Utc> {
    let ledger = store.ledger();
    let start = ledger
        .session(session_id)
        .map(|s| s.start_time)
        .unwrap_or_else(Utc::now);
    ledger
        .sets_of_session(session_id)
        .last()
        .map(|s| s.timestamp.max(start))
        .unwrap_or(start)
}
