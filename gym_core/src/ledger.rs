//! In-memory record set of workouts, exercises, sessions and sets.
//!
//! The ledger owns every record and expresses ownership through ids.
//! Deletes cascade explicitly:
//! - workout -> its exercises, its sessions, and every set of either
//! - exercise -> its sets (volume is withdrawn from their sessions)
//! - session -> its member sets

use crate::types::*;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Relative tolerance used when comparing a running volume against a recomputed sum
const VOLUME_EPSILON: f64 = 1e-6;

/// Every record kept by the app
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Ledger {
    #[serde(default)]
    workouts: BTreeMap<WorkoutId, Workout>,
    #[serde(default)]
    exercises: BTreeMap<ExerciseId, Exercise>,
    #[serde(default)]
    sessions: BTreeMap<SessionId, Session>,
    #[serde(default)]
    sets: BTreeMap<SetEntryId, SetEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.workouts.is_empty()
            && self.exercises.is_empty()
            && self.sessions.is_empty()
            && self.sets.is_empty()
    }

    pub fn workout_count(&self) -> usize {
        self.workouts.len()
    }

    pub fn exercise_count(&self) -> usize {
        self.exercises.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    pub fn create_workout(&mut self, name: impl Into<String>) -> WorkoutId {
        let workout = Workout {
            id: WorkoutId::new(),
            name: name.into(),
        };
        let id = workout.id;
        tracing::debug!("Created workout {} ({:?})", id, workout.name);
        self.workouts.insert(id, workout);
        id
    }

    pub fn create_exercise(
        &mut self,
        workout_id: WorkoutId,
        name: impl Into<String>,
        category: ExerciseCategory,
        note: impl Into<String>,
    ) -> Result<ExerciseId> {
        if !self.workouts.contains_key(&workout_id) {
            return Err(Error::NotFound(format!("workout {}", workout_id)));
        }
        let exercise = Exercise {
            id: ExerciseId::new(),
            workout_id: Some(workout_id),
            name: name.into(),
            category,
            note: note.into(),
        };
        let id = exercise.id;
        self.exercises.insert(id, exercise);
        Ok(id)
    }

    /// Create an open session for a workout
    pub fn create_session(
        &mut self,
        workout_id: WorkoutId,
        start_time: DateTime<Utc>,
    ) -> Result<SessionId> {
        if !self.workouts.contains_key(&workout_id) {
            return Err(Error::NotFound(format!("workout {}", workout_id)));
        }
        let session = Session {
            id: SessionId::new(),
            workout_id,
            start_time,
            end_time: None,
            duration: 0.0,
            total_volume: 0.0,
        };
        let id = session.id;
        self.sessions.insert(id, session);
        Ok(id)
    }

    /// Insert a fully formed record, replacing any record with the same id
    pub fn insert_exercise(&mut self, exercise: Exercise) {
        self.exercises.insert(exercise.id, exercise);
    }

    pub fn insert_session(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    pub fn insert_set(&mut self, set: SetEntry) {
        self.sets.insert(set.id, set);
    }

    /// Sequence number for the next logged set
    pub fn next_set_seq(&self) -> u64 {
        self.sets.values().map(|s| s.seq + 1).max().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Fetch
    // ------------------------------------------------------------------------

    pub fn workout(&self, id: WorkoutId) -> Option<&Workout> {
        self.workouts.get(&id)
    }

    pub fn workout_mut(&mut self, id: WorkoutId) -> Option<&mut Workout> {
        self.workouts.get_mut(&id)
    }

    pub fn exercise(&self, id: ExerciseId) -> Option<&Exercise> {
        self.exercises.get(&id)
    }

    pub fn exercise_mut(&mut self, id: ExerciseId) -> Option<&mut Exercise> {
        self.exercises.get_mut(&id)
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn set(&self, id: SetEntryId) -> Option<&SetEntry> {
        self.sets.get(&id)
    }

    /// First workout with this exact name (names are not enforced unique)
    pub fn find_workout_by_name(&self, name: &str) -> Option<&Workout> {
        self.workouts_by_name().into_iter().find(|w| w.name == name)
    }

    pub fn find_exercise(&self, workout_id: WorkoutId, name: &str) -> Option<&Exercise> {
        self.exercises_of(workout_id)
            .into_iter()
            .find(|e| e.name == name)
    }

    /// All workouts, sorted by name ascending
    pub fn workouts_by_name(&self) -> Vec<&Workout> {
        let mut workouts: Vec<_> = self.workouts.values().collect();
        workouts.sort_by(|a, b| a.name.cmp(&b.name));
        workouts
    }

    /// Exercises of a workout, sorted by name ascending
    pub fn exercises_of(&self, workout_id: WorkoutId) -> Vec<&Exercise> {
        let mut exercises: Vec<_> = self
            .exercises
            .values()
            .filter(|e| e.workout_id == Some(workout_id))
            .collect();
        exercises.sort_by(|a, b| a.name.cmp(&b.name));
        exercises
    }

    /// Sets of an exercise, oldest first
    pub fn sets_of_exercise(&self, exercise_id: ExerciseId) -> Vec<&SetEntry> {
        let mut sets: Vec<_> = self
            .sets
            .values()
            .filter(|s| s.exercise_id == exercise_id)
            .collect();
        sets.sort_by_key(|s| (s.timestamp, s.seq));
        sets
    }

    /// Member sets of a session, oldest first
    pub fn sets_of_session(&self, session_id: SessionId) -> Vec<&SetEntry> {
        let mut sets: Vec<_> = self
            .sets
            .values()
            .filter(|s| s.session_id == Some(session_id))
            .collect();
        sets.sort_by_key(|s| (s.timestamp, s.seq));
        sets
    }

    /// Sessions of a workout, newest first
    pub fn sessions_of(&self, workout_id: WorkoutId) -> Vec<&Session> {
        let mut sessions: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.workout_id == workout_id)
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        sessions
    }

    /// Every session, newest first
    pub fn sessions_newest_first(&self) -> Vec<&Session> {
        let mut sessions: Vec<_> = self.sessions.values().collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        sessions
    }

    /// Sessions with no end time, newest first
    pub fn open_sessions(&self) -> Vec<&Session> {
        self.sessions_newest_first()
            .into_iter()
            .filter(|s| s.is_open())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Volume
    // ------------------------------------------------------------------------

    /// Subtract `amount` from a session's running volume, clamped at zero
    pub fn withdraw_volume(&mut self, session_id: SessionId, amount: f64) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.total_volume = (session.total_volume - amount).max(0.0);
        }
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    /// Remove a single set record without touching any session volume
    pub fn remove_set(&mut self, id: SetEntryId) -> Option<SetEntry> {
        self.sets.remove(&id)
    }

    /// Remove a single session record without touching its sets
    pub fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Delete an exercise and its sets, withdrawing their volume from their sessions
    ///
    /// Returns the number of sets removed.
    pub fn delete_exercise(&mut self, id: ExerciseId) -> usize {
        if self.exercises.remove(&id).is_none() {
            return 0;
        }
        let doomed: Vec<SetEntry> = self
            .sets
            .values()
            .filter(|s| s.exercise_id == id)
            .cloned()
            .collect();
        for set in &doomed {
            self.sets.remove(&set.id);
            if let Some(session_id) = set.session_id {
                self.withdraw_volume(session_id, set.volume());
            }
        }
        tracing::debug!("Deleted exercise {} with {} sets", id, doomed.len());
        doomed.len()
    }

    /// Delete a session and its member sets
    ///
    /// Returns the number of sets removed.
    pub fn delete_session(&mut self, id: SessionId) -> usize {
        if self.sessions.remove(&id).is_none() {
            return 0;
        }
        let before = self.sets.len();
        self.sets.retain(|_, s| s.session_id != Some(id));
        let removed = before - self.sets.len();
        tracing::debug!("Deleted session {} with {} sets", id, removed);
        removed
    }

    /// Delete a workout with its exercises, sessions, and all their sets
    pub fn delete_workout(&mut self, id: WorkoutId) -> bool {
        if self.workouts.remove(&id).is_none() {
            return false;
        }

        let exercise_ids: Vec<ExerciseId> = self
            .exercises
            .values()
            .filter(|e| e.workout_id == Some(id))
            .map(|e| e.id)
            .collect();
        let session_ids: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.workout_id == id)
            .map(|s| s.id)
            .collect();

        // Sessions first so exercise deletion has no volume left to withdraw
        for session_id in &session_ids {
            self.delete_session(*session_id);
        }
        for exercise_id in &exercise_ids {
            self.delete_exercise(*exercise_id);
        }

        tracing::debug!(
            "Deleted workout {} ({} exercises, {} sessions)",
            id,
            exercise_ids.len(),
            session_ids.len()
        );
        true
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.workouts.clear();
        self.exercises.clear();
        self.sessions.clear();
        self.sets.clear();
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Check the ledger's invariants, returning one message per violation
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for exercise in self.exercises.values() {
            match exercise.workout_id {
                None => errors.push(format!("Exercise '{}' has no workout", exercise.name)),
                Some(w) if !self.workouts.contains_key(&w) => errors.push(format!(
                    "Exercise '{}' references missing workout {}",
                    exercise.name, w
                )),
                Some(_) => {}
            }
        }

        for session in self.sessions.values() {
            if !self.workouts.contains_key(&session.workout_id) {
                errors.push(format!(
                    "Session {} references missing workout {}",
                    session.id, session.workout_id
                ));
            }
        }

        let mut sums: HashMap<SessionId, f64> = HashMap::new();
        for set in self.sets.values() {
            let exercise = match self.exercises.get(&set.exercise_id) {
                Some(e) => e,
                None => {
                    errors.push(format!(
                        "Set {} references missing exercise {}",
                        set.id, set.exercise_id
                    ));
                    continue;
                }
            };
            let Some(session_id) = set.session_id else {
                continue;
            };
            let Some(session) = self.sessions.get(&session_id) else {
                errors.push(format!(
                    "Set {} references missing session {}",
                    set.id, session_id
                ));
                continue;
            };
            if exercise.workout_id != Some(session.workout_id) {
                errors.push(format!(
                    "Set {} belongs to exercise '{}' outside its session's workout",
                    set.id, exercise.name
                ));
            }
            *sums.entry(session_id).or_insert(0.0) += set.volume();
        }

        let mut open_per_workout: HashMap<WorkoutId, usize> = HashMap::new();
        for session in self.sessions.values() {
            let expected = sums.get(&session.id).copied().unwrap_or(0.0);
            let tolerance = VOLUME_EPSILON * expected.abs().max(1.0);
            if (session.total_volume - expected).abs() > tolerance {
                errors.push(format!(
                    "Session {} volume {} does not match its sets ({})",
                    session.id, session.total_volume, expected
                ));
            }
            if session.is_open() {
                *open_per_workout.entry(session.workout_id).or_insert(0) += 1;
            }
        }

        for (workout_id, count) in open_per_workout {
            if count > 1 {
                errors.push(format!(
                    "Workout {} has {} open sessions",
                    workout_id, count
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 6, 9, 0, 0).unwrap()
    }

    fn add_set(
        ledger: &mut Ledger,
        exercise_id: ExerciseId,
        session_id: SessionId,
        weight: f64,
        reps: u32,
        offset: i64,
    ) -> SetEntryId {
        let set = SetEntry {
            id: SetEntryId::new(),
            exercise_id,
            session_id: Some(session_id),
            weight,
            reps,
            timestamp: t0() + Duration::seconds(offset),
            seq: ledger.next_set_seq(),
        };
        let id = set.id;
        ledger.session_mut(session_id).unwrap().total_volume += set.volume();
        ledger.insert_set(set);
        id
    }

    fn push_day() -> (Ledger, WorkoutId, ExerciseId, SessionId) {
        let mut ledger = Ledger::new();
        let workout = ledger.create_workout("Push Day");
        let bench = ledger
            .create_exercise(workout, "Bench", ExerciseCategory::Chest, "")
            .unwrap();
        let session = ledger.create_session(workout, t0()).unwrap();
        (ledger, workout, bench, session)
    }

    #[test]
    fn test_create_exercise_requires_workout() {
        let mut ledger = Ledger::new();
        let result = ledger.create_exercise(WorkoutId::new(), "Squat", ExerciseCategory::Legs, "");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_sorted_fetches() {
        let mut ledger = Ledger::new();
        let pull = ledger.create_workout("Pull Day");
        let legs = ledger.create_workout("Leg Day");
        ledger
            .create_exercise(pull, "Rows", ExerciseCategory::Back, "")
            .unwrap();
        ledger
            .create_exercise(pull, "Curls", ExerciseCategory::Biceps, "")
            .unwrap();

        let names: Vec<_> = ledger.workouts_by_name().iter().map(|w| w.name.clone()).collect();
        assert_eq!(names, vec!["Leg Day", "Pull Day"]);

        let names: Vec<_> = ledger.exercises_of(pull).iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["Curls", "Rows"]);
        assert!(ledger.exercises_of(legs).is_empty());
    }

    #[test]
    fn test_delete_workout_cascades() {
        let (mut ledger, workout, bench, session) = push_day();
        add_set(&mut ledger, bench, session, 60.0, 5, 10);
        add_set(&mut ledger, bench, session, 60.0, 5, 20);
        let other = ledger.create_workout("Leg Day");

        assert!(ledger.delete_workout(workout));
        assert_eq!(ledger.workout_count(), 1);
        assert!(ledger.workout(other).is_some());
        assert_eq!(ledger.exercise_count(), 0);
        assert_eq!(ledger.session_count(), 0);
        assert_eq!(ledger.set_count(), 0);
        assert!(!ledger.delete_workout(workout));
    }

    #[test]
    fn test_delete_exercise_withdraws_volume() {
        let (mut ledger, workout, bench, session) = push_day();
        let fly = ledger
            .create_exercise(workout, "Fly", ExerciseCategory::Chest, "")
            .unwrap();
        add_set(&mut ledger, bench, session, 60.0, 5, 10);
        add_set(&mut ledger, fly, session, 10.0, 12, 20);
        assert_eq!(ledger.session(session).unwrap().total_volume, 420.0);

        assert_eq!(ledger.delete_exercise(fly), 1);
        assert_eq!(ledger.session(session).unwrap().total_volume, 300.0);
        assert!(ledger.validate().is_empty());
    }

    #[test]
    fn test_delete_session_removes_member_sets() {
        let (mut ledger, _, bench, session) = push_day();
        add_set(&mut ledger, bench, session, 60.0, 5, 10);
        assert_eq!(ledger.delete_session(session), 1);
        assert_eq!(ledger.set_count(), 0);
        assert!(ledger.sets_of_exercise(bench).is_empty());
    }

    #[test]
    fn test_withdraw_volume_clamps_at_zero() {
        let (mut ledger, _, _, session) = push_day();
        ledger.session_mut(session).unwrap().total_volume = 100.0;
        ledger.withdraw_volume(session, 100.000_000_1);
        assert_eq!(ledger.session(session).unwrap().total_volume, 0.0);
    }

    #[test]
    fn test_validate_detects_violations() {
        let (mut ledger, workout, bench, session) = push_day();
        add_set(&mut ledger, bench, session, 60.0, 5, 10);
        assert!(ledger.validate().is_empty());

        ledger.session_mut(session).unwrap().total_volume = 1.0;
        ledger.create_session(workout, t0()).unwrap();

        let other = ledger.create_workout("Leg Day");
        let squat = ledger
            .create_exercise(other, "Squat", ExerciseCategory::Legs, "")
            .unwrap();
        ledger.insert_set(SetEntry {
            id: SetEntryId::new(),
            exercise_id: squat,
            session_id: Some(session),
            weight: 0.0,
            reps: 5,
            timestamp: t0(),
            seq: 0,
        });

        let errors = ledger.validate();
        assert!(errors.iter().any(|e| e.contains("does not match")));
        assert!(errors.iter().any(|e| e.contains("open sessions")));
        assert!(errors.iter().any(|e| e.contains("outside its session's workout")));
    }

    #[test]
    fn test_json_roundtrip() {
        let (mut ledger, _, bench, session) = push_day();
        add_set(&mut ledger, bench, session, 62.5, 8, 10);

        let json = serde_json::to_string(&ledger).unwrap();
        let parsed: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ledger);
    }
}
