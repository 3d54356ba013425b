//! Core domain types for gymtrack.
//!
//! This module defines the records kept in the ledger:
//! - Workouts and the exercises attached to them
//! - Sessions (timed groups of sets with a running volume total)
//! - Individual weight/rep set entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identity of a workout
    WorkoutId
);
entity_id!(
    /// Identity of an exercise
    ExerciseId
);
entity_id!(
    /// Identity of a session
    SessionId
);
entity_id!(
    /// Identity of a logged set
    SetEntryId
);

// ============================================================================
// Exercise Category
// ============================================================================

/// Muscle group an exercise targets
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseCategory {
    Legs,
    Biceps,
    Triceps,
    Abs,
    Back,
    Shoulders,
    #[default]
    Chest,
}

impl ExerciseCategory {
    pub const ALL: [ExerciseCategory; 7] = [
        ExerciseCategory::Legs,
        ExerciseCategory::Biceps,
        ExerciseCategory::Triceps,
        ExerciseCategory::Abs,
        ExerciseCategory::Back,
        ExerciseCategory::Shoulders,
        ExerciseCategory::Chest,
    ];

    /// Lowercase wire name, as written to CSV
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseCategory::Legs => "legs",
            ExerciseCategory::Biceps => "biceps",
            ExerciseCategory::Triceps => "triceps",
            ExerciseCategory::Abs => "abs",
            ExerciseCategory::Back => "back",
            ExerciseCategory::Shoulders => "shoulders",
            ExerciseCategory::Chest => "chest",
        }
    }

    /// Capitalized name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            ExerciseCategory::Legs => "Legs",
            ExerciseCategory::Biceps => "Biceps",
            ExerciseCategory::Triceps => "Triceps",
            ExerciseCategory::Abs => "Abs",
            ExerciseCategory::Back => "Back",
            ExerciseCategory::Shoulders => "Shoulders",
            ExerciseCategory::Chest => "Chest",
        }
    }

    /// Parse a category name, falling back to chest for anything unknown
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            tracing::debug!("Unknown exercise category {:?}, using chest", s);
            ExerciseCategory::default()
        })
    }
}

impl fmt::Display for ExerciseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let wanted = s.trim().to_lowercase();
        ExerciseCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| crate::Error::Validation(format!("unknown exercise category: {}", s)))
    }
}

// ============================================================================
// Records
// ============================================================================

/// A named workout owning exercises and sessions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub id: WorkoutId,
    pub name: String,
}

/// An exercise attached to a workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: ExerciseId,
    /// Back-reference; `None` means the exercise is dangling
    pub workout_id: Option<WorkoutId>,
    pub name: String,
    pub category: ExerciseCategory,
    #[serde(default)]
    pub note: String,
}

/// A timed group of sets for one workout
///
/// `end_time == None` means the session is still open.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub workout_id: WorkoutId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between start and end, filled in on close
    pub duration: f64,
    /// Running sum of weight x reps over member sets
    pub total_volume: f64,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Mark the session ended at `end`, recomputing its duration
    pub fn close_at(&mut self, end: DateTime<Utc>) {
        self.end_time = Some(end);
        self.duration = seconds_between(self.start_time, end);
    }
}

/// One logged set of an exercise inside a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetEntry {
    pub id: SetEntryId,
    pub exercise_id: ExerciseId,
    /// `None` only for records that lost their session
    pub session_id: Option<SessionId>,
    /// Kilograms
    pub weight: f64,
    pub reps: u32,
    pub timestamp: DateTime<Utc>,
    /// Logging order; breaks ties between sets with the same timestamp
    #[serde(default)]
    pub seq: u64,
}

impl SetEntry {
    /// Volume contributed by this set (kg x reps)
    pub fn volume(&self) -> f64 {
        set_volume(self.weight, self.reps)
    }
}

/// Volume of a single set
pub fn set_volume(weight: f64, reps: u32) -> f64 {
    weight * f64::from(reps)
}

/// Fractional seconds from `start` to `end`
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}
