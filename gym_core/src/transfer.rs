//! Bulk CSV export and import of the whole ledger.
//!
//! Export flattens the ledger into one row per workout x exercise x set:
//!
//! ```text
//! WorkoutName,ExerciseName,ExerciseCategory,ExerciseNote,SetWeight,SetReps,SetTimestamp,SessionStartTime,SessionEndTime
//! "Push Day","Bench","chest","",60.0,5,"2025-07-06 09:00:00","2025-07-06 09:00:00",""
//! ```
//!
//! Text columns are always quoted, weight and reps never are, and timestamps
//! use local time. Quotes inside text are not escaped; the importer's
//! splitter drops them.
//!
//! Import replaces the entire ledger. Repeated workout, exercise and session
//! references are folded back together through lookup tables keyed by name
//! (and session start time).

use crate::types::*;
use crate::{Error, Ledger, Result, Store};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;

pub const HEADER: &str = "WorkoutName,ExerciseName,ExerciseCategory,ExerciseNote,SetWeight,SetReps,SetTimestamp,SessionStartTime,SessionEndTime";

/// Number of columns a data row must have
pub const COLUMN_COUNT: usize = 9;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counts of what an import produced
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub workouts: usize,
    pub exercises: usize,
    pub sessions: usize,
    pub sets: usize,
    /// Rows that could not be used at all
    pub skipped_rows: usize,
}

// ============================================================================
// Export
// ============================================================================

/// Serialize the ledger to CSV text
pub fn export_csv(ledger: &Ledger) -> String {
    let mut out = String::with_capacity(HEADER.len() + 1);
    out.push_str(HEADER);
    out.push('\n');

    for workout in ledger.workouts_by_name() {
        let exercises = ledger.exercises_of(workout.id);
        if exercises.is_empty() {
            out.push_str(&format!(
                "{},\"\",\"\",\"\",,,,\"\",\"\"\n",
                quote(&workout.name)
            ));
            continue;
        }

        for exercise in exercises {
            let prefix = format!(
                "{},{},{},{}",
                quote(&workout.name),
                quote(&exercise.name),
                quote(exercise.category.as_str()),
                quote(&exercise.note)
            );

            let sets = ledger.sets_of_exercise(exercise.id);
            if sets.is_empty() {
                out.push_str(&format!("{},,,,\"\",\"\"\n", prefix));
                continue;
            }

            for set in sets {
                let session = set.session_id.and_then(|id| ledger.session(id));
                let start = session
                    .map(|s| format_timestamp(s.start_time))
                    .unwrap_or_default();
                let end = session
                    .and_then(|s| s.end_time)
                    .map(format_timestamp)
                    .unwrap_or_default();
                out.push_str(&format!(
                    "{},{:?},{},{},{},{}\n",
                    prefix,
                    set.weight,
                    set.reps,
                    quote(&format_timestamp(set.timestamp)),
                    quote(&start),
                    quote(&end)
                ));
            }
        }
    }

    tracing::info!(
        "Exported {} workouts, {} sets to CSV",
        ledger.workout_count(),
        ledger.set_count()
    );
    out
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field)
}

/// Format a timestamp in local time as `yyyy-MM-dd HH:mm:ss`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a local `yyyy-MM-dd HH:mm:ss` timestamp
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Import
// ============================================================================

/// Split one CSV row on commas outside double quotes
///
/// Every `"` toggles the quoted state and is dropped from the output.
pub fn split_row(row: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(COLUMN_COUNT);
    let mut current = String::new();
    let mut inside_quotes = false;

    for c in row.chars() {
        match c {
            '"' => inside_quotes = !inside_quotes,
            ',' if !inside_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Lookup tables that fold repeated rows back into shared records
#[derive(Default)]
struct ImportTables {
    workouts: HashMap<String, WorkoutId>,
    /// Keyed by `workout|exercise`
    exercises: HashMap<String, ExerciseId>,
    /// Keyed by `workout|session start`
    sessions: HashMap<String, SessionId>,
}

/// Replace the store's ledger with the contents of `text`
///
/// Every existing record is deleted first. `now` stands in for timestamps
/// that are missing from a row. If the final save fails the previous ledger
/// is restored and the error returned.
pub fn import_csv(store: &mut dyn Store, text: &str, now: DateTime<Utc>) -> Result<ImportSummary> {
    let previous = std::mem::take(store.ledger_mut());
    tracing::info!(
        "Cleared {} workouts and {} sessions before import",
        previous.workout_count(),
        previous.session_count()
    );

    let mut summary = ImportSummary::default();
    let mut tables = ImportTables::default();
    let ledger = store.ledger_mut();

    // First line is the header
    for (index, raw) in text.split('\n').enumerate().skip(1) {
        let row = raw.trim_end_matches('\r');
        if row.trim().is_empty() {
            continue;
        }
        if let Err(e) = import_row(ledger, &mut tables, &mut summary, row, index + 1, now) {
            tracing::warn!("Skipping CSV row: {}", e);
            summary.skipped_rows += 1;
        }
    }

    if let Err(e) = store.save() {
        tracing::error!("Failed to save imported data: {}", e);
        *store.ledger_mut() = previous;
        return Err(e);
    }

    tracing::info!(
        "Imported {} workouts, {} exercises, {} sessions, {} sets ({} rows skipped)",
        summary.workouts,
        summary.exercises,
        summary.sessions,
        summary.sets,
        summary.skipped_rows
    );
    Ok(summary)
}

fn import_row(
    ledger: &mut Ledger,
    tables: &mut ImportTables,
    summary: &mut ImportSummary,
    row: &str,
    line: usize,
    now: DateTime<Utc>,
) -> Result<()> {
    let columns = split_row(row);
    if columns.len() < COLUMN_COUNT {
        return Err(Error::Parse {
            line,
            reason: format!("expected {} columns, found {}", COLUMN_COUNT, columns.len()),
        });
    }

    let workout_name = columns[0].as_str();
    if workout_name.is_empty() {
        return Err(Error::Parse {
            line,
            reason: "missing workout name".into(),
        });
    }
    let exercise_name = columns[1].as_str();
    let category = ExerciseCategory::parse_or_default(&columns[2]);
    let note = columns[3].as_str();
    let weight = parse_number::<f64>(&columns[4], "weight", line).filter(|w| w.is_finite() && *w >= 0.0);
    let reps = parse_number::<u32>(&columns[5], "reps", line);
    let timestamp = parse_timestamp(&columns[6]);
    let session_start_str = columns[7].trim();
    let session_start = parse_timestamp(session_start_str);
    let session_end = parse_timestamp(&columns[8]);

    let workout_id = match tables.workouts.get(workout_name) {
        Some(id) => *id,
        None => {
            let id = ledger.create_workout(workout_name);
            tables.workouts.insert(workout_name.to_string(), id);
            summary.workouts += 1;
            id
        }
    };

    if exercise_name.is_empty() {
        return Ok(());
    }

    let exercise_key = format!("{}|{}", workout_name, exercise_name);
    let exercise_id = match tables.exercises.get(&exercise_key) {
        Some(id) => {
            if let Some(exercise) = ledger.exercise_mut(*id) {
                exercise.note = note.to_string();
            }
            *id
        }
        None => {
            let id = ledger.create_exercise(workout_id, exercise_name, category, note)?;
            tables.exercises.insert(exercise_key, id);
            summary.exercises += 1;
            id
        }
    };

    let (Some(weight), Some(reps)) = (weight, reps) else {
        return Ok(());
    };

    let session_key = format!("{}|{}", workout_name, session_start_str);
    let cached = if session_start_str.is_empty() {
        None
    } else {
        tables.sessions.get(&session_key).copied()
    };
    let session_id = match cached {
        Some(id) => id,
        None => {
            let start_time = session_start.or(timestamp).unwrap_or(now);
            let mut session = Session {
                id: SessionId::new(),
                workout_id,
                start_time,
                end_time: None,
                duration: 0.0,
                total_volume: 0.0,
            };
            if let Some(end) = session_end {
                session.close_at(end);
            }
            let id = session.id;
            ledger.insert_session(session);
            if !session_start_str.is_empty() {
                tables.sessions.insert(session_key, id);
            }
            summary.sessions += 1;
            id
        }
    };

    let session = ledger
        .session_mut(session_id)
        .ok_or_else(|| Error::Integrity(format!("session {} vanished during import", session_id)))?;
    let entry = SetEntry {
        id: SetEntryId::new(),
        exercise_id,
        session_id: Some(session_id),
        weight,
        reps,
        timestamp: timestamp.unwrap_or(session.start_time),
        // The ledger starts empty, so row order is logging order
        seq: summary.sets as u64,
    };
    session.total_volume += entry.volume();
    ledger.insert_set(entry);
    summary.sets += 1;

    Ok(())
}

/// Parse an optional numeric column; empty means absent
fn parse_number<T: std::str::FromStr>(field: &str, what: &str, line: usize) -> Option<T> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    match field.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Line {}: ignoring unparseable {} {:?}", line, what, field);
            None
        }
    }
}
