//! Session history and per-exercise statistics.
//!
//! Read-only views over the ledger used by the history and exercise screens,
//! plus a per-session CSV report.

use crate::types::*;
use crate::{Ledger, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Whether a session is still collecting sets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Ongoing,
    Finished,
}

/// One line of the session history
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub workout_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: f64,
    pub total_volume: f64,
    pub set_count: usize,
    pub status: SessionStatus,
}

/// All sessions, newest first
pub fn session_history(ledger: &Ledger) -> Vec<SessionSummary> {
    ledger
        .sessions_newest_first()
        .into_iter()
        .map(|session| SessionSummary {
            session_id: session.id,
            workout_name: ledger
                .workout(session.workout_id)
                .map(|w| w.name.clone())
                .unwrap_or_else(|| "Unnamed Workout".to_string()),
            start_time: session.start_time,
            end_time: session.end_time,
            duration: session.duration,
            total_volume: session.total_volume,
            set_count: ledger.sets_of_session(session.id).len(),
            status: if session.is_open() {
                SessionStatus::Ongoing
            } else {
                SessionStatus::Finished
            },
        })
        .collect()
}

/// Format a duration in seconds as `"1h 5m"` or `"5m"`
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Sum of weight x reps over every set of an exercise
pub fn exercise_total_volume(ledger: &Ledger, exercise_id: ExerciseId) -> f64 {
    ledger
        .sets_of_exercise(exercise_id)
        .iter()
        .map(|s| s.volume())
        .sum()
}

/// Volume of an exercise per local calendar day, oldest day first
pub fn daily_volume(ledger: &Ledger, exercise_id: ExerciseId) -> Vec<(NaiveDate, f64)> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for set in ledger.sets_of_exercise(exercise_id) {
        let day = set.timestamp.with_timezone(&Local).date_naive();
        *days.entry(day).or_insert(0.0) += set.volume();
    }
    days.into_iter().collect()
}

/// Most recent set of an exercise, used to prefill the next one
pub fn last_set(ledger: &Ledger, exercise_id: ExerciseId) -> Option<&SetEntry> {
    ledger.sets_of_exercise(exercise_id).into_iter().last()
}

/// A row in the session report
#[derive(Debug, serde::Serialize)]
struct ReportRow {
    session_id: String,
    workout: String,
    started_at: String,
    ended_at: Option<String>,
    duration_seconds: Option<u64>,
    sets: usize,
    total_volume: f64,
}

impl ReportRow {
    fn new(summary: &SessionSummary) -> Self {
        ReportRow {
            session_id: summary.session_id.to_string(),
            workout: summary.workout_name.clone(),
            started_at: summary.start_time.to_rfc3339(),
            ended_at: summary.end_time.map(|t| t.to_rfc3339()),
            duration_seconds: summary.end_time.map(|_| summary.duration.max(0.0).round() as u64),
            sets: summary.set_count,
            total_volume: summary.total_volume,
        }
    }
}

/// Write one CSV row per session (newest first) to `path`
///
/// Returns the number of sessions written.
pub fn write_session_report(ledger: &Ledger, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let history = session_history(ledger);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    for summary in &history {
        writer.serialize(ReportRow::new(summary))?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} sessions to {:?}", history.len(), path);
    Ok(history.len())
}
