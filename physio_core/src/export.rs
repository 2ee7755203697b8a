//! CSV export of completed sessions.

use crate::{ExerciseSession, Result};
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    user_id: String,
    exercise_id: String,
    start_time: String,
    end_time: Option<String>,
    duration: u64,
    completed_sets: u32,
    completed_reps: u32,
    accuracy: f32,
    points_earned: u32,
    calories_burned: u32,
    pain_level: Option<u8>,
    difficulty_feedback: Option<u8>,
    mood: Option<String>,
    notes: String,
}

impl From<&ExerciseSession> for CsvRow {
    fn from(session: &ExerciseSession) -> Self {
        CsvRow {
            id: session.id.to_string(),
            user_id: session.user_id.clone(),
            exercise_id: session.exercise_id.clone(),
            start_time: session.start_time.to_rfc3339(),
            end_time: session.end_time.map(|t| t.to_rfc3339()),
            duration: session.duration,
            completed_sets: session.completed_sets,
            completed_reps: session.completed_reps,
            accuracy: session.accuracy,
            points_earned: session.points_earned,
            calories_burned: session.calories_burned,
            pain_level: session.pain_level,
            difficulty_feedback: session.difficulty_feedback,
            mood: session.mood.clone(),
            notes: session.notes.clone(),
        }
    }
}

/// Write completed sessions to `path`, replacing any existing file.
///
/// Returns the number of rows written.
pub fn export_csv(sessions: &[ExerciseSession], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut written = 0;
    for session in sessions.iter().filter(|s| s.completed) {
        writer.serialize(CsvRow::from(session))?;
        written += 1;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Exported {} sessions to {:?}", written, path);
    Ok(written)
}
