//! Progress summaries over stored sessions.

use crate::catalog::Catalog;
use crate::{ExerciseCategory, ExerciseSession};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Lifetime totals over completed sessions
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserStats {
    pub completed_sessions: u32,
    pub total_seconds: u64,
    pub total_points: u32,
}

pub fn user_stats(sessions: &[ExerciseSession]) -> UserStats {
    sessions
        .iter()
        .filter(|s| s.completed)
        .fold(UserStats::default(), |mut stats, s| {
            stats.completed_sessions += 1;
            stats.total_seconds += s.duration;
            stats.total_points += s.points_earned;
            stats
        })
}

/// Completed sessions per day for the 7 days ending `today`, oldest first
pub fn weekly_progress(sessions: &[ExerciseSession], today: NaiveDate) -> Vec<(NaiveDate, u32)> {
    (0..7)
        .rev()
        .map(|days_back| {
            let day = today - Duration::days(days_back);
            let count = sessions
                .iter()
                .filter(|s| s.completed && s.start_time.date_naive() == day)
                .count() as u32;
            (day, count)
        })
        .collect()
}

/// The `limit` most recent completed sessions, newest first
pub fn recent_completed(sessions: &[ExerciseSession], limit: usize) -> Vec<&ExerciseSession> {
    let mut completed: Vec<&ExerciseSession> = sessions.iter().filter(|s| s.completed).collect();
    completed.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    completed.truncate(limit);
    completed
}

/// Completed sessions per body region.
///
/// Sessions for exercises no longer in the catalog count as `General`.
pub fn sessions_by_category(
    sessions: &[ExerciseSession],
    catalog: &Catalog,
) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for session in sessions.iter().filter(|s| s.completed) {
        let category = catalog
            .get(&session.exercise_id)
            .map(|e| e.category)
            .unwrap_or(ExerciseCategory::General);
        *counts.entry(category_name(category)).or_insert(0) += 1;
    }
    counts
}

fn category_name(category: ExerciseCategory) -> String {
    format!("{:?}", category).to_lowercase()
}
