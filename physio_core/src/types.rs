//! Core domain types for the Physio system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercises and their prescription parameters
//! - Exercise sessions and post-session feedback
//! - User profiles and gamification records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Exercise Types
// ============================================================================

/// How demanding an exercise is
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseDifficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// Body region an exercise rehabilitates
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseCategory {
    #[default]
    General,
    Shoulder,
    Knee,
    Back,
    Neck,
    Ankle,
    Wrist,
    Hip,
}

impl ExerciseCategory {
    pub const ALL: [ExerciseCategory; 8] = [
        ExerciseCategory::General,
        ExerciseCategory::Shoulder,
        ExerciseCategory::Knee,
        ExerciseCategory::Back,
        ExerciseCategory::Neck,
        ExerciseCategory::Ankle,
        ExerciseCategory::Wrist,
        ExerciseCategory::Hip,
    ];

    /// Parse a category name as typed on the command line
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "general" => Some(Self::General),
            "shoulder" => Some(Self::Shoulder),
            "knee" => Some(Self::Knee),
            "back" => Some(Self::Back),
            "neck" => Some(Self::Neck),
            "ankle" => Some(Self::Ankle),
            "wrist" => Some(Self::Wrist),
            "hip" => Some(Self::Hip),
            _ => None,
        }
    }
}

/// A prescribed rehabilitation exercise. Read-only while a session runs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: ExerciseCategory,
    #[serde(default)]
    pub difficulty: ExerciseDifficulty,
    #[serde(default)]
    pub target_muscles: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub sets: u32,
    pub repetitions: u32,
    /// Seconds of rest between sets
    #[serde(default = "default_rest_time")]
    pub rest_time: u32,
    /// Suggested duration in seconds
    #[serde(default)]
    pub duration: u32,
    /// Base reward used by scoring
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub calories: u32,
    /// Assigned by a physiotherapist (as opposed to freely browsable)
    #[serde(default)]
    pub assigned: bool,
    #[serde(default)]
    pub video_url: Option<String>,
}

fn default_rest_time() -> u32 {
    30
}

fn default_points() -> u32 {
    crate::scoring::DEFAULT_BASE_POINTS
}

// ============================================================================
// Session Types
// ============================================================================

/// A single timed attempt at an exercise.
///
/// Created at session start, mutated until `completed` is set, then frozen.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSession {
    pub id: Uuid,
    pub user_id: String,
    pub exercise_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds, set on completion
    pub duration: u64,
    pub completed: bool,
    pub completed_sets: u32,
    pub completed_reps: u32,
    pub calories_burned: u32,
    pub points_earned: u32,
    /// Ratio of achieved to target reps, 0.0 ..= 1.0
    pub accuracy: f32,
    #[serde(default)]
    pub notes: String,
    /// 1-10
    #[serde(default)]
    pub pain_level: Option<u8>,
    /// 1 (too easy) - 5 (too hard)
    #[serde(default)]
    pub difficulty_feedback: Option<u8>,
    #[serde(default)]
    pub mood: Option<String>,
}

impl ExerciseSession {
    /// Fresh, not yet completed session record
    pub fn begin(user_id: impl Into<String>, exercise_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            exercise_id: exercise_id.into(),
            start_time: at,
            end_time: None,
            duration: 0,
            completed: false,
            completed_sets: 0,
            completed_reps: 0,
            calories_burned: 0,
            points_earned: 0,
            accuracy: 0.0,
            notes: String::new(),
            pain_level: None,
            difficulty_feedback: None,
            mood: None,
        }
    }
}

/// Patient-reported feedback attached when a session is finished
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionFeedback {
    pub pain_level: Option<u8>,
    pub difficulty: Option<u8>,
    pub mood: Option<String>,
    pub notes: Option<String>,
}

impl SessionFeedback {
    /// Write the feedback into a session, clamping scales to their ranges
    pub fn apply_to(self, session: &mut ExerciseSession) {
        session.pain_level = self.pain_level.map(|p| p.clamp(1, 10));
        session.difficulty_feedback = self.difficulty.map(|d| d.clamp(1, 5));
        session.mood = self.mood.filter(|m| !m.trim().is_empty());
        if let Some(notes) = self.notes {
            session.notes = notes;
        }
    }
}

// ============================================================================
// Gamification Types
// ============================================================================

/// Per-user progress counters
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    pub total_points: u32,
    pub level: u32,
    pub streak_days: u32,
    pub last_exercise_day: Option<NaiveDate>,
    pub completed_exercises: u32,
    pub total_exercise_seconds: u64,
    #[serde(default)]
    pub has_surgery: bool,
    #[serde(default)]
    pub surgery_details: Option<String>,
    /// Treating doctor or physiotherapist
    #[serde(default)]
    pub doctor_name: Option<String>,
}

/// What an achievement measures
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    General,
    Streak,
    Exercises,
    Points,
    Consistency,
    Milestones,
}

/// A threshold-based badge
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: AchievementCategory,
    pub required_value: u32,
    pub points: u32,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub progress: u32,
}

impl Achievement {
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }
}

/// What a daily task counts
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ExerciseCount,
    /// Minutes of exercise
    ExerciseTime,
    PointsEarned,
    StreakMaintain,
    SpecificExercise,
}

/// A goal valid for a single calendar day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DailyTask {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub target_value: u32,
    pub current_progress: u32,
    pub points: u32,
    pub completed: bool,
    pub date: NaiveDate,
    pub expires_at: DateTime<Utc>,
}
