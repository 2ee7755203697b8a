//! Exercise session state machine.
//!
//! The machine is purely synchronous. It owns the set/rep/rest counters and
//! the session record, and it knows which ticker should be running, but it
//! never sleeps. Whoever drives it (see [`crate::driver`]) calls [`SessionMachine::tick`]
//! once per period of the active ticker.
//!
//! ## Phases
//!
//! ```text
//! NotStarted -> InSet -> Resting -> InSet -> ... -> Completed
//! ```
//!
//! Pausing is orthogonal to the phase: it only stops the active ticker.
//! Transitions that do not apply in the current state are ignored and
//! reported as `false`.

use crate::scoring;
use crate::types::{Exercise, ExerciseSession, SessionFeedback};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Logical position within a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    NotStarted,
    InSet,
    Resting,
    Completed,
}

/// Which ticker should currently be running. Never more than one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveTimer {
    Idle,
    /// Counts elapsed exercise time up
    Exercise,
    /// Counts the rest interval down
    Rest,
}

/// Everything a UI needs to render a running session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub exercise: Exercise,
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub is_paused: bool,
    pub is_resting: bool,
    pub is_completed: bool,
    pub current_set: u32,
    pub current_reps: u32,
    pub total_sets: u32,
    pub target_reps: u32,
    pub elapsed_seconds: u64,
    pub rest_remaining: u64,
    pub timer_text: String,
    pub active_timer: ActiveTimer,
    pub movement_count: u32,
    pub accuracy: f32,
    pub calories_burned: u32,
    pub points_earned: u32,
    /// Last persistence failure, if any
    pub error: Option<String>,
    /// Set once the completed session has been shown long enough
    pub unwind: bool,
    /// Commands processed by the driver before this snapshot was taken.
    /// Always 0 when taken straight from the machine.
    pub commands_applied: u64,
}

/// Format seconds as `MM:SS`
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Clone, Debug)]
pub struct SessionMachine {
    exercise: Exercise,
    record: ExerciseSession,
    current_set: u32,
    current_reps: u32,
    /// Last set that has already been scored
    scored_set: u32,
    elapsed_seconds: u64,
    rest_remaining: u64,
    resting: bool,
    paused: bool,
    completed: bool,
    timer: ActiveTimer,
    /// Bumped whenever the ticker has to be (re)created or dropped
    timer_generation: u64,
    movement_count: u32,
    calories_burned: u32,
    points_earned: u32,
    accuracy: f32,
    error: Option<String>,
    unwind: bool,
}

impl SessionMachine {
    /// Wrap an existing, not yet completed record. The exercise ticker starts immediately.
    pub fn new(exercise: Exercise, record: ExerciseSession) -> Self {
        Self {
            exercise,
            record,
            current_set: 0,
            current_reps: 0,
            scored_set: 0,
            elapsed_seconds: 0,
            rest_remaining: 0,
            resting: false,
            paused: false,
            completed: false,
            timer: ActiveTimer::Exercise,
            timer_generation: 1,
            movement_count: 0,
            calories_burned: 0,
            points_earned: 0,
            accuracy: 0.0,
            error: None,
            unwind: false,
        }
    }

    /// Begin a new session for `user_id` at `now`
    pub fn start(exercise: Exercise, user_id: &str, now: DateTime<Utc>) -> Self {
        let record = ExerciseSession::begin(user_id, exercise.id.clone(), now);
        tracing::info!(
            "Starting session {} for exercise {} ({} x {})",
            record.id,
            exercise.id,
            exercise.sets,
            exercise.repetitions
        );
        Self::new(exercise, record)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn record(&self) -> &ExerciseSession {
        &self.record
    }

    pub fn into_record(self) -> ExerciseSession {
        self.record
    }

    pub fn phase(&self) -> SessionPhase {
        if self.completed {
            SessionPhase::Completed
        } else if self.resting {
            SessionPhase::Resting
        } else if self.current_set == 0 {
            SessionPhase::NotStarted
        } else {
            SessionPhase::InSet
        }
    }

    pub fn active_timer(&self) -> ActiveTimer {
        self.timer
    }

    pub fn timer_generation(&self) -> u64 {
        self.timer_generation
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn timer_text(&self) -> String {
        if self.resting && self.rest_remaining > 0 {
            format!("Rest: {}", format_clock(self.rest_remaining))
        } else {
            format_clock(self.elapsed_seconds)
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            exercise: self.exercise.clone(),
            session_id: self.record.id,
            phase: self.phase(),
            is_paused: self.paused,
            is_resting: self.resting,
            is_completed: self.completed,
            current_set: self.current_set,
            current_reps: self.current_reps,
            total_sets: self.exercise.sets,
            target_reps: self.exercise.repetitions,
            elapsed_seconds: self.elapsed_seconds,
            rest_remaining: self.rest_remaining,
            timer_text: self.timer_text(),
            active_timer: self.timer,
            movement_count: self.movement_count,
            accuracy: self.accuracy,
            calories_burned: self.calories_burned,
            points_earned: self.points_earned,
            error: self.error.clone(),
            unwind: self.unwind,
            commands_applied: 0,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    fn switch_timer(&mut self, timer: ActiveTimer) {
        self.timer = timer;
        self.timer_generation += 1;
    }

    /// Begin the next set. Restarts the exercise ticker.
    pub fn start_set(&mut self) -> bool {
        if self.completed || self.paused || self.current_set >= self.exercise.sets {
            tracing::debug!("start_set ignored in {:?}", self.phase());
            return false;
        }

        self.current_set += 1;
        self.current_reps = 0;
        self.resting = false;
        self.rest_remaining = 0;
        self.switch_timer(ActiveTimer::Exercise);

        tracing::debug!("Set {}/{} started", self.current_set, self.exercise.sets);
        true
    }

    /// Score the current set and rest before the next one
    pub fn complete_set(&mut self) -> bool {
        if self.completed
            || self.paused
            || self.resting
            || self.current_set == 0
            || self.scored_set == self.current_set
        {
            tracing::debug!("complete_set ignored in {:?}", self.phase());
            return false;
        }

        let points = scoring::set_points(
            self.exercise.points,
            self.current_reps,
            self.exercise.repetitions,
        );
        self.points_earned = self.points_earned.saturating_add(points);
        self.scored_set = self.current_set;
        self.accuracy = scoring::accuracy(self.current_reps, self.exercise.repetitions);
        self.resting = true;

        if self.current_set < self.exercise.sets {
            self.rest_remaining = u64::from(self.exercise.rest_time);
            if self.rest_remaining == 0 {
                self.resting = false;
            } else {
                self.switch_timer(ActiveTimer::Rest);
            }
        }

        tracing::debug!(
            "Set {} complete: +{} points ({} total), rest {}s",
            self.current_set,
            points,
            self.points_earned,
            self.rest_remaining
        );
        true
    }

    /// Record the rep counter reported by the UI. Negative values clamp to zero.
    pub fn update_current_reps(&mut self, reps: i32) -> bool {
        if self.completed {
            return false;
        }

        let reps = reps.max(0) as u32;
        if reps > self.current_reps {
            self.movement_count += 1;
            self.calories_burned += 1;
        }

        let changed = reps != self.current_reps;
        self.current_reps = reps;
        changed
    }

    pub fn pause(&mut self) -> bool {
        if self.completed || self.paused {
            return false;
        }
        self.paused = true;
        self.switch_timer(ActiveTimer::Idle);
        true
    }

    /// Restart whichever ticker was active, from the retained counters
    pub fn resume(&mut self) -> bool {
        if self.completed || !self.paused {
            return false;
        }
        self.paused = false;
        let timer = if self.resting && self.rest_remaining > 0 {
            ActiveTimer::Rest
        } else {
            ActiveTimer::Exercise
        };
        self.switch_timer(timer);
        true
    }

    /// Advance the active ticker by one period
    pub fn tick(&mut self) -> bool {
        if self.completed || self.paused {
            return false;
        }

        match self.timer {
            ActiveTimer::Idle => false,
            ActiveTimer::Exercise => {
                self.elapsed_seconds += 1;
                true
            }
            ActiveTimer::Rest => {
                self.rest_remaining = self.rest_remaining.saturating_sub(1);
                if self.rest_remaining == 0 {
                    self.resting = false;
                    self.switch_timer(ActiveTimer::Exercise);
                    tracing::debug!("Rest after set {} over", self.current_set);
                }
                true
            }
        }
    }

    /// Finalize the session. Returns the record to persist, or `None` if
    /// the session was already completed.
    pub fn complete_session(
        &mut self,
        now: DateTime<Utc>,
        feedback: SessionFeedback,
    ) -> Option<ExerciseSession> {
        if self.completed {
            return None;
        }

        self.switch_timer(ActiveTimer::Idle);
        self.rest_remaining = 0;
        self.points_earned = scoring::session_points(
            self.exercise.points,
            self.current_set,
            self.exercise.sets,
            self.accuracy,
        );
        self.completed = true;

        let record = &mut self.record;
        record.end_time = Some(now);
        record.duration = (now - record.start_time).num_seconds().max(0) as u64;
        record.completed = true;
        record.completed_sets = self.current_set;
        record.completed_reps = self.current_reps;
        record.calories_burned = self.calories_burned;
        record.points_earned = self.points_earned;
        record.accuracy = self.accuracy;
        feedback.apply_to(record);

        tracing::info!(
            "Session {} completed: {}/{} sets, {} points",
            record.id,
            record.completed_sets,
            self.exercise.sets,
            record.points_earned
        );
        Some(record.clone())
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn mark_unwind(&mut self) {
        self.unwind = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_default_catalog;
    use chrono::Duration;

    fn test_exercise() -> Exercise {
        let mut exercise = get_default_catalog()
            .get("straight_leg_raise")
            .unwrap()
            .clone();
        exercise.sets = 3;
        exercise.repetitions = 10;
        exercise.points = 10;
        exercise.rest_time = 5;
        exercise
    }

    fn machine() -> SessionMachine {
        SessionMachine::start(test_exercise(), "user-1", Utc::now())
    }

    #[test]
    fn test_new_session_is_not_started_with_exercise_ticker() {
        let m = machine();
        assert_eq!(m.phase(), SessionPhase::NotStarted);
        assert_eq!(m.active_timer(), ActiveTimer::Exercise);
        assert!(!m.record().completed);
        assert_eq!(m.record().end_time, None);
    }

    #[test]
    fn test_full_set_then_rest_countdown() {
        let mut m = machine();
        assert!(m.start_set());
        m.update_current_reps(10);
        assert!(m.complete_set());

        let snap = m.snapshot();
        assert_eq!(snap.points_earned, 5);
        assert!(snap.is_resting);
        assert_eq!(snap.rest_remaining, 5);
        assert_eq!(snap.active_timer, ActiveTimer::Rest);
        assert_eq!(snap.timer_text, "Rest: 00:05");

        for _ in 0..4 {
            m.tick();
        }
        assert!(m.snapshot().is_resting);

        m.tick();
        let snap = m.snapshot();
        assert!(!snap.is_resting);
        assert_eq!(snap.active_timer, ActiveTimer::Exercise);
        assert_eq!(snap.phase, SessionPhase::InSet);
    }

    #[test]
    fn test_rest_does_not_advance_elapsed_time() {
        let mut m = machine();
        m.start_set();
        m.tick();
        m.tick();
        m.complete_set();
        m.tick();
        assert_eq!(m.snapshot().elapsed_seconds, 2);
    }

    #[test]
    fn test_complete_set_does_not_advance_current_set() {
        let mut m = machine();
        m.start_set();
        m.update_current_reps(10);
        assert!(m.complete_set());
        let points = m.snapshot().points_earned;

        assert!(!m.complete_set());
        assert_eq!(m.snapshot().current_set, 1);
        assert_eq!(m.snapshot().points_earned, points);

        // Even after the rest runs out the same set is not scored twice
        for _ in 0..5 {
            m.tick();
        }
        assert!(!m.complete_set());
        assert_eq!(m.snapshot().current_set, 1);
        assert_eq!(m.snapshot().points_earned, points);
    }

    #[test]
    fn test_complete_set_before_first_set_is_ignored() {
        let mut m = machine();
        assert!(!m.complete_set());
        assert_eq!(m.snapshot().points_earned, 0);
        assert!(!m.snapshot().is_resting);
    }

    #[test]
    fn test_start_set_bounded_by_total_sets() {
        let mut m = machine();
        for expected in 1..=3 {
            assert!(m.start_set());
            assert_eq!(m.snapshot().current_set, expected);
        }
        assert!(!m.start_set());
        assert_eq!(m.snapshot().current_set, 3);
    }

    #[test]
    fn test_start_set_interrupts_rest() {
        let mut m = machine();
        m.start_set();
        m.complete_set();
        assert!(m.snapshot().is_resting);

        assert!(m.start_set());
        let snap = m.snapshot();
        assert!(!snap.is_resting);
        assert_eq!(snap.current_reps, 0);
        assert_eq!(snap.active_timer, ActiveTimer::Exercise);
    }

    #[test]
    fn test_last_set_rests_without_countdown() {
        let mut m = machine();
        for _ in 0..3 {
            m.start_set();
            m.complete_set();
        }
        let snap = m.snapshot();
        assert!(snap.is_resting);
        assert_eq!(snap.rest_remaining, 0);
        assert_eq!(snap.active_timer, ActiveTimer::Exercise);
    }

    #[test]
    fn test_zero_rest_time_clears_resting_immediately() {
        let mut exercise = test_exercise();
        exercise.rest_time = 0;
        let mut m = SessionMachine::start(exercise, "user-1", Utc::now());
        m.start_set();
        assert!(m.complete_set());
        assert!(!m.snapshot().is_resting);
    }

    #[test]
    fn test_rep_increase_counts_exactly_one_movement() {
        for n in 0..50 {
            let mut m = machine();
            m.update_current_reps(n);
            let before = m.snapshot();
            m.update_current_reps(n + 1);
            let after = m.snapshot();
            assert_eq!(after.movement_count, before.movement_count + 1);
            assert!(after.calories_burned >= before.calories_burned);
        }
    }

    #[test]
    fn test_rep_decrease_and_negative_clamp() {
        let mut m = machine();
        m.update_current_reps(5);
        let before = m.snapshot();

        m.update_current_reps(-3);
        let after = m.snapshot();
        assert_eq!(after.current_reps, 0);
        assert_eq!(after.movement_count, before.movement_count);
        assert_eq!(after.calories_burned, before.calories_burned);
    }

    #[test]
    fn test_pause_freezes_rest_and_resume_continues() {
        let mut m = machine();
        m.start_set();
        m.complete_set();
        m.tick();
        m.tick();
        assert_eq!(m.snapshot().rest_remaining, 3);

        assert!(m.pause());
        assert_eq!(m.active_timer(), ActiveTimer::Idle);
        for _ in 0..10 {
            assert!(!m.tick());
        }
        assert_eq!(m.snapshot().rest_remaining, 3);
        assert!(m.snapshot().is_resting);

        assert!(m.resume());
        assert_eq!(m.active_timer(), ActiveTimer::Rest);
        for _ in 0..3 {
            m.tick();
        }
        assert!(!m.snapshot().is_resting);
    }

    #[test]
    fn test_pause_keeps_elapsed_time() {
        let mut m = machine();
        m.start_set();
        m.tick();
        m.tick();
        m.pause();
        assert!(!m.pause());
        m.tick();
        assert!(m.resume());
        assert!(!m.resume());
        m.tick();
        assert_eq!(m.snapshot().elapsed_seconds, 3);
        assert_eq!(m.snapshot().timer_text, "00:03");
    }

    #[test]
    fn test_transitions_ignored_while_paused() {
        let mut m = machine();
        m.pause();
        assert!(!m.start_set());
        assert_eq!(m.snapshot().current_set, 0);
    }

    #[test]
    fn test_timer_generation_bumps_on_every_restart() {
        let mut m = machine();
        let g0 = m.timer_generation();
        m.start_set();
        let g1 = m.timer_generation();
        assert!(g1 > g0);
        m.start_set();
        assert!(m.timer_generation() > g1);
    }

    #[test]
    fn test_complete_session_partial_sets() {
        let mut m = machine();
        m.start_set();
        m.update_current_reps(10);
        m.complete_set();
        m.start_set();

        let now = m.record().start_time + Duration::seconds(90);
        let record = m.complete_session(now, SessionFeedback::default()).unwrap();

        // trunc(10 * 2/3) = 6, accuracy bonus trunc(1.0 * 0.2) = 0
        assert_eq!(record.points_earned, 6);
        assert!(record.completed);
        assert_eq!(record.completed_sets, 2);
        assert_eq!(record.duration, 90);
        assert_eq!(record.end_time, Some(now));
        assert!(record.completed_sets <= m.exercise().sets);

        let snap = m.snapshot();
        assert!(snap.is_completed);
        assert_eq!(snap.phase, SessionPhase::Completed);
        assert_eq!(snap.active_timer, ActiveTimer::Idle);
        assert_eq!(snap.points_earned, 6);
    }

    #[test]
    fn test_complete_session_without_sets() {
        let mut m = machine();
        let record = m
            .complete_session(Utc::now(), SessionFeedback::default())
            .unwrap();
        assert!(record.completed);
        assert_eq!(record.points_earned, 0);
        assert_eq!(record.completed_sets, 0);
    }

    #[test]
    fn test_completed_session_is_terminal() {
        let mut m = machine();
        m.start_set();
        let record = m
            .complete_session(Utc::now(), SessionFeedback::default())
            .unwrap();

        assert!(!m.start_set());
        assert!(!m.complete_set());
        assert!(!m.update_current_reps(4));
        assert!(!m.pause());
        assert!(!m.resume());
        assert!(!m.tick());
        assert!(m
            .complete_session(Utc::now(), SessionFeedback::default())
            .is_none());
        assert_eq!(m.record(), &record);
    }

    #[test]
    fn test_feedback_is_clamped_into_record() {
        let mut m = machine();
        let feedback = SessionFeedback {
            pain_level: Some(14),
            difficulty: Some(0),
            mood: Some("tired".into()),
            notes: Some("left knee stiff".into()),
        };
        let record = m.complete_session(Utc::now(), feedback).unwrap();
        assert_eq!(record.pain_level, Some(10));
        assert_eq!(record.difficulty_feedback, Some(1));
        assert_eq!(record.mood.as_deref(), Some("tired"));
        assert_eq!(record.notes, "left knee stiff");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(3600), "60:00");
    }
}
