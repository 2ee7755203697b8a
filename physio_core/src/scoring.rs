//! Point and accuracy arithmetic.
//!
//! All fractional results are truncated toward zero.

/// Base reward used when an exercise does not specify one
pub const DEFAULT_BASE_POINTS: u32 = 10;

/// Share of the base reward granted for each completed set
const SET_POINTS_FACTOR: f64 = 0.5;

/// Weight of accuracy in the end-of-session bonus
const ACCURACY_BONUS_FACTOR: f64 = 0.2;

/// Points needed to reach each level, lowest first
const LEVEL_THRESHOLDS: [u32; 10] = [100, 250, 500, 1000, 1500, 2500, 3500, 5000, 7500, 10000];

fn ratio(done: u32, target: u32) -> f64 {
    if target == 0 {
        1.0
    } else {
        done as f64 / target as f64
    }
}

/// Points for finishing one set with `reps` out of `target_reps`
pub fn set_points(base_points: u32, reps: u32, target_reps: u32) -> u32 {
    (base_points as f64 * ratio(reps, target_reps) * SET_POINTS_FACTOR) as u32
}

/// End-of-session total. Replaces the running per-set total.
pub fn session_points(base_points: u32, current_set: u32, total_sets: u32, accuracy: f32) -> u32 {
    let completion = (base_points as f64 * ratio(current_set, total_sets)) as u32;
    let bonus = (accuracy.max(0.0) as f64 * ACCURACY_BONUS_FACTOR) as u32;
    completion + bonus
}

/// Achieved over target reps, capped at 1. Stand-in for sensor-based scoring.
pub fn accuracy(reps: u32, target_reps: u32) -> f32 {
    ratio(reps, target_reps).min(1.0) as f32
}

/// Level reached with `points` in total
pub fn level_for_points(points: u32) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .take_while(|threshold| points >= **threshold)
        .count() as u32
}
