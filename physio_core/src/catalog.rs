//! Default catalog of rehabilitation exercises.
//!
//! This module provides the built-in exercises and lookup helpers. Custom
//! exercises from the config file are merged on top with [`Catalog::with_custom`].

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashSet};

/// The set of exercises a session can be started from
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub exercises: BTreeMap<String, Exercise>,
}

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

struct Prescription {
    sets: u32,
    repetitions: u32,
    rest_time: u32,
    points: u32,
}

fn exercise(
    id: &str,
    title: &str,
    category: ExerciseCategory,
    difficulty: ExerciseDifficulty,
    rx: Prescription,
    muscles: &[&str],
    instructions: &[&str],
) -> Exercise {
    Exercise {
        id: id.into(),
        title: title.into(),
        description: String::new(),
        category,
        difficulty,
        target_muscles: muscles.iter().map(|m| m.to_string()).collect(),
        instructions: instructions.iter().map(|i| i.to_string()).collect(),
        sets: rx.sets,
        repetitions: rx.repetitions,
        rest_time: rx.rest_time,
        // Rough per-rep pace of 3 seconds plus rests
        duration: rx.sets * rx.repetitions * 3 + rx.sets.saturating_sub(1) * rx.rest_time,
        points: rx.points,
        calories: rx.sets * rx.repetitions / 2,
        assigned: false,
        video_url: None,
    }
}

/// Builds the default catalog with built-in exercises
pub fn build_default_catalog() -> Catalog {
    use ExerciseCategory::*;
    use ExerciseDifficulty::*;

    let exercises = vec![
        exercise(
            "pendulum_swing",
            "Pendulum Shoulder Swing",
            Shoulder,
            Beginner,
            Prescription { sets: 3, repetitions: 10, rest_time: 30, points: 10 },
            &["rotator_cuff", "deltoid"],
            &[
                "Lean forward supporting yourself on a table",
                "Let the affected arm hang and swing it in small circles",
            ],
        ),
        exercise(
            "wall_slide",
            "Wall Slide",
            Shoulder,
            Intermediate,
            Prescription { sets: 3, repetitions: 12, rest_time: 45, points: 15 },
            &["serratus_anterior", "trapezius"],
            &["Forearms on the wall", "Slide up until arms are overhead, then return"],
        ),
        exercise(
            "straight_leg_raise",
            "Straight Leg Raise",
            Knee,
            Beginner,
            Prescription { sets: 3, repetitions: 10, rest_time: 30, points: 10 },
            &["quadriceps", "hip_flexors"],
            &["Lie on your back, one knee bent", "Raise the straight leg to knee height"],
        ),
        exercise(
            "mini_squat",
            "Mini Squat",
            Knee,
            Intermediate,
            Prescription { sets: 3, repetitions: 15, rest_time: 45, points: 15 },
            &["quadriceps", "glutes"],
            &["Feet shoulder width apart", "Bend knees to 45 degrees and stand up"],
        ),
        exercise(
            "bird_dog",
            "Bird Dog",
            Back,
            Intermediate,
            Prescription { sets: 3, repetitions: 8, rest_time: 30, points: 15 },
            &["erector_spinae", "glutes", "core"],
            &["On hands and knees", "Extend opposite arm and leg, hold, switch"],
        ),
        exercise(
            "chin_tuck",
            "Chin Tuck",
            Neck,
            Beginner,
            Prescription { sets: 2, repetitions: 10, rest_time: 20, points: 5 },
            &["deep_neck_flexors"],
            &["Sit tall", "Draw the chin straight back, hold five seconds"],
        ),
        exercise(
            "ankle_alphabet",
            "Ankle Alphabet",
            Ankle,
            Beginner,
            Prescription { sets: 2, repetitions: 1, rest_time: 30, points: 5 },
            &["tibialis_anterior", "calf"],
            &["Lift the foot", "Trace the alphabet with your big toe"],
        ),
        exercise(
            "wrist_flexor_stretch",
            "Wrist Flexor Stretch",
            Wrist,
            Beginner,
            Prescription { sets: 3, repetitions: 5, rest_time: 15, points: 5 },
            &["forearm_flexors"],
            &["Arm straight, palm up", "Gently pull the fingers back with the other hand"],
        ),
        exercise(
            "clamshell",
            "Clamshell",
            Hip,
            Beginner,
            Prescription { sets: 3, repetitions: 12, rest_time: 30, points: 10 },
            &["gluteus_medius"],
            &["Lie on your side, knees bent", "Open the top knee keeping feet together"],
        ),
        exercise(
            "marching_in_place",
            "Marching in Place",
            General,
            Beginner,
            Prescription { sets: 2, repetitions: 20, rest_time: 30, points: 10 },
            &["hip_flexors", "calf"],
            &["Stand tall", "Lift knees alternately at a steady pace"],
        ),
    ];

    let exercises = exercises.into_iter().map(|e| (e.id.clone(), e)).collect();
    Catalog { exercises }
}

impl Catalog {
    /// Look up an exercise by id
    pub fn get(&self, id: &str) -> Option<&Exercise> {
        self.exercises.get(id)
    }

    /// Look up an exercise by id, failing with [`Error::ExerciseNotFound`]
    pub fn require(&self, id: &str) -> Result<&Exercise> {
        self.get(id).ok_or_else(|| Error::ExerciseNotFound(id.to_string()))
    }

    pub fn by_category(&self, category: ExerciseCategory) -> Vec<&Exercise> {
        self.exercises
            .values()
            .filter(|e| e.category == category)
            .collect()
    }

    /// Exercises a physiotherapist has assigned
    pub fn assigned(&self) -> Vec<&Exercise> {
        self.exercises.values().filter(|e| e.assigned).collect()
    }

    /// Merge extra exercises over this catalog; same id replaces the built-in
    pub fn with_custom(&self, custom: &[Exercise]) -> Catalog {
        let mut merged = self.clone();
        for exercise in custom {
            if merged.exercises.contains_key(&exercise.id) {
                tracing::debug!("Custom exercise {} overrides built-in", exercise.id);
            }
            merged
                .exercises
                .insert(exercise.id.clone(), exercise.clone());
        }
        merged
    }

    /// Validate the catalog, returning a list of problems
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut titles = HashSet::new();

        for (key, exercise) in &self.exercises {
            if exercise.id.trim().is_empty() {
                errors.push("Exercise with empty id".to_string());
            }
            if key != &exercise.id {
                errors.push(format!(
                    "Exercise '{}' stored under key '{}'",
                    exercise.id, key
                ));
            }
            if exercise.title.trim().is_empty() {
                errors.push(format!("Exercise '{}': empty title", exercise.id));
            }
            if exercise.sets == 0 {
                errors.push(format!("Exercise '{}': sets must be > 0", exercise.id));
            }
            if !titles.insert(exercise.title.to_lowercase()) {
                errors.push(format!(
                    "Exercise '{}': duplicate title '{}'",
                    exercise.id, exercise.title
                ));
            }
        }

        if self.exercises.is_empty() {
            errors.push("Catalog has no exercises".to_string());
        }

        errors
    }
}
