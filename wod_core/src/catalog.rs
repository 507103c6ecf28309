//! Default catalog of movements.
//!
//! This module provides the built-in movements the engine knows how to time:
//! which timing family each belongs to, which local-fatigue buckets it loads,
//! and where its 1RM comes from when the athlete has no direct entry.

use crate::types::PatternBucket::*;
use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Cached default catalog - built once and reused across all runs
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached default catalog
///
/// Sweeps launch hundreds of runs against the same catalog; this avoids
/// rebuilding the movement table for each of them.
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds the default catalog with built-in movements
///
/// **Note**: For production use, prefer `get_default_catalog()` which returns a
/// cached reference. This function is retained for tests and for building
/// extended catalogs with [`Catalog::insert`].
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

fn weights(patterns: &[(PatternBucket, f64)]) -> Vec<PatternWeight> {
    patterns
        .iter()
        .map(|(bucket, weight)| PatternWeight::new(*bucket, *weight))
        .collect()
}

fn barbell(id: &str, name: &str, patterns: &[(PatternBucket, f64)], refs: &[&str]) -> MovementSpec {
    MovementSpec {
        id: id.into(),
        name: name.into(),
        kind: MovementKind::Barbell,
        patterns: weights(patterns),
        load_reference: refs.iter().map(|r| r.to_string()).collect(),
        modality: None,
    }
}

fn gymnastic(id: &str, name: &str, patterns: &[(PatternBucket, f64)]) -> MovementSpec {
    MovementSpec {
        id: id.into(),
        name: name.into(),
        kind: MovementKind::Gymnastic,
        patterns: weights(patterns),
        load_reference: vec![],
        modality: None,
    }
}

fn cardio(id: &str, name: &str, modality: &str, patterns: &[(PatternBucket, f64)]) -> MovementSpec {
    MovementSpec {
        id: id.into(),
        name: name.into(),
        kind: MovementKind::Cardio,
        patterns: weights(patterns),
        load_reference: vec![],
        modality: Some(modality.into()),
    }
}

/// Internal function that actually builds the catalog
fn build_default_catalog_internal() -> Catalog {
    let specs = vec![
        // ====================================================================
        // Barbell
        // ====================================================================
        barbell("back_squat", "Back Squat", &[(Squat, 1.0)], &[]),
        barbell(
            "front_squat",
            "Front Squat",
            &[(Squat, 1.0), (Core, 0.3)],
            &["back_squat"],
        ),
        barbell(
            "overhead_squat",
            "Overhead Squat",
            &[(Squat, 1.0), (Push, 0.5), (Core, 0.3)],
            &["snatch"],
        ),
        barbell(
            "thruster",
            "Thruster",
            &[(Squat, 1.0), (Push, 0.6)],
            &["front_squat", "back_squat"],
        ),
        barbell("deadlift", "Deadlift", &[(Hinge, 1.0), (Grip, 0.5)], &[]),
        barbell(
            "sumo_deadlift_high_pull",
            "Sumo Deadlift High Pull",
            &[(Hinge, 1.0), (Pull, 0.5), (Grip, 0.3)],
            &["deadlift"],
        ),
        barbell(
            "clean",
            "Clean",
            &[(Hinge, 1.0), (Pull, 0.5), (Grip, 0.3)],
            &["power_clean"],
        ),
        barbell(
            "power_clean",
            "Power Clean",
            &[(Hinge, 1.0), (Pull, 0.5), (Grip, 0.3)],
            &["clean"],
        ),
        barbell(
            "hang_power_clean",
            "Hang Power Clean",
            &[(Hinge, 1.0), (Pull, 0.5), (Grip, 0.3)],
            &["power_clean", "clean"],
        ),
        barbell(
            "clean_and_jerk",
            "Clean and Jerk",
            &[(Hinge, 1.0), (Push, 0.6), (Pull, 0.4)],
            &["clean"],
        ),
        barbell(
            "snatch",
            "Snatch",
            &[(Hinge, 1.0), (Pull, 0.6), (Push, 0.4)],
            &["power_snatch"],
        ),
        barbell(
            "power_snatch",
            "Power Snatch",
            &[(Hinge, 1.0), (Pull, 0.6), (Push, 0.4)],
            &["snatch"],
        ),
        barbell("overhead_press", "Overhead Press", &[(Push, 1.0)], &[]),
        barbell(
            "push_press",
            "Push Press",
            &[(Push, 1.0), (Squat, 0.3)],
            &["overhead_press"],
        ),
        barbell(
            "push_jerk",
            "Push Jerk",
            &[(Push, 1.0), (Squat, 0.3)],
            &["push_press", "overhead_press"],
        ),
        barbell(
            "shoulder_to_overhead",
            "Shoulder to Overhead",
            &[(Push, 1.0), (Squat, 0.3)],
            &["push_jerk", "push_press", "overhead_press"],
        ),
        barbell("bench_press", "Bench Press", &[(Push, 1.0)], &[]),
        // ====================================================================
        // Gymnastics and bodyweight
        // ====================================================================
        gymnastic("pull_up", "Pull-up", &[(Pull, 1.0), (Grip, 0.5)]),
        gymnastic("chin_up", "Chin-up", &[(Pull, 1.0), (Grip, 0.5)]),
        gymnastic("chest_to_bar", "Chest-to-Bar Pull-up", &[(Pull, 1.0), (Grip, 0.6)]),
        gymnastic(
            "bar_muscle_up",
            "Bar Muscle-up",
            &[(Pull, 1.0), (Push, 0.6), (Grip, 0.5)],
        ),
        gymnastic(
            "ring_muscle_up",
            "Ring Muscle-up",
            &[(Pull, 1.0), (Push, 0.7), (Grip, 0.4)],
        ),
        gymnastic("rope_climb", "Rope Climb", &[(Pull, 1.0), (Grip, 1.0)]),
        gymnastic("handstand_push_up", "Handstand Push-up", &[(Push, 1.0)]),
        gymnastic("push_up", "Push-up", &[(Push, 1.0), (Core, 0.3)]),
        gymnastic("ring_dip", "Ring Dip", &[(Push, 1.0)]),
        gymnastic("toes_to_bar", "Toes-to-Bar", &[(Core, 1.0), (Grip, 0.6)]),
        gymnastic("knees_to_elbows", "Knees-to-Elbows", &[(Core, 1.0), (Grip, 0.5)]),
        gymnastic("sit_up", "Sit-up", &[(Core, 1.0)]),
        gymnastic("air_squat", "Air Squat", &[(Squat, 1.0)]),
        gymnastic("lunge", "Walking Lunge", &[(Squat, 1.0)]),
        gymnastic("box_jump", "Box Jump", &[(Squat, 1.0)]),
        gymnastic("wall_ball", "Wall Ball", &[(Squat, 1.0), (Push, 0.5)]),
        gymnastic("burpee", "Burpee", &[(Hinge, 1.0), (Push, 0.6), (Squat, 0.4)]),
        gymnastic("double_under", "Double-under", &[(Squat, 0.5), (Core, 0.2)]),
        gymnastic("kettlebell_swing", "Kettlebell Swing", &[(Hinge, 1.0), (Grip, 0.5)]),
        // ====================================================================
        // Monostructural
        // ====================================================================
        cardio("row", "Row", "row", &[(Pull, 0.4), (Hinge, 0.3), (Squat, 0.3)]),
        cardio("bike", "Assault/Echo Bike", "bike", &[(Squat, 0.5), (Push, 0.2)]),
        cardio("ski", "Ski Erg", "ski", &[(Pull, 0.5), (Core, 0.3)]),
        cardio("run", "Run", "run", &[(Squat, 0.4)]),
        cardio("swim", "Swim", "swim", &[(Pull, 0.5), (Push, 0.2)]),
    ];

    let movements: HashMap<String, MovementSpec> =
        specs.into_iter().map(|m| (m.id.clone(), m)).collect();

    Catalog { movements }
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<&MovementSpec> {
        self.movements.get(id)
    }

    /// Add or replace a movement
    pub fn insert(&mut self, spec: MovementSpec) {
        self.movements.insert(spec.id.clone(), spec);
    }

    /// Validate catalog integrity
    ///
    /// Returns a list of validation errors (empty if valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut ids: Vec<_> = self.movements.keys().collect();
        ids.sort();

        for id in ids {
            let movement = &self.movements[id];

            if &movement.id != id {
                errors.push(format!(
                    "Movement key '{}' does not match id '{}'",
                    id, movement.id
                ));
            }

            if movement.patterns.is_empty() {
                errors.push(format!("Movement '{}' loads no pattern bucket", id));
            }

            for pattern in &movement.patterns {
                if !(pattern.weight > 0.0 && pattern.weight <= 1.0) {
                    errors.push(format!(
                        "Movement '{}': weight {} for {} outside (0, 1]",
                        id,
                        pattern.weight,
                        pattern.bucket.as_str()
                    ));
                }
            }

            match (movement.kind, &movement.modality) {
                (MovementKind::Cardio, None) => {
                    errors.push(format!("Cardio movement '{}' has no modality", id));
                }
                (MovementKind::Barbell | MovementKind::Gymnastic, Some(modality)) => {
                    errors.push(format!(
                        "Movement '{}' is not cardio but names modality '{}'",
                        id, modality
                    ));
                }
                _ => {}
            }

            if movement.load_reference.iter().any(|r| r == id) {
                errors.push(format!("Movement '{}' references itself for load", id));
            }
        }

        errors
    }
}
