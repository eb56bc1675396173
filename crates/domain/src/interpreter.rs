//! Boundary for externally interpreted workouts. A language model turns
//! free text into an [`InterpretedWorkout`]; this module maps it onto the
//! exercise catalog so it can pass through the same validation and
//! persistence path as manual entry.

use serde::{Deserialize, Serialize};

use crate::{Exercise, ExercisePayload, SetPayload, WorkoutPayload};

/// Workout-shaped payload produced by the external interpreter. Untrusted
/// input; nothing here is validated beyond its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretedWorkout {
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub exercises: Vec<InterpretedExercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretedExercise {
    pub name: String,
    pub sets: u32,
    pub load: f64,
    pub reps: i64,
}

/// Maps interpreted exercises onto catalog entries by case-insensitive
/// name match. Matched entries expand into `sets` identical working sets;
/// unmatched names are dropped from the submission and returned so the
/// caller can report them.
#[must_use]
pub fn resolve(
    interpreted: &InterpretedWorkout,
    catalog: &[Exercise],
) -> (WorkoutPayload, Vec<String>) {
    let mut exercises = Vec::new();
    let mut dropped = Vec::new();

    for entry in &interpreted.exercises {
        match catalog.iter().find(|e| e.name_matches(&entry.name)) {
            Some(exercise) => exercises.push(ExercisePayload {
                exercise_id: *exercise.id,
                load: entry.load,
                sets: (0..entry.sets)
                    .map(|_| SetPayload {
                        set_type: None,
                        load: entry.load,
                        reps: entry.reps,
                    })
                    .collect(),
            }),
            None => dropped.push(entry.name.clone()),
        }
    }

    (
        WorkoutPayload {
            title: interpreted.title.clone(),
            date: interpreted.date.clone(),
            rest: None,
            nutrition: None,
            mood: None,
            effort: None,
            remarks: None,
            exercises,
        },
        dropped,
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::Name;

    use super::*;

    fn catalog() -> Vec<Exercise> {
        vec![
            Exercise {
                id: 1.into(),
                name: Name::new("Bench Press").unwrap(),
                muscle_group: Some("chest".to_string()),
                photo_url: None,
            },
            Exercise {
                id: 2.into(),
                name: Name::new("Squat").unwrap(),
                muscle_group: Some("legs".to_string()),
                photo_url: None,
            },
        ]
    }

    fn interpreted() -> InterpretedWorkout {
        InterpretedWorkout {
            title: "Morning session".to_string(),
            date: "2025-05-04".to_string(),
            exercises: vec![
                InterpretedExercise {
                    name: "bench press".to_string(),
                    sets: 3,
                    load: 80.0,
                    reps: 8,
                },
                InterpretedExercise {
                    name: "Cable Crossover".to_string(),
                    sets: 4,
                    load: 25.0,
                    reps: 12,
                },
            ],
        }
    }

    #[test]
    fn test_resolve_maps_matched_and_drops_unmatched() {
        let (payload, dropped) = resolve(&interpreted(), &catalog());

        assert_eq!(dropped, vec!["Cable Crossover".to_string()]);
        assert_eq!(payload.title, "Morning session");
        assert_eq!(payload.exercises.len(), 1);
        assert_eq!(payload.exercises[0].exercise_id, uuid::Uuid::from_u128(1));
        assert_eq!(payload.exercises[0].sets.len(), 3);
        assert!(
            payload.exercises[0]
                .sets
                .iter()
                .all(|s| s.load == 80.0 && s.reps == 8 && s.set_type.is_none())
        );
    }

    #[test]
    fn test_resolve_without_matches_yields_empty_submission() {
        let (payload, dropped) = resolve(&interpreted(), &[]);

        assert_eq!(payload.exercises, vec![]);
        assert_eq!(
            dropped,
            vec!["bench press".to_string(), "Cable Crossover".to_string()]
        );
    }

    #[test]
    fn test_resolve_keeps_zero_set_exercises() {
        let interpreted = InterpretedWorkout {
            title: "Quick one".to_string(),
            date: "2025-05-04".to_string(),
            exercises: vec![InterpretedExercise {
                name: "Squat".to_string(),
                sets: 0,
                load: 100.0,
                reps: 5,
            }],
        };
        let (payload, dropped) = resolve(&interpreted, &catalog());

        assert_eq!(dropped, Vec::<String>::new());
        assert_eq!(payload.exercises.len(), 1);
        assert_eq!(payload.exercises[0].sets, vec![]);
    }
}
