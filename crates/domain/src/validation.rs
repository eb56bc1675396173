use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ExerciseID, Load, Name, NameError, Rating, Ratings, Reps, SetDraft, SetType, WorkoutDraft,
    WorkoutExerciseDraft,
};

/// Wire shape of a workout submission. Field types are deliberately wide;
/// `validate_workout` narrows them into domain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPayload {
    pub title: String,
    /// `%Y-%m-%d` or an RFC 3339 datetime, of which the date part is kept.
    pub date: String,
    #[serde(default)]
    pub rest: Option<i64>,
    #[serde(default)]
    pub nutrition: Option<i64>,
    #[serde(default)]
    pub mood: Option<i64>,
    #[serde(default)]
    pub effort: Option<i64>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub exercises: Vec<ExercisePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePayload {
    pub exercise_id: Uuid,
    pub load: f64,
    #[serde(default)]
    pub sets: Vec<SetPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPayload {
    /// Unrecognized or absent tags fall back to the working-set type.
    #[serde(default)]
    pub set_type: Option<String>,
    pub load: f64,
    pub reps: i64,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("invalid title: {0}")]
    InvalidTitle(#[from] NameError),
    #[error("date is not a valid calendar date: {0}")]
    InvalidDate(String),
    #[error("{field} must be in the range 0 to 10 ({value} is not)")]
    RatingOutOfRange { field: &'static str, value: i64 },
    #[error("unknown exercise: {0}")]
    UnknownExercise(Uuid),
    #[error("{field} must be a non-negative weight ({value} is not)")]
    InvalidLoad { field: &'static str, value: f64 },
    #[error("reps must be a non-negative count ({0} is not)")]
    InvalidReps(i64),
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Checks a submission against the catalog and the numeric constraints and
/// produces a typed draft. Pure; the first violated constraint is
/// returned. Out-of-range ratings are rejected, never clamped, on every
/// submission path.
pub fn validate_workout(
    payload: &WorkoutPayload,
    known_exercises: &BTreeSet<ExerciseID>,
) -> Result<WorkoutDraft, ValidationError> {
    let title = Name::new(&payload.title)?;
    let date = parse_date(&payload.date)?;
    let ratings = Ratings {
        rest: rating("rest", payload.rest)?,
        nutrition: rating("nutrition", payload.nutrition)?,
        mood: rating("mood", payload.mood)?,
        effort: rating("effort", payload.effort)?,
    };

    let mut exercises = Vec::with_capacity(payload.exercises.len());
    for entry in &payload.exercises {
        let exercise_id = ExerciseID::from(entry.exercise_id);
        if !known_exercises.contains(&exercise_id) {
            return Err(ValidationError::UnknownExercise(entry.exercise_id));
        }
        let load = Load::new(entry.load).map_err(|_| ValidationError::InvalidLoad {
            field: "load",
            value: entry.load,
        })?;

        let mut sets = Vec::with_capacity(entry.sets.len());
        for set in &entry.sets {
            sets.push(SetDraft {
                set_type: set
                    .set_type
                    .as_deref()
                    .map(SetType::from_tag)
                    .unwrap_or_default(),
                load: Load::new(set.load).map_err(|_| ValidationError::InvalidLoad {
                    field: "set load",
                    value: set.load,
                })?,
                reps: Reps::try_from(set.reps)
                    .map_err(|_| ValidationError::InvalidReps(set.reps))?,
            });
        }

        exercises.push(WorkoutExerciseDraft {
            exercise_id,
            load,
            sets,
        });
    }

    Ok(WorkoutDraft {
        title,
        date,
        ratings,
        remarks: payload
            .remarks
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(ToString::to_string),
        exercises,
    })
}

fn rating(field: &'static str, value: Option<i64>) -> Result<Option<Rating>, ValidationError> {
    value
        .map(|v| Rating::try_from(v).map_err(|_| ValidationError::RatingOutOfRange { field, value: v }))
        .transpose()
}

fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|datetime| datetime.date_naive())
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}
