use std::fmt;

use chrono::NaiveDate;
use derive_more::{Deref, Display, Into};
use uuid::Uuid;

use crate::{
    CreateError, DeleteError, Exercise, ExerciseID, Name, Note, ReadError, Reward, UpdateError,
    UserID, WorkoutPayload, interpreter::InterpretedWorkout,
};

#[allow(async_fn_in_trait)]
pub trait WorkoutService {
    async fn get_workouts(&self, user_id: UserID) -> Result<Vec<Workout>, ReadError>;
    /// Validates and persists a workout, then applies the gamification
    /// reward. A failed reward does not undo the persisted workout; it is
    /// logged and reported as `reward: None`.
    async fn submit_workout(
        &self,
        user_id: UserID,
        payload: &WorkoutPayload,
    ) -> Result<SubmittedWorkout, CreateError>;
    /// Maps an interpreted free-text workout onto the catalog and submits
    /// it through the same validation path as manual entry. Returns the
    /// names of interpreted exercises that matched no catalog entry.
    async fn import_interpreted_workout(
        &self,
        user_id: UserID,
        interpreted: &InterpretedWorkout,
    ) -> Result<(SubmittedWorkout, Vec<String>), CreateError>;
    async fn modify_workout(
        &self,
        id: WorkoutID,
        ratings: Option<Ratings>,
        remarks: Option<String>,
    ) -> Result<Workout, UpdateError>;
    async fn delete_workout(&self, id: WorkoutID) -> Result<WorkoutID, DeleteError>;
}

#[allow(async_fn_in_trait)]
pub trait WorkoutRepository {
    /// Workouts of the user, newest first, with exercises, sets and notes
    /// joined in.
    async fn read_workouts(&self, user_id: UserID) -> Result<Vec<Workout>, ReadError>;
    async fn read_workout(&self, id: WorkoutID) -> Result<Workout, ReadError>;
    /// Creates the workout with all nested workout-exercises and sets in
    /// one unit of work. Readers never see a partially created workout.
    async fn create_workout(
        &self,
        user_id: UserID,
        draft: WorkoutDraft,
    ) -> Result<Workout, CreateError>;
    /// Partial update; only supplied fields change.
    async fn modify_workout(
        &self,
        id: WorkoutID,
        ratings: Option<Ratings>,
        remarks: Option<String>,
    ) -> Result<Workout, UpdateError>;
    /// Removes the workout and all of its workout-exercises and sets.
    /// Linked notes are unlinked, not deleted.
    async fn delete_workout(&self, id: WorkoutID) -> Result<WorkoutID, DeleteError>;
    async fn count_workouts(&self, user_id: UserID) -> Result<u32, ReadError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
    pub id: WorkoutID,
    pub user_id: UserID,
    pub title: Name,
    pub date: NaiveDate,
    pub ratings: Ratings,
    pub remarks: Option<String>,
    pub exercises: Vec<WorkoutExercise>,
    pub notes: Vec<Note>,
}

impl Workout {
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }

    #[must_use]
    pub fn working_set_count(&self) -> usize {
        self.exercises
            .iter()
            .flat_map(|e| &e.sets)
            .filter(|s| s.set_type == SetType::Working)
            .count()
    }

    /// Total weight moved across working sets (load × reps), in kg.
    #[must_use]
    pub fn volume_load(&self) -> f64 {
        self.exercises
            .iter()
            .flat_map(|e| &e.sets)
            .filter(|s| s.set_type == SetType::Working)
            .map(|s| f64::from(s.load) * f64::from(u32::from(s.reps)))
            .sum()
    }
}

#[derive(Deref, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkoutID(Uuid);

impl WorkoutID {
    #[must_use]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for WorkoutID {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u128> for WorkoutID {
    fn from(value: u128) -> Self {
        Self(Uuid::from_bytes(value.to_be_bytes()))
    }
}

/// Optional 0-10 self-assessments of a workout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ratings {
    pub rest: Option<Rating>,
    pub nutrition: Option<Rating>,
    pub mood: Option<Rating>,
    pub effort: Option<Rating>,
}

#[derive(Debug, Default, Display, Clone, Copy, Into, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rating(u8);

impl Rating {
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, RatingError> {
        if value > Self::MAX {
            return Err(RatingError::OutOfRange(i64::from(value)));
        }

        Ok(Self(value))
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(parsed_value) => Rating::new(parsed_value),
            Err(_) => Err(RatingError::OutOfRange(value)),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RatingError {
    #[error("Rating must be in the range 0 to 10 ({0} is not)")]
    OutOfRange(i64),
}

#[derive(Debug, Default, Display, Clone, Copy, Into, PartialEq, PartialOrd)]
pub struct Load(f64);

impl Load {
    pub fn new(value: f64) -> Result<Self, LoadError> {
        if !value.is_finite() || value < 0.0 {
            return Err(LoadError::OutOfRange(value));
        }

        Ok(Self(value))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LoadError {
    #[error("Load must be a non-negative weight in kg ({0} is not)")]
    OutOfRange(f64),
}

#[derive(Debug, Default, Display, Clone, Copy, Into, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reps(u32);

impl Reps {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }
}

impl TryFrom<i64> for Reps {
    type Error = RepsError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u32::try_from(value) {
            Ok(parsed_value) => Ok(Self(parsed_value)),
            Err(_) => Err(RepsError::OutOfRange(value)),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RepsError {
    #[error("Reps must be a non-negative count ({0} is not)")]
    OutOfRange(i64),
}

/// One catalog exercise performed within a workout, with its recorded
/// sets in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutExercise {
    pub id: WorkoutExerciseID,
    pub exercise: Exercise,
    pub load: Load,
    pub sets: Vec<Set>,
}

#[derive(Deref, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkoutExerciseID(Uuid);

impl From<Uuid> for WorkoutExerciseID {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u128> for WorkoutExerciseID {
    fn from(value: u128) -> Self {
        Self(Uuid::from_bytes(value.to_be_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    pub id: SetID,
    pub set_type: SetType,
    pub load: Load,
    pub reps: Reps,
}

#[derive(Deref, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SetID(Uuid);

impl From<Uuid> for SetID {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u128> for SetID {
    fn from(value: u128) -> Self {
        Self(Uuid::from_bytes(value.to_be_bytes()))
    }
}

/// Closed set of set-type tags. The wire spellings are those of the
/// original mobile client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SetType {
    WarmUp,
    Feeder,
    #[default]
    Working,
}

impl SetType {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            SetType::WarmUp => "aquecimento",
            SetType::Feeder => "pap",
            SetType::Working => "validas",
        }
    }

    /// The single place where the tag fallback rule lives: unrecognized
    /// tags become `Working`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "aquecimento" => SetType::WarmUp,
            "pap" => SetType::Feeder,
            _ => SetType::Working,
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A validated submission, ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutDraft {
    pub title: Name,
    pub date: NaiveDate,
    pub ratings: Ratings,
    pub remarks: Option<String>,
    pub exercises: Vec<WorkoutExerciseDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutExerciseDraft {
    pub exercise_id: ExerciseID,
    pub load: Load,
    pub sets: Vec<SetDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetDraft {
    pub set_type: SetType,
    pub load: Load,
    pub reps: Reps,
}

/// Result of a workout submission: the persisted workout plus the
/// gamification outcome, absent if the reward phase failed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedWorkout {
    pub workout: Workout,
    pub reward: Option<Reward>,
}
