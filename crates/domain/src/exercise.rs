use derive_more::Deref;
use uuid::Uuid;

use crate::{CreateError, Name, ReadError, UpdateError};

#[allow(async_fn_in_trait)]
pub trait ExerciseService {
    async fn get_exercises(&self) -> Result<Vec<Exercise>, ReadError>;
    async fn get_exercises_by_muscle_group(
        &self,
        muscle_group: &str,
    ) -> Result<Vec<Exercise>, ReadError>;
    async fn create_exercise(
        &self,
        name: Name,
        muscle_group: Option<String>,
        photo_url: Option<String>,
    ) -> Result<Exercise, CreateError>;
    async fn modify_exercise(
        &self,
        id: ExerciseID,
        name: Option<Name>,
        photo_url: Option<String>,
    ) -> Result<Exercise, UpdateError>;
}

#[allow(async_fn_in_trait)]
pub trait ExerciseRepository {
    async fn read_exercises(&self) -> Result<Vec<Exercise>, ReadError>;
    /// Case-insensitive substring match on the muscle group tag.
    async fn read_exercises_by_muscle_group(
        &self,
        muscle_group: &str,
    ) -> Result<Vec<Exercise>, ReadError>;
    async fn create_exercise(
        &self,
        name: Name,
        muscle_group: Option<String>,
        photo_url: Option<String>,
    ) -> Result<Exercise, CreateError>;
    async fn modify_exercise(
        &self,
        id: ExerciseID,
        name: Option<Name>,
        photo_url: Option<String>,
    ) -> Result<Exercise, UpdateError>;
}

/// Catalog entry shared across all workouts. Names are unique
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exercise {
    pub id: ExerciseID,
    pub name: Name,
    pub muscle_group: Option<String>,
    pub photo_url: Option<String>,
}

impl Exercise {
    #[must_use]
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.as_ref().to_lowercase() == name.trim().to_lowercase()
    }
}

#[derive(Deref, Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExerciseID(Uuid);

impl ExerciseID {
    #[must_use]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for ExerciseID {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u128> for ExerciseID {
    fn from(value: u128) -> Self {
        Self(Uuid::from_bytes(value.to_be_bytes()))
    }
}
