use derive_more::Deref;
use uuid::Uuid;

use crate::{CreateError, DeleteError, ReadError, UpdateError, WorkoutID};

#[allow(async_fn_in_trait)]
pub trait NoteService {
    async fn get_notes(&self, workout_id: Option<WorkoutID>) -> Result<Vec<Note>, ReadError>;
    async fn create_note(
        &self,
        content: String,
        workout_id: Option<WorkoutID>,
    ) -> Result<Note, CreateError>;
    async fn modify_note(&self, id: NoteID, content: String) -> Result<Note, UpdateError>;
    async fn delete_note(&self, id: NoteID) -> Result<NoteID, DeleteError>;
}

#[allow(async_fn_in_trait)]
pub trait NoteRepository {
    /// Notes in creation order, optionally restricted to one workout.
    async fn read_notes(&self, workout_id: Option<WorkoutID>) -> Result<Vec<Note>, ReadError>;
    async fn create_note(
        &self,
        content: String,
        workout_id: Option<WorkoutID>,
    ) -> Result<Note, CreateError>;
    async fn modify_note(&self, id: NoteID, content: String) -> Result<Note, UpdateError>;
    async fn delete_note(&self, id: NoteID) -> Result<NoteID, DeleteError>;
}

/// Free-standing annotation with an optional link to a workout. The link
/// is cleared when the workout is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteID,
    pub content: String,
    pub workout_id: Option<WorkoutID>,
}

#[derive(Deref, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NoteID(Uuid);

impl NoteID {
    #[must_use]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for NoteID {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u128> for NoteID {
    fn from(value: u128) -> Self {
        Self(Uuid::from_bytes(value.to_be_bytes()))
    }
}
