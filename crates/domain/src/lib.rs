#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod interpreter;

mod error;
mod exercise;
mod gamification;
mod name;
mod note;
mod service;
mod user;
mod validation;
mod workout;

pub use error::{CreateError, DeleteError, ReadError, StorageError, UpdateError};
pub use exercise::{Exercise, ExerciseID, ExerciseRepository, ExerciseService};
pub use gamification::{
    Badge, BadgeID, GamificationProfile, GamificationProfileID, GamificationRepository,
    GamificationService, MILESTONES, Milestone, Progress, Reward, XP_PER_LEVEL, XP_PER_WORKOUT,
    qualified,
};
pub use name::{Name, NameError};
pub use note::{Note, NoteID, NoteRepository, NoteService};
pub use service::Service;
pub use user::{User, UserID, UserRepository, UserService};
pub use validation::{
    ExercisePayload, SetPayload, ValidationError, WorkoutPayload, validate_workout,
};
pub use workout::{
    Load, LoadError, Rating, RatingError, Ratings, Reps, RepsError, Set, SetDraft, SetID, SetType,
    SubmittedWorkout, Workout, WorkoutDraft, WorkoutExercise, WorkoutExerciseDraft,
    WorkoutExerciseID, WorkoutID, WorkoutRepository, WorkoutService,
};
