use std::collections::BTreeSet;

use log::{error, warn};

use crate::{
    CreateError, DeleteError, Exercise, ExerciseID, ExerciseRepository, ExerciseService,
    GamificationProfile, GamificationRepository, GamificationService, Name, Note, NoteID,
    NoteRepository, NoteService, Ratings, ReadError, SubmittedWorkout, UpdateError, User, UserID,
    UserRepository, UserService, ValidationError, Workout, WorkoutID, WorkoutPayload,
    WorkoutRepository, WorkoutService,
    interpreter::{self, InterpretedWorkout},
    validate_workout,
};

pub struct Service<R> {
    repository: R,
}

impl<R> Service<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

macro_rules! log_on_error {
    ($func:expr, $action:literal, $entity:literal) => {{
        let result = $func.await;
        if let Err(ref err) = result {
            error!("failed to {} {}: {err}", $action, $entity);
        }
        result
    }};
}

impl<R: UserRepository> UserService for Service<R> {
    async fn get_users(&self) -> Result<Vec<User>, ReadError> {
        log_on_error!(self.repository.read_users(), "get", "users")
    }

    async fn get_user(&self, id: UserID) -> Result<User, ReadError> {
        log_on_error!(self.repository.read_user(id), "get", "user")
    }

    async fn register_user(
        &self,
        name: Name,
        email: String,
        password_hash: String,
    ) -> Result<User, CreateError> {
        if email.trim().is_empty() {
            return Err(ValidationError::MissingField("email").into());
        }
        log_on_error!(
            self.repository.create_user(name, email, password_hash),
            "create",
            "user"
        )
    }
}

impl<R: ExerciseRepository> ExerciseService for Service<R> {
    async fn get_exercises(&self) -> Result<Vec<Exercise>, ReadError> {
        log_on_error!(self.repository.read_exercises(), "get", "exercises")
    }

    async fn get_exercises_by_muscle_group(
        &self,
        muscle_group: &str,
    ) -> Result<Vec<Exercise>, ReadError> {
        log_on_error!(
            self.repository.read_exercises_by_muscle_group(muscle_group),
            "get",
            "exercises"
        )
    }

    async fn create_exercise(
        &self,
        name: Name,
        muscle_group: Option<String>,
        photo_url: Option<String>,
    ) -> Result<Exercise, CreateError> {
        log_on_error!(
            self.repository.create_exercise(name, muscle_group, photo_url),
            "create",
            "exercise"
        )
    }

    async fn modify_exercise(
        &self,
        id: ExerciseID,
        name: Option<Name>,
        photo_url: Option<String>,
    ) -> Result<Exercise, UpdateError> {
        log_on_error!(
            self.repository.modify_exercise(id, name, photo_url),
            "modify",
            "exercise"
        )
    }
}

impl<R: NoteRepository> NoteService for Service<R> {
    async fn get_notes(&self, workout_id: Option<WorkoutID>) -> Result<Vec<Note>, ReadError> {
        log_on_error!(self.repository.read_notes(workout_id), "get", "notes")
    }

    async fn create_note(
        &self,
        content: String,
        workout_id: Option<WorkoutID>,
    ) -> Result<Note, CreateError> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(ValidationError::MissingField("content").into());
        }
        log_on_error!(
            self.repository.create_note(content, workout_id),
            "create",
            "note"
        )
    }

    async fn modify_note(&self, id: NoteID, content: String) -> Result<Note, UpdateError> {
        log_on_error!(self.repository.modify_note(id, content), "modify", "note")
    }

    async fn delete_note(&self, id: NoteID) -> Result<NoteID, DeleteError> {
        log_on_error!(self.repository.delete_note(id), "delete", "note")
    }
}

impl<R: GamificationRepository> GamificationService for Service<R> {
    async fn get_gamification(&self, user_id: UserID) -> Result<GamificationProfile, ReadError> {
        log_on_error!(
            self.repository.read_gamification(user_id),
            "get",
            "gamification profile"
        )
    }
}

impl<R> WorkoutService for Service<R>
where
    R: WorkoutRepository + ExerciseRepository + GamificationRepository,
{
    async fn get_workouts(&self, user_id: UserID) -> Result<Vec<Workout>, ReadError> {
        log_on_error!(self.repository.read_workouts(user_id), "get", "workouts")
    }

    async fn submit_workout(
        &self,
        user_id: UserID,
        payload: &WorkoutPayload,
    ) -> Result<SubmittedWorkout, CreateError> {
        let known_exercises = self
            .repository
            .read_exercises()
            .await
            .map_err(CreateError::from)?
            .into_iter()
            .map(|e| e.id)
            .collect::<BTreeSet<_>>();
        let draft = validate_workout(payload, &known_exercises)?;
        let workout = self.repository.create_workout(user_id, draft).await?;

        // The workout is saved at this point. The reward is best-effort:
        // a failure must not turn the submission into an error.
        let reward = match self.repository.reward_workout(user_id).await {
            Ok(reward) => Some(reward),
            Err(err) => {
                error!("workout {} saved but reward failed: {err}", *workout.id);
                None
            }
        };

        Ok(SubmittedWorkout { workout, reward })
    }

    async fn import_interpreted_workout(
        &self,
        user_id: UserID,
        interpreted: &InterpretedWorkout,
    ) -> Result<(SubmittedWorkout, Vec<String>), CreateError> {
        let catalog = self
            .repository
            .read_exercises()
            .await
            .map_err(CreateError::from)?;
        let (payload, dropped) = interpreter::resolve(interpreted, &catalog);
        if !dropped.is_empty() {
            warn!(
                "no catalog match for interpreted exercise(s): {}",
                dropped.join(", ")
            );
        }
        let submitted = self.submit_workout(user_id, &payload).await?;
        Ok((submitted, dropped))
    }

    async fn modify_workout(
        &self,
        id: WorkoutID,
        ratings: Option<Ratings>,
        remarks: Option<String>,
    ) -> Result<Workout, UpdateError> {
        log_on_error!(
            self.repository.modify_workout(id, ratings, remarks),
            "modify",
            "workout"
        )
    }

    async fn delete_workout(&self, id: WorkoutID) -> Result<WorkoutID, DeleteError> {
        log_on_error!(self.repository.delete_workout(id), "delete", "workout")
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use pretty_assertions::assert_eq;

    use crate::{
        Load, Rating, Reward, Set, SetType, StorageError, WorkoutExercise,
        interpreter::InterpretedExercise, validation::{ExercisePayload, SetPayload},
        XP_PER_WORKOUT, Progress,
    };

    use super::*;

    struct FakeRepository {
        exercises: Vec<Exercise>,
        workouts: RefCell<Vec<Workout>>,
        fail_reward: bool,
        rewards: Cell<u32>,
        next_id: Cell<u128>,
    }

    impl FakeRepository {
        fn new(fail_reward: bool) -> Self {
            Self {
                exercises: vec![Exercise {
                    id: 1.into(),
                    name: Name::new("Bench Press").unwrap(),
                    muscle_group: Some("chest".to_string()),
                    photo_url: None,
                }],
                workouts: RefCell::new(Vec::new()),
                fail_reward,
                rewards: Cell::new(0),
                next_id: Cell::new(100),
            }
        }

        fn next_id(&self) -> u128 {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            id
        }
    }

    impl ExerciseRepository for &FakeRepository {
        async fn read_exercises(&self) -> Result<Vec<Exercise>, ReadError> {
            Ok(self.exercises.clone())
        }

        async fn read_exercises_by_muscle_group(
            &self,
            _muscle_group: &str,
        ) -> Result<Vec<Exercise>, ReadError> {
            unimplemented!()
        }

        async fn create_exercise(
            &self,
            _name: Name,
            _muscle_group: Option<String>,
            _photo_url: Option<String>,
        ) -> Result<Exercise, CreateError> {
            unimplemented!()
        }

        async fn modify_exercise(
            &self,
            _id: ExerciseID,
            _name: Option<Name>,
            _photo_url: Option<String>,
        ) -> Result<Exercise, UpdateError> {
            unimplemented!()
        }
    }

    impl WorkoutRepository for &FakeRepository {
        async fn read_workouts(&self, user_id: UserID) -> Result<Vec<Workout>, ReadError> {
            Ok(self
                .workouts
                .borrow()
                .iter()
                .filter(|w| w.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn read_workout(&self, id: WorkoutID) -> Result<Workout, ReadError> {
            self.workouts
                .borrow()
                .iter()
                .find(|w| w.id == id)
                .cloned()
                .ok_or(ReadError::NotFound)
        }

        async fn create_workout(
            &self,
            user_id: UserID,
            draft: crate::WorkoutDraft,
        ) -> Result<Workout, CreateError> {
            let exercises = draft
                .exercises
                .iter()
                .map(|entry| WorkoutExercise {
                    id: self.next_id().into(),
                    exercise: self
                        .exercises
                        .iter()
                        .find(|e| e.id == entry.exercise_id)
                        .cloned()
                        .unwrap(),
                    load: entry.load,
                    sets: entry
                        .sets
                        .iter()
                        .map(|set| Set {
                            id: self.next_id().into(),
                            set_type: set.set_type,
                            load: set.load,
                            reps: set.reps,
                        })
                        .collect(),
                })
                .collect();
            let workout = Workout {
                id: self.next_id().into(),
                user_id,
                title: draft.title,
                date: draft.date,
                ratings: draft.ratings,
                remarks: draft.remarks,
                exercises,
                notes: vec![],
            };
            self.workouts.borrow_mut().push(workout.clone());
            Ok(workout)
        }

        async fn modify_workout(
            &self,
            _id: WorkoutID,
            _ratings: Option<Ratings>,
            _remarks: Option<String>,
        ) -> Result<Workout, UpdateError> {
            unimplemented!()
        }

        async fn delete_workout(&self, _id: WorkoutID) -> Result<WorkoutID, DeleteError> {
            unimplemented!()
        }

        async fn count_workouts(&self, user_id: UserID) -> Result<u32, ReadError> {
            Ok(u32::try_from(
                self.workouts
                    .borrow()
                    .iter()
                    .filter(|w| w.user_id == user_id)
                    .count(),
            )
            .unwrap())
        }
    }

    impl NoteRepository for &FakeRepository {
        async fn read_notes(
            &self,
            _workout_id: Option<WorkoutID>,
        ) -> Result<Vec<Note>, ReadError> {
            unimplemented!()
        }

        async fn create_note(
            &self,
            _content: String,
            _workout_id: Option<WorkoutID>,
        ) -> Result<Note, CreateError> {
            unimplemented!()
        }

        async fn modify_note(&self, _id: NoteID, _content: String) -> Result<Note, UpdateError> {
            unimplemented!()
        }

        async fn delete_note(&self, _id: NoteID) -> Result<NoteID, DeleteError> {
            unimplemented!()
        }
    }

    impl GamificationRepository for &FakeRepository {
        async fn read_gamification(
            &self,
            _user_id: UserID,
        ) -> Result<GamificationProfile, ReadError> {
            unimplemented!()
        }

        async fn reward_workout(&self, _user_id: UserID) -> Result<Reward, UpdateError> {
            if self.fail_reward {
                return Err(UpdateError::Storage(StorageError::Unavailable(
                    "gamification store offline".to_string(),
                )));
            }
            self.rewards.set(self.rewards.get() + 1);
            let mut progress = Progress::default();
            for _ in 0..self.rewards.get() {
                progress.gain(XP_PER_WORKOUT);
            }
            Ok(Reward {
                level: progress.level,
                points: progress.points,
                new_badges: vec![],
            })
        }
    }

    fn payload() -> WorkoutPayload {
        WorkoutPayload {
            title: "Push Day".to_string(),
            date: "2025-05-04".to_string(),
            rest: Some(7),
            nutrition: None,
            mood: Some(8),
            effort: None,
            remarks: None,
            exercises: vec![ExercisePayload {
                exercise_id: uuid::Uuid::from_u128(1),
                load: 80.0,
                sets: vec![SetPayload {
                    set_type: None,
                    load: 80.0,
                    reps: 8,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_submit_workout_persists_and_rewards() {
        let repository = FakeRepository::new(false);
        let service = Service::new(&repository);

        let submitted = service.submit_workout(2.into(), &payload()).await.unwrap();

        assert_eq!(
            submitted.reward,
            Some(Reward {
                level: 1,
                points: 20,
                new_badges: vec![]
            })
        );
        assert_eq!(repository.workouts.borrow().len(), 1);
        assert_eq!(submitted.workout.ratings.rest, Some(Rating::new(7).unwrap()));
    }

    #[tokio::test]
    async fn test_submit_workout_reward_failure_is_non_fatal() {
        let repository = FakeRepository::new(true);
        let service = Service::new(&repository);

        let submitted = service.submit_workout(2.into(), &payload()).await.unwrap();

        assert_eq!(submitted.reward, None);
        assert_eq!(repository.workouts.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_workout_rejects_out_of_range_rating() {
        let repository = FakeRepository::new(false);
        let service = Service::new(&repository);
        let mut payload = payload();
        payload.mood = Some(15);

        let result = service.submit_workout(2.into(), &payload).await;

        assert!(matches!(
            result,
            Err(CreateError::Invalid(ValidationError::RatingOutOfRange {
                field: "mood",
                value: 15
            }))
        ));
        assert!(repository.workouts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_import_interpreted_workout_drops_unmatched_names() {
        let repository = FakeRepository::new(false);
        let service = Service::new(&repository);
        let interpreted = InterpretedWorkout {
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
        };

        let (submitted, dropped) = service
            .import_interpreted_workout(2.into(), &interpreted)
            .await
            .unwrap();

        assert_eq!(dropped, vec!["Cable Crossover".to_string()]);
        assert_eq!(submitted.workout.exercises.len(), 1);
        assert_eq!(submitted.workout.exercises[0].sets.len(), 3);
        assert!(
            submitted.workout.exercises[0]
                .sets
                .iter()
                .all(|s| s.set_type == SetType::Working)
        );
        assert_eq!(submitted.workout.exercises[0].load, Load::new(80.0).unwrap());
    }

    #[tokio::test]
    async fn test_import_interpreted_workout_uses_same_validator() {
        let repository = FakeRepository::new(false);
        let service = Service::new(&repository);
        let interpreted = InterpretedWorkout {
            title: "Morning session".to_string(),
            date: "2025-05-04".to_string(),
            exercises: vec![InterpretedExercise {
                name: "Bench Press".to_string(),
                sets: 2,
                load: -80.0,
                reps: 8,
            }],
        };

        let result = service
            .import_interpreted_workout(2.into(), &interpreted)
            .await;

        assert!(matches!(
            result,
            Err(CreateError::Invalid(ValidationError::InvalidLoad { .. }))
        ));
        assert!(repository.workouts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_create_note_requires_content() {
        let repository = FakeRepository::new(false);
        let service = Service::new(&repository);

        let result = service.create_note("   ".to_string(), None).await;

        assert!(matches!(
            result,
            Err(CreateError::Invalid(ValidationError::MissingField(
                "content"
            )))
        ));
    }
}
