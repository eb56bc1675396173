use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use log::warn;
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use uuid::Uuid;

use stimulus_domain::{
    Badge, CreateError, DeleteError, Exercise, ExerciseID, ExerciseRepository, GamificationProfile,
    GamificationRepository, Load, Name, Note, NoteID, NoteRepository, Progress, Rating, Ratings,
    ReadError, Reps, Reward, Set, SetType, StorageError, UpdateError, User, UserID, UserRepository,
    Workout, WorkoutDraft, WorkoutExercise, WorkoutID, WorkoutRepository, XP_PER_WORKOUT,
    qualified,
};

const SCHEMA: [&str; 11] = [
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS exercises (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        muscle_group TEXT,
        photo_url TEXT
    )",
    "CREATE TABLE IF NOT EXISTS workouts (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users (id),
        title TEXT NOT NULL,
        date TEXT NOT NULL,
        rest INTEGER,
        nutrition INTEGER,
        mood INTEGER,
        effort INTEGER,
        remarks TEXT
    )",
    "CREATE TABLE IF NOT EXISTS workout_exercises (
        id TEXT PRIMARY KEY,
        workout_id TEXT NOT NULL REFERENCES workouts (id),
        exercise_id TEXT NOT NULL REFERENCES exercises (id),
        load REAL NOT NULL,
        position INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sets (
        id TEXT PRIMARY KEY,
        workout_exercise_id TEXT NOT NULL REFERENCES workout_exercises (id),
        set_type TEXT NOT NULL,
        load REAL NOT NULL,
        reps INTEGER NOT NULL,
        position INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        workout_id TEXT REFERENCES workouts (id)
    )",
    "CREATE TABLE IF NOT EXISTS gamification_profiles (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE REFERENCES users (id),
        level INTEGER NOT NULL,
        points INTEGER NOT NULL,
        lifetime_xp INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS badges (
        id TEXT PRIMARY KEY,
        profile_id TEXT NOT NULL REFERENCES gamification_profiles (id),
        user_id TEXT NOT NULL REFERENCES users (id),
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        UNIQUE (profile_id, name)
    )",
    "CREATE INDEX IF NOT EXISTS idx_workouts_user ON workouts (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_workout_exercises_workout ON workout_exercises (workout_id)",
    "CREATE INDEX IF NOT EXISTS idx_sets_workout_exercise ON sets (workout_exercise_id)",
];

/// Number of times a busy reward transaction is retried before giving up.
const REWARD_RETRIES: u32 = 3;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        Self::connect(SqlitePoolOptions::new().max_connections(5), options).await
    }

    /// Private in-memory database. Restricted to a single pooled
    /// connection: every connection would otherwise see its own empty
    /// database.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new().in_memory(true).foreign_keys(true);
        Self::connect(
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            options,
        )
        .await
    }

    async fn connect(
        pool_options: SqlitePoolOptions,
        options: SqliteConnectOptions,
    ) -> Result<Self, StorageError> {
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(storage_error)?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(Self { pool })
    }

    async fn read_exercise(&self, id: ExerciseID) -> Result<Exercise, ReadError> {
        sqlx::query("SELECT id, name, muscle_group, photo_url FROM exercises WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_storage)?
            .ok_or(ReadError::NotFound)
            .and_then(|row| exercise_from_row(&row).map_err(ReadError::Storage))
    }

    async fn workout_from_row(&self, row: &SqliteRow) -> Result<Workout, ReadError> {
        let id_text = text(row, "id").map_err(ReadError::Storage)?;
        let workout_id = WorkoutID::from(parse_uuid(&id_text).map_err(ReadError::Storage)?);

        let exercise_rows = sqlx::query(
            "SELECT we.id, we.load, \
                    e.id AS exercise_id, e.name, e.muscle_group, e.photo_url \
             FROM workout_exercises we \
             JOIN exercises e ON e.id = we.exercise_id \
             WHERE we.workout_id = ? \
             ORDER BY we.position",
        )
        .bind(&id_text)
        .fetch_all(&self.pool)
        .await
        .map_err(read_storage)?;

        let mut exercises = Vec::with_capacity(exercise_rows.len());
        for exercise_row in &exercise_rows {
            let workout_exercise_id = text(exercise_row, "id").map_err(ReadError::Storage)?;
            let set_rows = sqlx::query(
                "SELECT id, set_type, load, reps FROM sets \
                 WHERE workout_exercise_id = ? \
                 ORDER BY position",
            )
            .bind(&workout_exercise_id)
            .fetch_all(&self.pool)
            .await
            .map_err(read_storage)?;

            exercises.push(
                workout_exercise_from_row(exercise_row, &set_rows).map_err(ReadError::Storage)?,
            );
        }

        let note_rows =
            sqlx::query("SELECT id, content, workout_id FROM notes WHERE workout_id = ? ORDER BY rowid")
                .bind(&id_text)
                .fetch_all(&self.pool)
                .await
                .map_err(read_storage)?;
        let notes = note_rows
            .iter()
            .map(|row| note_from_row(row).map_err(ReadError::Storage))
            .collect::<Result<Vec<_>, _>>()?;

        let date: NaiveDate = row
            .try_get("date")
            .map_err(|e| ReadError::Storage(storage_error(e)))?;

        Ok(Workout {
            id: workout_id,
            user_id: UserID::from(
                parse_uuid(&text(row, "user_id").map_err(ReadError::Storage)?)
                    .map_err(ReadError::Storage)?,
            ),
            title: parse_name(&text(row, "title").map_err(ReadError::Storage)?)
                .map_err(ReadError::Storage)?,
            date,
            ratings: ratings_from_row(row).map_err(ReadError::Storage)?,
            remarks: row
                .try_get("remarks")
                .map_err(|e| ReadError::Storage(storage_error(e)))?,
            exercises,
            notes,
        })
    }

    /// One attempt at the reward transaction; busy errors bubble up to the
    /// retry loop in `reward_workout`.
    async fn try_reward_workout(&self, user_id: UserID) -> Result<Reward, sqlx::Error> {
        let user_text = user_id.to_string();
        let mut tx = self.pool.begin().await?;

        let profile_row = sqlx::query(
            "SELECT id, level, points, lifetime_xp FROM gamification_profiles WHERE user_id = ?",
        )
        .bind(&user_text)
        .fetch_optional(&mut *tx)
        .await?;

        let (profile_id, mut progress) = match profile_row {
            Some(row) => (
                row.try_get::<String, _>("id")?,
                Progress {
                    level: row.try_get("level")?,
                    points: row.try_get("points")?,
                    lifetime_xp: row.try_get("lifetime_xp")?,
                },
            ),
            None => {
                let profile_id = Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO gamification_profiles (id, user_id, level, points, lifetime_xp) \
                     VALUES (?, ?, 1, 0, 0)",
                )
                .bind(&profile_id)
                .bind(&user_text)
                .execute(&mut *tx)
                .await?;
                (profile_id, Progress::default())
            }
        };

        progress.gain(XP_PER_WORKOUT);
        sqlx::query(
            "UPDATE gamification_profiles SET level = ?, points = ?, lifetime_xp = ? WHERE id = ?",
        )
        .bind(progress.level)
        .bind(progress.points)
        .bind(progress.lifetime_xp)
        .bind(&profile_id)
        .execute(&mut *tx)
        .await?;

        let workout_count: u32 = sqlx::query_scalar("SELECT COUNT(*) FROM workouts WHERE user_id = ?")
            .bind(&user_text)
            .fetch_one(&mut *tx)
            .await?;
        let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM badges WHERE profile_id = ?")
            .bind(&profile_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut new_badges = Vec::new();
        for milestone in qualified(workout_count) {
            if existing.iter().any(|name| name == milestone.name) {
                continue;
            }
            let badge_id = Uuid::new_v4();
            // the unique index absorbs a lost race on the same badge
            let result = sqlx::query(
                "INSERT OR IGNORE INTO badges (id, profile_id, user_id, name, description) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(badge_id.to_string())
            .bind(&profile_id)
            .bind(&user_text)
            .bind(milestone.name)
            .bind(milestone.description)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 1 {
                new_badges.push(Badge {
                    id: badge_id.into(),
                    name: milestone.name.to_string(),
                    description: milestone.description.to_string(),
                });
            }
        }

        tx.commit().await?;

        Ok(Reward {
            level: progress.level,
            points: progress.points,
            new_badges,
        })
    }
}

impl UserRepository for SqliteStore {
    async fn read_users(&self) -> Result<Vec<User>, ReadError> {
        let rows = sqlx::query("SELECT id, name, email, password_hash FROM users ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(read_storage)?;
        rows.iter()
            .map(|row| user_from_row(row).map_err(ReadError::Storage))
            .collect()
    }

    async fn read_user(&self, id: UserID) -> Result<User, ReadError> {
        sqlx::query("SELECT id, name, email, password_hash FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_storage)?
            .ok_or(ReadError::NotFound)
            .and_then(|row| user_from_row(&row).map_err(ReadError::Storage))
    }

    async fn create_user(
        &self,
        name: Name,
        email: String,
        password_hash: String,
    ) -> Result<User, CreateError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, name, email, password_hash) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(name.to_string())
            .bind(&email)
            .bind(&password_hash)
            .execute(&self.pool)
            .await
            .map_err(create_error)?;
        Ok(User {
            id: id.into(),
            name,
            email,
            password_hash,
        })
    }
}

impl ExerciseRepository for SqliteStore {
    async fn read_exercises(&self) -> Result<Vec<Exercise>, ReadError> {
        let rows = sqlx::query("SELECT id, name, muscle_group, photo_url FROM exercises ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(read_storage)?;
        rows.iter()
            .map(|row| exercise_from_row(row).map_err(ReadError::Storage))
            .collect()
    }

    async fn read_exercises_by_muscle_group(
        &self,
        muscle_group: &str,
    ) -> Result<Vec<Exercise>, ReadError> {
        let rows = sqlx::query(
            "SELECT id, name, muscle_group, photo_url FROM exercises \
             WHERE muscle_group IS NOT NULL \
               AND INSTR(LOWER(muscle_group), LOWER(?)) > 0 \
             ORDER BY rowid",
        )
        .bind(muscle_group)
        .fetch_all(&self.pool)
        .await
        .map_err(read_storage)?;
        rows.iter()
            .map(|row| exercise_from_row(row).map_err(ReadError::Storage))
            .collect()
    }

    async fn create_exercise(
        &self,
        name: Name,
        muscle_group: Option<String>,
        photo_url: Option<String>,
    ) -> Result<Exercise, CreateError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO exercises (id, name, muscle_group, photo_url) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(name.to_string())
            .bind(&muscle_group)
            .bind(&photo_url)
            .execute(&self.pool)
            .await
            .map_err(create_error)?;
        Ok(Exercise {
            id: id.into(),
            name,
            muscle_group,
            photo_url,
        })
    }

    async fn modify_exercise(
        &self,
        id: ExerciseID,
        name: Option<Name>,
        photo_url: Option<String>,
    ) -> Result<Exercise, UpdateError> {
        let current = self.read_exercise(id).await.map_err(UpdateError::from)?;
        let name = name.unwrap_or(current.name);
        let photo_url = photo_url.or(current.photo_url);
        sqlx::query("UPDATE exercises SET name = ?, photo_url = ? WHERE id = ?")
            .bind(name.to_string())
            .bind(&photo_url)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(update_error)?;
        Ok(Exercise {
            id,
            name,
            muscle_group: current.muscle_group,
            photo_url,
        })
    }
}

impl WorkoutRepository for SqliteStore {
    async fn read_workouts(&self, user_id: UserID) -> Result<Vec<Workout>, ReadError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, date, rest, nutrition, mood, effort, remarks \
             FROM workouts \
             WHERE user_id = ? \
             ORDER BY date DESC, rowid DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(read_storage)?;

        let mut workouts = Vec::with_capacity(rows.len());
        for row in &rows {
            workouts.push(self.workout_from_row(row).await?);
        }
        Ok(workouts)
    }

    async fn read_workout(&self, id: WorkoutID) -> Result<Workout, ReadError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, date, rest, nutrition, mood, effort, remarks \
             FROM workouts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(read_storage)?
        .ok_or(ReadError::NotFound)?;
        self.workout_from_row(&row).await
    }

    async fn create_workout(
        &self,
        user_id: UserID,
        draft: WorkoutDraft,
    ) -> Result<Workout, CreateError> {
        let workout_id = WorkoutID::from(Uuid::new_v4());
        let mut tx = self.pool.begin().await.map_err(|e| CreateError::Storage(storage_error(e)))?;

        sqlx::query(
            "INSERT INTO workouts (id, user_id, title, date, rest, nutrition, mood, effort, remarks) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(workout_id.to_string())
        .bind(user_id.to_string())
        .bind(draft.title.to_string())
        .bind(draft.date)
        .bind(draft.ratings.rest.map(|r| i64::from(u8::from(r))))
        .bind(draft.ratings.nutrition.map(|r| i64::from(u8::from(r))))
        .bind(draft.ratings.mood.map(|r| i64::from(u8::from(r))))
        .bind(draft.ratings.effort.map(|r| i64::from(u8::from(r))))
        .bind(&draft.remarks)
        .execute(&mut *tx)
        .await
        .map_err(create_error)?;

        for (position, entry) in draft.exercises.iter().enumerate() {
            let workout_exercise_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO workout_exercises (id, workout_id, exercise_id, load, position) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&workout_exercise_id)
            .bind(workout_id.to_string())
            .bind(entry.exercise_id.to_string())
            .bind(f64::from(entry.load))
            .bind(i64::try_from(position).unwrap_or_default())
            .execute(&mut *tx)
            .await
            .map_err(create_error)?;

            for (set_position, set) in entry.sets.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO sets (id, workout_exercise_id, set_type, load, reps, position) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&workout_exercise_id)
                .bind(set.set_type.tag())
                .bind(f64::from(set.load))
                .bind(u32::from(set.reps))
                .bind(i64::try_from(set_position).unwrap_or_default())
                .execute(&mut *tx)
                .await
                .map_err(create_error)?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| CreateError::Storage(storage_error(e)))?;

        self.read_workout(workout_id).await.map_err(CreateError::from)
    }

    async fn modify_workout(
        &self,
        id: WorkoutID,
        ratings: Option<Ratings>,
        remarks: Option<String>,
    ) -> Result<Workout, UpdateError> {
        let current = self.read_workout(id).await.map_err(UpdateError::from)?;
        let ratings = ratings.unwrap_or(current.ratings);
        let remarks = remarks.or(current.remarks);
        sqlx::query(
            "UPDATE workouts SET rest = ?, nutrition = ?, mood = ?, effort = ?, remarks = ? \
             WHERE id = ?",
        )
        .bind(ratings.rest.map(|r| i64::from(u8::from(r))))
        .bind(ratings.nutrition.map(|r| i64::from(u8::from(r))))
        .bind(ratings.mood.map(|r| i64::from(u8::from(r))))
        .bind(ratings.effort.map(|r| i64::from(u8::from(r))))
        .bind(&remarks)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(update_error)?;
        self.read_workout(id).await.map_err(UpdateError::from)
    }

    async fn delete_workout(&self, id: WorkoutID) -> Result<WorkoutID, DeleteError> {
        let id_text = id.to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DeleteError::Storage(storage_error(e)))?;

        sqlx::query(
            "DELETE FROM sets WHERE workout_exercise_id IN \
             (SELECT id FROM workout_exercises WHERE workout_id = ?)",
        )
        .bind(&id_text)
        .execute(&mut *tx)
        .await
        .map_err(delete_storage)?;
        sqlx::query("DELETE FROM workout_exercises WHERE workout_id = ?")
            .bind(&id_text)
            .execute(&mut *tx)
            .await
            .map_err(delete_storage)?;
        sqlx::query("UPDATE notes SET workout_id = NULL WHERE workout_id = ?")
            .bind(&id_text)
            .execute(&mut *tx)
            .await
            .map_err(delete_storage)?;
        let result = sqlx::query("DELETE FROM workouts WHERE id = ?")
            .bind(&id_text)
            .execute(&mut *tx)
            .await
            .map_err(delete_storage)?;
        if result.rows_affected() == 0 {
            return Err(DeleteError::NotFound);
        }

        tx.commit()
            .await
            .map_err(|e| DeleteError::Storage(storage_error(e)))?;
        Ok(id)
    }

    async fn count_workouts(&self, user_id: UserID) -> Result<u32, ReadError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM workouts WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(read_storage)
    }
}

impl NoteRepository for SqliteStore {
    async fn read_notes(&self, workout_id: Option<WorkoutID>) -> Result<Vec<Note>, ReadError> {
        let rows = match workout_id {
            Some(id) => {
                sqlx::query("SELECT id, content, workout_id FROM notes WHERE workout_id = ? ORDER BY rowid")
                    .bind(id.to_string())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT id, content, workout_id FROM notes ORDER BY rowid")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(read_storage)?;
        rows.iter()
            .map(|row| note_from_row(row).map_err(ReadError::Storage))
            .collect()
    }

    async fn create_note(
        &self,
        content: String,
        workout_id: Option<WorkoutID>,
    ) -> Result<Note, CreateError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO notes (id, content, workout_id) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(&content)
            .bind(workout_id.map(|w| w.to_string()))
            .execute(&self.pool)
            .await
            .map_err(create_error)?;
        Ok(Note {
            id: id.into(),
            content,
            workout_id,
        })
    }

    async fn modify_note(&self, id: NoteID, content: String) -> Result<Note, UpdateError> {
        let result = sqlx::query("UPDATE notes SET content = ? WHERE id = ?")
            .bind(&content)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(update_error)?;
        if result.rows_affected() == 0 {
            return Err(UpdateError::NotFound);
        }
        let row = sqlx::query("SELECT id, content, workout_id FROM notes WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| UpdateError::Storage(storage_error(e)))?;
        note_from_row(&row).map_err(UpdateError::Storage)
    }

    async fn delete_note(&self, id: NoteID) -> Result<NoteID, DeleteError> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(delete_storage)?;
        if result.rows_affected() == 0 {
            return Err(DeleteError::NotFound);
        }
        Ok(id)
    }
}

impl GamificationRepository for SqliteStore {
    async fn read_gamification(&self, user_id: UserID) -> Result<GamificationProfile, ReadError> {
        let user_text = user_id.to_string();
        let mut row = sqlx::query(
            "SELECT id, level, points, lifetime_xp FROM gamification_profiles WHERE user_id = ?",
        )
        .bind(&user_text)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_storage)?;

        if row.is_none() {
            sqlx::query(
                "INSERT OR IGNORE INTO gamification_profiles (id, user_id, level, points, lifetime_xp) \
                 VALUES (?, ?, 1, 0, 0)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&user_text)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ReadError::NotFound
                } else {
                    ReadError::Storage(storage_error(e))
                }
            })?;
            row = sqlx::query(
                "SELECT id, level, points, lifetime_xp FROM gamification_profiles WHERE user_id = ?",
            )
            .bind(&user_text)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_storage)?;
        }

        let row = row.ok_or(ReadError::NotFound)?;
        let profile_id_text = text(&row, "id").map_err(ReadError::Storage)?;

        let badge_rows =
            sqlx::query("SELECT id, name, description FROM badges WHERE profile_id = ? ORDER BY rowid")
                .bind(&profile_id_text)
                .fetch_all(&self.pool)
                .await
                .map_err(read_storage)?;
        let badges = badge_rows
            .iter()
            .map(|row| badge_from_row(row).map_err(ReadError::Storage))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GamificationProfile {
            id: parse_uuid(&profile_id_text).map_err(ReadError::Storage)?.into(),
            user_id,
            progress: Progress {
                level: row.try_get("level").map_err(|e| ReadError::Storage(storage_error(e)))?,
                points: row.try_get("points").map_err(|e| ReadError::Storage(storage_error(e)))?,
                lifetime_xp: row
                    .try_get("lifetime_xp")
                    .map_err(|e| ReadError::Storage(storage_error(e)))?,
            },
            badges,
        })
    }

    async fn reward_workout(&self, user_id: UserID) -> Result<Reward, UpdateError> {
        let mut attempt = 0;
        loop {
            match self.try_reward_workout(user_id).await {
                Ok(reward) => return Ok(reward),
                Err(err) if attempt < REWARD_RETRIES && is_busy(&err) => {
                    attempt += 1;
                    let backoff = Duration::from_millis(10 * (1 << attempt));
                    warn!("reward transaction busy, retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(if is_foreign_key_violation(&err) {
                        UpdateError::NotFound
                    } else {
                        UpdateError::Storage(storage_error(err))
                    });
                }
            }
        }
    }
}

fn text(row: &SqliteRow, column: &str) -> Result<String, StorageError> {
    row.try_get(column).map_err(storage_error)
}

fn parse_uuid(value: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(value).map_err(|e| StorageError::Other(Box::new(e)))
}

fn parse_name(value: &str) -> Result<Name, StorageError> {
    Name::new(value).map_err(|e| StorageError::Other(Box::new(e)))
}

fn user_from_row(row: &SqliteRow) -> Result<User, StorageError> {
    Ok(User {
        id: parse_uuid(&text(row, "id")?)?.into(),
        name: parse_name(&text(row, "name")?)?,
        email: text(row, "email")?,
        password_hash: text(row, "password_hash")?,
    })
}

fn exercise_from_row(row: &SqliteRow) -> Result<Exercise, StorageError> {
    Ok(Exercise {
        id: parse_uuid(&text(row, "id")?)?.into(),
        name: parse_name(&text(row, "name")?)?,
        muscle_group: row.try_get("muscle_group").map_err(storage_error)?,
        photo_url: row.try_get("photo_url").map_err(storage_error)?,
    })
}

fn workout_exercise_from_row(
    row: &SqliteRow,
    set_rows: &[SqliteRow],
) -> Result<WorkoutExercise, StorageError> {
    let sets = set_rows
        .iter()
        .map(set_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(WorkoutExercise {
        id: parse_uuid(&text(row, "id")?)?.into(),
        exercise: Exercise {
            id: parse_uuid(&text(row, "exercise_id")?)?.into(),
            name: parse_name(&text(row, "name")?)?,
            muscle_group: row.try_get("muscle_group").map_err(storage_error)?,
            photo_url: row.try_get("photo_url").map_err(storage_error)?,
        },
        load: parse_load(row.try_get("load").map_err(storage_error)?)?,
        sets,
    })
}

fn set_from_row(row: &SqliteRow) -> Result<Set, StorageError> {
    Ok(Set {
        id: parse_uuid(&text(row, "id")?)?.into(),
        set_type: SetType::from_tag(&text(row, "set_type")?),
        load: parse_load(row.try_get("load").map_err(storage_error)?)?,
        reps: Reps::new(row.try_get("reps").map_err(storage_error)?),
    })
}

fn note_from_row(row: &SqliteRow) -> Result<Note, StorageError> {
    let workout_id: Option<String> = row.try_get("workout_id").map_err(storage_error)?;
    Ok(Note {
        id: parse_uuid(&text(row, "id")?)?.into(),
        content: text(row, "content")?,
        workout_id: workout_id
            .map(|id| parse_uuid(&id).map(WorkoutID::from))
            .transpose()?,
    })
}

fn badge_from_row(row: &SqliteRow) -> Result<Badge, StorageError> {
    Ok(Badge {
        id: parse_uuid(&text(row, "id")?)?.into(),
        name: text(row, "name")?,
        description: text(row, "description")?,
    })
}

fn parse_load(value: f64) -> Result<Load, StorageError> {
    Load::new(value).map_err(|e| StorageError::Other(Box::new(e)))
}

fn ratings_from_row(row: &SqliteRow) -> Result<Ratings, StorageError> {
    Ok(Ratings {
        rest: parse_rating(row.try_get("rest").map_err(storage_error)?)?,
        nutrition: parse_rating(row.try_get("nutrition").map_err(storage_error)?)?,
        mood: parse_rating(row.try_get("mood").map_err(storage_error)?)?,
        effort: parse_rating(row.try_get("effort").map_err(storage_error)?)?,
    })
}

fn parse_rating(value: Option<i64>) -> Result<Option<Rating>, StorageError> {
    value
        .map(|v| Rating::try_from(v).map_err(|e| StorageError::Other(Box::new(e))))
        .transpose()
}

fn storage_error(err: sqlx::Error) -> StorageError {
    if is_unavailable(&err) {
        StorageError::Unavailable(err.to_string())
    } else {
        StorageError::Other(Box::new(err))
    }
}

fn read_storage(err: sqlx::Error) -> ReadError {
    ReadError::Storage(storage_error(err))
}

fn delete_storage(err: sqlx::Error) -> DeleteError {
    DeleteError::Storage(storage_error(err))
}

fn create_error(err: sqlx::Error) -> CreateError {
    if is_unique_violation(&err) {
        CreateError::Conflict
    } else if is_foreign_key_violation(&err) {
        CreateError::NotFound
    } else {
        CreateError::Storage(storage_error(err))
    }
}

fn update_error(err: sqlx::Error) -> UpdateError {
    if is_unique_violation(&err) {
        UpdateError::Conflict
    } else {
        UpdateError::Storage(storage_error(err))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::ForeignKeyViolation)
    )
}

fn is_busy(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if is_busy_message(db.message()))
}

fn is_unavailable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => is_busy_message(db.message()),
        _ => false,
    }
}

fn is_busy_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("locked") || message.contains("busy")
}
