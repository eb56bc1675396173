use derive_more::Deref;
use uuid::Uuid;

use crate::{ReadError, UpdateError, UserID};

/// Fixed award for one completed workout.
pub const XP_PER_WORKOUT: u32 = 20;

/// Experience required to advance one level.
pub const XP_PER_LEVEL: u32 = 100;

#[allow(async_fn_in_trait)]
pub trait GamificationService {
    async fn get_gamification(&self, user_id: UserID) -> Result<GamificationProfile, ReadError>;
}

#[allow(async_fn_in_trait)]
pub trait GamificationRepository {
    /// Profile with its badges; created lazily with `Progress::default()`
    /// on first access.
    async fn read_gamification(&self, user_id: UserID) -> Result<GamificationProfile, ReadError>;
    /// Applies the award for one completed workout and mints any newly
    /// qualified milestone badges, as a single serialized unit of work.
    /// Awarding is idempotent per milestone: a badge name exists at most
    /// once per profile, and a lost race is absorbed, not surfaced.
    async fn reward_workout(&self, user_id: UserID) -> Result<Reward, UpdateError>;
}

/// Per-user progression state: experience within the current level plus a
/// lifetime counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub level: u32,
    pub points: u32,
    pub lifetime_xp: u32,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            level: 1,
            points: 0,
            lifetime_xp: 0,
        }
    }
}

impl Progress {
    /// Adds experience and carries any overflow into level increments.
    /// Loops rather than testing once, so a single award larger than
    /// `XP_PER_LEVEL` advances multiple levels. Returns the number of
    /// levels gained. Afterwards `points < XP_PER_LEVEL` holds.
    pub fn gain(&mut self, xp: u32) -> u32 {
        self.points += xp;
        self.lifetime_xp += xp;

        let mut level_ups = 0;
        while self.points >= XP_PER_LEVEL {
            self.points -= XP_PER_LEVEL;
            self.level += 1;
            level_ups += 1;
        }
        level_ups
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub threshold: u32,
    pub name: &'static str,
    pub description: &'static str,
}

/// Workout-count milestones, in ascending threshold order.
pub const MILESTONES: [Milestone; 4] = [
    Milestone {
        threshold: 10,
        name: "Bronze",
        description: "10 workouts completed",
    },
    Milestone {
        threshold: 20,
        name: "Silver",
        description: "20 workouts completed",
    },
    Milestone {
        threshold: 50,
        name: "Gold",
        description: "50 workouts completed",
    },
    Milestone {
        threshold: 100,
        name: "Diamond",
        description: "100 workouts completed",
    },
];

/// Milestones reached with the given lifetime workout count. Pure and
/// deterministic; the same count always yields the same subset.
#[must_use]
pub fn qualified(workout_count: u32) -> &'static [Milestone] {
    let end = MILESTONES
        .iter()
        .take_while(|m| m.threshold <= workout_count)
        .count();
    &MILESTONES[..end]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamificationProfile {
    pub id: GamificationProfileID,
    pub user_id: UserID,
    pub progress: Progress,
    pub badges: Vec<Badge>,
}

#[derive(Deref, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GamificationProfileID(Uuid);

impl From<Uuid> for GamificationProfileID {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u128> for GamificationProfileID {
    fn from(value: u128) -> Self {
        Self(Uuid::from_bytes(value.to_be_bytes()))
    }
}

/// Permanent achievement record, unlocked once per milestone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub id: BadgeID,
    pub name: String,
    pub description: String,
}

#[derive(Deref, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BadgeID(Uuid);

impl From<Uuid> for BadgeID {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u128> for BadgeID {
    fn from(value: u128) -> Self {
        Self(Uuid::from_bytes(value.to_be_bytes()))
    }
}

/// Outcome of rewarding one completed workout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    pub level: u32,
    pub points: u32,
    pub new_badges: Vec<Badge>,
}
