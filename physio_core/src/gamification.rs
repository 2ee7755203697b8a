//! Points, levels, streaks, achievements and daily tasks.
//!
//! Every user on a device has a [`PlayerRecord`]. All records live in a
//! single [`ProfileBook`] file that is loaded, modified and saved back
//! atomically, the same way user state is handled elsewhere.

use crate::scoring::level_for_points;
use crate::{
    Achievement, AchievementCategory, DailyTask, Error, ExerciseSession, Result, TaskType,
    UserProfile,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use crate::lockfile::FileLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Awarded every 7th consecutive exercise day
pub const WEEKLY_STREAK_BONUS: u32 = 50;

const WEEKLY_STREAK_DAYS: u32 = 7;

/// The achievements every new player starts with
pub fn default_achievements() -> Vec<Achievement> {
    let achievement = |id: &str,
                       title: &str,
                       description: &str,
                       category: AchievementCategory,
                       required_value: u32,
                       points: u32| Achievement {
        id: id.into(),
        title: title.into(),
        description: description.into(),
        category,
        required_value,
        points,
        unlocked_at: None,
        progress: 0,
    };

    vec![
        achievement(
            "first_exercise",
            "First Step",
            "Complete your first exercise",
            AchievementCategory::Exercises,
            1,
            25,
        ),
        achievement(
            "exercise_master",
            "Exercise Master",
            "Complete 10 exercises",
            AchievementCategory::Exercises,
            10,
            100,
        ),
        achievement(
            "point_collector",
            "Point Collector",
            "Collect 1000 points",
            AchievementCategory::Points,
            1000,
            200,
        ),
        achievement(
            "week_warrior",
            "Week Warrior",
            "Exercise 7 days in a row",
            AchievementCategory::Streak,
            7,
            150,
        ),
        achievement(
            "consistency_king",
            "Consistency King",
            "Exercise 30 days in a row",
            AchievementCategory::Streak,
            30,
            500,
        ),
    ]
}

/// The three goals generated for a calendar day
pub fn daily_tasks_for(date: NaiveDate) -> Vec<DailyTask> {
    let expires_at = date
        .succ_opt()
        .unwrap_or(date)
        .and_time(NaiveTime::MIN)
        .and_utc();

    let task = |title: &str, description: &str, task_type: TaskType, target_value: u32, points: u32| {
        DailyTask {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            task_type,
            target_value,
            current_progress: 0,
            points,
            completed: false,
            date,
            expires_at,
        }
    };

    vec![
        task(
            "Complete 3 exercises",
            "Finish at least 3 exercises today",
            TaskType::ExerciseCount,
            3,
            50,
        ),
        task(
            "30 minutes of exercise",
            "Exercise for 30 minutes in total",
            TaskType::ExerciseTime,
            30,
            30,
        ),
        task(
            "Earn 100 points",
            "Earn 100 points today",
            TaskType::PointsEarned,
            100,
            25,
        ),
    ]
}

/// Value an achievement of `category` is measured against, if it is tracked
fn achievement_value(profile: &UserProfile, category: AchievementCategory) -> Option<u32> {
    match category {
        AchievementCategory::Exercises => Some(profile.completed_exercises),
        AchievementCategory::Points => Some(profile.total_points),
        AchievementCategory::Streak | AchievementCategory::Consistency => {
            Some(profile.streak_days)
        }
        AchievementCategory::General | AchievementCategory::Milestones => None,
    }
}

/// What a completed session earned
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionReward {
    /// Session points plus any streak bonus, before achievement rewards
    pub points: u32,
    pub streak_days: u32,
    pub streak_bonus: u32,
    pub level: u32,
    /// Ids of achievements unlocked by this session
    pub unlocked: Vec<String>,
}

/// Everything tracked for one user
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub profile: UserProfile,
    #[serde(default = "default_achievements")]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub daily_tasks: Vec<DailyTask>,
}

impl PlayerRecord {
    pub fn new(user_id: &str) -> Self {
        Self {
            profile: UserProfile {
                user_id: user_id.into(),
                ..UserProfile::default()
            },
            achievements: default_achievements(),
            daily_tasks: Vec::new(),
        }
    }

    /// Add points, recompute the level and unlock achievements.
    ///
    /// Returns the ids of newly unlocked achievements.
    pub fn award_points(&mut self, points: u32, now: DateTime<Utc>) -> Vec<String> {
        self.profile.total_points = self.profile.total_points.saturating_add(points);
        self.profile.level = level_for_points(self.profile.total_points);
        self.unlock_achievements(now)
    }

    /// Unlocking pays out points, which can unlock further achievements
    fn unlock_achievements(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut unlocked = Vec::new();
        loop {
            let mut changed = false;
            for achievement in self.achievements.iter_mut() {
                let Some(value) = achievement_value(&self.profile, achievement.category) else {
                    continue;
                };
                achievement.progress = value.min(achievement.required_value);
                if achievement.is_unlocked() || value < achievement.required_value {
                    continue;
                }

                achievement.unlocked_at = Some(now);
                self.profile.total_points =
                    self.profile.total_points.saturating_add(achievement.points);
                changed = true;
                tracing::info!(
                    "User {} unlocked achievement {}",
                    self.profile.user_id,
                    achievement.id
                );
                unlocked.push(achievement.id.clone());
            }

            self.profile.level = level_for_points(self.profile.total_points);
            if !changed {
                return unlocked;
            }
        }
    }

    /// Count `day` towards the streak. Returns true when it is a new streak day.
    pub fn register_exercise_day(&mut self, day: NaiveDate) -> bool {
        let profile = &mut self.profile;
        match profile.last_exercise_day {
            Some(last) if last == day => return false,
            Some(last) if last.succ_opt() == Some(day) => profile.streak_days += 1,
            // Out-of-order days never extend or break the streak
            Some(last) if last > day => return false,
            _ => profile.streak_days = 1,
        }
        profile.last_exercise_day = Some(day);
        true
    }

    /// Apply a finished session to the profile.
    ///
    /// Incomplete sessions earn nothing.
    pub fn record_session(&mut self, session: &ExerciseSession, now: DateTime<Utc>) -> SessionReward {
        if !session.completed {
            return SessionReward {
                streak_days: self.profile.streak_days,
                level: self.profile.level,
                ..SessionReward::default()
            };
        }

        self.profile.completed_exercises += 1;
        self.profile.total_exercise_seconds += session.duration;

        let day = session.end_time.unwrap_or(session.start_time).date_naive();
        let streak_bonus = if self.register_exercise_day(day)
            && self.profile.streak_days % WEEKLY_STREAK_DAYS == 0
        {
            WEEKLY_STREAK_BONUS
        } else {
            0
        };

        let points = session.points_earned + streak_bonus;
        let unlocked = self.award_points(points, now);

        tracing::debug!(
            "User {} earned {} points (streak {} days)",
            self.profile.user_id,
            points,
            self.profile.streak_days
        );

        SessionReward {
            points,
            streak_days: self.profile.streak_days,
            streak_bonus,
            level: self.profile.level,
            unlocked,
        }
    }

    /// Drop expired tasks and generate today's if missing
    pub fn ensure_daily_tasks(&mut self, today: NaiveDate) {
        self.daily_tasks.retain(|task| task.date == today);
        if self.daily_tasks.is_empty() {
            self.daily_tasks = daily_tasks_for(today);
            tracing::debug!(
                "Generated daily tasks for {} on {}",
                self.profile.user_id,
                today
            );
        }
    }

    /// Recompute today's task progress from the sessions completed today
    pub fn refresh_task_progress(&mut self, today: NaiveDate, sessions: &[ExerciseSession]) {
        let todays: Vec<&ExerciseSession> = sessions
            .iter()
            .filter(|s| s.completed && s.start_time.date_naive() == today)
            .collect();
        let count = todays.len() as u32;
        let minutes = (todays.iter().map(|s| s.duration).sum::<u64>() / 60) as u32;
        let points: u32 = todays.iter().map(|s| s.points_earned).sum();

        for task in self
            .daily_tasks
            .iter_mut()
            .filter(|t| t.date == today && !t.completed)
        {
            task.current_progress = match task.task_type {
                TaskType::ExerciseCount => count,
                TaskType::ExerciseTime => minutes,
                TaskType::PointsEarned => points,
                TaskType::StreakMaintain => self.profile.streak_days,
                TaskType::SpecificExercise => task.current_progress,
            };
        }
    }

    /// Mark a task done and award its points.
    ///
    /// Returns the points awarded; completing an already completed task awards nothing.
    pub fn complete_task(&mut self, task_id: Uuid, now: DateTime<Utc>) -> Result<u32> {
        let task = self
            .daily_tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        if task.completed {
            return Ok(0);
        }
        if task.current_progress < task.target_value {
            return Err(Error::TaskIncomplete {
                id: task_id.to_string(),
                progress: task.current_progress,
                target: task.target_value,
            });
        }

        task.completed = true;
        let points = task.points;
        tracing::info!("User {} completed task '{}'", self.profile.user_id, task.title);
        self.award_points(points, now);
        Ok(points)
    }
}

/// All players known on this device, keyed by user id
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileBook {
    #[serde(default)]
    pub players: BTreeMap<String, PlayerRecord>,
}

impl ProfileBook {
    /// Load the book under a shared lock.
    ///
    /// A missing file yields an empty book. A corrupted file is logged and
    /// also yields an empty book.
    pub fn load(path: &Path) -> Result<Self> {
        let _lock = FileLock::shared(path)?;
        Ok(Self::read_from(path))
    }

    /// Atomically replace the file under an exclusive lock
    pub fn save(&self, path: &Path) -> Result<()> {
        let _lock = FileLock::exclusive(path)?;
        self.write_to(path)
    }

    /// Load, modify and save back.
    ///
    /// The exclusive lock is held from the read through the rename, so
    /// concurrent updates from other processes are serialized.
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProfileBook) -> Result<T>,
    {
        let _lock = FileLock::exclusive(path)?;
        let mut book = Self::read_from(path);
        let out = f(&mut book)?;
        book.write_to(path)?;
        Ok(out)
    }

    // Callers hold the sidecar lock.
    fn read_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No profile file found, starting empty");
            return Self::default();
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to read profiles {:?}: {}. Starting empty.", path, e);
                return Self::default();
            }
        };

        match serde_json::from_str::<ProfileBook>(&contents) {
            Ok(book) => {
                tracing::debug!("Loaded {} profiles from {:?}", book.players.len(), path);
                book
            }
            Err(e) => {
                tracing::warn!("Failed to parse profiles {:?}: {}. Starting empty.", path, e);
                Self::default()
            }
        }
    }

    // Temp file, sync, rename. Callers hold the sidecar lock.
    fn write_to(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::State(format!("profile path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved profiles to {:?}", path);
        Ok(())
    }

    pub fn player(&self, user_id: &str) -> Option<&PlayerRecord> {
        self.players.get(user_id)
    }

    /// The user's record, created on first use
    pub fn player_mut(&mut self, user_id: &str) -> &mut PlayerRecord {
        self.players
            .entry(user_id.to_string())
            .or_insert_with(|| PlayerRecord::new(user_id))
    }

    /// Profiles ordered by total points, highest first
    pub fn leaderboard(&self) -> Vec<UserProfile> {
        rank_profiles(self.players.values().map(|p| p.profile.clone()).collect())
    }
}

/// Order profiles by total points, highest first, ties by user id
pub fn rank_profiles(mut profiles: Vec<UserProfile>) -> Vec<UserProfile> {
    profiles.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    profiles
}
