//! Achievement definitions and metadata
//!
//! The catalog is fixed process-wide configuration. Nothing about earned
//! badges is stored; they are recomputed from the ledger on every read.

use super::rules::{AchievementRule, HourWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AchievementCategory {
    Module,
    Exercise,
    Streak,
    Score,
    Special,
}

impl AchievementCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Exercise => "exercise",
            Self::Streak => "streak",
            Self::Score => "score",
            Self::Special => "special",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(Self::Module),
            "exercise" => Some(Self::Exercise),
            "streak" => Some(Self::Streak),
            "score" => Some(Self::Score),
            "special" => Some(Self::Special),
            _ => None,
        }
    }
}

/// Ordered from least to most rare; `Ord` drives display ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 4] = [Self::Common, Self::Rare, Self::Epic, Self::Legendary];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub category: AchievementCategory,
    pub rarity: Rarity,
    pub rule: AchievementRule,
}

pub const STREAK_DAYS: usize = 7;
pub const HIGH_SCORE: u8 = 90;

pub static ACHIEVEMENTS: &[AchievementDefinition] = &[
    AchievementDefinition {
        id: "first_module",
        title: "First Steps",
        description: "Complete your first training module",
        icon: "🌱",
        category: AchievementCategory::Module,
        rarity: Rarity::Common,
        rule: AchievementRule::ModuleCount { count: 1 },
    },
    AchievementDefinition {
        id: "half_way",
        title: "Half Way There",
        description: "Complete five training modules",
        icon: "🌿",
        category: AchievementCategory::Module,
        rarity: Rarity::Rare,
        rule: AchievementRule::ModuleCount { count: 5 },
    },
    AchievementDefinition {
        id: "wellness_master",
        title: "Wellness Master",
        description: "Complete all ten training modules",
        icon: "🌳",
        category: AchievementCategory::Module,
        rarity: Rarity::Legendary,
        rule: AchievementRule::ModuleCount { count: 10 },
    },
    AchievementDefinition {
        id: "exercise_enthusiast",
        title: "Exercise Enthusiast",
        description: "Submit ten exercises",
        icon: "💪",
        category: AchievementCategory::Exercise,
        rarity: Rarity::Common,
        rule: AchievementRule::SubmissionCount { count: 10 },
    },
    AchievementDefinition {
        id: "practice_perfecter",
        title: "Practice Makes Perfect",
        description: "Submit fifty exercises",
        icon: "🏋️",
        category: AchievementCategory::Exercise,
        rarity: Rarity::Epic,
        rule: AchievementRule::SubmissionCount { count: 50 },
    },
    AchievementDefinition {
        id: "high_scorer",
        title: "High Scorer",
        description: "Score 90 or more on five exercises",
        icon: "⭐",
        category: AchievementCategory::Score,
        rarity: Rarity::Rare,
        rule: AchievementRule::ScoreThreshold {
            min_score: HIGH_SCORE,
            count: 5,
        },
    },
    AchievementDefinition {
        id: "perfectionist",
        title: "Perfectionist",
        description: "Get a perfect score on any exercise",
        icon: "💯",
        category: AchievementCategory::Score,
        rarity: Rarity::Epic,
        rule: AchievementRule::ScoreThreshold {
            min_score: 100,
            count: 1,
        },
    },
    AchievementDefinition {
        id: "early_bird",
        title: "Early Bird",
        description: "Submit an exercise before 8 AM",
        icon: "🌅",
        category: AchievementCategory::Special,
        rarity: Rarity::Common,
        rule: AchievementRule::TimeOfDay(HourWindow::Before(8)),
    },
    AchievementDefinition {
        id: "night_owl",
        title: "Night Owl",
        description: "Submit an exercise after 10 PM",
        icon: "🦉",
        category: AchievementCategory::Special,
        rarity: Rarity::Common,
        rule: AchievementRule::TimeOfDay(HourWindow::From(22)),
    },
    AchievementDefinition {
        id: "weekend_warrior",
        title: "Weekend Warrior",
        description: "Practice on both Saturday and Sunday of the same weekend",
        icon: "🏖️",
        category: AchievementCategory::Special,
        rarity: Rarity::Rare,
        rule: AchievementRule::WeekendPair,
    },
    AchievementDefinition {
        id: "consistency_champion",
        title: "Consistency Champion",
        description: "Practice seven days in a row",
        icon: "🔥",
        category: AchievementCategory::Streak,
        rarity: Rarity::Epic,
        rule: AchievementRule::DailyStreak { days: STREAK_DAYS },
    },
];

#[must_use]
pub fn find(id: &str) -> Option<&'static AchievementDefinition> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}
