//! Badge catalog and the rules that award it.
//!
//! Achievements are pull-based: callers hand over the learner's completed
//! modules and full submission history and get the whole catalog back with
//! earned flags. Nothing is cached between calls.

mod definitions;
mod engine;
mod ranking;
mod rules;

pub use definitions::{
    ACHIEVEMENTS, AchievementCategory, AchievementDefinition, HIGH_SCORE, Rarity, STREAK_DAYS,
    find,
};
pub use engine::{AchievementStatus, evaluate, evaluate_definitions};
pub use ranking::{AchievementFilter, AchievementSummary, display_order, present};
pub use rules::{AchievementRule, HourWindow, RuleOutcome};
