//! Achievement predicates.
//!
//! Every rule is a pure function of the learner's completed modules, their
//! submission ledger and the evaluation context. A submission with a bad
//! timestamp or score is skipped only by the rules that need that field.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};

use crate::model::{ExerciseSubmission, MalformedRecordError, ModuleProgress};
use crate::time::EvaluationContext;

/// Local-hour window for time-of-day rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourWindow {
    /// Local hour strictly below the bound.
    Before(u32),
    /// Local hour at or above the bound.
    From(u32),
}

impl HourWindow {
    #[must_use]
    pub fn contains(self, hour: u32) -> bool {
        match self {
            Self::Before(bound) => hour < bound,
            Self::From(bound) => hour >= bound,
        }
    }
}

/// Closed set of rule kinds. New badges pick a variant and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AchievementRule {
    /// At least `count` completed modules.
    ModuleCount { count: usize },
    /// At least `count` submissions of any kind.
    SubmissionCount { count: usize },
    /// At least `count` submissions scoring `min_score` or more.
    ScoreThreshold { min_score: u8, count: usize },
    /// Any submission whose local hour falls in the window.
    TimeOfDay(HourWindow),
    /// A Saturday and the Sunday right after it both have a submission.
    WeekendPair,
    /// `days` consecutive local calendar days with at least one submission.
    DailyStreak { days: usize },
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleOutcome {
    pub earned: bool,
    pub earned_at: Option<DateTime<Utc>>,
}

impl RuleOutcome {
    #[must_use]
    pub fn not_earned() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn earned(at: Option<DateTime<Utc>>) -> Self {
        Self {
            earned: true,
            earned_at: at,
        }
    }
}

impl AchievementRule {
    #[must_use]
    pub fn evaluate(
        &self,
        completed_modules: &[ModuleProgress],
        submissions: &[ExerciseSubmission],
        ctx: &EvaluationContext,
    ) -> RuleOutcome {
        match *self {
            Self::ModuleCount { count } => module_count(completed_modules, count),
            Self::SubmissionCount { count } => submission_count(submissions, count),
            Self::ScoreThreshold { min_score, count } => {
                score_threshold(submissions, min_score, count)
            }
            Self::TimeOfDay(window) => time_of_day(submissions, window, ctx),
            Self::WeekendPair => weekend_pair(submissions, ctx),
            Self::DailyStreak { days } => daily_streak(submissions, days, ctx),
        }
    }
}

fn skip_malformed(rule: &'static str, err: &MalformedRecordError) {
    tracing::debug!(rule, error = %err, "submission excluded from rule");
}

/// Submissions in submission order: by timestamp, with undated records after
/// dated ones in ledger order.
fn chronological(submissions: &[ExerciseSubmission]) -> Vec<&ExerciseSubmission> {
    let mut ordered: Vec<_> = submissions.iter().collect();
    ordered.sort_by_key(|s| (s.submitted_at.is_none(), s.submitted_at));
    ordered
}

fn nth_threshold<T>(
    items: &[T],
    count: usize,
    at: impl Fn(&T) -> Option<DateTime<Utc>>,
) -> RuleOutcome {
    if count == 0 {
        return RuleOutcome::earned(None);
    }
    items
        .get(count - 1)
        .map_or_else(RuleOutcome::not_earned, |item| RuleOutcome::earned(at(item)))
}

fn module_count(completed_modules: &[ModuleProgress], count: usize) -> RuleOutcome {
    let mut done: Vec<_> = completed_modules
        .iter()
        .filter(|m| m.is_completed())
        .collect();
    done.sort_by_key(|m| (m.completed_at().is_none(), m.completed_at()));
    nth_threshold(&done, count, |m| m.completed_at())
}

fn submission_count(submissions: &[ExerciseSubmission], count: usize) -> RuleOutcome {
    nth_threshold(&chronological(submissions), count, |s| s.submitted_at)
}

fn score_threshold(
    submissions: &[ExerciseSubmission],
    min_score: u8,
    count: usize,
) -> RuleOutcome {
    let qualifying: Vec<_> = chronological(submissions)
        .into_iter()
        .filter(|s| match s.checked_score() {
            Ok(Some(score)) => score >= min_score,
            Ok(None) => false,
            Err(err) => {
                skip_malformed("score_threshold", &err);
                false
            }
        })
        .collect();
    nth_threshold(&qualifying, count, |s| s.submitted_at)
}

/// Valid timestamps in ascending order.
fn timestamps(rule: &'static str, submissions: &[ExerciseSubmission]) -> Vec<DateTime<Utc>> {
    let mut out: Vec<_> = submissions
        .iter()
        .filter_map(|s| match s.timestamp() {
            Ok(at) => Some(at),
            Err(err) => {
                skip_malformed(rule, &err);
                None
            }
        })
        .collect();
    out.sort_unstable();
    out
}

/// Earliest submission time per local calendar day.
fn first_per_day(
    rule: &'static str,
    submissions: &[ExerciseSubmission],
    ctx: &EvaluationContext,
) -> BTreeMap<NaiveDate, DateTime<Utc>> {
    let mut days = BTreeMap::new();
    for at in timestamps(rule, submissions) {
        days.entry(ctx.local_date(at)).or_insert(at);
    }
    days
}

fn time_of_day(
    submissions: &[ExerciseSubmission],
    window: HourWindow,
    ctx: &EvaluationContext,
) -> RuleOutcome {
    timestamps("time_of_day", submissions)
        .into_iter()
        .find(|at| window.contains(ctx.local(*at).hour()))
        .map_or_else(RuleOutcome::not_earned, |at| RuleOutcome::earned(Some(at)))
}

/// Weeks are Monday-anchored so a Saturday and the following Sunday share a
/// week. The badge is dated by the most recent submission that falls on any
/// qualifying weekend.
fn weekend_pair(submissions: &[ExerciseSubmission], ctx: &EvaluationContext) -> RuleOutcome {
    let stamps = timestamps("weekend_pair", submissions);
    let days: BTreeSet<NaiveDate> = stamps.iter().map(|at| ctx.local_date(*at)).collect();
    let paired = |day: NaiveDate| match day.weekday() {
        Weekday::Sat => days.contains(&(day + Duration::days(1))),
        Weekday::Sun => days.contains(&(day - Duration::days(1))),
        _ => false,
    };
    stamps
        .iter()
        .rev()
        .copied()
        .find(|at| paired(ctx.local_date(*at)))
        .map_or_else(RuleOutcome::not_earned, |at| RuleOutcome::earned(Some(at)))
}

fn daily_streak(
    submissions: &[ExerciseSubmission],
    days_needed: usize,
    ctx: &EvaluationContext,
) -> RuleOutcome {
    let days = first_per_day("daily_streak", submissions, ctx);
    if days_needed == 0 {
        return RuleOutcome::earned(None);
    }

    let mut run = 0_usize;
    let mut previous: Option<NaiveDate> = None;
    for (day, first_at) in &days {
        run = match previous {
            Some(prev) if *day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        if run >= days_needed {
            return RuleOutcome::earned(Some(*first_at));
        }
        previous = Some(*day);
    }
    RuleOutcome::not_earned()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
