use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::definitions::{AchievementCategory, Rarity};
use super::engine::AchievementStatus;

/// Narrowing applied before display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AchievementFilter {
    pub category: Option<AchievementCategory>,
    pub earned_only: bool,
}

impl AchievementFilter {
    #[must_use]
    pub fn matches(&self, status: &AchievementStatus) -> bool {
        if self.earned_only && !status.earned {
            return false;
        }
        self.category
            .is_none_or(|category| status.definition.category == category)
    }
}

/// Earned first, then rarer first, then by id.
#[must_use]
pub fn display_order(a: &AchievementStatus, b: &AchievementStatus) -> Ordering {
    b.earned
        .cmp(&a.earned)
        .then_with(|| b.definition.rarity.cmp(&a.definition.rarity))
        .then_with(|| a.definition.id.cmp(b.definition.id))
}

/// Filters and sorts statuses for display.
#[must_use]
pub fn present(
    statuses: impl IntoIterator<Item = AchievementStatus>,
    filter: &AchievementFilter,
) -> Vec<AchievementStatus> {
    let mut shown: Vec<_> = statuses.into_iter().filter(|s| filter.matches(s)).collect();
    shown.sort_by(display_order);
    shown
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementSummary {
    pub total: usize,
    pub earned: usize,
    pub earned_by_rarity: BTreeMap<Rarity, usize>,
}

impl AchievementSummary {
    #[must_use]
    pub fn from_statuses(statuses: &[AchievementStatus]) -> Self {
        let mut earned_by_rarity: BTreeMap<Rarity, usize> =
            Rarity::ALL.iter().map(|r| (*r, 0)).collect();
        let mut earned = 0;
        for status in statuses.iter().filter(|s| s.earned) {
            earned += 1;
            *earned_by_rarity.entry(status.definition.rarity).or_default() += 1;
        }
        Self {
            total: statuses.len(),
            earned,
            earned_by_rarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::definitions::{ACHIEVEMENTS, find};
    use crate::time::fixed_now;

    fn status(id: &str, earned: bool) -> AchievementStatus {
        AchievementStatus {
            definition: *find(id).unwrap(),
            earned,
            earned_at: earned.then(fixed_now),
        }
    }

    fn ids(statuses: &[AchievementStatus]) -> Vec<&'static str> {
        statuses.iter().map(|s| s.definition.id).collect()
    }

    #[test]
    fn earned_common_beats_unearned_legendary() {
        let shown = present(
            [status("wellness_master", false), status("first_module", true)],
            &AchievementFilter::default(),
        );
        assert_eq!(ids(&shown), vec!["first_module", "wellness_master"]);
    }

    #[test]
    fn rarity_orders_within_group() {
        let shown = present(
            [
                status("early_bird", true),
                status("consistency_champion", true),
                status("half_way", true),
                status("wellness_master", true),
            ],
            &AchievementFilter::default(),
        );
        assert_eq!(
            ids(&shown),
            vec!["wellness_master", "consistency_champion", "half_way", "early_bird"]
        );
    }

    #[test]
    fn order_does_not_depend_on_input_order() {
        let all: Vec<_> = ACHIEVEMENTS
            .iter()
            .enumerate()
            .map(|(i, d)| AchievementStatus {
                definition: *d,
                earned: i % 3 == 0,
                earned_at: None,
            })
            .collect();
        let mut reversed = all.clone();
        reversed.reverse();

        let filter = AchievementFilter::default();
        assert_eq!(present(all, &filter), present(reversed, &filter));
    }

    #[test]
    fn filters_narrow_by_category_and_earned() {
        let statuses = [
            status("early_bird", true),
            status("night_owl", false),
            status("high_scorer", true),
        ];

        let special = AchievementFilter {
            category: Some(AchievementCategory::Special),
            earned_only: false,
        };
        assert_eq!(ids(&present(statuses, &special)), vec!["early_bird", "night_owl"]);

        let earned = AchievementFilter {
            category: None,
            earned_only: true,
        };
        assert_eq!(ids(&present(statuses, &earned)), vec!["high_scorer", "early_bird"]);
    }

    #[test]
    fn summary_counts_by_rarity() {
        let statuses = [
            status("early_bird", true),
            status("night_owl", true),
            status("perfectionist", true),
            status("wellness_master", false),
        ];
        let summary = AchievementSummary::from_statuses(&statuses);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.earned, 3);
        assert_eq!(summary.earned_by_rarity[&Rarity::Common], 2);
        assert_eq!(summary.earned_by_rarity[&Rarity::Epic], 1);
        assert_eq!(summary.earned_by_rarity[&Rarity::Legendary], 0);
    }
}
