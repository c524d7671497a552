use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ModuleId, SectionId, UserId};
use crate::model::module::TrainingModule;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("progress record belongs to module {found}, expected {expected}")]
    ModuleMismatch { expected: ModuleId, found: ModuleId },

    #[error("completed section {0} is not part of the module")]
    UnknownCompletedSection(SectionId),

    #[error("current section {0} is not part of the module")]
    UnknownCurrentSection(SectionId),

    #[error("invalid persisted progress: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

/// Module-level state machine: `NotStarted -> InProgress -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

//
// ─── MODULE PROGRESS ──────────────────────────────────────────────────────────
//

/// Per (user, module) progress record.
///
/// Invariants, relative to the module it was built against:
/// - `completed_sections` is a subset of the module's sections
/// - `status == Completed` iff every section is completed
/// - `current_section`, when set, names an existing section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub(crate) user_id: UserId,
    pub(crate) module_id: ModuleId,
    pub(crate) status: ProgressStatus,
    pub(crate) completed_sections: BTreeSet<SectionId>,
    pub(crate) current_section: Option<SectionId>,
    pub(crate) progress_percentage: u8,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl ModuleProgress {
    /// Creates the record for a learner opening a module for the first time.
    #[must_use]
    pub fn start(user_id: UserId, module: &TrainingModule, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            module_id: module.id.clone(),
            status: ProgressStatus::InProgress,
            completed_sections: BTreeSet::new(),
            current_section: module.sections.first().map(|s| s.id.clone()),
            progress_percentage: 0,
            started_at: now,
            completed_at: None,
        }
    }

    /// Rehydrate a progress record from persisted storage, checking it against
    /// the module's reference data.
    ///
    /// The stored percentage is ignored and recomputed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if any record invariant does not hold.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        module: &TrainingModule,
        module_id: ModuleId,
        status: ProgressStatus,
        completed_sections: BTreeSet<SectionId>,
        current_section: Option<SectionId>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if module_id != module.id {
            return Err(ProgressError::ModuleMismatch {
                expected: module.id.clone(),
                found: module_id,
            });
        }
        if let Some(unknown) = completed_sections
            .iter()
            .find(|id| !module.contains_section(id))
        {
            return Err(ProgressError::UnknownCompletedSection(unknown.clone()));
        }
        if let Some(current) = current_section
            .as_ref()
            .filter(|id| !module.contains_section(id))
        {
            return Err(ProgressError::UnknownCurrentSection(current.clone()));
        }

        let all_done = completed_sections.len() == module.section_count();
        match (status, all_done) {
            (ProgressStatus::Completed, false) => {
                return Err(ProgressError::InvalidPersistedState(
                    "completed status with unfinished sections".into(),
                ));
            }
            (ProgressStatus::InProgress | ProgressStatus::NotStarted, true) => {
                return Err(ProgressError::InvalidPersistedState(
                    "all sections finished but status is not completed".into(),
                ));
            }
            (ProgressStatus::Completed, true) if completed_at.is_none() => {
                return Err(ProgressError::InvalidPersistedState(
                    "completed status without completed_at".into(),
                ));
            }
            _ => {}
        }

        let progress_percentage = percentage(completed_sections.len(), module.section_count());
        Ok(Self {
            user_id,
            module_id,
            status,
            completed_sections,
            current_section,
            progress_percentage,
            started_at,
            completed_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        self.status
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ProgressStatus::Completed
    }

    #[must_use]
    pub fn completed_sections(&self) -> &BTreeSet<SectionId> {
        &self.completed_sections
    }

    #[must_use]
    pub fn is_section_completed(&self, id: &SectionId) -> bool {
        self.completed_sections.contains(id)
    }

    #[must_use]
    pub fn current_section(&self) -> Option<&SectionId> {
        self.current_section.as_ref()
    }

    /// Share of completed sections, 0..=100, rounded down.
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        self.progress_percentage
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

/// `completed / total * 100`, rounded down; an empty module counts as done.
#[must_use]
pub fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = completed.min(total) * 100 / total;
    u8::try_from(pct).unwrap_or(100)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
