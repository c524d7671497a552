//! Linear section gating for a single module.
//!
//! Section `0` is always open; section `i > 0` opens once section `i - 1` is
//! completed. The gate is a pure view over a module and a learner's progress
//! record; [`complete_section`] is the only transition.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    ModuleCatalog, ModuleId, ModuleProgress, ModuleSection, ProgressStatus, SectionId,
    TrainingModule, UserId, percentage,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    #[error("section {section} does not belong to module {module}")]
    UnknownSection { module: ModuleId, section: SectionId },

    #[error("section {0} is locked until the previous section is completed")]
    SectionLocked(SectionId),

    #[error("progress record is for module {found}, not {expected}")]
    ModuleMismatch { expected: ModuleId, found: ModuleId },
}

/// Display state of a section for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionAccess {
    Completed,
    Current,
    Available,
    Locked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionState<'a> {
    pub index: usize,
    pub section: &'a ModuleSection,
    pub access: SectionAccess,
}

/// Outcome of marking a section complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCompletion {
    pub section: SectionId,
    /// False when the section had already been completed.
    pub newly_completed: bool,
    /// True only for the call that moved the module to `Completed`.
    pub module_completed: bool,
    pub next_section: Option<SectionId>,
    pub progress_percentage: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressGate<'a> {
    module: &'a TrainingModule,
    progress: &'a ModuleProgress,
}

impl<'a> ProgressGate<'a> {
    /// # Errors
    ///
    /// Returns `GateError::ModuleMismatch` if the record belongs to another module.
    pub fn new(
        module: &'a TrainingModule,
        progress: &'a ModuleProgress,
    ) -> Result<Self, GateError> {
        ensure_same_module(module, progress)?;
        Ok(Self { module, progress })
    }

    #[must_use]
    pub fn is_accessible(&self, index: usize) -> bool {
        is_accessible(self.module, self.progress, index)
    }

    #[must_use]
    pub fn is_section_accessible(&self, id: &SectionId) -> bool {
        self.module
            .section_index(id)
            .is_some_and(|i| self.is_accessible(i))
    }

    /// Index of the section the learner should work on next.
    ///
    /// The tracked pointer wins while it names an open, unfinished section;
    /// otherwise the first unfinished open section is used. `None` once every
    /// section is completed.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        let tracked = self
            .progress
            .current_section()
            .and_then(|id| self.module.section_index(id))
            .filter(|&i| {
                self.is_accessible(i) && !self.progress.is_section_completed(&self.module.sections[i].id)
            });

        tracked.or_else(|| {
            self.module
                .sections
                .iter()
                .enumerate()
                .find(|(i, s)| {
                    !self.progress.is_section_completed(&s.id) && self.is_accessible(*i)
                })
                .map(|(i, _)| i)
        })
    }

    #[must_use]
    pub fn section_states(&self) -> Vec<SectionState<'a>> {
        let current = self.current_index();
        self.module
            .sections
            .iter()
            .enumerate()
            .map(|(index, section)| {
                let access = if self.progress.is_section_completed(&section.id) {
                    SectionAccess::Completed
                } else if Some(index) == current {
                    SectionAccess::Current
                } else if self.is_accessible(index) {
                    SectionAccess::Available
                } else {
                    SectionAccess::Locked
                };
                SectionState {
                    index,
                    section,
                    access,
                }
            })
            .collect()
    }
}

fn ensure_same_module(module: &TrainingModule, progress: &ModuleProgress) -> Result<(), GateError> {
    if progress.module_id() != &module.id {
        return Err(GateError::ModuleMismatch {
            expected: module.id.clone(),
            found: progress.module_id().clone(),
        });
    }
    Ok(())
}

fn is_accessible(module: &TrainingModule, progress: &ModuleProgress, index: usize) -> bool {
    match index {
        0 => !module.sections.is_empty(),
        i if i < module.sections.len() => {
            progress.is_section_completed(&module.sections[i - 1].id)
        }
        _ => false,
    }
}

/// Marks `section_id` complete and advances the module state machine.
///
/// Completing an already completed section changes nothing.
///
/// # Errors
///
/// Returns `GateError::UnknownSection` if the section is not part of the module,
/// and `GateError::SectionLocked` if its predecessor is still open.
pub fn complete_section(
    module: &TrainingModule,
    progress: &mut ModuleProgress,
    section_id: &SectionId,
    now: DateTime<Utc>,
) -> Result<SectionCompletion, GateError> {
    ensure_same_module(module, progress)?;
    let index = module
        .section_index(section_id)
        .ok_or_else(|| GateError::UnknownSection {
            module: module.id.clone(),
            section: section_id.clone(),
        })?;

    let newly_completed = !progress.is_section_completed(section_id);
    if newly_completed && !is_accessible(module, progress, index) {
        return Err(GateError::SectionLocked(section_id.clone()));
    }

    let was_completed = progress.is_completed();
    if newly_completed {
        progress.completed_sections.insert(section_id.clone());
        if let Some(next) = module.sections.get(index + 1) {
            progress.current_section = Some(next.id.clone());
        }
    }
    progress.progress_percentage =
        percentage(progress.completed_sections.len(), module.section_count());

    let all_done = module
        .sections
        .iter()
        .all(|s| progress.is_section_completed(&s.id));
    let module_completed = all_done && !was_completed;
    if module_completed {
        progress.status = ProgressStatus::Completed;
        progress.completed_at = Some(now);
    }

    Ok(SectionCompletion {
        section: section_id.clone(),
        newly_completed,
        module_completed,
        next_section: progress.current_section.clone(),
        progress_percentage: progress.progress_percentage,
    })
}

/// Status of every catalog module for one learner, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOverview {
    pub module_id: ModuleId,
    pub number: u32,
    pub title: String,
    pub status: ProgressStatus,
    pub progress_percentage: u8,
}

#[must_use]
pub fn overview(catalog: &ModuleCatalog, records: &[ModuleProgress]) -> Vec<ModuleOverview> {
    catalog
        .iter()
        .map(|module| {
            let record = records.iter().find(|r| r.module_id() == &module.id);
            ModuleOverview {
                module_id: module.id.clone(),
                number: module.number,
                title: module.title.clone(),
                status: record.map_or(ProgressStatus::NotStarted, ModuleProgress::status),
                progress_percentage: record.map_or(0, ModuleProgress::progress_percentage),
            }
        })
        .collect()
}

/// Rebuilds a record from its completed sections by replaying them in module
/// order through [`complete_section`].
///
/// Status, pointer and percentage follow from coverage alone. Sections the
/// module no longer has, and anything after the first gap, are dropped.
/// `finished_at` stamps the module completion if the replay reaches it.
#[must_use]
pub fn rebuild_progress(
    module: &TrainingModule,
    user_id: UserId,
    completed: &BTreeSet<SectionId>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> ModuleProgress {
    let mut progress = ModuleProgress::start(user_id, module, started_at);
    for section in &module.sections {
        if !completed.contains(&section.id)
            || complete_section(module, &mut progress, &section.id, finished_at).is_err()
        {
            break;
        }
    }
    progress
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
