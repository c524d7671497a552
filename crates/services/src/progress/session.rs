use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use wellness_core::gate::{self, GateError, ProgressGate, SectionCompletion};
use wellness_core::model::{ModuleId, ModuleProgress, SectionId, TrainingModule};

//
// ─── WARNINGS ──────────────────────────────────────────────────────────────────
//

/// A write that did not reach the ledger.
///
/// The local view has already moved on; the write is retried on the next sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceWarning {
    pub module_id: ModuleId,
    pub section_id: Option<SectionId>,
    pub reason: String,
}

impl fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section_id {
            Some(section) => write!(
                f,
                "progress for section {section} of module {} was not saved: {}",
                self.module_id, self.reason
            ),
            None => write!(
                f,
                "progress for module {} was not saved: {}",
                self.module_id, self.reason
            ),
        }
    }
}

//
// ─── RECONCILIATION ────────────────────────────────────────────────────────────
//

/// Handle for one authoritative read, tied to the local generation it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

/// Result of folding an authoritative record into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Every local completion is confirmed.
    InSync,
    /// The ledger is missing local completions; they are kept locally and
    /// retried on the next sync.
    Diverged { unconfirmed_sections: Vec<SectionId> },
    /// A local write happened after the read was issued; the read was discarded.
    Stale,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// A learner's working copy of one module.
///
/// `local` is what the learner sees and may run ahead of `confirmed`, the last
/// state known to be in the ledger. Sections completed locally but not yet
/// written are tracked in module order.
///
/// A detached session was started without reading the ledger. It issues no
/// writes until an authoritative record has been folded in.
#[derive(Debug, Clone)]
pub struct ModuleSession {
    module: TrainingModule,
    local: ModuleProgress,
    confirmed: ModuleProgress,
    unconfirmed: Vec<SectionId>,
    generation: u64,
    detached: bool,
}

impl ModuleSession {
    /// Session over a record read from the ledger.
    ///
    /// # Errors
    ///
    /// Returns `GateError::ModuleMismatch` if `progress` belongs to another module.
    pub fn new(module: TrainingModule, progress: ModuleProgress) -> Result<Self, GateError> {
        ProgressGate::new(&module, &progress)?;
        Ok(Self {
            module,
            local: progress.clone(),
            confirmed: progress,
            unconfirmed: Vec::new(),
            generation: 0,
            detached: false,
        })
    }

    /// Session over a locally started record the ledger has not confirmed.
    ///
    /// # Errors
    ///
    /// Returns `GateError::ModuleMismatch` if `progress` belongs to another module.
    pub fn detached(module: TrainingModule, progress: ModuleProgress) -> Result<Self, GateError> {
        let mut session = Self::new(module, progress)?;
        session.detached = true;
        Ok(session)
    }

    /// True until an authoritative record has been applied.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    #[must_use]
    pub fn module(&self) -> &TrainingModule {
        &self.module
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module.id
    }

    /// The optimistic view shown to the learner.
    #[must_use]
    pub fn local(&self) -> &ModuleProgress {
        &self.local
    }

    #[must_use]
    pub fn confirmed(&self) -> &ModuleProgress {
        &self.confirmed
    }

    #[must_use]
    pub fn unconfirmed_sections(&self) -> &[SectionId] {
        &self.unconfirmed
    }

    #[must_use]
    pub fn is_confirmed(&self, section: &SectionId) -> bool {
        !self.unconfirmed.contains(section)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Gate over the local view.
    ///
    /// # Errors
    ///
    /// Never fails for a session built through [`ModuleSession::new`].
    pub fn gate(&self) -> Result<ProgressGate<'_>, GateError> {
        ProgressGate::new(&self.module, &self.local)
    }

    /// Applies a completion to the local view only.
    ///
    /// # Errors
    ///
    /// Returns `GateError` if the section is unknown or still locked.
    pub fn complete_locally(
        &mut self,
        section_id: &SectionId,
        now: DateTime<Utc>,
    ) -> Result<SectionCompletion, GateError> {
        let completion = gate::complete_section(&self.module, &mut self.local, section_id, now)?;
        if completion.newly_completed {
            self.generation += 1;
            self.track_unconfirmed(section_id.clone());
        }
        Ok(completion)
    }

    /// Next write needed to bring the ledger up to the local view.
    ///
    /// The snapshot is the confirmed record plus the first unconfirmed
    /// section, so every write leaves the ledger in a state the gate accepts.
    /// Detached sessions have nothing to write against and return `None`.
    pub(crate) fn next_write(&mut self, now: DateTime<Utc>) -> Option<(ModuleProgress, SectionId)> {
        if self.detached {
            return None;
        }
        let at = self.local.completed_at().unwrap_or(now);
        while let Some(section) = self.unconfirmed.first().cloned() {
            let mut snapshot = self.confirmed.clone();
            match gate::complete_section(&self.module, &mut snapshot, &section, at) {
                Ok(_) => return Some((snapshot, section)),
                Err(err) => {
                    tracing::warn!(
                        module = %self.module.id,
                        section = %section,
                        error = %err,
                        "dropping unconfirmed section that no longer applies"
                    );
                    self.unconfirmed.remove(0);
                }
            }
        }
        None
    }

    /// Records that `section` reached the ledger, which now holds `stored`.
    ///
    /// Completions the ledger had that the local view lacked are taken over.
    pub(crate) fn confirm(
        &mut self,
        stored: ModuleProgress,
        section: &SectionId,
        now: DateTime<Utc>,
    ) {
        self.unconfirmed.retain(|s| s != section);
        let behind = stored
            .completed_sections()
            .iter()
            .any(|id| !self.local.is_section_completed(id));
        if behind {
            let completed: BTreeSet<SectionId> = self
                .local
                .completed_sections()
                .union(stored.completed_sections())
                .cloned()
                .collect();
            let finished_at = stored
                .completed_at()
                .or(self.local.completed_at())
                .unwrap_or(now);
            self.local = gate::rebuild_progress(
                &self.module,
                self.local.user_id().clone(),
                &completed,
                stored.started_at(),
                finished_at,
            );
        }
        self.confirmed = stored;
    }

    /// Starts an authoritative read.
    #[must_use]
    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket {
            generation: self.generation,
        }
    }

    /// Folds an authoritative record into the session.
    ///
    /// Local completions missing from `authoritative` are replayed on top of it
    /// so the learner is never pushed back.
    ///
    /// # Errors
    ///
    /// Returns `GateError::ModuleMismatch` if the record belongs to another module.
    pub fn apply_refresh(
        &mut self,
        ticket: RefreshTicket,
        authoritative: ModuleProgress,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, GateError> {
        ProgressGate::new(&self.module, &authoritative)?;
        if ticket.generation != self.generation {
            tracing::debug!(module = %self.module.id, "discarding stale progress read");
            return Ok(Reconciliation::Stale);
        }

        let missing: Vec<SectionId> = self
            .module
            .sections
            .iter()
            .map(|s| &s.id)
            .filter(|id| {
                self.local.is_section_completed(id) && !authoritative.is_section_completed(id)
            })
            .cloned()
            .collect();

        let at = self.local.completed_at().unwrap_or(now);
        let mut local = authoritative.clone();
        let mut kept = Vec::with_capacity(missing.len());
        for section in missing {
            match gate::complete_section(&self.module, &mut local, &section, at) {
                Ok(_) => kept.push(section),
                Err(err) => tracing::warn!(
                    module = %self.module.id,
                    section = %section,
                    error = %err,
                    "local completion no longer applies"
                ),
            }
        }

        self.confirmed = authoritative;
        self.local = local;
        self.unconfirmed.clone_from(&kept);
        self.detached = false;

        if kept.is_empty() {
            Ok(Reconciliation::InSync)
        } else {
            Ok(Reconciliation::Diverged {
                unconfirmed_sections: kept,
            })
        }
    }

    fn track_unconfirmed(&mut self, section: SectionId) {
        self.unconfirmed.push(section);
        let module = &self.module;
        self.unconfirmed
            .sort_by_key(|id| module.section_index(id).unwrap_or(usize::MAX));
    }
}
