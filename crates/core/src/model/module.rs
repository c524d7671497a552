use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ids::{ExerciseId, ModuleId, SectionId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("duplicate module id in catalog: {0}")]
    DuplicateModule(ModuleId),

    #[error("module {0} has no sections")]
    EmptyModule(ModuleId),

    #[error("duplicate section id {section} in module {module}")]
    DuplicateSection { module: ModuleId, section: SectionId },
}

//
// ─── EXERCISES ────────────────────────────────────────────────────────────────
//

/// Kind of interactive exercise. Each kind is backed by its own input form;
/// the progress engine never looks inside the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    BreathingTimer,
    MoodTracker,
    HabitAnalyzer,
    GoalSetter,
    Quiz,
    JournalPrompt,
    GratitudeLog,
    BodyScan,
    Reflection,
    ValueSorter,
    ThoughtRecord,
    SleepLog,
    AffirmationBuilder,
    StressThermometer,
    Visualization,
    SelfAssessment,
    ActionPlan,
    Checklist,
    ScenarioChoice,
    EnergyAudit,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleExercise {
    pub id: ExerciseId,
    pub kind: ExerciseKind,
    #[serde(default)]
    pub instructions: String,
    /// Per-kind form configuration, opaque to this crate.
    #[serde(default)]
    pub config: Value,
}

//
// ─── SECTIONS & MODULES ───────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSection {
    pub id: SectionId,
    pub number: u32,
    #[serde(default)]
    pub title: String,
    /// Instructional content blocks, rendered by the presentation layer.
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub exercises: Vec<ModuleExercise>,
}

impl ModuleSection {
    #[must_use]
    pub fn exercise(&self, id: &ExerciseId) -> Option<&ModuleExercise> {
        self.exercises.iter().find(|e| &e.id == id)
    }
}

/// Immutable reference data for a training module.
///
/// Section order is the gating order: section `i` unlocks once section `i - 1`
/// is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingModule {
    pub id: ModuleId,
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub sections: Vec<ModuleSection>,
}

impl TrainingModule {
    /// Checks that the module has sections and that section ids are unique.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` describing the first violation found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.sections.is_empty() {
            return Err(CatalogError::EmptyModule(self.id.clone()));
        }
        for (i, section) in self.sections.iter().enumerate() {
            if self.sections[..i].iter().any(|s| s.id == section.id) {
                return Err(CatalogError::DuplicateSection {
                    module: self.id.clone(),
                    section: section.id.clone(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn section_index(&self, id: &SectionId) -> Option<usize> {
        self.sections.iter().position(|s| &s.id == id)
    }

    #[must_use]
    pub fn section(&self, id: &SectionId) -> Option<&ModuleSection> {
        self.sections.iter().find(|s| &s.id == id)
    }

    #[must_use]
    pub fn contains_section(&self, id: &SectionId) -> bool {
        self.section_index(id).is_some()
    }

    /// Finds an exercise anywhere in the module.
    #[must_use]
    pub fn exercise(&self, id: &ExerciseId) -> Option<&ModuleExercise> {
        self.sections.iter().find_map(|s| s.exercise(id))
    }

    #[must_use]
    pub fn section_of_exercise(&self, id: &ExerciseId) -> Option<&ModuleSection> {
        self.sections.iter().find(|s| s.exercise(id).is_some())
    }
}

//
// ─── CATALOG ──────────────────────────────────────────────────────────────────
//

/// Ordered list of modules. Succession between modules comes from this order,
/// never from the shape of a module id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleCatalog {
    modules: Vec<TrainingModule>,
}

impl ModuleCatalog {
    /// Builds a catalog sorted by module `number`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for duplicate module ids or invalid modules.
    pub fn new(mut modules: Vec<TrainingModule>) -> Result<Self, CatalogError> {
        modules.sort_by_key(|m| m.number);
        for (i, module) in modules.iter().enumerate() {
            module.validate()?;
            if modules[..i].iter().any(|m| m.id == module.id) {
                return Err(CatalogError::DuplicateModule(module.id.clone()));
            }
        }
        Ok(Self { modules })
    }

    #[must_use]
    pub fn get(&self, id: &ModuleId) -> Option<&TrainingModule> {
        self.modules.iter().find(|m| &m.id == id)
    }

    #[must_use]
    pub fn first(&self) -> Option<&TrainingModule> {
        self.modules.first()
    }

    /// Returns the module that follows `id` in catalog order.
    #[must_use]
    pub fn next_after(&self, id: &ModuleId) -> Option<&TrainingModule> {
        let idx = self.modules.iter().position(|m| &m.id == id)?;
        self.modules.get(idx + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainingModule> {
        self.modules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    #[must_use]
    pub fn into_modules(self) -> Vec<TrainingModule> {
        self.modules
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
