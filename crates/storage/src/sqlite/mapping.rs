use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::Row;
use wellness_core::model::{
    ExerciseId, ExerciseSubmission, ModuleId, ModuleProgress, ModuleSection, ProgressStatus,
    Responses, SectionId, SubmissionId, TrainingModule, UserId,
};

use crate::repository::{PersistedProgress, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn submission_id_from_i64(v: i64) -> Result<SubmissionId, StorageError> {
    u64::try_from(v)
        .map(SubmissionId::new)
        .map_err(|_| StorageError::Serialization("submission_id sign overflow".into()))
}

pub(crate) fn map_module_row(row: &sqlx::sqlite::SqliteRow) -> Result<TrainingModule, StorageError> {
    let number: i64 = row.try_get("number").map_err(ser)?;
    let sections_json: String = row.try_get("sections").map_err(ser)?;
    let sections: Vec<ModuleSection> = serde_json::from_str(&sections_json).map_err(ser)?;

    Ok(TrainingModule {
        id: ModuleId::new(row.try_get::<String, _>("id").map_err(ser)?),
        number: u32::try_from(number)
            .map_err(|_| StorageError::Serialization(format!("invalid module number: {number}")))?,
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        sections,
    })
}

pub(crate) fn parse_status(s: &str) -> Result<ProgressStatus, StorageError> {
    ProgressStatus::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid status: {s}")))
}

/// Rebuilds a progress record; `completed` comes from `completed_sections`.
pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
    module: &TrainingModule,
    completed: BTreeSet<SectionId>,
) -> Result<ModuleProgress, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    PersistedProgress {
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?),
        module_id: ModuleId::new(row.try_get::<String, _>("module_id").map_err(ser)?),
        status: parse_status(&status_str)?,
        completed,
        current_section: row
            .try_get::<Option<String>, _>("current_section_id")
            .map_err(ser)?
            .map(SectionId::new),
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    }
    .restore(module)
}

/// Ledger timestamps are written as RFC 3339 text. Anything else reads back as
/// `None` so one bad row cannot fail the whole history.
pub(crate) fn parse_submitted_at(id: SubmissionId, raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(err) => {
            tracing::warn!(submission = %id, value = %raw, error = %err, "unreadable submitted_at");
            None
        }
    }
}

pub(crate) fn map_submission_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ExerciseSubmission, StorageError> {
    let id = submission_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let responses_json: String = row.try_get("responses").map_err(ser)?;
    let responses: Responses = serde_json::from_str(&responses_json).unwrap_or_else(|err| {
        tracing::warn!(submission = %id, error = %err, "unreadable responses, using empty map");
        Responses::new()
    });
    let time_spent: i64 = row.try_get("time_spent_secs").map_err(ser)?;

    Ok(ExerciseSubmission {
        id,
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?),
        module_id: ModuleId::new(row.try_get::<String, _>("module_id").map_err(ser)?),
        exercise_id: ExerciseId::new(row.try_get::<String, _>("exercise_id").map_err(ser)?),
        section_id: SectionId::new(row.try_get::<String, _>("section_id").map_err(ser)?),
        responses,
        score: row.try_get("score").map_err(ser)?,
        feedback: row.try_get("feedback").map_err(ser)?,
        submitted_at: parse_submitted_at(id, row.try_get("submitted_at").map_err(ser)?),
        time_spent_secs: u32::try_from(time_spent).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellness_core::time::fixed_now;

    #[test]
    fn submitted_at_roundtrips_rfc3339() {
        let id = SubmissionId::new(1);
        let raw = fixed_now().to_rfc3339();
        assert_eq!(parse_submitted_at(id, Some(raw)), Some(fixed_now()));
    }

    #[test]
    fn garbage_submitted_at_reads_as_missing() {
        let id = SubmissionId::new(1);
        assert_eq!(parse_submitted_at(id, Some("yesterday-ish".into())), None);
        assert_eq!(parse_submitted_at(id, None), None);
    }

    #[test]
    fn offset_timestamps_are_normalised() {
        let id = SubmissionId::new(1);
        let parsed = parse_submitted_at(id, Some("2023-11-14T23:13:20+01:00".into()));
        assert_eq!(parsed, Some(fixed_now()));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(parse_status("paused").is_err());
        assert_eq!(parse_status("completed").unwrap(), ProgressStatus::Completed);
    }
}
