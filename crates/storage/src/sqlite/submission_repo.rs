use wellness_core::model::{ExerciseSubmission, UserId};

use super::{
    SqliteRepository,
    mapping::{conn, map_submission_row, ser, submission_id_from_i64},
};
use crate::repository::{NewSubmission, StorageError, SubmissionQuery, SubmissionRepository};

#[async_trait::async_trait]
impl SubmissionRepository for SqliteRepository {
    async fn append_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<ExerciseSubmission, StorageError> {
        let responses = serde_json::to_string(&submission.responses).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO exercise_submissions (
                    user_id, module_id, exercise_id, section_id,
                    responses, score, feedback, submitted_at, time_spent_secs
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(submission.user_id.as_str())
        .bind(submission.module_id.as_str())
        .bind(submission.exercise_id.as_str())
        .bind(submission.section_id.as_str())
        .bind(responses)
        .bind(submission.score)
        .bind(&submission.feedback)
        .bind(submission.submitted_at.to_rfc3339())
        .bind(i64::from(submission.time_spent_secs))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = submission_id_from_i64(res.last_insert_rowid())?;
        Ok(submission.into_submission(id))
    }

    async fn list_submissions(
        &self,
        user_id: &UserId,
        query: &SubmissionQuery,
    ) -> Result<Vec<ExerciseSubmission>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, user_id, module_id, exercise_id, section_id,
                    responses, score, feedback, submitted_at, time_spent_secs
                FROM exercise_submissions
                WHERE user_id = ?1
                  AND (?2 IS NULL OR module_id = ?2)
                  AND (?3 IS NULL OR exercise_id = ?3)
                ORDER BY id ASC
            ",
        )
        .bind(user_id.as_str())
        .bind(query.module_id.as_ref().map(|m| m.as_str()))
        .bind(query.exercise_id.as_ref().map(|e| e.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_submission_row(&row)?);
        }
        Ok(out)
    }
}
