use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use wellness_core::model::{ModuleCatalog, ModuleProgress, SectionId, TrainingModule, UserId};

use super::{
    SqliteRepository,
    mapping::{conn, map_progress_row, ser},
};
use crate::repository::{ProgressRepository, StorageError, merge_progress};

const SELECT_PROGRESS: &str = r"
    SELECT user_id, module_id, status, current_section_id,
           progress_percentage, started_at, completed_at
    FROM module_progress
    WHERE user_id = ?1 AND module_id = ?2
";

async fn completed_sections(
    db: &mut SqliteConnection,
    user_id: &UserId,
    module: &TrainingModule,
) -> Result<BTreeSet<SectionId>, StorageError> {
    let rows = sqlx::query(
        r"
            SELECT section_id
            FROM completed_sections
            WHERE user_id = ?1 AND module_id = ?2
        ",
    )
    .bind(user_id.as_str())
    .bind(module.id.as_str())
    .fetch_all(&mut *db)
    .await
    .map_err(conn)?;

    rows.iter()
        .map(|row| {
            row.try_get::<String, _>("section_id")
                .map(SectionId::new)
                .map_err(ser)
        })
        .collect()
}

async fn load(
    db: &mut SqliteConnection,
    user_id: &UserId,
    module: &TrainingModule,
) -> Result<Option<ModuleProgress>, StorageError> {
    let row = sqlx::query(SELECT_PROGRESS)
        .bind(user_id.as_str())
        .bind(module.id.as_str())
        .fetch_optional(&mut *db)
        .await
        .map_err(conn)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let completed = completed_sections(db, user_id, module).await?;
    map_progress_row(&row, module, completed).map(Some)
}

async fn upsert_progress(
    db: &mut SqliteConnection,
    progress: &ModuleProgress,
    now: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
            INSERT INTO module_progress (
                user_id, module_id, status, current_section_id,
                progress_percentage, started_at, completed_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, module_id) DO UPDATE SET
                -- started_at is fixed by the first insert
                status = excluded.status,
                current_section_id = excluded.current_section_id,
                progress_percentage = excluded.progress_percentage,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
        ",
    )
    .bind(progress.user_id().as_str())
    .bind(progress.module_id().as_str())
    .bind(progress.status().as_str())
    .bind(progress.current_section().map(SectionId::as_str))
    .bind(i64::from(progress.progress_percentage()))
    .bind(progress.started_at())
    .bind(progress.completed_at())
    .bind(now)
    .execute(&mut *db)
    .await
    .map_err(conn)?;
    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_module_progress(
        &self,
        user_id: &UserId,
        module: &TrainingModule,
    ) -> Result<Option<ModuleProgress>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        load(&mut db, user_id, module).await
    }

    async fn start_module(
        &self,
        user_id: &UserId,
        module: &TrainingModule,
        now: DateTime<Utc>,
    ) -> Result<ModuleProgress, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        if let Some(existing) = load(&mut tx, user_id, module).await? {
            tx.commit().await.map_err(conn)?;
            return Ok(existing);
        }

        let progress = ModuleProgress::start(user_id.clone(), module, now);
        upsert_progress(&mut tx, &progress, now).await?;
        tx.commit().await.map_err(conn)?;

        tracing::debug!(user = %user_id, module = %module.id, "module progress created");
        Ok(progress)
    }

    async fn record_section_completion(
        &self,
        module: &TrainingModule,
        progress: &ModuleProgress,
        section_id: &SectionId,
        now: DateTime<Utc>,
    ) -> Result<ModuleProgress, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let stored = load(&mut tx, progress.user_id(), module).await?;
        let merged = merge_progress(module, stored.as_ref(), progress, section_id, now)?;
        upsert_progress(&mut tx, &merged, now).await?;

        for section in merged.completed_sections() {
            if stored
                .as_ref()
                .is_some_and(|s| s.is_section_completed(section))
            {
                continue;
            }
            sqlx::query(
                r"
                    INSERT INTO completed_sections (user_id, module_id, section_id, completed_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(user_id, module_id, section_id) DO NOTHING
                ",
            )
            .bind(merged.user_id().as_str())
            .bind(module.id.as_str())
            .bind(section.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(merged)
    }

    async fn list_user_progress(
        &self,
        user_id: &UserId,
        catalog: &ModuleCatalog,
    ) -> Result<Vec<ModuleProgress>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        let mut out = Vec::new();
        for module in catalog.iter() {
            match load(&mut db, user_id, module).await {
                Ok(Some(progress)) => out.push(progress),
                Ok(None) => {}
                Err(StorageError::Serialization(reason)) => {
                    tracing::warn!(
                        user = %user_id,
                        module = %module.id,
                        %reason,
                        "skipping unreadable progress record"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}
