use wellness_core::model::{ModuleId, TrainingModule};

use super::{
    SqliteRepository,
    mapping::{conn, map_module_row, ser},
};
use crate::repository::{ModuleRepository, StorageError};

#[async_trait::async_trait]
impl ModuleRepository for SqliteRepository {
    async fn upsert_module(&self, module: &TrainingModule) -> Result<(), StorageError> {
        let sections = serde_json::to_string(&module.sections).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO modules (id, number, title, description, sections)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    number = excluded.number,
                    title = excluded.title,
                    description = excluded.description,
                    sections = excluded.sections
            ",
        )
        .bind(module.id.as_str())
        .bind(i64::from(module.number))
        .bind(&module.title)
        .bind(module.description.as_deref())
        .bind(sections)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_module(&self, id: &ModuleId) -> Result<Option<TrainingModule>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, number, title, description, sections
                FROM modules
                WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_module_row).transpose()
    }

    async fn list_modules(&self) -> Result<Vec<TrainingModule>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, number, title, description, sections
                FROM modules
                ORDER BY number ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_module_row).collect()
    }
}
