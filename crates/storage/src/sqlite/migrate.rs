use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the ledger schema.
///
/// Version 1 creates modules, progress records, completed sections and the
/// submission ledger with their indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS modules (
                id TEXT PRIMARY KEY,
                number INTEGER NOT NULL CHECK (number >= 0),
                title TEXT NOT NULL,
                description TEXT,
                sections TEXT NOT NULL
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS module_progress (
                user_id TEXT NOT NULL,
                module_id TEXT NOT NULL,
                status TEXT NOT NULL
                    CHECK (status IN ('not_started', 'in_progress', 'completed')),
                current_section_id TEXT,
                progress_percentage INTEGER NOT NULL
                    CHECK (progress_percentage BETWEEN 0 AND 100),
                started_at TEXT NOT NULL,
                completed_at TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, module_id),
                FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS completed_sections (
                user_id TEXT NOT NULL,
                module_id TEXT NOT NULL,
                section_id TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (user_id, module_id, section_id),
                FOREIGN KEY (user_id, module_id)
                    REFERENCES module_progress(user_id, module_id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    // submitted_at and score are unconstrained; malformed rows are screened
    // per rule when achievements are evaluated.
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS exercise_submissions (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                module_id TEXT NOT NULL,
                exercise_id TEXT NOT NULL,
                section_id TEXT NOT NULL,
                responses TEXT NOT NULL,
                score INTEGER,
                feedback TEXT NOT NULL DEFAULT '',
                submitted_at TEXT,
                time_spent_secs INTEGER NOT NULL DEFAULT 0 CHECK (time_spent_secs >= 0)
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_modules_number
                ON modules(number);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_submissions_user_module_exercise
                ON exercise_submissions (user_id, module_id, exercise_id, id);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
