//! Operational store gateway (classes, users)
//!
//! The monitor reads ended classes and mutates exactly one column:
//! `ai_triggered`. The conditional update on that flag is the only
//! synchronization primitive between concurrent monitor instances.

use crate::models::EndedClass;
use crate::{time, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Connect to the operational store and bootstrap the schema if needed.
///
/// Safe to call from multiple processes; all DDL is idempotent.
pub async fn init_operational_store(dsn: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(dsn).await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_users_table(&pool).await?;
    create_classes_table(&pool).await?;

    info!("Operational store ready");
    Ok(pool)
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            email TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_classes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classes (
            class_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            meeting_start TEXT,
            meeting_end TEXT,
            zoom_id TEXT,
            ai_triggered INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Covers the monitor's snapshot query
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_classes_ended
         ON classes (status, ai_triggered, meeting_end)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Snapshot query: ended classes not yet dispatched, oldest first.
///
/// Selection is advisory; the conditional update in
/// [`mark_class_triggered`] is authoritative under concurrent monitors.
pub async fn fetch_ended_classes(pool: &SqlitePool, batch_size: u32) -> Result<Vec<EndedClass>> {
    let rows = sqlx::query_as::<
        _,
        (
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        ),
    >(
        r#"
        SELECT
            c.class_id,
            c.student_id,
            c.teacher_id,
            c.meeting_start,
            c.meeting_end,
            c.zoom_id,
            u.email AS teacher_email
        FROM classes c
        LEFT JOIN users u ON u.user_id = c.teacher_id
        WHERE c.status = 'ended'
          AND c.meeting_end IS NOT NULL
          AND (c.ai_triggered IS NULL OR c.ai_triggered = 0)
        ORDER BY c.meeting_end ASC
        LIMIT ?
        "#,
    )
    .bind(batch_size as i64)
    .fetch_all(pool)
    .await?;

    let mut classes = Vec::with_capacity(rows.len());
    for (class_id, student_id, teacher_id, meeting_start, meeting_end, zoom_id, teacher_email) in
        rows
    {
        let start = meeting_start.as_deref().and_then(time::parse_meeting_time);
        let end = meeting_end.as_deref().and_then(time::parse_meeting_time);
        match (start, end) {
            (Some(meeting_start), Some(meeting_end)) => classes.push(EndedClass {
                class_id,
                student_id,
                teacher_id,
                meeting_start,
                meeting_end,
                zoom_id,
                teacher_email,
            }),
            _ => {
                warn!(
                    class_id = %class_id,
                    "Skipping ended class with unparseable meeting times"
                );
            }
        }
    }

    Ok(classes)
}

/// Compare-and-set the dispatch guard flag.
///
/// Returns `true` if this caller won the flag (exactly one instance can),
/// `false` if another monitor already set it.
pub async fn mark_class_triggered(pool: &SqlitePool, class_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE classes
        SET ai_triggered = 1,
            updated_at = ?
        WHERE class_id = ?
          AND (ai_triggered IS NULL OR ai_triggered = 0)
        "#,
    )
    .bind(time::now_rfc3339())
    .bind(class_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
