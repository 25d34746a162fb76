use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS sections (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            section_id INTEGER,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_questions (
            video_id INTEGER PRIMARY KEY,
            question_count INTEGER NOT NULL CHECK (question_count >= 0),
            FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrollments (
            learner_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            enrolled_at TEXT NOT NULL,
            PRIMARY KEY (learner_id, course_id),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS video_progress (
            learner_id INTEGER NOT NULL,
            video_id INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0 CHECK (completed IN (0, 1)),
            watch_time INTEGER NOT NULL DEFAULT 0 CHECK (watch_time >= 0),
            test_passed INTEGER NOT NULL DEFAULT 0 CHECK (test_passed IN (0, 1)),
            test_score INTEGER CHECK (test_score BETWEEN 0 AND 100),
            test_attempts INTEGER NOT NULL DEFAULT 0 CHECK (test_attempts >= 0),
            updated_at TEXT,
            PRIMARY KEY (learner_id, video_id),
            FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sections_course
            ON sections (course_id, position);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_videos_course
            ON videos (course_id, section_id, position);
    ",
];

/// Applies versioned schema migrations, recording each in `schema_migrations`.
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

    // Version 1: outline, quizzes, enrollments, progress.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

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
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
