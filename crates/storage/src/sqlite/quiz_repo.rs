use course_core::model::{CourseId, QuizCounts, VideoId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, course_id, ser, video_id, video_id_from_i64, write_err};
use crate::repository::{QuizRepository, StorageError};

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn set_question_count(&self, video: VideoId, questions: u32) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO quiz_questions (video_id, question_count)
            VALUES (?1, ?2)
            ON CONFLICT(video_id) DO UPDATE SET question_count = excluded.question_count
            ",
        )
        .bind(video_id(video)?)
        .bind(i64::from(questions))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn quiz_counts(&self, course: CourseId) -> Result<QuizCounts, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT q.video_id, q.question_count
            FROM quiz_questions q
            JOIN videos v ON v.id = q.video_id
            WHERE v.course_id = ?1
            ",
        )
        .bind(course_id(course)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut counts = QuizCounts::new();
        for row in rows {
            let video = video_id_from_i64(row.try_get::<i64, _>("video_id").map_err(ser)?)?;
            let n: i64 = row.try_get("question_count").map_err(ser)?;
            let n = u32::try_from(n)
                .map_err(|_| StorageError::Serialization(format!("invalid question_count: {n}")))?;
            counts.set(video, n);
        }
        Ok(counts)
    }
}
