use chrono::{DateTime, Utc};
use course_core::model::{
    CourseId, LearnerId, ProgressMap, QuizOutcome, VideoId, VideoProgress, WatchUpdate,
};

use super::SqliteRepository;
use super::mapping::{conn, course_id, learner_id, map_progress_row, video_id, write_err};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn progress_for_course(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<ProgressMap, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                p.video_id, p.completed, p.watch_time, p.test_passed,
                p.test_score, p.test_attempts, p.updated_at
            FROM video_progress p
            JOIN videos v ON v.id = p.video_id
            WHERE p.learner_id = ?1 AND v.course_id = ?2
            ",
        )
        .bind(learner_id(learner)?)
        .bind(course_id(course)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn record_watch(
        &self,
        learner: LearnerId,
        video: VideoId,
        update: WatchUpdate,
        at: DateTime<Utc>,
    ) -> Result<VideoProgress, StorageError> {
        // Only the watch columns are written; MAX keeps both monotonic.
        let row = sqlx::query(
            r"
            INSERT INTO video_progress (learner_id, video_id, completed, watch_time, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(learner_id, video_id) DO UPDATE SET
                completed = MAX(completed, excluded.completed),
                watch_time = MAX(watch_time, excluded.watch_time),
                updated_at = excluded.updated_at
            RETURNING
                video_id, completed, watch_time, test_passed,
                test_score, test_attempts, updated_at
            ",
        )
        .bind(learner_id(learner)?)
        .bind(video_id(video)?)
        .bind(i64::from(update.finished))
        .bind(i64::from(update.watched_secs))
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;

        map_progress_row(&row).map(|(_, progress)| progress)
    }

    async fn record_quiz(
        &self,
        learner: LearnerId,
        video: VideoId,
        outcome: QuizOutcome,
        at: DateTime<Utc>,
    ) -> Result<VideoProgress, StorageError> {
        // Only the quiz columns are written; a pass is never downgraded.
        let row = sqlx::query(
            r"
            INSERT INTO video_progress (
                learner_id, video_id, test_passed, test_score, test_attempts, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, 1, ?5)
            ON CONFLICT(learner_id, video_id) DO UPDATE SET
                test_passed = MAX(test_passed, excluded.test_passed),
                test_score = excluded.test_score,
                test_attempts = test_attempts + 1,
                updated_at = excluded.updated_at
            RETURNING
                video_id, completed, watch_time, test_passed,
                test_score, test_attempts, updated_at
            ",
        )
        .bind(learner_id(learner)?)
        .bind(video_id(video)?)
        .bind(i64::from(outcome.passed()))
        .bind(i64::from(outcome.score()))
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;

        map_progress_row(&row).map(|(_, progress)| progress)
    }
}
