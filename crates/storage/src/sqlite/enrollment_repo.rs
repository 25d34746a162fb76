use course_core::model::{CourseId, Enrollment, LearnerId};

use super::SqliteRepository;
use super::mapping::{conn, course_id, learner_id, write_err};
use crate::repository::{EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (learner_id, course_id, enrolled_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(learner_id, course_id) DO NOTHING
            ",
        )
        .bind(learner_id(enrollment.learner_id)?)
        .bind(course_id(enrollment.course_id)?)
        .bind(enrollment.enrolled_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn is_enrolled(&self, learner: LearnerId, course: CourseId) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM enrollments WHERE learner_id = ?1 AND course_id = ?2",
        )
        .bind(learner_id(learner)?)
        .bind(course_id(course)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        Ok(row.is_some())
    }
}
