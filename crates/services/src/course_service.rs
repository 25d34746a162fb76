use std::sync::Arc;

use course_core::model::{Course, CourseId, Enrollment, LearnerId, QuizCounts};
use storage::repository::{CourseRepository, EnrollmentRepository, Storage};

use crate::Clock;
use crate::error::CourseServiceError;

/// Publishes course outlines and enrolls learners.
#[derive(Clone)]
pub struct CourseService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl CourseService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            courses: Arc::clone(&storage.courses),
            enrollments: Arc::clone(&storage.enrollments),
        }
    }

    /// Store a course outline together with its quiz question counts.
    ///
    /// Outline and counts are written in one step. Every video of the outline
    /// gets its count, so a video missing from `quizzes` ends up without a
    /// quiz; a failed publish leaves the previous outline and counts as they
    /// were.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if persistence fails, including
    /// `StorageError::Conflict` when an id belongs to another course.
    pub async fn publish_course(
        &self,
        course: &Course,
        quizzes: &QuizCounts,
    ) -> Result<(), CourseServiceError> {
        self.courses.upsert_course(course, quizzes).await?;
        tracing::info!(
            course = %course.id(),
            videos = course.video_count(),
            "published course"
        );
        Ok(())
    }

    /// Enroll a learner. Enrolling twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::CourseNotFound` for an unknown course.
    pub async fn enroll(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<Enrollment, CourseServiceError> {
        if self.courses.get_course(course).await?.is_none() {
            return Err(CourseServiceError::CourseNotFound(course));
        }
        let enrollment = Enrollment::new(learner, course, self.clock.now());
        self.enrollments.enroll(&enrollment).await?;
        tracing::info!(%learner, %course, "learner enrolled");
        Ok(enrollment)
    }

    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if repository access fails.
    pub async fn get_course(&self, course: CourseId) -> Result<Option<Course>, CourseServiceError> {
        Ok(self.courses.get_course(course).await?)
    }

    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if repository access fails.
    pub async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, CourseServiceError> {
        Ok(self.courses.list_courses(limit).await?)
    }
}
