use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    Course, CourseId, Enrollment, LearnerId, ProgressMap, QuizCounts, QuizOutcome, VideoId,
    VideoProgress, WatchUpdate,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: id already belongs to another record")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Course outlines (sections and videos).
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Persist or replace a course outline together with the quiz question
    /// count of every video, as one atomic write.
    ///
    /// Videos dropped from the outline are deleted together with their
    /// progress rows; videos that remain keep their progress. Videos missing
    /// from `quizzes` are stored without a quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a section or video id already
    /// belongs to another course; nothing is written in that case.
    async fn upsert_course(
        &self,
        course: &Course,
        quizzes: &QuizCounts,
    ) -> Result<(), StorageError>;

    /// Fetch a course outline by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// List courses ordered by ID, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError>;
}

/// Quiz question counts per video.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the video does not exist.
    async fn set_question_count(&self, video: VideoId, questions: u32) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn quiz_counts(&self, course: CourseId) -> Result<QuizCounts, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Record an enrollment. Re-enrolling keeps the original `enrolled_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn is_enrolled(&self, learner: LearnerId, course: CourseId) -> Result<bool, StorageError>;
}

/// Per (learner, video) progress rows.
///
/// The two record methods each upsert one field group and never touch the
/// other one, so concurrent watch and quiz events cannot clobber each other.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// All existing rows for the learner within one course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn progress_for_course(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<ProgressMap, StorageError>;

    /// Upsert the watch field group and return the resulting row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn record_watch(
        &self,
        learner: LearnerId,
        video: VideoId,
        update: WatchUpdate,
        at: DateTime<Utc>,
    ) -> Result<VideoProgress, StorageError>;

    /// Upsert the quiz field group and return the resulting row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn record_quiz(
        &self,
        learner: LearnerId,
        video: VideoId,
        outcome: QuizOutcome,
        at: DateTime<Utc>,
    ) -> Result<VideoProgress, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    quizzes: Arc<Mutex<HashMap<VideoId, u32>>>,
    enrollments: Arc<Mutex<HashMap<(LearnerId, CourseId), Enrollment>>>,
    progress: Arc<Mutex<HashMap<(LearnerId, VideoId), VideoProgress>>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock().map_err(|e| StorageError::Connection(e.to_string()))
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn course_videos(&self, course: CourseId) -> Result<Vec<VideoId>, StorageError> {
        Ok(lock(&self.courses)?
            .get(&course)
            .map(|c| c.videos().map(|v| v.id).collect())
            .unwrap_or_default())
    }

    fn video_exists(&self, video: VideoId) -> Result<bool, StorageError> {
        Ok(lock(&self.courses)?
            .values()
            .any(|c| c.contains_video(video)))
    }
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn upsert_course(
        &self,
        course: &Course,
        quizzes: &QuizCounts,
    ) -> Result<(), StorageError> {
        let mut courses = lock(&self.courses)?;
        let taken = courses.values().filter(|c| c.id() != course.id()).any(|other| {
            other.videos().any(|v| course.contains_video(v.id))
                || other
                    .sections()
                    .iter()
                    .any(|s| course.sections().iter().any(|own| own.id == s.id))
        });
        if taken {
            return Err(StorageError::Conflict);
        }

        let mut counts = lock(&self.quizzes)?;
        if let Some(previous) = courses.get(&course.id()) {
            let dropped: Vec<VideoId> = previous
                .videos()
                .map(|v| v.id)
                .filter(|id| !course.contains_video(*id))
                .collect();
            if !dropped.is_empty() {
                lock(&self.progress)?.retain(|(_, video), _| !dropped.contains(video));
                counts.retain(|video, _| !dropped.contains(video));
            }
        }
        for video in course.videos() {
            counts.insert(video.id, quizzes.get(video.id));
        }
        courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        Ok(lock(&self.courses)?.get(&id).cloned())
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let guard = lock(&self.courses)?;
        let mut courses: Vec<Course> = guard.values().cloned().collect();
        courses.sort_by_key(Course::id);
        courses.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(courses)
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn set_question_count(&self, video: VideoId, questions: u32) -> Result<(), StorageError> {
        if !self.video_exists(video)? {
            return Err(StorageError::NotFound);
        }
        lock(&self.quizzes)?.insert(video, questions);
        Ok(())
    }

    async fn quiz_counts(&self, course: CourseId) -> Result<QuizCounts, StorageError> {
        let videos = self.course_videos(course)?;
        let quizzes = lock(&self.quizzes)?;
        Ok(videos
            .into_iter()
            .filter_map(|id| quizzes.get(&id).map(|n| (id, *n)))
            .collect())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        if !lock(&self.courses)?.contains_key(&enrollment.course_id) {
            return Err(StorageError::NotFound);
        }
        lock(&self.enrollments)?
            .entry((enrollment.learner_id, enrollment.course_id))
            .or_insert(*enrollment);
        Ok(())
    }

    async fn is_enrolled(&self, learner: LearnerId, course: CourseId) -> Result<bool, StorageError> {
        Ok(lock(&self.enrollments)?.contains_key(&(learner, course)))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn progress_for_course(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<ProgressMap, StorageError> {
        let videos = self.course_videos(course)?;
        let guard = lock(&self.progress)?;
        Ok(videos
            .into_iter()
            .filter_map(|id| guard.get(&(learner, id)).map(|p| (id, *p)))
            .collect())
    }

    async fn record_watch(
        &self,
        learner: LearnerId,
        video: VideoId,
        update: WatchUpdate,
        at: DateTime<Utc>,
    ) -> Result<VideoProgress, StorageError> {
        if !self.video_exists(video)? {
            return Err(StorageError::NotFound);
        }
        let mut guard = lock(&self.progress)?;
        let row = guard.entry((learner, video)).or_default();
        row.apply_watch(update, at);
        Ok(*row)
    }

    async fn record_quiz(
        &self,
        learner: LearnerId,
        video: VideoId,
        outcome: QuizOutcome,
        at: DateTime<Utc>,
    ) -> Result<VideoProgress, StorageError> {
        if !self.video_exists(video)? {
            return Err(StorageError::NotFound);
        }
        let mut guard = lock(&self.progress)?;
        let row = guard.entry((learner, video)).or_default();
        row.apply_quiz(outcome, at);
        Ok(*row)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            courses: Arc::new(repo.clone()),
            quizzes: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            progress: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{Section, SectionId, Video};
    use course_core::time::fixed_now;

    fn build_course(videos: &[u64]) -> Course {
        let videos = videos
            .iter()
            .zip(1..)
            .map(|(id, order)| Video::new(VideoId::new(*id), format!("V{id}"), order))
            .collect();
        let section = Section::new(SectionId::new(1), "Intro", 1, videos);
        Course::new(CourseId::new(1), "Course", vec![section], vec![]).unwrap()
    }

    async fn publish(repo: &InMemoryRepository, videos: &[u64]) {
        repo.upsert_course(&build_course(videos), &QuizCounts::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn watch_and_quiz_groups_merge_on_one_row() {
        let repo = InMemoryRepository::new();
        publish(&repo, &[1, 2]).await;
        let learner = LearnerId::new(7);

        repo.record_watch(
            learner,
            VideoId::new(1),
            WatchUpdate { watched_secs: 90, finished: true },
            fixed_now(),
        )
        .await
        .unwrap();
        let row = repo
            .record_quiz(learner, VideoId::new(1), QuizOutcome::new(80, true).unwrap(), fixed_now())
            .await
            .unwrap();

        assert!(row.completed);
        assert!(row.test_passed);
        assert_eq!(row.watch_time_secs, 90);
        assert_eq!(row.test_attempts, 1);

        let map = repo.progress_for_course(learner, CourseId::new(1)).await.unwrap();
        assert_eq!(map.len(), 1);
        assert!(!map.contains(VideoId::new(2)));
    }

    #[tokio::test]
    async fn republishing_drops_progress_of_removed_videos_only() {
        let repo = InMemoryRepository::new();
        publish(&repo, &[1, 2]).await;
        let learner = LearnerId::new(1);
        for id in [1, 2] {
            repo.record_watch(
                learner,
                VideoId::new(id),
                WatchUpdate { watched_secs: 5, finished: true },
                fixed_now(),
            )
            .await
            .unwrap();
        }

        publish(&repo, &[1]).await;
        let map = repo.progress_for_course(learner, CourseId::new(1)).await.unwrap();
        assert!(map.contains(VideoId::new(1)));
        assert!(!map.contains(VideoId::new(2)));
    }

    #[tokio::test]
    async fn enroll_requires_existing_course_and_is_idempotent() {
        let repo = InMemoryRepository::new();
        let enrollment = Enrollment::new(LearnerId::new(1), CourseId::new(1), fixed_now());
        assert!(matches!(
            repo.enroll(&enrollment).await,
            Err(StorageError::NotFound)
        ));

        publish(&repo, &[1]).await;
        repo.enroll(&enrollment).await.unwrap();
        repo.enroll(&enrollment).await.unwrap();
        assert!(repo.is_enrolled(LearnerId::new(1), CourseId::new(1)).await.unwrap());
        assert!(!repo.is_enrolled(LearnerId::new(2), CourseId::new(1)).await.unwrap());
    }

    #[tokio::test]
    async fn quiz_counts_are_scoped_to_course() {
        let repo = InMemoryRepository::new();
        publish(&repo, &[1, 2]).await;
        repo.set_question_count(VideoId::new(2), 4).await.unwrap();
        assert!(matches!(
            repo.set_question_count(VideoId::new(99), 1).await,
            Err(StorageError::NotFound)
        ));

        let counts = repo.quiz_counts(CourseId::new(1)).await.unwrap();
        assert_eq!(counts.get(VideoId::new(2)), 4);
        assert!(!counts.has_quiz(VideoId::new(1)));
    }

    fn course_with(id: u64, section: u64, videos: &[u64]) -> Course {
        let videos = videos
            .iter()
            .zip(1..)
            .map(|(v, order)| Video::new(VideoId::new(*v), format!("V{v}"), order))
            .collect();
        let section = Section::new(SectionId::new(section), "Intro", 1, videos);
        Course::new(CourseId::new(id), format!("Course {id}"), vec![section], vec![]).unwrap()
    }

    #[tokio::test]
    async fn ids_owned_by_another_course_are_a_conflict() {
        let repo = InMemoryRepository::new();
        let first = course_with(1, 1, &[1, 2]);
        repo.upsert_course(&first, &QuizCounts::new()).await.unwrap();

        let steals_video = course_with(2, 2, &[2]);
        assert!(matches!(
            repo.upsert_course(&steals_video, &QuizCounts::new()).await,
            Err(StorageError::Conflict)
        ));
        let steals_section = course_with(2, 1, &[3]);
        assert!(matches!(
            repo.upsert_course(&steals_section, &QuizCounts::new()).await,
            Err(StorageError::Conflict)
        ));

        assert_eq!(repo.get_course(CourseId::new(1)).await.unwrap(), Some(first));
        assert!(repo.get_course(CourseId::new(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_publish_keeps_previous_quiz_counts() {
        let repo = InMemoryRepository::new();
        let quizzes: QuizCounts = [(VideoId::new(2), 3)].into_iter().collect();
        repo.upsert_course(&course_with(1, 1, &[1, 2]), &quizzes)
            .await
            .unwrap();
        repo.upsert_course(&course_with(2, 2, &[5]), &QuizCounts::new())
            .await
            .unwrap();

        // Republishing course 1 with a video of course 2 fails as a whole.
        let cleared = QuizCounts::new();
        let err = repo
            .upsert_course(&course_with(1, 1, &[1, 2, 5]), &cleared)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let counts = repo.quiz_counts(CourseId::new(1)).await.unwrap();
        assert_eq!(counts.get(VideoId::new(2)), 3);
    }
}
