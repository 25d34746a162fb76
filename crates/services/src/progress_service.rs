use std::sync::Arc;

use serde::Serialize;

use course_core::gate::{self, AccessDecision, CourseProgress, GateError, LinearSequence, Neighbors};
use course_core::model::{
    Course, CourseId, LearnerId, ProgressMap, QuizCounts, QuizOutcome, SectionId, VideoId,
    VideoProgress, VideoState, WatchUpdate,
};
use storage::repository::{
    CourseRepository, EnrollmentRepository, ProgressRepository, QuizRepository, Storage,
};

use crate::Clock;
use crate::error::ProgressServiceError;
use crate::settings::GateSettings;

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoNavigation {
    #[serde(flatten)]
    pub neighbors: Neighbors,
    /// Whether the learner may already open `neighbors.next`.
    pub next_unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineEntry {
    pub video_id: VideoId,
    pub section_id: Option<SectionId>,
    pub title: String,
    pub state: VideoState,
}

/// Everything a course page needs in one read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutlineView {
    pub course_id: CourseId,
    pub title: String,
    pub progress: CourseProgress,
    pub resume_at: Option<VideoId>,
    pub videos: Vec<OutlineEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub score: u8,
    pub passed: bool,
    pub progress: VideoProgress,
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Course structure and one learner's progress, read together.
struct Snapshot {
    course: Course,
    sequence: LinearSequence,
    progress: ProgressMap,
    quizzes: QuizCounts,
}

impl Snapshot {
    fn access(&self, video: VideoId) -> Result<AccessDecision, GateError> {
        gate::can_access_video(&self.sequence, video, &self.progress, &self.quizzes, true)
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Answers access/progress/navigation questions and applies progress events.
///
/// Every call reads a fresh snapshot; nothing is cached between calls, so a
/// stale "locked" answer is corrected by the next request.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    settings: GateSettings,
    courses: Arc<dyn CourseRepository>,
    quizzes: Arc<dyn QuizRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, settings: GateSettings, storage: &Storage) -> Self {
        Self {
            clock,
            settings,
            courses: Arc::clone(&storage.courses),
            quizzes: Arc::clone(&storage.quizzes),
            enrollments: Arc::clone(&storage.enrollments),
            progress: Arc::clone(&storage.progress),
        }
    }

    #[must_use]
    pub fn settings(&self) -> GateSettings {
        self.settings
    }

    async fn is_enrolled(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<bool, ProgressServiceError> {
        Ok(self.enrollments.is_enrolled(learner, course).await?)
    }

    async fn require_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<(), ProgressServiceError> {
        if self.is_enrolled(learner, course).await? {
            Ok(())
        } else {
            Err(GateError::NotEnrolled.into())
        }
    }

    async fn snapshot(
        &self,
        learner: LearnerId,
        course_id: CourseId,
    ) -> Result<Snapshot, ProgressServiceError> {
        let course = self
            .courses
            .get_course(course_id)
            .await?
            .ok_or(ProgressServiceError::CourseNotFound(course_id))?;
        if self.settings.strict_ordering {
            gate::check_ordering(&course)?;
        }
        let sequence = gate::build_linear_sequence(&course);
        let quizzes = self.quizzes.quiz_counts(course_id).await?;
        let progress = self.progress.progress_for_course(learner, course_id).await?;

        Ok(Snapshot {
            course,
            sequence,
            progress,
            quizzes,
        })
    }

    /// Loads a snapshot and fails unless the learner may watch `video`.
    async fn authorize(
        &self,
        learner: LearnerId,
        course: CourseId,
        video: VideoId,
    ) -> Result<Snapshot, ProgressServiceError> {
        self.require_enrollment(learner, course).await?;
        let snapshot = self.snapshot(learner, course).await?;
        if let Err(err) = snapshot.access(video)?.ensure_allowed() {
            tracing::info!(%learner, %course, %video, error = %err, "rejected progress write");
            return Err(err.into());
        }
        Ok(snapshot)
    }

    /// Whether the learner may watch `video`.
    ///
    /// Enrollment is checked before the course is even loaded, so an
    /// unenrolled learner always gets `not_enrolled`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::VideoNotInSequence` (wrapped) when the video is not
    /// part of the course, and storage errors.
    pub async fn check_access(
        &self,
        learner: LearnerId,
        course: CourseId,
        video: VideoId,
    ) -> Result<AccessDecision, ProgressServiceError> {
        if !self.is_enrolled(learner, course).await? {
            return Ok(AccessDecision::denied(gate::DenyReason::NotEnrolled));
        }
        let decision = self.snapshot(learner, course).await?.access(video)?;
        tracing::debug!(%learner, %course, %video, can_watch = decision.can_watch(), "access decision");
        Ok(decision)
    }

    /// Completion summary using the compound rule.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NotEnrolled` (wrapped) for unenrolled learners.
    pub async fn course_progress(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<CourseProgress, ProgressServiceError> {
        self.require_enrollment(learner, course).await?;
        let s = self.snapshot(learner, course).await?;
        Ok(gate::compute_course_progress(&s.sequence, &s.progress, &s.quizzes))
    }

    /// Previous/next links for a video, plus whether "next" is open yet.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NotEnrolled` or `GateError::VideoNotInSequence`
    /// (wrapped), and storage errors.
    pub async fn navigation(
        &self,
        learner: LearnerId,
        course: CourseId,
        video: VideoId,
    ) -> Result<VideoNavigation, ProgressServiceError> {
        self.require_enrollment(learner, course).await?;
        let s = self.snapshot(learner, course).await?;
        let neighbors = gate::neighbors_of(&s.sequence, video)?;
        let next_unlocked = match neighbors.next {
            Some(next) => s.access(next)?.can_watch(),
            None => false,
        };
        Ok(VideoNavigation {
            neighbors,
            next_unlocked,
        })
    }

    /// Full outline with per-video state, progress and resume point.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NotEnrolled` (wrapped) for unenrolled learners.
    pub async fn outline(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<CourseOutlineView, ProgressServiceError> {
        self.require_enrollment(learner, course).await?;
        let s = self.snapshot(learner, course).await?;

        let states = gate::outline_states(&s.sequence, &s.progress, &s.quizzes);
        let mut videos = Vec::with_capacity(states.len());
        for (id, state) in states {
            if let Some(video) = s.course.videos().find(|v| v.id == id) {
                videos.push(OutlineEntry {
                    video_id: id,
                    section_id: video.section_id,
                    title: video.title.clone(),
                    state,
                });
            }
        }

        Ok(CourseOutlineView {
            course_id: s.course.id(),
            title: s.course.title().to_owned(),
            progress: gate::compute_course_progress(&s.sequence, &s.progress, &s.quizzes),
            resume_at: gate::resume_point(&s.sequence, &s.progress, &s.quizzes),
            videos,
        })
    }

    /// Apply a "video watched" event.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NotEnrolled`, `GateError::Locked` or
    /// `GateError::VideoNotInSequence` (wrapped) when the learner may not
    /// watch the video, and storage errors.
    pub async fn record_watch(
        &self,
        learner: LearnerId,
        course: CourseId,
        video: VideoId,
        watched_secs: u32,
        finished: bool,
    ) -> Result<VideoProgress, ProgressServiceError> {
        self.authorize(learner, course, video).await?;
        let update = WatchUpdate {
            watched_secs,
            finished,
        };
        let row = self
            .progress
            .record_watch(learner, video, update, self.clock.now())
            .await?;
        tracing::debug!(%learner, %video, completed = row.completed, "recorded watch");
        Ok(row)
    }

    /// Apply a "quiz submitted" event with `correct` of `total` answers right.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubmission` for an empty or over-full answer count,
    /// `NoQuiz` if the video has no questions, gate errors when the learner
    /// may not watch the video, and storage errors.
    pub async fn submit_quiz(
        &self,
        learner: LearnerId,
        course: CourseId,
        video: VideoId,
        correct: u32,
        total: u32,
    ) -> Result<QuizResult, ProgressServiceError> {
        if total == 0 || correct > total {
            return Err(ProgressServiceError::InvalidSubmission { correct, total });
        }
        let snapshot = self.authorize(learner, course, video).await?;
        if !snapshot.quizzes.has_quiz(video) {
            return Err(ProgressServiceError::NoQuiz(video));
        }

        let score = GateSettings::score(correct, total);
        let passed = self.settings.passes(score);
        let outcome = QuizOutcome::new(score, passed)?;
        let progress = self
            .progress
            .record_quiz(learner, video, outcome, self.clock.now())
            .await?;
        tracing::debug!(%learner, %video, score, passed, attempts = progress.test_attempts, "recorded quiz");

        Ok(QuizResult {
            score,
            passed,
            progress,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
