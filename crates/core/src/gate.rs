//! Sequential unlocking rules for course videos.
//!
//! Everything here is a pure function over a snapshot the caller has already
//! loaded: a course outline, the learner's progress records, quiz question
//! counts and whether an enrollment exists. Nothing is fetched or written.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Course, ProgressMap, QuizCounts, Video, VideoId, VideoState};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    #[error("learner is not enrolled in this course")]
    NotEnrolled,

    #[error("video is locked: {0}")]
    Locked(DenyReason),

    #[error("video {0} is not part of this course")]
    VideoNotInSequence(VideoId),

    #[error("duplicate order {order} in {container}")]
    MalformedOrdering { container: String, order: i32 },
}

impl GateError {
    /// HTTP status a route handler should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::NotEnrolled | GateError::Locked(_) => 403,
            GateError::VideoNotInSequence(_) => 400,
            GateError::MalformedOrdering { .. } => 500,
        }
    }
}

//
// ─── LINEAR SEQUENCE ───────────────────────────────────────────────────────────
//

/// Total watch order of a course: section videos first (sections and their
/// videos by ascending `order`), then legacy videos by ascending `order`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearSequence {
    videos: Vec<VideoId>,
    positions: HashMap<VideoId, usize>,
}

impl LinearSequence {
    #[must_use]
    pub fn position(&self, video: VideoId) -> Option<usize> {
        self.positions.get(&video).copied()
    }

    #[must_use]
    pub fn first(&self) -> Option<VideoId> {
        self.videos.first().copied()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<VideoId> {
        self.videos.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.videos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = VideoId> + '_ {
        self.videos.iter().copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[VideoId] {
        &self.videos
    }

    fn index_of(&self, video: VideoId) -> Result<usize, GateError> {
        self.position(video)
            .ok_or(GateError::VideoNotInSequence(video))
    }
}

impl FromIterator<VideoId> for LinearSequence {
    fn from_iter<I: IntoIterator<Item = VideoId>>(iter: I) -> Self {
        let videos: Vec<VideoId> = iter.into_iter().collect();
        let positions = videos.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self { videos, positions }
    }
}

fn duplicate_order<I: IntoIterator<Item = i32>>(orders: I) -> Option<i32> {
    let mut sorted: Vec<i32> = orders.into_iter().collect();
    sorted.sort_unstable();
    sorted.windows(2).find(|w| w[0] == w[1]).map(|w| w[0])
}

fn ordering_containers(course: &Course) -> Vec<(String, Option<i32>)> {
    let mut out = vec![(
        format!("sections of course {}", course.id()),
        duplicate_order(course.sections().iter().map(|s| s.order)),
    )];
    for section in course.sections() {
        out.push((
            format!("section {}", section.id),
            duplicate_order(section.videos.iter().map(|v| v.order)),
        ));
    }
    out.push((
        format!("legacy videos of course {}", course.id()),
        duplicate_order(course.legacy_videos().iter().map(|v| v.order)),
    ));
    out
}

/// Strict variant of the ordering check.
///
/// # Errors
///
/// Returns `GateError::MalformedOrdering` for the first container holding two
/// entries with the same `order`.
pub fn check_ordering(course: &Course) -> Result<(), GateError> {
    match ordering_containers(course)
        .into_iter()
        .find_map(|(container, dup)| dup.map(|order| (container, order)))
    {
        Some((container, order)) => Err(GateError::MalformedOrdering { container, order }),
        None => Ok(()),
    }
}

fn sorted_videos(videos: &[Video]) -> impl Iterator<Item = VideoId> {
    let mut refs: Vec<&Video> = videos.iter().collect();
    // `sort_by_key` is stable: equal orders keep their input order.
    refs.sort_by_key(|v| v.order);
    refs.into_iter().map(|v| v.id)
}

/// Flattens a course outline into its watch order.
///
/// Ties in `order` are tolerated and resolved by input position; each tie is
/// logged as a warning.
#[must_use]
pub fn build_linear_sequence(course: &Course) -> LinearSequence {
    for (container, dup) in ordering_containers(course) {
        if let Some(order) = dup {
            tracing::warn!(course = %course.id(), %container, order, "duplicate order value");
        }
    }

    let mut sections: Vec<_> = course.sections().iter().collect();
    sections.sort_by_key(|s| s.order);

    sections
        .into_iter()
        .flat_map(|s| sorted_videos(&s.videos))
        .chain(sorted_videos(course.legacy_videos()))
        .collect()
}

//
// ─── ACCESS ────────────────────────────────────────────────────────────────────
//

/// Why a video cannot be watched yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotEnrolled,
    PreviousIncomplete,
    QuizNotPassed,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::NotEnrolled => "not_enrolled",
            DenyReason::PreviousIncomplete => "previous_incomplete",
            DenyReason::QuizNotPassed => "quiz_not_passed",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an access check. Built only through `allowed` and `denied`, so a
/// denial always carries its reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    can_watch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<DenyReason>,
}

impl AccessDecision {
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            can_watch: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn denied(reason: DenyReason) -> Self {
        Self {
            can_watch: false,
            reason: Some(reason),
        }
    }

    #[must_use]
    pub fn can_watch(&self) -> bool {
        self.can_watch
    }

    /// Why the video is closed; `None` exactly when `can_watch` is true.
    #[must_use]
    pub fn reason(&self) -> Option<DenyReason> {
        self.reason
    }

    /// Turns a negative decision into an error for write paths.
    ///
    /// # Errors
    ///
    /// `GateError::NotEnrolled` or `GateError::Locked` when the video cannot be
    /// watched.
    pub fn ensure_allowed(self) -> Result<(), GateError> {
        match self.reason {
            None => Ok(()),
            Some(DenyReason::NotEnrolled) => Err(GateError::NotEnrolled),
            Some(reason) => Err(GateError::Locked(reason)),
        }
    }
}

/// Decides whether a learner may watch `video`.
///
/// The enrollment check runs before anything else, so an unenrolled learner is
/// denied even for videos outside the course. Otherwise the first video is
/// always open and every later one requires its predecessor to be watched and,
/// if the predecessor has a quiz, passed.
///
/// # Errors
///
/// Returns `GateError::VideoNotInSequence` if `video` is not in `sequence`.
pub fn can_access_video(
    sequence: &LinearSequence,
    video: VideoId,
    progress: &ProgressMap,
    quiz_counts: &QuizCounts,
    enrollment_exists: bool,
) -> Result<AccessDecision, GateError> {
    if !enrollment_exists {
        return Ok(AccessDecision::denied(DenyReason::NotEnrolled));
    }

    let index = sequence.index_of(video)?;
    let Some(previous) = index.checked_sub(1).and_then(|i| sequence.get(i)) else {
        return Ok(AccessDecision::allowed());
    };

    let record = progress.get_or_default(previous);
    if !record.completed {
        return Ok(AccessDecision::denied(DenyReason::PreviousIncomplete));
    }
    if quiz_counts.has_quiz(previous) && !record.test_passed {
        return Ok(AccessDecision::denied(DenyReason::QuizNotPassed));
    }
    Ok(AccessDecision::allowed())
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub completed_count: usize,
    pub total_count: usize,
    /// Whole percent, rounded half up. Zero for a course without videos.
    pub percentage: u8,
}

/// Counts videos that are watched and, where a quiz exists, passed.
#[must_use]
pub fn compute_course_progress(
    sequence: &LinearSequence,
    progress: &ProgressMap,
    quiz_counts: &QuizCounts,
) -> CourseProgress {
    let total_count = sequence.len();
    let completed_count = sequence
        .iter()
        .filter(|id| {
            progress
                .get_or_default(*id)
                .is_completed_and_passed(quiz_counts.has_quiz(*id))
        })
        .count();

    CourseProgress {
        completed_count,
        total_count,
        percentage: percentage(completed_count, total_count),
    }
}

fn percentage(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = done.min(total) as u128;
    let total = total as u128;
    let pct = (done * 100 + total / 2) / total;
    u8::try_from(pct).unwrap_or(100)
}

//
// ─── NAVIGATION ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbors {
    pub previous: Option<VideoId>,
    pub next: Option<VideoId>,
}

/// # Errors
///
/// Returns `GateError::VideoNotInSequence` if `video` is not in `sequence`.
pub fn neighbors_of(sequence: &LinearSequence, video: VideoId) -> Result<Neighbors, GateError> {
    let index = sequence.index_of(video)?;
    Ok(Neighbors {
        previous: index.checked_sub(1).and_then(|i| sequence.get(i)),
        next: sequence.get(index + 1),
    })
}

//
// ─── STATE VIEW ────────────────────────────────────────────────────────────────
//

fn state_for(
    video: VideoId,
    previous_done: bool,
    progress: &ProgressMap,
    quiz_counts: &QuizCounts,
) -> VideoState {
    let record = progress.get_or_default(video);
    if record.is_completed_and_passed(quiz_counts.has_quiz(video)) {
        VideoState::CompletedAndPassed
    } else if record.completed {
        VideoState::Watched
    } else if previous_done {
        VideoState::Unlocked
    } else {
        VideoState::Locked
    }
}

/// Lifecycle state of one video. Enrollment is not considered here.
///
/// # Errors
///
/// Returns `GateError::VideoNotInSequence` if `video` is not in `sequence`.
pub fn video_state(
    sequence: &LinearSequence,
    video: VideoId,
    progress: &ProgressMap,
    quiz_counts: &QuizCounts,
) -> Result<VideoState, GateError> {
    let index = sequence.index_of(video)?;
    let previous_done = match index.checked_sub(1).and_then(|i| sequence.get(i)) {
        None => true,
        Some(prev) => progress
            .get_or_default(prev)
            .is_completed_and_passed(quiz_counts.has_quiz(prev)),
    };
    Ok(state_for(video, previous_done, progress, quiz_counts))
}

/// State of every video, in watch order.
#[must_use]
pub fn outline_states(
    sequence: &LinearSequence,
    progress: &ProgressMap,
    quiz_counts: &QuizCounts,
) -> Vec<(VideoId, VideoState)> {
    let mut previous_done = true;
    sequence
        .iter()
        .map(|id| {
            let state = state_for(id, previous_done, progress, quiz_counts);
            previous_done = state == VideoState::CompletedAndPassed;
            (id, state)
        })
        .collect()
}

/// First video the learner has not fully completed, or `None` when the whole
/// course is done.
#[must_use]
pub fn resume_point(
    sequence: &LinearSequence,
    progress: &ProgressMap,
    quiz_counts: &QuizCounts,
) -> Option<VideoId> {
    sequence.iter().find(|id| {
        !progress
            .get_or_default(*id)
            .is_completed_and_passed(quiz_counts.has_quiz(*id))
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
