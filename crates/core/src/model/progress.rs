use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::VideoId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("quiz score must be between 0 and 100, got {0}")]
    InvalidScore(u8),
}

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Field group written by a "video watched" event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchUpdate {
    /// Playback position reached, in seconds.
    pub watched_secs: u32,
    /// Whether playback reached the end of the video.
    pub finished: bool,
}

/// Field group written by a "quiz submitted" event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOutcome {
    score: u8,
    passed: bool,
}

impl QuizOutcome {
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidScore` if `score` exceeds 100.
    pub fn new(score: u8, passed: bool) -> Result<Self, ProgressError> {
        if score > 100 {
            return Err(ProgressError::InvalidScore(score));
        }
        Ok(Self { score, passed })
    }

    #[must_use]
    pub fn score(&self) -> u8 {
        self.score
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }
}

//
// ─── VIDEO PROGRESS ────────────────────────────────────────────────────────────
//

/// Per (learner, video) progress record.
///
/// `Default` is the value of a record that has not been written yet: nothing
/// watched, no quiz taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgress {
    pub completed: bool,
    pub test_passed: bool,
    pub watch_time_secs: u32,
    pub test_score: Option<u8>,
    pub test_attempts: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl VideoProgress {
    /// Applies a watch event. Only `completed`, `watch_time_secs` and
    /// `updated_at` change; both tracked fields only move forward.
    pub fn apply_watch(&mut self, update: WatchUpdate, at: DateTime<Utc>) {
        self.watch_time_secs = self.watch_time_secs.max(update.watched_secs);
        self.completed |= update.finished;
        self.updated_at = Some(at);
    }

    /// Applies a quiz submission. The latest score wins, but a pass is never
    /// revoked by a later failed attempt.
    pub fn apply_quiz(&mut self, outcome: QuizOutcome, at: DateTime<Utc>) {
        self.test_score = Some(outcome.score);
        self.test_passed |= outcome.passed;
        self.test_attempts = self.test_attempts.saturating_add(1);
        self.updated_at = Some(at);
    }

    /// Compound completion: watched to the end, and quiz passed when one exists.
    #[must_use]
    pub fn is_completed_and_passed(&self, has_quiz: bool) -> bool {
        self.completed && (!has_quiz || self.test_passed)
    }
}

/// A learner's progress records for one course, keyed by video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMap(HashMap<VideoId, VideoProgress>);

impl ProgressMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, video: VideoId, progress: VideoProgress) {
        self.0.insert(video, progress);
    }

    /// The stored record, or the default record when none exists yet.
    #[must_use]
    pub fn get_or_default(&self, video: VideoId) -> VideoProgress {
        self.0.get(&video).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, video: VideoId) -> bool {
        self.0.contains_key(&video)
    }

    /// Mutable access to a record, creating the default one on first use.
    pub fn entry(&mut self, video: VideoId) -> &mut VideoProgress {
        self.0.entry(video).or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(VideoId, VideoProgress)> for ProgressMap {
    fn from_iter<I: IntoIterator<Item = (VideoId, VideoProgress)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

//
// ─── VIDEO STATE ───────────────────────────────────────────────────────────────
//

/// Where a video sits in the per-video lifecycle.
///
/// ```text
/// LOCKED -> UNLOCKED -> WATCHED -> COMPLETED_AND_PASSED
/// ```
///
/// A failed quiz keeps the video in `Watched`; there is no transition back to
/// `Locked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoState {
    Locked,
    Unlocked,
    Watched,
    CompletedAndPassed,
}

impl VideoState {
    #[must_use]
    pub fn is_accessible(self) -> bool {
        !matches!(self, VideoState::Locked)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn default_is_the_absent_record() {
        let p = VideoProgress::default();
        assert!(!p.completed);
        assert!(!p.test_passed);
        assert_eq!(p.watch_time_secs, 0);
        assert_eq!(p.test_attempts, 0);
    }

    #[test]
    fn watch_time_never_decreases() {
        let mut p = VideoProgress::default();
        p.apply_watch(WatchUpdate { watched_secs: 120, finished: false }, fixed_now());
        p.apply_watch(WatchUpdate { watched_secs: 30, finished: false }, fixed_now());
        assert_eq!(p.watch_time_secs, 120);
        assert!(!p.completed);
    }

    #[test]
    fn completed_is_sticky() {
        let mut p = VideoProgress::default();
        p.apply_watch(WatchUpdate { watched_secs: 300, finished: true }, fixed_now());
        p.apply_watch(WatchUpdate { watched_secs: 10, finished: false }, fixed_now());
        assert!(p.completed);
    }

    #[test]
    fn failed_retry_keeps_earlier_pass() {
        let mut p = VideoProgress::default();
        p.apply_quiz(QuizOutcome::new(90, true).unwrap(), fixed_now());
        p.apply_quiz(QuizOutcome::new(40, false).unwrap(), fixed_now());
        assert!(p.test_passed);
        assert_eq!(p.test_score, Some(40));
        assert_eq!(p.test_attempts, 2);
    }

    #[test]
    fn quiz_event_leaves_watch_fields_alone() {
        let mut p = VideoProgress::default();
        p.apply_watch(WatchUpdate { watched_secs: 50, finished: false }, fixed_now());
        p.apply_quiz(QuizOutcome::new(100, true).unwrap(), fixed_now());
        assert_eq!(p.watch_time_secs, 50);
        assert!(!p.completed);
    }

    #[test]
    fn score_above_hundred_is_rejected() {
        assert_eq!(
            QuizOutcome::new(101, true).unwrap_err(),
            ProgressError::InvalidScore(101)
        );
    }

    #[test]
    fn compound_completion_respects_quiz_presence() {
        let watched = VideoProgress {
            completed: true,
            ..VideoProgress::default()
        };
        assert!(watched.is_completed_and_passed(false));
        assert!(!watched.is_completed_and_passed(true));
    }

    #[test]
    fn progress_map_defaults_missing_rows() {
        let map = ProgressMap::new();
        assert_eq!(map.get_or_default(VideoId::new(1)), VideoProgress::default());
        assert!(map.is_empty());
    }
}
