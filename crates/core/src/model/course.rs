use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, SectionId, VideoId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("video {0} appears more than once in the course outline")]
    DuplicateVideo(VideoId),

    #[error("section {0} appears more than once in the course outline")]
    DuplicateSection(SectionId),

    #[error("video {video} is listed under section {listed_in:?} but belongs to {belongs_to:?}")]
    SectionMismatch {
        video: VideoId,
        listed_in: Option<SectionId>,
        belongs_to: Option<SectionId>,
    },
}

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

/// A single lesson video.
///
/// `order` is only meaningful among the video's peers: the other videos of the
/// same section, or the other legacy videos of the course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub order: i32,
    #[serde(default)]
    pub section_id: Option<SectionId>,
}

impl Video {
    /// Creates a video that is not attached to any section yet.
    #[must_use]
    pub fn new(id: VideoId, title: impl Into<String>, order: i32) -> Self {
        Self {
            id,
            title: title.into(),
            order,
            section_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    pub order: i32,
    pub videos: Vec<Video>,
}

impl Section {
    /// Creates a section and stamps its id onto every contained video.
    #[must_use]
    pub fn new(id: SectionId, title: impl Into<String>, order: i32, mut videos: Vec<Video>) -> Self {
        for video in &mut videos {
            video.section_id = Some(id);
        }
        Self {
            id,
            title: title.into(),
            order,
            videos,
        }
    }
}

/// Course outline: ordered sections plus videos that predate sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    id: CourseId,
    title: String,
    sections: Vec<Section>,
    legacy_videos: Vec<Video>,
}

impl Course {
    /// Builds a course outline.
    ///
    /// Duplicate `order` values are accepted; ordering ties are resolved later
    /// by a stable sort.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title,
    /// `CourseError::DuplicateSection` or `CourseError::DuplicateVideo` if a
    /// section or video id occurs twice, and
    /// `CourseError::SectionMismatch` if a video's `section_id` disagrees with
    /// the container it is listed in.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        sections: Vec<Section>,
        legacy_videos: Vec<Video>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }

        let mut section_ids = HashSet::new();
        if let Some(dup) = sections.iter().find(|s| !section_ids.insert(s.id)) {
            return Err(CourseError::DuplicateSection(dup.id));
        }

        let mut seen = HashSet::new();
        let listed = sections
            .iter()
            .flat_map(|s| s.videos.iter().map(move |v| (Some(s.id), v)))
            .chain(legacy_videos.iter().map(|v| (None, v)));

        for (container, video) in listed {
            if video.section_id != container {
                return Err(CourseError::SectionMismatch {
                    video: video.id,
                    listed_in: container,
                    belongs_to: video.section_id,
                });
            }
            if !seen.insert(video.id) {
                return Err(CourseError::DuplicateVideo(video.id));
            }
        }

        Ok(Self {
            id,
            title,
            sections,
            legacy_videos,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[must_use]
    pub fn legacy_videos(&self) -> &[Video] {
        &self.legacy_videos
    }

    /// Every video in the outline, in declaration order (not watch order).
    pub fn videos(&self) -> impl Iterator<Item = &Video> {
        self.sections
            .iter()
            .flat_map(|s| s.videos.iter())
            .chain(self.legacy_videos.iter())
    }

    #[must_use]
    pub fn video_count(&self) -> usize {
        self.videos().count()
    }

    #[must_use]
    pub fn contains_video(&self, id: VideoId) -> bool {
        self.videos().any(|v| v.id == id)
    }
}

//
// ─── QUIZ COUNTS ───────────────────────────────────────────────────────────────
//

/// Number of quiz questions attached to each video. Missing entries mean zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizCounts(HashMap<VideoId, u32>);

impl QuizCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, video: VideoId, questions: u32) {
        if questions == 0 {
            self.0.remove(&video);
        } else {
            self.0.insert(video, questions);
        }
    }

    #[must_use]
    pub fn get(&self, video: VideoId) -> u32 {
        self.0.get(&video).copied().unwrap_or(0)
    }

    /// A video has a quiz iff at least one question is attached to it.
    #[must_use]
    pub fn has_quiz(&self, video: VideoId) -> bool {
        self.get(video) > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (VideoId, u32)> + '_ {
        self.0.iter().map(|(id, n)| (*id, *n))
    }
}

impl FromIterator<(VideoId, u32)> for QuizCounts {
    fn from_iter<I: IntoIterator<Item = (VideoId, u32)>>(iter: I) -> Self {
        let mut counts = Self::new();
        for (video, questions) in iter {
            counts.set(video, questions);
        }
        counts
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: u64, order: i32) -> Video {
        Video::new(VideoId::new(id), format!("Video {id}"), order)
    }

    #[test]
    fn section_new_stamps_section_id() {
        let section = Section::new(SectionId::new(3), "Intro", 1, vec![video(1, 1), video(2, 2)]);
        assert!(
            section
                .videos
                .iter()
                .all(|v| v.section_id == Some(SectionId::new(3)))
        );
    }

    #[test]
    fn course_rejects_blank_title() {
        let err = Course::new(CourseId::new(1), "  ", vec![], vec![]).unwrap_err();
        assert_eq!(err, CourseError::EmptyTitle);
    }

    #[test]
    fn course_rejects_duplicate_video_ids() {
        let section = Section::new(SectionId::new(1), "S", 1, vec![video(1, 1)]);
        let err = Course::new(CourseId::new(1), "Rust", vec![section], vec![video(1, 1)])
            .unwrap_err();
        assert_eq!(err, CourseError::DuplicateVideo(VideoId::new(1)));
    }

    #[test]
    fn course_rejects_duplicate_section_ids() {
        let first = Section::new(SectionId::new(1), "Basics", 1, vec![video(1, 1)]);
        let again = Section::new(SectionId::new(1), "Basics again", 2, vec![video(2, 1)]);
        let err = Course::new(CourseId::new(1), "Rust", vec![first, again], vec![]).unwrap_err();
        assert_eq!(err, CourseError::DuplicateSection(SectionId::new(1)));
    }

    #[test]
    fn course_rejects_legacy_video_with_section() {
        let mut stray = video(5, 1);
        stray.section_id = Some(SectionId::new(9));
        let err = Course::new(CourseId::new(1), "Rust", vec![], vec![stray]).unwrap_err();
        assert!(matches!(err, CourseError::SectionMismatch { .. }));
    }

    #[test]
    fn course_accepts_duplicate_orders() {
        let section = Section::new(SectionId::new(1), "S", 1, vec![video(1, 1), video(2, 1)]);
        let course = Course::new(CourseId::new(1), "Rust", vec![section], vec![]).unwrap();
        assert_eq!(course.video_count(), 2);
        assert!(course.contains_video(VideoId::new(2)));
        assert!(!course.contains_video(VideoId::new(3)));
    }

    #[test]
    fn quiz_counts_treat_missing_as_zero() {
        let counts: QuizCounts = [(VideoId::new(1), 3), (VideoId::new(2), 0)]
            .into_iter()
            .collect();
        assert!(counts.has_quiz(VideoId::new(1)));
        assert!(!counts.has_quiz(VideoId::new(2)));
        assert_eq!(counts.get(VideoId::new(99)), 0);
        assert_eq!(counts.iter().count(), 1);
    }
}
