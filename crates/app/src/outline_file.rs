use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use course_core::model::{Course, CourseId, QuizCounts, Section, SectionId, Video, VideoId};

/// On-disk course outline accepted by `app import`.
///
/// ```json
/// {
///   "id": "1",
///   "title": "Rust basics",
///   "sections": [
///     { "id": "10", "title": "Intro", "order": 1,
///       "videos": [{ "id": "100", "title": "Hello", "order": 1, "questions": 2 }] }
///   ],
///   "videos": []
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlineFile {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub sections: Vec<SectionEntry>,
    /// Videos attached directly to the course.
    #[serde(default)]
    pub videos: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionEntry {
    pub id: SectionId,
    pub title: String,
    pub order: i32,
    #[serde(default)]
    pub videos: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoEntry {
    pub id: VideoId,
    pub title: String,
    pub order: i32,
    /// Number of quiz questions; `0` means the video has no quiz.
    #[serde(default)]
    pub questions: u32,
}

impl OutlineFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read outline {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse outline {}", path.display()))
    }

    /// Splits the file into the validated course and its quiz counts.
    pub fn into_course(self) -> Result<(Course, QuizCounts)> {
        let mut quizzes = QuizCounts::new();
        let mut take = |entries: Vec<VideoEntry>| -> Vec<Video> {
            entries
                .into_iter()
                .map(|entry| {
                    quizzes.set(entry.id, entry.questions);
                    Video::new(entry.id, entry.title, entry.order)
                })
                .collect()
        };

        let sections = self
            .sections
            .into_iter()
            .map(|s| {
                let videos = take(s.videos);
                Section::new(s.id, s.title, s.order, videos)
            })
            .collect::<Vec<_>>();
        let legacy = take(self.videos);

        let course = Course::new(self.id, self.title, sections, legacy)
            .context("invalid course outline")?;
        Ok((course, quizzes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_legacy_videos() {
        let raw = r#"{
            "id": "1",
            "title": "Rust",
            "sections": [
                { "id": "10", "title": "Intro", "order": 1,
                  "videos": [
                    { "id": "100", "title": "Hello", "order": 1 },
                    { "id": "101", "title": "Quiz me", "order": 2, "questions": 3 }
                  ] }
            ],
            "videos": [{ "id": "200", "title": "Bonus", "order": 1 }]
        }"#;
        let file: OutlineFile = serde_json::from_str(raw).unwrap();
        let (course, quizzes) = file.into_course().unwrap();

        assert_eq!(course.video_count(), 3);
        assert_eq!(course.legacy_videos().len(), 1);
        assert_eq!(quizzes.get(VideoId::new(101)), 3);
        assert!(!quizzes.has_quiz(VideoId::new(100)));
    }

    #[test]
    fn duplicate_video_ids_are_rejected() {
        let raw = r#"{
            "id": "1",
            "title": "Rust",
            "sections": [
                { "id": "10", "title": "Intro", "order": 1,
                  "videos": [{ "id": "100", "title": "Hello", "order": 1 }] }
            ],
            "videos": [{ "id": "100", "title": "Again", "order": 1 }]
        }"#;
        let file: OutlineFile = serde_json::from_str(raw).unwrap();
        assert!(file.into_course().is_err());
    }
}
