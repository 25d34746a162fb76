//! Shared error types for the services crate.

use thiserror::Error;

use course_core::GateError;
use course_core::model::{CourseError, CourseId, ProgressError, VideoId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `GateSettings::validate`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("pass threshold must be between 0 and 100, got {0}")]
    InvalidPassThreshold(u8),
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("video {0} has no quiz")]
    NoQuiz(VideoId),
    #[error("invalid quiz submission: {correct} of {total}")]
    InvalidSubmission { correct: u32, total: u32 },
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    /// HTTP status a route handler should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            ProgressServiceError::Gate(e) => e.status_code(),
            ProgressServiceError::CourseNotFound(_)
            | ProgressServiceError::NoQuiz(_)
            | ProgressServiceError::Storage(StorageError::NotFound) => 404,
            ProgressServiceError::InvalidSubmission { .. } | ProgressServiceError::Progress(_) => {
                400
            }
            ProgressServiceError::Storage(_) => 500,
        }
    }
}

/// Errors emitted by `CourseService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseServiceError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
