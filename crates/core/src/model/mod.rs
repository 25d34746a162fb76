mod course;
mod enrollment;
mod ids;
mod progress;

pub use course::{Course, CourseError, QuizCounts, Section, Video};
pub use enrollment::Enrollment;
pub use ids::{CourseId, LearnerId, ParseIdError, SectionId, VideoId};
pub use progress::{
    ProgressError, ProgressMap, QuizOutcome, VideoProgress, VideoState, WatchUpdate,
};
