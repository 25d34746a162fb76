#![forbid(unsafe_code)]

pub mod app_services;
pub mod course_service;
pub mod error;
pub mod progress_service;
pub mod settings;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use course_service::CourseService;
pub use error::{AppServicesError, CourseServiceError, ProgressServiceError, SettingsError};
pub use progress_service::{
    CourseOutlineView, OutlineEntry, ProgressService, QuizResult, VideoNavigation,
};
pub use settings::GateSettings;
