use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::course_service::CourseService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::settings::GateSettings;

/// Assembles the app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    courses: Arc<CourseService>,
    progress: Arc<ProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the settings are invalid or storage
    /// initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: GateSettings,
    ) -> Result<Self, AppServicesError> {
        let settings = settings.validate()?;
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, settings))
    }

    /// Build services over fresh in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Settings` if the settings are invalid.
    pub fn in_memory(clock: Clock, settings: GateSettings) -> Result<Self, AppServicesError> {
        let settings = settings.validate()?;
        Ok(Self::from_storage(&Storage::in_memory(), clock, settings))
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, settings: GateSettings) -> Self {
        Self {
            courses: Arc::new(CourseService::new(clock, storage)),
            progress: Arc::new(ProgressService::new(clock, settings, storage)),
        }
    }

    #[must_use]
    pub fn courses(&self) -> Arc<CourseService> {
        Arc::clone(&self.courses)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }
}
