use thiserror::Error;

use crate::gate::GateError;
use crate::model::{CourseError, ProgressError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Gate(#[from] GateError),
}
