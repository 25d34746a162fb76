#![forbid(unsafe_code)]

pub mod error;
pub mod gate;
pub mod model;
pub mod time;

pub use error::Error;
pub use gate::{
    AccessDecision, CourseProgress, DenyReason, GateError, LinearSequence, Neighbors,
    build_linear_sequence, can_access_video, check_ordering, compute_course_progress,
    neighbors_of, outline_states, resume_point, video_state,
};
pub use time::Clock;
