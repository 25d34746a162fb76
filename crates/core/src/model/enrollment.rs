use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, LearnerId};

/// Links a learner to a course. Its existence gates every access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    #[must_use]
    pub fn new(learner_id: LearnerId, course_id: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            course_id,
            enrolled_at,
        }
    }
}
