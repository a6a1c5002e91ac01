use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::TimeSlot;

/// Result of a successful seat mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatReceipt {
    pub course_id: String,
    pub available_seats: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct EnrollmentRow {
    pub course_id: String,
    pub code: String,
    pub title: String,
}

/// A course a student holds a seat in, with its weekly meetings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledCourse {
    pub course_id: String,
    pub code: String,
    pub title: String,
    pub schedule: Vec<TimeSlot>,
}
