use std::collections::HashSet;

use crate::error::EnrollmentError;
use crate::models::{EnrolledCourse, TimeSlot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    ScheduleConflict { course_id: String, course_code: String },
    MissingPrerequisite { course_id: String },
}

impl From<Violation> for EnrollmentError {
    fn from(violation: Violation) -> Self {
        match violation {
            Violation::ScheduleConflict { course_id, course_code } => {
                EnrollmentError::ScheduleConflict { course_id, course_code }
            }
            Violation::MissingPrerequisite { course_id } => {
                EnrollmentError::MissingPrerequisite(course_id)
            }
        }
    }
}

/// Whether `candidate` collides with `existing`. Slots that merely touch
/// (one ends exactly when the other starts) do not collide.
pub fn slots_overlap(existing: &TimeSlot, candidate: &TimeSlot) -> bool {
    if existing.day != candidate.day {
        return false;
    }

    let (old_start, old_end) = (existing.start_time, existing.end_time);
    let (new_start, new_end) = (candidate.start_time, candidate.end_time);

    (new_start >= old_start && new_start < old_end)
        || (new_end > old_start && new_end <= old_end)
        || (new_start <= old_start && new_end >= old_end)
}

/// Checks a candidate course against what the student already holds.
///
/// Schedule conflicts are reported before missing prerequisites. Enrolled
/// courses are scanned in enrollment order, then each of their slots against
/// each candidate slot; the first collision wins. Prerequisites are checked
/// in their stored order.
pub fn check_enrollment(
    enrolled: &[EnrolledCourse],
    candidate_schedule: &[TimeSlot],
    prerequisites: &[String],
) -> Result<(), Violation> {
    for course in enrolled {
        for existing in &course.schedule {
            if candidate_schedule
                .iter()
                .any(|candidate| slots_overlap(existing, candidate))
            {
                return Err(Violation::ScheduleConflict {
                    course_id: course.course_id.clone(),
                    course_code: course.code.clone(),
                });
            }
        }
    }

    let held: HashSet<&str> = enrolled.iter().map(|c| c.course_id.as_str()).collect();
    if let Some(missing) = prerequisites.iter().find(|id| !held.contains(id.as_str())) {
        return Err(Violation::MissingPrerequisite {
            course_id: missing.clone(),
        });
    }

    Ok(())
}
