use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::db::repository;
use crate::models::Course;
use crate::notify::{NotificationDispatcher, SeatNotice};

/// Turns freed seats into notices for waiting students.
///
/// Claiming happens inside the caller's transaction so a notice is marked
/// sent exactly when the seat change commits; delivery happens afterwards.
#[derive(Clone)]
pub struct WaitlistNotifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl WaitlistNotifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn claim(
        &self,
        conn: &mut SqliteConnection,
        course: &Course,
    ) -> Result<Vec<SeatNotice>, sqlx::Error> {
        let entries = repository::claim_pending_subscriptions(conn, &course.id).await?;
        Ok(entries
            .into_iter()
            .map(|entry| SeatNotice::from_entry(entry, &course.id, &course.code, &course.title))
            .collect())
    }

    /// Delivers notices one by one and returns how many went out. Failures
    /// and unreachable students are logged, never returned.
    pub async fn dispatch(&self, notices: Vec<SeatNotice>) -> usize {
        if notices.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for notice in &notices {
            if !notice.is_reachable() {
                warn!(
                    student = %notice.student_id,
                    course = %notice.course_code,
                    "no reachable contact for {:?} notice", notice.channel
                );
                continue;
            }

            match self.dispatcher.notify(notice).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    student = %notice.student_id,
                    course = %notice.course_code,
                    "seat notice delivery failed: {}", e
                ),
            }
        }

        info!(
            "Notification sent to {} of {} students for course {}",
            delivered,
            notices.len(),
            notices[0].course_code
        );
        delivered
    }
}
