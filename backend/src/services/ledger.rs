use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::TxnPolicy;
use crate::db::{Store, repository};
use crate::error::EnrollmentError;
use crate::models::{NotificationChannel, SeatReceipt, Subscription};
use crate::notify::{NotificationDispatcher, SeatNotice};
use crate::services::events::SeatEvents;
use crate::services::validator;
use crate::services::waitlist::WaitlistNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checks {
    /// Seat, duplicate, schedule and prerequisite checks.
    Full,
    /// Administrative override: seat and duplicate checks only.
    SeatsOnly,
}

/// Owns every mutation of the seat ledger.
///
/// Each operation runs as one write transaction on the [`Store`]; nothing is
/// visible until it commits, and any error drops the transaction. Seat
/// events and waitlist notices go out only after the commit.
pub struct EnrollmentService {
    store: Arc<Store>,
    notifier: WaitlistNotifier,
    events: SeatEvents,
    policy: TxnPolicy,
}

impl EnrollmentService {
    pub fn new(
        store: Arc<Store>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        events: SeatEvents,
        policy: TxnPolicy,
    ) -> Self {
        Self {
            store,
            notifier: WaitlistNotifier::new(dispatcher),
            events,
            policy,
        }
    }

    pub fn events(&self) -> &SeatEvents {
        &self.events
    }

    #[instrument(skip(self))]
    pub async fn enroll(&self, student_id: &str, course_id: &str) -> Result<SeatReceipt, EnrollmentError> {
        let receipt = self
            .run(move || self.enroll_once(student_id, course_id, Checks::Full))
            .await
            .inspect_err(|e| debug!("enroll rejected: {}", e))?;

        info!(available = receipt.available_seats, "student enrolled");
        self.events.publish(&receipt.course_id, receipt.available_seats);
        Ok(receipt)
    }

    /// Enrolls without schedule or prerequisite checks. The course must
    /// still have a free seat.
    #[instrument(skip(self))]
    pub async fn force_enroll(&self, student_id: &str, course_id: &str) -> Result<SeatReceipt, EnrollmentError> {
        let receipt = self
            .run(move || self.enroll_once(student_id, course_id, Checks::SeatsOnly))
            .await
            .inspect_err(|e| debug!("force enroll rejected: {}", e))?;

        info!(available = receipt.available_seats, "student force-enrolled");
        self.events.publish(&receipt.course_id, receipt.available_seats);
        Ok(receipt)
    }

    #[instrument(skip(self))]
    pub async fn drop_course(&self, student_id: &str, course_id: &str) -> Result<SeatReceipt, EnrollmentError> {
        let (receipt, notices) = self
            .run(move || self.drop_once(student_id, course_id))
            .await
            .inspect_err(|e| debug!("drop rejected: {}", e))?;

        info!(available = receipt.available_seats, waiting = notices.len(), "student dropped course");
        self.events.publish(&receipt.course_id, receipt.available_seats);
        self.notifier.dispatch(notices).await;
        Ok(receipt)
    }

    #[instrument(skip(self))]
    pub async fn subscribe(
        &self,
        student_id: &str,
        course_id: &str,
        channel: NotificationChannel,
    ) -> Result<Subscription, EnrollmentError> {
        let subscription = self
            .run(move || self.subscribe_once(student_id, course_id, channel))
            .await
            .inspect_err(|e| debug!("subscribe rejected: {}", e))?;

        info!(subscription = %subscription.id, "student subscribed to seat notices");
        Ok(subscription)
    }

    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, student_id: &str, course_id: &str) -> Result<(), EnrollmentError> {
        self.run(move || self.unsubscribe_once(student_id, course_id))
            .await
            .inspect_err(|e| debug!("unsubscribe rejected: {}", e))?;

        info!("student unsubscribed from seat notices");
        Ok(())
    }

    /// Sets a course's total seats and recomputes what is free.
    #[instrument(skip(self))]
    pub async fn update_capacity(&self, course_id: &str, total_seats: i64) -> Result<SeatReceipt, EnrollmentError> {
        if total_seats < 1 {
            return Err(EnrollmentError::InvalidCapacity(total_seats));
        }

        let (receipt, notices) = self
            .run(move || self.update_capacity_once(course_id, total_seats))
            .await
            .inspect_err(|e| debug!("capacity update rejected: {}", e))?;

        info!(available = receipt.available_seats, "course capacity updated");
        self.events.publish(&receipt.course_id, receipt.available_seats);
        self.notifier.dispatch(notices).await;
        Ok(receipt)
    }

    /// Removes a course nobody is enrolled in, together with its waitlist.
    #[instrument(skip(self))]
    pub async fn delete_course(&self, course_id: &str) -> Result<(), EnrollmentError> {
        self.run(move || self.delete_course_once(course_id))
            .await
            .inspect_err(|e| debug!("course deletion rejected: {}", e))?;

        info!("course deleted");
        self.events.publish_deleted(course_id);
        Ok(())
    }

    /// Notifies waiting students of every course that has a free seat right
    /// now. Returns how many notices were delivered.
    #[instrument(skip(self))]
    pub async fn process_pending_notifications(&self) -> Result<usize, EnrollmentError> {
        let batches = self.run(move || self.claim_all_pending()).await?;

        let mut delivered = 0;
        for notices in batches {
            delivered += self.notifier.dispatch(notices).await;
        }
        Ok(delivered)
    }

    /// Runs one attempt after another until it succeeds, is rejected, or
    /// runs out of retries. Every attempt starts a fresh transaction, so
    /// preconditions are always re-validated.
    async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, EnrollmentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EnrollmentError>>,
    {
        let mut retries = 0;
        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout, attempt()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(EnrollmentError::TimedOut),
            };

            match outcome {
                Err(e) if e.is_transient() && retries < self.policy.max_retries => {
                    retries += 1;
                    warn!(retries, "transient storage failure, retrying: {}", e);
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(retries))).await;
                }
                other => return other,
            }
        }
    }

    async fn enroll_once(
        &self,
        student_id: &str,
        course_id: &str,
        checks: Checks,
    ) -> Result<SeatReceipt, EnrollmentError> {
        let mut txn = self.store.begin_write().await?;

        let course = repository::find_course_by_id(&mut txn, course_id)
            .await?
            .ok_or_else(|| EnrollmentError::CourseNotFound(course_id.to_string()))?;

        // a repeat enroll is a conflict even when it took the last seat
        if repository::is_enrolled(&mut txn, student_id, course_id).await? {
            return Err(EnrollmentError::AlreadyEnrolled(course_id.to_string()));
        }
        if course.available_seats < 1 {
            return Err(EnrollmentError::NoSeatsAvailable(course_id.to_string()));
        }

        repository::find_student_by_id(&mut txn, student_id)
            .await?
            .ok_or_else(|| EnrollmentError::StudentNotFound(student_id.to_string()))?;

        if checks == Checks::Full {
            let enrolled = repository::fetch_enrolled_courses(&mut txn, student_id).await?;
            let schedule = repository::fetch_course_slots(&mut txn, course_id).await?;
            let prerequisites = repository::fetch_prerequisites(&mut txn, course_id).await?;
            validator::check_enrollment(&enrolled, &schedule, &prerequisites)?;
        }

        let available_seats = repository::take_seat(&mut txn, course_id)
            .await?
            .ok_or_else(|| EnrollmentError::NoSeatsAvailable(course_id.to_string()))?;
        repository::insert_enrollment(&mut txn, student_id, course_id).await?;
        repository::deactivate_subscription(&mut txn, student_id, course_id).await?;

        txn.commit().await?;

        Ok(SeatReceipt {
            course_id: course_id.to_string(),
            available_seats,
        })
    }

    async fn drop_once(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<(SeatReceipt, Vec<SeatNotice>), EnrollmentError> {
        let mut txn = self.store.begin_write().await?;

        let course = repository::find_course_by_id(&mut txn, course_id)
            .await?
            .ok_or_else(|| EnrollmentError::CourseNotFound(course_id.to_string()))?;

        repository::find_student_by_id(&mut txn, student_id)
            .await?
            .ok_or_else(|| EnrollmentError::StudentNotFound(student_id.to_string()))?;

        if !repository::delete_enrollment(&mut txn, student_id, course_id).await? {
            return Err(EnrollmentError::NotEnrolled(course_id.to_string()));
        }

        let available_seats = repository::release_seat(&mut txn, course_id)
            .await?
            .ok_or_else(|| EnrollmentError::CourseNotFound(course_id.to_string()))?;
        let notices = self.notifier.claim(&mut txn, &course).await?;

        txn.commit().await?;

        let receipt = SeatReceipt {
            course_id: course_id.to_string(),
            available_seats,
        };
        Ok((receipt, notices))
    }

    async fn subscribe_once(
        &self,
        student_id: &str,
        course_id: &str,
        channel: NotificationChannel,
    ) -> Result<Subscription, EnrollmentError> {
        let mut txn = self.store.begin_write().await?;

        repository::find_student_by_id(&mut txn, student_id)
            .await?
            .ok_or_else(|| EnrollmentError::StudentNotFound(student_id.to_string()))?;
        repository::find_course_by_id(&mut txn, course_id)
            .await?
            .ok_or_else(|| EnrollmentError::CourseNotFound(course_id.to_string()))?;

        if let Some(existing) = repository::find_active_subscription(&mut txn, student_id, course_id).await? {
            if !existing.notification_sent {
                return Err(EnrollmentError::AlreadySubscribed(course_id.to_string()));
            }
            // already notified: the new subscription replaces it
            repository::deactivate_subscription(&mut txn, student_id, course_id).await?;
        }

        let subscription = repository::insert_subscription(&mut txn, student_id, course_id, channel).await?;
        txn.commit().await?;

        Ok(subscription)
    }

    async fn unsubscribe_once(&self, student_id: &str, course_id: &str) -> Result<(), EnrollmentError> {
        let mut txn = self.store.begin_write().await?;

        if !repository::deactivate_subscription(&mut txn, student_id, course_id).await? {
            return Err(EnrollmentError::NotSubscribed(course_id.to_string()));
        }

        txn.commit().await?;
        Ok(())
    }

    async fn update_capacity_once(
        &self,
        course_id: &str,
        total_seats: i64,
    ) -> Result<(SeatReceipt, Vec<SeatNotice>), EnrollmentError> {
        let mut txn = self.store.begin_write().await?;

        let course = repository::find_course_by_id(&mut txn, course_id)
            .await?
            .ok_or_else(|| EnrollmentError::CourseNotFound(course_id.to_string()))?;

        let enrolled = repository::count_enrolled(&mut txn, course_id).await?;
        if total_seats < enrolled {
            return Err(EnrollmentError::CapacityBelowEnrollment { enrolled });
        }

        let available_seats = total_seats - enrolled;
        repository::set_capacity(&mut txn, course_id, total_seats, available_seats).await?;

        let notices = if available_seats > course.available_seats {
            self.notifier.claim(&mut txn, &course).await?
        } else {
            Vec::new()
        };

        txn.commit().await?;

        let receipt = SeatReceipt {
            course_id: course_id.to_string(),
            available_seats,
        };
        Ok((receipt, notices))
    }

    async fn delete_course_once(&self, course_id: &str) -> Result<(), EnrollmentError> {
        let mut txn = self.store.begin_write().await?;

        repository::find_course_by_id(&mut txn, course_id)
            .await?
            .ok_or_else(|| EnrollmentError::CourseNotFound(course_id.to_string()))?;

        let enrolled = repository::count_enrolled(&mut txn, course_id).await?;
        if enrolled > 0 {
            return Err(EnrollmentError::CourseHasEnrollments { enrolled });
        }
        if let Some(code) = repository::fetch_dependent_courses(&mut txn, course_id).await?.into_iter().next() {
            return Err(EnrollmentError::RequiredByCourse(code));
        }

        repository::delete_course(&mut txn, course_id).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn claim_all_pending(&self) -> Result<Vec<Vec<SeatNotice>>, EnrollmentError> {
        let mut txn = self.store.begin_write().await?;

        let course_ids = repository::fetch_courses_with_pending_notices(&mut txn).await?;
        let mut batches = Vec::with_capacity(course_ids.len());
        for course_id in course_ids {
            if let Some(course) = repository::find_course_by_id(&mut txn, &course_id).await? {
                batches.push(self.notifier.claim(&mut txn, &course).await?);
            }
        }

        txn.commit().await?;
        Ok(batches)
    }
}
