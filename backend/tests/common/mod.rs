#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use registrar::config::TxnPolicy;
use registrar::db::{self, repository};
use registrar::models::{Course, DayOfWeek, NewCourseRequest, NewStudentRequest, Student, TimeSlot};
use registrar::notify::{NotificationDispatcher, NotifyError, SeatNotice};
use registrar::state::AppState;

/// Keeps every notice it is handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SeatNotice>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<SeatNotice> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, notice: &SeatNotice) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Always fails, like an unreachable mail gateway.
pub struct FailingDispatcher;

#[async_trait]
impl NotificationDispatcher for FailingDispatcher {
    async fn notify(&self, _notice: &SeatNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected {
            status: 503,
            body: "gateway down".to_string(),
        })
    }
}

pub struct Harness {
    pub state: AppState,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub async fn harness() -> Harness {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let state = state_with(dispatcher.clone()).await;
    Harness { state, dispatcher }
}

pub async fn state_with(dispatcher: Arc<dyn NotificationDispatcher>) -> AppState {
    state_with_policy(dispatcher, TxnPolicy::default()).await
}

pub async fn state_with_policy(dispatcher: Arc<dyn NotificationDispatcher>, policy: TxnPolicy) -> AppState {
    let pool = db::connect("sqlite::memory:", 1, Duration::from_secs(5))
        .await
        .expect("Failed to create database");
    AppState::new(pool, dispatcher, 64, policy)
}

/// A database file under `dir` shared by `max_connections` connections.
pub async fn file_harness(dir: &Path, max_connections: u32) -> Harness {
    let url = format!("sqlite://{}", dir.join("registrar.db").display());
    let pool = db::connect(&url, max_connections, Duration::from_secs(5))
        .await
        .expect("Failed to create database file");

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let state = AppState::new(pool, dispatcher.clone(), 64, TxnPolicy::default());
    Harness { state, dispatcher }
}

pub fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

pub fn slot(day: DayOfWeek, start: (u32, u32), end: (u32, u32)) -> TimeSlot {
    TimeSlot::new(day, at(start.0, start.1), at(end.0, end.1), "Room 101")
}

pub async fn add_student(state: &AppState, name: &str) -> Student {
    state
        .catalog
        .create_student(NewStudentRequest {
            name: name.to_string(),
            email: format!("{}@example.edu", name.to_lowercase()),
            phone: Some("+15550100".to_string()),
        })
        .await
        .expect("Failed to create student")
}

pub async fn add_course(
    state: &AppState,
    code: &str,
    seats: i64,
    schedule: Vec<TimeSlot>,
    prerequisites: Vec<String>,
) -> Course {
    state
        .catalog
        .create_course(NewCourseRequest {
            code: code.to_string(),
            title: format!("{} lecture", code),
            total_seats: seats,
            schedule,
            prerequisites,
        })
        .await
        .expect("Failed to create course")
}

pub async fn available(state: &AppState, course_id: &str) -> i64 {
    state
        .catalog
        .course_detail(course_id)
        .await
        .expect("course exists")
        .course
        .available_seats
}

/// `0 <= available <= total` and `available == total - enrolled` for every course.
pub async fn assert_ledger_consistent(state: &AppState) {
    let mut conn = state.store.pool().acquire().await.expect("connection");
    for course in repository::fetch_courses(&mut conn).await.expect("courses") {
        let enrolled = repository::count_enrolled(&mut conn, &course.id).await.expect("count");
        assert!(course.available_seats >= 0, "{} went negative", course.code);
        assert!(course.available_seats <= course.total_seats, "{} over capacity", course.code);
        assert_eq!(
            course.available_seats,
            course.total_seats - enrolled,
            "{} ledger out of sync",
            course.code
        );
    }
}
