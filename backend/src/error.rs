use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Coarse classification of a ledger rejection, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    NotFound,
    Conflict,
    ResourceExhausted,
    PreconditionFailed,
    TransactionFailed,
}

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("Course not found: {0}")]
    CourseNotFound(String),

    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("No seats available in course {0}")]
    NoSeatsAvailable(String),

    #[error("Student is already enrolled in course {0}")]
    AlreadyEnrolled(String),

    #[error("Schedule conflict with {course_code} ({course_id})")]
    ScheduleConflict { course_id: String, course_code: String },

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("Student is not enrolled in course {0}")]
    NotEnrolled(String),

    #[error("Student is already subscribed to course {0}")]
    AlreadySubscribed(String),

    #[error("No active subscription for course {0}")]
    NotSubscribed(String),

    #[error("Total seats must be at least 1, got {0}")]
    InvalidCapacity(i64),

    #[error("Total seats cannot drop below the {enrolled} enrolled students")]
    CapacityBelowEnrollment { enrolled: i64 },

    #[error("Cannot delete a course with {enrolled} enrolled students")]
    CourseHasEnrollments { enrolled: i64 },

    #[error("Course is a prerequisite of {0}")]
    RequiredByCourse(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(#[from] sqlx::Error),

    #[error("Transaction timed out")]
    TimedOut,
}

impl EnrollmentError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            EnrollmentError::CourseNotFound(_) | EnrollmentError::StudentNotFound(_) => {
                RejectionKind::NotFound
            }
            EnrollmentError::AlreadyEnrolled(_)
            | EnrollmentError::AlreadySubscribed(_)
            | EnrollmentError::ScheduleConflict { .. } => RejectionKind::Conflict,
            EnrollmentError::NoSeatsAvailable(_) => RejectionKind::ResourceExhausted,
            EnrollmentError::MissingPrerequisite(_)
            | EnrollmentError::NotEnrolled(_)
            | EnrollmentError::NotSubscribed(_)
            | EnrollmentError::InvalidCapacity(_)
            | EnrollmentError::CapacityBelowEnrollment { .. }
            | EnrollmentError::CourseHasEnrollments { .. }
            | EnrollmentError::RequiredByCourse(_) => RejectionKind::PreconditionFailed,
            EnrollmentError::TransactionFailed(_) | EnrollmentError::TimedOut => {
                RejectionKind::TransactionFailed
            }
        }
    }

    /// Storage hiccups that may succeed when the whole operation is rerun.
    pub fn is_transient(&self) -> bool {
        match self {
            EnrollmentError::TransactionFailed(sqlx::Error::PoolTimedOut) => true,
            EnrollmentError::TransactionFailed(sqlx::Error::Database(db)) => {
                // SQLITE_BUSY / SQLITE_LOCKED and their extended codes
                matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Enrollment(e) => match e.kind() {
                RejectionKind::NotFound => (StatusCode::NOT_FOUND, "not_found", e.to_string()),
                RejectionKind::Conflict => (StatusCode::CONFLICT, "conflict", e.to_string()),
                RejectionKind::ResourceExhausted => {
                    (StatusCode::CONFLICT, "resource_exhausted", e.to_string())
                }
                RejectionKind::PreconditionFailed => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "precondition_failed",
                    e.to_string(),
                ),
                RejectionKind::TransactionFailed => {
                    error!("enrollment transaction failed: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "transaction_failed",
                        "Transaction failed, no changes were made".to_string(),
                    )
                }
            },
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Database error occurred".to_string(),
                )
            }
            AppError::Migrate(e) => {
                error!("migration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            code: code.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
