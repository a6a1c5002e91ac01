use std::convert::Infallible;

use axum::Json;
use axum::extract::Path;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{patch, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ProcessResponse {
    delivered: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/{id}", get(get_course).delete(delete_course))
        .route("/courses/{id}/capacity", patch(update_capacity))
        .route("/students", post(create_student))
        .route("/students/{id}/courses", get(student_courses))
        .route(
            "/students/{student_id}/enrollments/{course_id}",
            post(enroll).delete(drop_course),
        )
        .route(
            "/students/{student_id}/subscriptions/{course_id}",
            post(subscribe).delete(unsubscribe),
        )
        .route(
            "/admin/students/{student_id}/enrollments/{course_id}",
            post(force_enroll).delete(drop_course),
        )
        .route("/notifications/process", post(process_notifications))
        .route("/events", get(seat_events))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(state.store.pool()).await?;
    Ok(StatusCode::OK)
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    let courses = state.catalog.list_courses().await?;
    Ok(Json(courses))
}

async fn create_course(
    State(state): State<AppState>,
    Json(req): Json<NewCourseRequest>
) -> Result<(StatusCode, Json<Course>), AppError> {
    let course = state.catalog.create_course(req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<CourseDetail>, AppError> {
    let detail = state.catalog.course_detail(&id).await?;
    Ok(Json(detail))
}

async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<StatusCode, AppError> {
    state.enrollment.delete_course(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_capacity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCapacityRequest>
) -> Result<Json<SeatReceipt>, AppError> {
    let receipt = state.enrollment.update_capacity(&id, req.total_seats).await?;
    Ok(Json(receipt))
}

async fn create_student(
    State(state): State<AppState>,
    Json(req): Json<NewStudentRequest>
) -> Result<(StatusCode, Json<Student>), AppError> {
    let student = state.catalog.create_student(req).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn student_courses(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<Vec<EnrolledCourse>>, AppError> {
    let courses = state.catalog.student_courses(&id).await?;
    Ok(Json(courses))
}

async fn enroll(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>
) -> Result<Json<SeatReceipt>, AppError> {
    let receipt = state.enrollment.enroll(&student_id, &course_id).await?;
    Ok(Json(receipt))
}

async fn force_enroll(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>
) -> Result<Json<SeatReceipt>, AppError> {
    let receipt = state.enrollment.force_enroll(&student_id, &course_id).await?;
    Ok(Json(receipt))
}

async fn drop_course(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>
) -> Result<Json<SeatReceipt>, AppError> {
    let receipt = state.enrollment.drop_course(&student_id, &course_id).await?;
    Ok(Json(receipt))
}

async fn subscribe(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
    Json(req): Json<SubscribeRequest>
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    let subscription = state
        .enrollment
        .subscribe(&student_id, &course_id, req.channel)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>
) -> Result<StatusCode, AppError> {
    state.enrollment.unsubscribe(&student_id, &course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn process_notifications(State(state): State<AppState>) -> Result<Json<ProcessResponse>, AppError> {
    let delivered = state.enrollment.process_pending_notifications().await?;
    Ok(Json(ProcessResponse { delivered }))
}

/// Live course changes as Server-Sent Events named `seats_changed` or
/// `course_deleted`.
async fn seat_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.enrollment.events().subscribe();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => match Event::default().event(change.name()).json_data(&change) {
                    Ok(event) => return Some((Ok::<_, Infallible>(event), rx)),
                    Err(e) => warn!("failed to encode course event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "seat event listener lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
