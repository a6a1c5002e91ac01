use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::db::{Store, repository};
use crate::error::AppError;
use crate::models::{Course, CourseDetail, EnrolledCourse, NewCourseRequest, NewStudentRequest, Student};

/// Course and student records the ledger works against.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<Store>,
}

impl CatalogService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn create_student(&self, req: NewStudentRequest) -> Result<Student, AppError> {
        if req.name.trim().is_empty() || !req.email.contains('@') {
            return Err(AppError::BadRequest("name and a valid email are required".to_string()));
        }

        let mut txn = self.store.begin_write().await?;
        let student = repository::insert_student(&mut txn, req)
            .await
            .map_err(|e| unique_to_conflict(e, "a student with this email already exists"))?;
        txn.commit().await?;

        info!(student = %student.id, "student created");
        Ok(student)
    }

    /// New courses start with every seat free.
    pub async fn create_course(&self, req: NewCourseRequest) -> Result<Course, AppError> {
        validate_course(&req)?;

        let mut txn = self.store.begin_write().await?;

        let found = repository::count_existing_courses(&mut txn, &req.prerequisites).await?;
        if found != req.prerequisites.len() {
            return Err(AppError::BadRequest("unknown prerequisite course".to_string()));
        }

        let course = repository::insert_course(&mut txn, &req)
            .await
            .map_err(|e| unique_to_conflict(e, "a course with this code already exists"))?;
        txn.commit().await?;

        info!(course = %course.id, code = %course.code, seats = course.total_seats, "course created");
        Ok(course)
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        let mut conn = self.store.pool().acquire().await?;
        Ok(repository::fetch_courses(&mut conn).await?)
    }

    pub async fn course_detail(&self, course_id: &str) -> Result<CourseDetail, AppError> {
        let mut conn = self.store.pool().acquire().await?;

        let course = repository::find_course_by_id(&mut conn, course_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let schedule = repository::fetch_course_slots(&mut conn, course_id).await?;
        let prerequisites = repository::fetch_prerequisites(&mut conn, course_id).await?;
        let enrolled_students = repository::fetch_enrolled_students(&mut conn, course_id).await?;

        Ok(CourseDetail {
            course,
            schedule,
            prerequisites,
            enrolled_students,
        })
    }

    /// The student's weekly schedule.
    pub async fn student_courses(&self, student_id: &str) -> Result<Vec<EnrolledCourse>, AppError> {
        let mut conn = self.store.pool().acquire().await?;

        repository::find_student_by_id(&mut conn, student_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(repository::fetch_enrolled_courses(&mut conn, student_id).await?)
    }
}

fn validate_course(req: &NewCourseRequest) -> Result<(), AppError> {
    if req.code.trim().is_empty() || req.title.trim().is_empty() {
        return Err(AppError::BadRequest("course code and title are required".to_string()));
    }
    if req.total_seats < 1 {
        return Err(AppError::BadRequest("total_seats must be at least 1".to_string()));
    }
    if let Some(slot) = req.schedule.iter().find(|s| s.start_time >= s.end_time) {
        return Err(AppError::BadRequest(format!(
            "slot on {:?} must start before it ends",
            slot.day
        )));
    }
    let unique: HashSet<&String> = req.prerequisites.iter().collect();
    if unique.len() != req.prerequisites.len() {
        return Err(AppError::BadRequest("duplicate prerequisite".to_string()));
    }
    Ok(())
}

fn unique_to_conflict(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message.to_string()),
        _ => AppError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::db::setup_test_db;
    use crate::models::{DayOfWeek, TimeSlot};

    fn course_req(code: &str) -> NewCourseRequest {
        NewCourseRequest {
            code: code.to_string(),
            title: "Data Structures".to_string(),
            total_seats: 40,
            schedule: vec![TimeSlot::new(
                DayOfWeek::Thursday,
                NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(12, 15, 0).unwrap(),
                "Hall B",
            )],
            prerequisites: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_and_describe_course() {
        let catalog = CatalogService::new(Arc::new(Store::new(setup_test_db().await)));

        let course = catalog.create_course(course_req("CS220")).await.expect("create course");
        assert_eq!(course.available_seats, 40);

        let detail = catalog.course_detail(&course.id).await.expect("detail");
        assert_eq!(detail.schedule.len(), 1);
        assert!(detail.enrolled_students.is_empty());

        let dup = catalog.create_course(course_req("CS220")).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_rejects_bad_courses() {
        let catalog = CatalogService::new(Arc::new(Store::new(setup_test_db().await)));

        let mut zero = course_req("Z1");
        zero.total_seats = 0;
        assert!(matches!(catalog.create_course(zero).await, Err(AppError::BadRequest(_))));

        let mut backwards = course_req("Z2");
        backwards.schedule[0].end_time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(matches!(catalog.create_course(backwards).await, Err(AppError::BadRequest(_))));

        let mut ghost_prereq = course_req("Z3");
        ghost_prereq.prerequisites = vec!["nope".to_string()];
        assert!(matches!(catalog.create_course(ghost_prereq).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_student_email_is_unique() {
        let catalog = CatalogService::new(Arc::new(Store::new(setup_test_db().await)));
        let req = NewStudentRequest {
            name: "Dana".to_string(),
            email: "dana@example.edu".to_string(),
            phone: Some("+15550100".to_string()),
        };

        let student = catalog.create_student(req.clone()).await.expect("create student");
        assert!(catalog.student_courses(&student.id).await.expect("schedule").is_empty());
        assert!(matches!(catalog.create_student(req).await, Err(AppError::Conflict(_))));
        assert!(matches!(catalog.student_courses("missing").await, Err(AppError::NotFound)));
    }
}
