use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::models::{
    Course, EnrolledCourse, EnrollmentRow, NewCourseRequest, NewStudentRequest, NotificationChannel, Student,
    Subscription, TimeSlot, WaitlistEntry,
};

pub async fn insert_student(
    conn: &mut SqliteConnection,
    req: NewStudentRequest,
) -> Result<Student, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query("INSERT INTO students (id, name, email, phone, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(&req.name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(&now)
        .execute(&mut *conn)
        .await?;

    Ok(Student {
        id,
        name: req.name,
        email: req.email,
        phone: req.phone,
        created_at: now,
    })
}

pub async fn find_student_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(
        "SELECT id, name, email, phone, created_at FROM students WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// Inserts the course together with its schedule and prerequisites.
/// Callers run this inside a transaction.
pub async fn insert_course(
    conn: &mut SqliteConnection,
    req: &NewCourseRequest,
) -> Result<Course, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO courses
            (id, code, title, total_seats, available_seats, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?5)
        "#,
    )
    .bind(&id)
    .bind(&req.code)
    .bind(&req.title)
    .bind(req.total_seats)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    for (position, slot) in req.schedule.iter().enumerate() {
        sqlx::query(
            "INSERT INTO course_slots (course_id, position, day, start_time, end_time, location) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(position as i64)
        .bind(slot.day)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(&slot.location)
        .execute(&mut *conn)
        .await?;
    }

    for (position, prerequisite_id) in req.prerequisites.iter().enumerate() {
        sqlx::query(
            "INSERT INTO course_prerequisites (course_id, prerequisite_id, position) VALUES (?, ?, ?)",
        )
        .bind(&id)
        .bind(prerequisite_id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(Course {
        id,
        code: req.code.clone(),
        title: req.title.clone(),
        total_seats: req.total_seats,
        available_seats: req.total_seats,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub async fn fetch_courses(conn: &mut SqliteConnection) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT id, code, title, total_seats, available_seats, created_at, updated_at
        FROM courses
        ORDER BY code
        "#,
    )
    .fetch_all(&mut *conn)
    .await
}

pub async fn find_course_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "SELECT id, code, title, total_seats, available_seats, created_at, updated_at FROM courses WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn count_existing_courses(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<usize, sqlx::Error> {
    let mut found = 0;
    for id in ids {
        if find_course_by_id(conn, id).await?.is_some() {
            found += 1;
        }
    }
    Ok(found)
}

pub async fn fetch_course_slots(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Vec<TimeSlot>, sqlx::Error> {
    sqlx::query_as::<_, TimeSlot>(
        r#"
        SELECT day, start_time, end_time, location
        FROM course_slots
        WHERE course_id = ?
        ORDER BY position
        "#,
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn fetch_prerequisites(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT prerequisite_id FROM course_prerequisites WHERE course_id = ? ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn fetch_enrolled_students(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT student_id FROM enrollments WHERE course_id = ? ORDER BY seq",
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn count_enrolled(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM enrollments WHERE course_id = ?")
        .bind(course_id)
        .fetch_one(&mut *conn)
        .await
}

/// Decrements the seat count if one is free, returning the new count.
pub async fn take_seat(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE courses
        SET available_seats = available_seats - 1,
            updated_at = ?1
        WHERE id = ?2 AND available_seats > 0
        RETURNING available_seats
        "#,
    )
    .bind(now)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Increments the seat count, returning the new count. The table's CHECK
/// constraint rejects going above `total_seats`.
pub async fn release_seat(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE courses
        SET available_seats = available_seats + 1,
            updated_at = ?1
        WHERE id = ?2
        RETURNING available_seats
        "#,
    )
    .bind(now)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn set_capacity(
    conn: &mut SqliteConnection,
    course_id: &str,
    total_seats: i64,
    available_seats: i64,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE courses
        SET total_seats = ?1,
            available_seats = ?2,
            updated_at = ?3
        WHERE id = ?4
        "#,
    )
    .bind(total_seats)
    .bind(available_seats)
    .bind(now)
    .bind(course_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(result > 0)
}

/// Codes of the courses that list `course_id` as a prerequisite.
pub async fn fetch_dependent_courses(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT c.code
        FROM course_prerequisites p
        JOIN courses c ON c.id = p.course_id
        WHERE p.prerequisite_id = ?
        ORDER BY c.code
        "#,
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await
}

/// Removes the course with its schedule, prerequisites and every
/// subscription, active or not.
pub async fn delete_course(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query("DELETE FROM subscriptions WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM course_slots WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM course_prerequisites WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(course_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Courses the student holds a seat in, oldest enrollment first.
pub async fn fetch_enrollments(
    conn: &mut SqliteConnection,
    student_id: &str,
) -> Result<Vec<EnrollmentRow>, sqlx::Error> {
    sqlx::query_as::<_, EnrollmentRow>(
        r#"
        SELECT e.course_id AS course_id, c.code AS code, c.title AS title
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE e.student_id = ?
        ORDER BY e.seq
        "#,
    )
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await
}

/// The student's courses with their weekly schedules, oldest enrollment first.
pub async fn fetch_enrolled_courses(
    conn: &mut SqliteConnection,
    student_id: &str,
) -> Result<Vec<EnrolledCourse>, sqlx::Error> {
    let rows = fetch_enrollments(conn, student_id).await?;
    let mut courses = Vec::with_capacity(rows.len());
    for row in rows {
        let schedule = fetch_course_slots(conn, &row.course_id).await?;
        courses.push(EnrolledCourse {
            course_id: row.course_id,
            code: row.code,
            title: row.title,
            schedule,
        });
    }
    Ok(courses)
}

pub async fn is_enrolled(
    conn: &mut SqliteConnection,
    student_id: &str,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

pub async fn insert_enrollment(
    conn: &mut SqliteConnection,
    student_id: &str,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("INSERT INTO enrollments (student_id, course_id, enrolled_at) VALUES (?, ?, ?)")
        .bind(student_id)
        .bind(course_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete_enrollment(
    conn: &mut SqliteConnection,
    student_id: &str,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM enrollments WHERE student_id = ? AND course_id = ?")
        .bind(student_id)
        .bind(course_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(result > 0)
}

pub async fn find_active_subscription(
    conn: &mut SqliteConnection,
    student_id: &str,
    course_id: &str,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(
        r#"
        SELECT id, student_id, course_id, channel, is_active,
               notification_sent, notification_sent_at, created_at
        FROM subscriptions
        WHERE student_id = ? AND course_id = ? AND is_active = 1
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn insert_subscription(
    conn: &mut SqliteConnection,
    student_id: &str,
    course_id: &str,
    channel: NotificationChannel,
) -> Result<Subscription, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO subscriptions
            (id, student_id, course_id, channel, is_active, notification_sent, created_at)
        VALUES (?, ?, ?, ?, 1, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(student_id)
    .bind(course_id)
    .bind(channel)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(Subscription {
        id,
        student_id: student_id.to_string(),
        course_id: course_id.to_string(),
        channel,
        is_active: true,
        notification_sent: false,
        notification_sent_at: None,
        created_at: now,
    })
}

pub async fn deactivate_subscription(
    conn: &mut SqliteConnection,
    student_id: &str,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE subscriptions SET is_active = 0 WHERE student_id = ? AND course_id = ? AND is_active = 1",
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(result > 0)
}

/// Reads the course's active, unsent subscriptions and marks them sent.
pub async fn claim_pending_subscriptions(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Vec<WaitlistEntry>, sqlx::Error> {
    let entries = sqlx::query_as::<_, WaitlistEntry>(
        r#"
        SELECT s.student_id AS student_id,
               st.name AS student_name,
               st.email AS email,
               st.phone AS phone,
               s.channel AS channel
        FROM subscriptions s
        JOIN students st ON st.id = s.student_id
        WHERE s.course_id = ? AND s.is_active = 1 AND s.notification_sent = 0
        ORDER BY s.created_at, s.rowid
        "#,
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    if entries.is_empty() {
        return Ok(entries);
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET notification_sent = 1,
            notification_sent_at = ?1
        WHERE course_id = ?2 AND is_active = 1 AND notification_sent = 0
        "#,
    )
    .bind(now)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    Ok(entries)
}

/// Courses with free seats that still have students waiting on a notice.
pub async fn fetch_courses_with_pending_notices(
    conn: &mut SqliteConnection,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT c.id
        FROM courses c
        JOIN subscriptions s ON s.course_id = c.id
        WHERE c.available_seats > 0 AND s.is_active = 1 AND s.notification_sent = 0
        ORDER BY c.code
        "#,
    )
    .fetch_all(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::db::setup_test_db;
    use crate::models::DayOfWeek;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn course_req(code: &str, seats: i64) -> NewCourseRequest {
        NewCourseRequest {
            code: code.to_string(),
            title: format!("{} lecture", code),
            total_seats: seats,
            schedule: vec![TimeSlot::new(DayOfWeek::Monday, time(9, 0), time(10, 30), "Room 101")],
            prerequisites: vec![],
        }
    }

    fn student_req(name: &str) -> NewStudentRequest {
        NewStudentRequest {
            name: name.to_string(),
            email: format!("{}@example.edu", name.to_lowercase()),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_course() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");

        let base = insert_course(&mut conn, &course_req("CS101", 30))
            .await
            .expect("Failed to insert course");

        let mut req = course_req("CS201", 2);
        req.schedule.push(TimeSlot::new(DayOfWeek::Wednesday, time(13, 0), time(14, 0), "Lab 2"));
        req.prerequisites = vec![base.id.clone()];
        let course = insert_course(&mut conn, &req).await.expect("Failed to insert course");
        assert_eq!(course.available_seats, 2);

        let courses = fetch_courses(&mut conn).await.expect("Failed to fetch courses");
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].code, "CS101");

        let slots = fetch_course_slots(&mut conn, &course.id)
            .await
            .expect("Failed to fetch slots");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].day, DayOfWeek::Monday);
        assert_eq!(slots[1].start_time, time(13, 0));
        assert_eq!(slots[1].location, "Lab 2");

        let prereqs = fetch_prerequisites(&mut conn, &course.id)
            .await
            .expect("Failed to fetch prerequisites");
        assert_eq!(prereqs, vec![base.id]);
    }

    #[tokio::test]
    async fn test_take_seat_stops_at_zero() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");

        let course = insert_course(&mut conn, &course_req("MATH1", 1))
            .await
            .expect("Failed to insert course");

        let first = take_seat(&mut conn, &course.id).await.expect("take_seat failed");
        assert_eq!(first, Some(0));

        let second = take_seat(&mut conn, &course.id).await.expect("take_seat failed");
        assert_eq!(second, None);

        let released = release_seat(&mut conn, &course.id).await.expect("release_seat failed");
        assert_eq!(released, Some(1));

        // available may never exceed total
        assert!(release_seat(&mut conn, &course.id).await.is_err());
    }

    #[tokio::test]
    async fn test_enrollment_order_and_removal() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");

        let student = insert_student(&mut conn, student_req("Aiko"))
            .await
            .expect("Failed to insert student");
        let a = insert_course(&mut conn, &course_req("B-COURSE", 5)).await.expect("insert");
        let b = insert_course(&mut conn, &course_req("A-COURSE", 5)).await.expect("insert");

        insert_enrollment(&mut conn, &student.id, &a.id).await.expect("enroll a");
        insert_enrollment(&mut conn, &student.id, &b.id).await.expect("enroll b");

        // duplicate pair is rejected by the table
        assert!(insert_enrollment(&mut conn, &student.id, &a.id).await.is_err());

        let rows = fetch_enrollments(&mut conn, &student.id).await.expect("fetch");
        let ids: Vec<_> = rows.iter().map(|r| r.course_id.clone()).collect();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);

        assert!(is_enrolled(&mut conn, &student.id, &a.id).await.expect("is_enrolled"));
        assert!(delete_enrollment(&mut conn, &student.id, &a.id).await.expect("delete"));
        assert!(!is_enrolled(&mut conn, &student.id, &a.id).await.expect("is_enrolled"));
        assert_eq!(count_enrolled(&mut conn, &b.id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_one_active_subscription_per_pair() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");

        let student = insert_student(&mut conn, student_req("Ben")).await.expect("insert");
        let course = insert_course(&mut conn, &course_req("PHY1", 1)).await.expect("insert");

        insert_subscription(&mut conn, &student.id, &course.id, NotificationChannel::Email)
            .await
            .expect("first subscription");
        let dup = insert_subscription(&mut conn, &student.id, &course.id, NotificationChannel::Sms).await;
        assert!(dup.is_err());

        assert!(deactivate_subscription(&mut conn, &student.id, &course.id).await.expect("deactivate"));
        insert_subscription(&mut conn, &student.id, &course.id, NotificationChannel::Sms)
            .await
            .expect("subscription after deactivation");
    }

    #[tokio::test]
    async fn test_claim_pending_marks_sent_once() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");

        let student = insert_student(&mut conn, student_req("Chika")).await.expect("insert");
        let course = insert_course(&mut conn, &course_req("CHEM1", 1)).await.expect("insert");
        insert_subscription(&mut conn, &student.id, &course.id, NotificationChannel::Both)
            .await
            .expect("subscribe");

        let claimed = claim_pending_subscriptions(&mut conn, &course.id).await.expect("claim");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].email, "chika@example.edu");
        assert_eq!(claimed[0].channel, NotificationChannel::Both);

        let again = claim_pending_subscriptions(&mut conn, &course.id).await.expect("claim");
        assert!(again.is_empty());

        let sub = find_active_subscription(&mut conn, &student.id, &course.id)
            .await
            .expect("find")
            .expect("still active");
        assert!(sub.notification_sent);
        assert!(sub.notification_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_course_takes_subscriptions_along() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");

        let base = insert_course(&mut conn, &course_req("MATH1", 3)).await.expect("insert");
        let mut req = course_req("MATH2", 3);
        req.prerequisites = vec![base.id.clone()];
        let follow_up = insert_course(&mut conn, &req).await.expect("insert");
        let student = insert_student(&mut conn, student_req("Cy")).await.expect("insert");
        insert_subscription(&mut conn, &student.id, &follow_up.id, NotificationChannel::Email)
            .await
            .expect("subscription");

        let dependents = fetch_dependent_courses(&mut conn, &base.id).await.expect("dependents");
        assert_eq!(dependents, vec!["MATH2".to_string()]);

        assert!(delete_course(&mut conn, &follow_up.id).await.expect("delete"));
        assert!(find_course_by_id(&mut conn, &follow_up.id).await.expect("find").is_none());
        assert!(find_active_subscription(&mut conn, &student.id, &follow_up.id)
            .await
            .expect("find subscription")
            .is_none());
        assert!(fetch_course_slots(&mut conn, &follow_up.id).await.expect("slots").is_empty());
        assert!(fetch_dependent_courses(&mut conn, &base.id).await.expect("dependents").is_empty());

        assert!(!delete_course(&mut conn, &follow_up.id).await.expect("delete again"));
    }
}
