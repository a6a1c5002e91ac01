pub mod course;
pub mod enrollment;
pub mod student;
pub mod subscription;

pub use course::{Course, CourseDetail, DayOfWeek, NewCourseRequest, TimeSlot, UpdateCapacityRequest};
pub use enrollment::{EnrolledCourse, EnrollmentRow, SeatReceipt};
pub use student::{NewStudentRequest, Student};
pub use subscription::{NotificationChannel, SubscribeRequest, Subscription, WaitlistEntry};
