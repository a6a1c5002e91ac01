pub mod catalog;
pub mod events;
pub mod ledger;
pub mod scheduler;
pub mod validator;
pub mod waitlist;

pub use catalog::CatalogService;
pub use events::{CourseEvent, SeatEvents, SeatsChanged};
pub use ledger::EnrollmentService;
pub use scheduler::NotificationSweeper;
pub use waitlist::WaitlistNotifier;
