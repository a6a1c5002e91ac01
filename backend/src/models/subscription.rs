use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NotificationChannel {
    #[default]
    Email,
    Sms,
    Both,
}

impl NotificationChannel {
    pub fn wants_email(self) -> bool {
        matches!(self, NotificationChannel::Email | NotificationChannel::Both)
    }

    pub fn wants_sms(self) -> bool {
        matches!(self, NotificationChannel::Sms | NotificationChannel::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub channel: NotificationChannel,
    pub is_active: bool,
    pub notification_sent: bool,
    pub notification_sent_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub channel: NotificationChannel,
}

/// An active, unsent subscription joined with the student's contact details.
#[derive(Debug, Clone, FromRow)]
pub struct WaitlistEntry {
    pub student_id: String,
    pub student_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub channel: NotificationChannel,
}
