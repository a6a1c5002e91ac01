use serde::{Deserialize, Serialize};

use crate::models::NotificationChannel;

/// Body posted to the notification webhook, one per seat notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub channel: NotificationChannel,
    pub student_id: String,
    pub student_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub course_id: String,
    pub course_code: String,
    pub subject: String,
    pub message: String,
}
