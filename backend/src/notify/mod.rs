pub mod dto;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::models::{NotificationChannel, WaitlistEntry};

/// "A seat opened in this course" for one waiting student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatNotice {
    pub student_id: String,
    pub student_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub channel: NotificationChannel,
    pub course_id: String,
    pub course_code: String,
    pub course_title: String,
}

impl SeatNotice {
    pub fn from_entry(entry: WaitlistEntry, course_id: &str, course_code: &str, course_title: &str) -> Self {
        Self {
            student_id: entry.student_id,
            student_name: entry.student_name,
            email: entry.email,
            phone: entry.phone.filter(|p| !p.is_empty()),
            channel: entry.channel,
            course_id: course_id.to_string(),
            course_code: course_code.to_string(),
            course_title: course_title.to_string(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Seat Available in {}", self.course_code)
    }

    pub fn message(&self) -> String {
        format!(
            "Good news! A seat has become available in {}: {}. Log in to register now before it fills up.",
            self.course_code, self.course_title
        )
    }

    pub fn email_target(&self) -> Option<&str> {
        self.channel.wants_email().then_some(self.email.as_str())
    }

    /// SMS goes out only when the student asked for it and has a phone.
    pub fn sms_target(&self) -> Option<&str> {
        if self.channel.wants_sms() {
            self.phone.as_deref()
        } else {
            None
        }
    }

    /// False for an sms-only notice to a student without a phone.
    pub fn is_reachable(&self) -> bool {
        self.email_target().is_some() || self.sms_target().is_some()
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook responded with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("no reachable contact for student {0}")]
    NoContact(String),
}

/// Delivers seat-opened notices. Best-effort: the ledger logs failures and
/// moves on.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notice: &SeatNotice) -> Result<(), NotifyError>;
}

/// Writes notices to the log instead of delivering them.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, notice: &SeatNotice) -> Result<(), NotifyError> {
        if !notice.is_reachable() {
            return Err(NotifyError::NoContact(notice.student_id.clone()));
        }
        if let Some(email) = notice.email_target() {
            info!(to = email, subject = %notice.subject(), "email notice: {}", notice.message());
        }
        if let Some(phone) = notice.sms_target() {
            info!(to = phone, "sms notice: {}", notice.message());
        }
        Ok(())
    }
}

/// Posts each notice as JSON to an external delivery service.
pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn notify(&self, notice: &SeatNotice) -> Result<(), NotifyError> {
        if !notice.is_reachable() {
            return Err(NotifyError::NoContact(notice.student_id.clone()));
        }

        let payload = dto::WebhookPayload {
            channel: notice.channel,
            student_id: notice.student_id.clone(),
            student_name: notice.student_name.clone(),
            email: notice.email_target().map(str::to_string),
            phone: notice.sms_target().map(str::to_string),
            course_id: notice.course_id.clone(),
            course_code: notice.course_code.clone(),
            subject: notice.subject(),
            message: notice.message(),
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(channel: NotificationChannel, phone: Option<&str>) -> SeatNotice {
        SeatNotice::from_entry(
            WaitlistEntry {
                student_id: "s2".into(),
                student_name: "Sora".into(),
                email: "sora@example.edu".into(),
                phone: phone.map(str::to_string),
                channel,
            },
            "c",
            "CS101",
            "Intro to Programming",
        )
    }

    #[test]
    fn test_channel_targets() {
        let email_only = notice(NotificationChannel::Email, Some("+100"));
        assert_eq!(email_only.email_target(), Some("sora@example.edu"));
        assert_eq!(email_only.sms_target(), None);

        let both = notice(NotificationChannel::Both, Some("+100"));
        assert_eq!(both.email_target(), Some("sora@example.edu"));
        assert_eq!(both.sms_target(), Some("+100"));

        let sms_no_phone = notice(NotificationChannel::Sms, Some(""));
        assert_eq!(sms_no_phone.email_target(), None);
        assert_eq!(sms_no_phone.sms_target(), None);
        assert!(!sms_no_phone.is_reachable());
        assert!(both.is_reachable());
    }

    #[tokio::test]
    async fn test_log_dispatcher_refuses_unreachable_notice() {
        let result = LogDispatcher.notify(&notice(NotificationChannel::Sms, None)).await;
        assert!(matches!(result, Err(NotifyError::NoContact(id)) if id == "s2"));

        LogDispatcher
            .notify(&notice(NotificationChannel::Email, None))
            .await
            .expect("email notice");
    }

    #[test]
    fn test_message_names_course() {
        let n = notice(NotificationChannel::Email, None);
        assert_eq!(n.subject(), "Seat Available in CS101");
        assert!(n.message().contains("CS101: Intro to Programming"));
    }
}
