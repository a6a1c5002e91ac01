use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatsChanged {
    pub course_id: String,
    pub available_seats: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CourseEvent {
    SeatsChanged(SeatsChanged),
    CourseDeleted { course_id: String },
}

impl CourseEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            CourseEvent::SeatsChanged(_) => "seats_changed",
            CourseEvent::CourseDeleted { .. } => "course_deleted",
        }
    }

    pub fn course_id(&self) -> &str {
        match self {
            CourseEvent::SeatsChanged(change) => &change.course_id,
            CourseEvent::CourseDeleted { course_id } => course_id,
        }
    }
}

/// Fire-and-forget fan-out of committed course changes to live listeners.
#[derive(Clone)]
pub struct SeatEvents {
    tx: broadcast::Sender<CourseEvent>,
}

impl SeatEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, course_id: &str, available_seats: i64) {
        self.send(CourseEvent::SeatsChanged(SeatsChanged {
            course_id: course_id.to_string(),
            available_seats,
        }));
    }

    pub fn publish_deleted(&self, course_id: &str) {
        self.send(CourseEvent::CourseDeleted {
            course_id: course_id.to_string(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CourseEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: CourseEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            debug!(course_id = event.course_id(), "no course listeners");
        }
    }
}
