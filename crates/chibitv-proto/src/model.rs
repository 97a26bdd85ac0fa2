use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Broadcast service identifier as used by the server.
pub type ServiceId = u16;

/// A selectable broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    #[serde(default)]
    pub provider_name: String,
}

/// One `{name, content}` entry of an event's extended description.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

/// Event record exactly as the server sends it.  Any field may be missing;
/// see [`RawEvent::normalize`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: u16,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Vec<EventDescription>,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
}

impl RawEvent {
    /// Convert into a displayable [`Event`].  Records without a title (or with
    /// an empty one) or without both ends of the time window return `None`.
    pub fn normalize(&self) -> Option<Event> {
        let title = self.title.as_deref().filter(|t| !t.is_empty())?;
        let start_at = self.start_time?;
        let end_at = self.end_time?;
        Some(Event {
            id: self.id,
            title: title.to_string(),
            description: self.description.clone(),
            start_at,
            end_at,
        })
    }
}

/// A schedule entry with a complete time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: u16,
    pub title: String,
    pub description: Vec<EventDescription>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

impl Event {
    /// On air at `now`: `start_at <= now < end_at`.
    pub fn is_current(&self, now: NaiveDateTime) -> bool {
        self.start_at <= now && now < self.end_at
    }

    /// Still worth listing at `now`: `end_at >= now`.
    pub fn is_relevant(&self, now: NaiveDateTime) -> bool {
        self.end_at >= now
    }

    /// Description entries with non-empty content, in server order.
    pub fn visible_description(&self) -> impl Iterator<Item = &EventDescription> {
        self.description.iter().filter(|d| !d.content.trim().is_empty())
    }
}

/// `GET /streams/{id}` response body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamState {
    #[serde(default)]
    pub service: Option<Service>,
    #[serde(default)]
    pub event: Option<RawEvent>,
}

/// `PATCH /streams/{id}` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUpdate {
    pub service_id: ServiceId,
}

/// The confirmed assignment of the single playback slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub active_service: Option<Service>,
    pub current_event: Option<Event>,
}

impl Session {
    pub fn active_service_id(&self) -> Option<ServiceId> {
        self.active_service.as_ref().map(|s| s.id)
    }
}

impl From<StreamState> for Session {
    fn from(value: StreamState) -> Self {
        Self {
            active_service: value.service,
            current_event: value.event.as_ref().and_then(RawEvent::normalize),
        }
    }
}
