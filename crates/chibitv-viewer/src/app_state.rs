//! AppState: shared read-only data passed to all components during render/event.
//!
//! Components read this but never mutate it.
//! The App event-loop is the only thing that writes to AppState.

use chibitv_proto::model::{Event, RawEvent, Service, ServiceId};
use chibitv_proto::schedule;
use chibitv_proto::session::SessionState;
use chrono::NaiveDateTime;

use crate::player::PlayerStatus;

/// Fetch status of a list the viewer refreshes on its own timer.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Loading,
    Ready(T),
    /// Last refresh failed; keeps the previous value if there was one.
    Failed(Option<T>, String),
}

impl<T> Fetch<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Fetch::Ready(v) | Fetch::Failed(Some(v), _) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Fetch::Failed(_, e) => Some(e),
            _ => None,
        }
    }

    /// Record a failed refresh, keeping what was there.
    pub fn fail(&mut self, error: String) {
        let prev = match std::mem::replace(self, Fetch::Loading) {
            Fetch::Ready(v) | Fetch::Failed(Some(v), _) => Some(v),
            _ => None,
        };
        *self = Fetch::Failed(prev, error);
    }
}

/// Raw schedule records together with the service they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEvents {
    pub service_id: ServiceId,
    pub events: Vec<RawEvent>,
}

pub struct AppState {
    pub services: Fetch<Vec<Service>>,
    pub session: SessionState,
    pub events: Fetch<ServiceEvents>,
    pub player: PlayerStatus,
    /// Wall clock used for schedule projection, refreshed every second.
    pub now: NaiveDateTime,
    pub menu_open: bool,
    pub description_open: bool,
    pub server_url: String,
    pub stream_url: String,
}

impl AppState {
    pub fn new(server_url: String, stream_url: String, now: NaiveDateTime) -> Self {
        Self {
            services: Fetch::Loading,
            session: SessionState::default(),
            events: Fetch::Loading,
            player: PlayerStatus::default(),
            now,
            menu_open: false,
            description_open: false,
            server_url,
            stream_url,
        }
    }

    pub fn service_list(&self) -> &[Service] {
        self.services.value().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn selected_service_id(&self) -> Option<ServiceId> {
        self.session.selected_service_id()
    }

    /// The selected service, preferring the catalogue entry over the copy
    /// embedded in the session.
    pub fn selected_service(&self) -> Option<&Service> {
        let id = self.selected_service_id()?;
        self.service_list()
            .iter()
            .find(|s| s.id == id)
            .or_else(|| self.session.session.as_ref()?.active_service.as_ref())
    }

    pub fn current_event(&self) -> Option<&Event> {
        self.session.current_event()
    }

    /// Events held for the selected service.  Records fetched for a service
    /// that is no longer selected are ignored.
    pub fn raw_schedule(&self) -> Option<&[RawEvent]> {
        let selected = self.selected_service_id()?;
        let held = self.events.value()?;
        (held.service_id == selected).then_some(held.events.as_slice())
    }

    /// Upcoming schedule for the selected service, recomputed against `now`.
    pub fn schedule(&self) -> Option<Vec<Event>> {
        self.raw_schedule().map(|raw| schedule::project(raw, self.now))
    }

    /// True when the navbar should offer the description disclosure.
    pub fn has_description(&self) -> bool {
        self.current_event()
            .is_some_and(|e| e.visible_description().next().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chibitv_proto::model::StreamState;
    use chrono::TimeDelta;

    fn service(id: ServiceId, name: &str) -> Service {
        Service {
            id,
            name: name.into(),
            provider_name: String::new(),
        }
    }

    fn raw(id: u16, title: &str, start: NaiveDateTime, mins: i64) -> RawEvent {
        RawEvent {
            id,
            title: Some(title.into()),
            description: vec![],
            start_time: Some(start),
            end_time: Some(start + TimeDelta::minutes(mins)),
        }
    }

    fn state_with_session(active: Option<Service>) -> AppState {
        let now = chibitv_proto::time::now();
        let mut state = AppState::new(
            "http://tv/api".into(),
            "http://tv/api/streams/0/stream.ts".into(),
            now,
        );
        let mut session = SessionState::default();
        session.session = Some(
            StreamState {
                service: active,
                event: None,
            }
            .into(),
        );
        state.session = session;
        state
    }

    #[test]
    fn fetch_failure_keeps_previous_value() {
        let mut services = Fetch::Ready(vec![service(1, "A")]);
        services.fail("timeout".into());
        assert_eq!(services.value().map(Vec::len), Some(1));
        assert_eq!(services.error(), Some("timeout"));

        let mut empty: Fetch<Vec<Service>> = Fetch::Loading;
        empty.fail("refused".into());
        assert!(empty.value().is_none());
    }

    #[test]
    fn selected_service_prefers_catalogue() {
        let mut state = state_with_session(Some(service(2, "stale name")));
        assert_eq!(state.selected_service().map(|s| s.name.as_str()), Some("stale name"));

        state.services = Fetch::Ready(vec![service(1, "A"), service(2, "B")]);
        assert_eq!(state.selected_service().map(|s| s.name.as_str()), Some("B"));
    }

    #[test]
    fn schedule_only_for_selected_service() {
        let mut state = state_with_session(Some(service(1, "A")));
        let now = state.now;
        state.events = Fetch::Ready(ServiceEvents {
            service_id: 2,
            events: vec![raw(1, "Other", now, 30)],
        });
        assert!(state.schedule().is_none());

        state.events = Fetch::Ready(ServiceEvents {
            service_id: 1,
            events: vec![
                raw(2, "Later", now + TimeDelta::hours(1), 30),
                raw(3, "Now", now - TimeDelta::minutes(5), 30),
                raw(4, "Done", now - TimeDelta::hours(2), 30),
            ],
        });
        let titles: Vec<String> = state
            .schedule()
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Now", "Later"]);
    }

    #[test]
    fn no_session_means_no_selection() {
        let state = AppState::new(String::new(), String::new(), chibitv_proto::time::now());
        assert!(state.selected_service().is_none());
        assert!(state.schedule().is_none());
        assert!(!state.has_description());
    }
}
