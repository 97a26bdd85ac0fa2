//! Action enum: all user-initiated intents.

use chibitv_proto::model::ServiceId;

/// Identifies a UI component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Navbar,
    ServiceTabs,
    PlayerPane,
    ScheduleOverlay,
    HelpOverlay,
}

/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Session ──────────────────────────────────────────────────────────────
    /// Ask the server to tune the stream slot to this service.
    SelectService(ServiceId),
    /// Poll the session right now instead of waiting for the next tick.
    Refresh,

    // ── Overlays / disclosure ────────────────────────────────────────────────
    ToggleMenu,
    CloseMenu,
    ToggleDescription,
    ToggleHelp,

    // ── System ───────────────────────────────────────────────────────────────
    Quit,
    Noop,
}
