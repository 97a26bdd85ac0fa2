pub mod help_overlay;
pub mod navbar;
pub mod player_pane;
pub mod schedule_overlay;
pub mod service_tabs;
