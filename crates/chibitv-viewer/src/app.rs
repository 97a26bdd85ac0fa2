//! App: owns all components, runs the event loop, dispatches actions.
//!
//! Playback follows the session: the pipeline is mounted while no service
//! switch is in flight and torn down for the duration of one.  `PlaybackGate`
//! turns session snapshots into mount/unmount commands for the controller.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseEvent,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use chibitv_proto::api::ViewerApi;
use chibitv_proto::config::PollingConfig;
use chibitv_proto::model::{RawEvent, Service, ServiceId};
use chibitv_proto::session::{SessionReconciler, SessionState};
use chibitv_proto::time;

use crate::{
    action::Action,
    app_state::{AppState, Fetch, ServiceEvents},
    component::Component,
    components::{
        help_overlay::HelpOverlay, navbar::Navbar, player_pane::PlayerPane,
        schedule_overlay::ScheduleOverlay, service_tabs::ServiceTabs,
    },
    player::{PlayerHandle, PlayerStatus},
    widgets::{
        status_bar::{draw_keys_bar, InputMode},
        toast::ToastManager,
    },
};

// ── Playback gate ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStep {
    Mount,
    Unmount,
}

/// Tracks whether the pipeline should exist for the current session.
///
/// Mounted iff a session has been confirmed and no switch is pending.  The
/// mutation epoch it was mounted under is remembered so that a switch whose
/// pending window was too short to be observed still forces a fresh pipeline.
#[derive(Debug, Default)]
pub struct PlaybackGate {
    mounted_epoch: Option<u64>,
}

impl PlaybackGate {
    pub fn observe(&mut self, session: &SessionState) -> Vec<GateStep> {
        let ready = session.is_loaded() && !session.mutation_pending();
        self.step(ready, session.mutation_epoch())
    }

    fn step(&mut self, ready: bool, epoch: u64) -> Vec<GateStep> {
        match self.mounted_epoch {
            Some(_) if !ready => {
                self.mounted_epoch = None;
                vec![GateStep::Unmount]
            }
            Some(mounted) if mounted != epoch => {
                self.mounted_epoch = Some(epoch);
                vec![GateStep::Unmount, GateStep::Mount]
            }
            Some(_) => vec![],
            None if ready => {
                self.mounted_epoch = Some(epoch);
                vec![GateStep::Mount]
            }
            None => vec![],
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted_epoch.is_some()
    }
}

/// Hand gate decisions to the controller, in order.
async fn drive_player(player: &PlayerHandle, steps: Vec<GateStep>) {
    for step in steps {
        match step {
            GateStep::Mount => player.mount().await,
            GateStep::Unmount => player.unmount().await,
        }
    }
}

/// Next published player status, `None` once the controller has stopped.
async fn next_player_status(rx: &mut watch::Receiver<PlayerStatus>) -> Option<PlayerStatus> {
    rx.changed().await.ok()?;
    Some(rx.borrow_and_update().clone())
}

// ── Input reader ──────────────────────────────────────────────────────────────

/// How long the reader blocks before checking whether the app is still there.
const INPUT_POLL: Duration = Duration::from_millis(100);

fn read_terminal_event() -> io::Result<Option<Event>> {
    if event::poll(INPUT_POLL)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

/// Forward terminal events until the app drops its receiver.  `next` yields
/// `Ok(None)` when its poll window passed without input.
fn forward_input(
    tx: &mpsc::Sender<AppMessage>,
    mut next: impl FnMut() -> io::Result<Option<Event>>,
) {
    while !tx.is_closed() {
        match next() {
            Ok(Some(ev)) => {
                if tx.blocking_send(AppMessage::Event(ev)).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("terminal input failed: {}", e);
                break;
            }
        }
    }
    debug!("input reader stopped");
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Everything that reaches the event loop from background tasks.
pub enum AppMessage {
    Event(Event),
    ServicesLoaded(Result<Vec<Service>, String>),
    EventsLoaded(ServiceId, Result<Vec<RawEvent>, String>),
    SwitchFailed(ServiceId, String),
}

#[derive(Default)]
struct PaneAreas {
    tabs: Rect,
    body: Rect,
}

pub struct App {
    state: AppState,
    api: Arc<dyn ViewerApi>,
    reconciler: SessionReconciler,
    player: PlayerHandle,
    polling: PollingConfig,

    navbar: Navbar,
    tabs: ServiceTabs,
    player_pane: PlayerPane,
    schedule: ScheduleOverlay,
    help: HelpOverlay,
    toast: ToastManager,

    gate: PlaybackGate,
    areas: PaneAreas,
    should_quit: bool,
    tx: Option<mpsc::Sender<AppMessage>>,
}

impl App {
    pub fn new(
        api: Arc<dyn ViewerApi>,
        reconciler: SessionReconciler,
        player: PlayerHandle,
        polling: PollingConfig,
        server_url: String,
    ) -> Self {
        let stream_url = api.stream_url(reconciler.stream_id());
        let mut state = AppState::new(server_url, stream_url, time::now());
        state.session = reconciler.snapshot();
        state.player = player.status().borrow().clone();
        Self {
            state,
            api,
            reconciler,
            player,
            polling,
            navbar: Navbar::new(),
            tabs: ServiceTabs::new(),
            player_pane: PlayerPane::new(),
            schedule: ScheduleOverlay::new(),
            help: HelpOverlay::new(),
            toast: ToastManager::new(),
            gate: PlaybackGate::default(),
            areas: PaneAreas::default(),
            should_quit: false,
            tx: None,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(mut self) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);
        self.tx = Some(tx.clone());

        // ── Background task: keyboard/mouse events ────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || forward_input(&event_tx, read_terminal_event));

        let mut session_rx = self.reconciler.subscribe();
        let mut player_rx = self.player.status();
        let mut player_alive = true;

        let mut services_refresh = tokio::time::interval(self.polling.services_interval());
        services_refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut events_refresh = tokio::time::interval(self.polling.events_interval());
        events_refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first schedule fetch is driven by the session, not this timer.
        events_refresh.reset();

        let mut clock_tick = tokio::time::interval(Duration::from_secs(1));
        clock_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Whatever the session already holds counts as the first snapshot.
        let initial = session_rx.borrow_and_update().clone();
        self.on_session(initial, None).await;
        info!("viewer started against {}", self.state.server_url);

        loop {
            terminal.draw(|f| self.draw(f))?;

            tokio::select! {
                Some(msg) = rx.recv() => {
                    self.handle_message(msg).await;
                }
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        warn!("session cell closed");
                        break;
                    }
                    let next = session_rx.borrow_and_update().clone();
                    let prev = std::mem::take(&mut self.state.session);
                    self.on_session(next, Some(prev)).await;
                }
                status = next_player_status(&mut player_rx), if player_alive => {
                    match status {
                        Some(status) => self.state.player = status,
                        None => {
                            warn!("player controller gone, status frozen");
                            player_alive = false;
                        }
                    }
                }
                _ = services_refresh.tick() => {
                    self.fetch_services();
                }
                _ = events_refresh.tick() => {
                    self.fetch_events();
                }
                _ = clock_tick.tick() => {
                    self.state.now = time::now();
                    self.toast.tick();
                }
            }

            if self.should_quit {
                break;
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        info!("quitting, releasing player");
        self.player.shutdown().await;
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    // ── Message handling ──────────────────────────────────────────────────────

    async fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(Event::Key(key)) => self.handle_key(key),
            AppMessage::Event(Event::Mouse(mouse)) => self.handle_mouse(mouse),
            AppMessage::Event(_) => {}
            AppMessage::ServicesLoaded(Ok(services)) => {
                debug!("services loaded: {}", services.len());
                self.state.services = Fetch::Ready(services);
                self.tabs.sync(&self.state);
            }
            AppMessage::ServicesLoaded(Err(e)) => {
                warn!("services refresh failed: {}", e);
                self.state.services.fail(e);
            }
            AppMessage::EventsLoaded(service_id, result) => {
                // A reply for a service that is no longer selected is dropped.
                if self.state.selected_service_id() != Some(service_id) {
                    debug!("discarding events for service {}", service_id);
                    return;
                }
                match result {
                    Ok(events) => {
                        self.state.events = Fetch::Ready(ServiceEvents { service_id, events });
                    }
                    Err(e) => {
                        warn!("events refresh for service {} failed: {}", service_id, e);
                        self.state.events.fail(e);
                    }
                }
            }
            AppMessage::SwitchFailed(service_id, e) => {
                let name = self
                    .state
                    .service_list()
                    .iter()
                    .find(|s| s.id == service_id)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| format!("service {}", service_id));
                self.toast.warning(format!("could not switch to {}: {}", name, e));
            }
        }
    }

    async fn on_session(&mut self, next: SessionState, prev: Option<SessionState>) {
        let prev_service = prev.as_ref().and_then(SessionState::selected_service_id);
        let prev_event = prev.as_ref().and_then(|s| s.current_event().map(|e| e.id));
        self.state.session = next;

        if self.state.current_event().map(|e| e.id) != prev_event {
            self.state.description_open = false;
        }
        let selected = self.state.selected_service_id();
        if selected != prev_service {
            debug!("selected service {:?} -> {:?}", prev_service, selected);
            self.state.events = Fetch::Loading;
            self.fetch_events();
        }
        self.tabs.sync(&self.state);

        let steps = self.gate.observe(&self.state.session);
        if !steps.is_empty() {
            debug!("player gate: {:?} (mounted={})", steps, self.gate.is_mounted());
        }
        drive_player(&self.player, steps).await;
    }

    // ── Background fetches ────────────────────────────────────────────────────

    fn fetch_services(&self) {
        let Some(tx) = self.tx.clone() else { return };
        let api = self.api.clone();
        tokio::spawn(async move {
            let result = api.services().await.map_err(|e| e.to_string());
            let _ = tx.send(AppMessage::ServicesLoaded(result)).await;
        });
    }

    fn fetch_events(&self) {
        let Some(service_id) = self.state.selected_service_id() else {
            return;
        };
        let Some(tx) = self.tx.clone() else { return };
        let api = self.api.clone();
        tokio::spawn(async move {
            let result = api.events(service_id).await.map_err(|e| e.to_string());
            let _ = tx.send(AppMessage::EventsLoaded(service_id, result)).await;
        });
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    fn input_mode(&self) -> InputMode {
        if self.help.visible {
            InputMode::Help
        } else if self.state.menu_open {
            InputMode::Menu
        } else {
            InputMode::Normal
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.dispatch(vec![Action::Quit]);
            return;
        }

        let actions = match self.input_mode() {
            InputMode::Help => self.help.handle_key(key, &self.state),
            mode => match key.code {
                KeyCode::Char('q') => vec![Action::Quit],
                KeyCode::Char('?') => vec![Action::ToggleHelp],
                KeyCode::Char('m') => vec![Action::ToggleMenu],
                KeyCode::Char('d') => vec![Action::ToggleDescription],
                KeyCode::Char('r') => vec![Action::Refresh],
                KeyCode::Up
                | KeyCode::Down
                | KeyCode::Char('j')
                | KeyCode::Char('k')
                | KeyCode::PageUp
                | KeyCode::PageDown
                | KeyCode::Home
                | KeyCode::Char('g')
                | KeyCode::Esc
                    if mode == InputMode::Menu =>
                {
                    self.schedule.handle_key(key, &self.state)
                }
                _ => self.tabs.handle_key(key, &self.state),
            },
        };
        self.dispatch(actions);
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.help.visible {
            return;
        }
        let inside = |r: Rect| {
            mouse.column >= r.x
                && mouse.column < r.x + r.width
                && mouse.row >= r.y
                && mouse.row < r.y + r.height
        };
        let actions = if inside(self.areas.tabs) {
            self.tabs.handle_mouse(mouse, &self.state)
        } else if self.state.menu_open && inside(self.areas.body) {
            self.schedule.handle_mouse(mouse, &self.state)
        } else {
            vec![]
        };
        self.dispatch(actions);
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    fn dispatch(&mut self, actions: Vec<Action>) {
        for action in actions {
            if action == Action::Noop {
                continue;
            }
            debug!("action: {:?}", action);
            let components: [&mut dyn Component; 5] = [
                &mut self.navbar,
                &mut self.tabs,
                &mut self.player_pane,
                &mut self.schedule,
                &mut self.help,
            ];
            for component in components {
                trace!("{:?} <- {:?}", component.id(), action);
                component.on_action(&action, &self.state);
            }
            self.apply_action(action);
        }
    }

    fn apply_action(&mut self, action: Action) {
        match action {
            Action::SelectService(service_id) => {
                let session = &self.state.session;
                if !session.mutation_pending() && session.selected_service_id() == Some(service_id)
                {
                    debug!("service {} already active", service_id);
                    return;
                }
                let reconciler = self.reconciler.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = reconciler.select_service(service_id).await {
                        if let Some(tx) = tx {
                            let _ = tx
                                .send(AppMessage::SwitchFailed(service_id, e.to_string()))
                                .await;
                        }
                    }
                });
            }
            Action::ToggleMenu => {
                self.state.menu_open = !self.state.menu_open;
                if self.state.menu_open && self.state.raw_schedule().is_none() {
                    self.fetch_events();
                }
            }
            Action::CloseMenu => self.state.menu_open = false,
            Action::ToggleDescription => {
                if self.state.has_description() {
                    self.state.description_open = !self.state.description_open;
                }
            }
            Action::Refresh => {
                let reconciler = self.reconciler.clone();
                tokio::spawn(async move {
                    let _ = reconciler.poll().await;
                });
                self.fetch_services();
                self.fetch_events();
                self.toast.info("refreshing");
            }
            Action::Quit => self.should_quit = true,
            Action::ToggleHelp | Action::Noop => {}
        }
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let navbar_height = self.navbar.height(&self.state, area.width);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(navbar_height),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        self.areas.tabs = chunks[1];
        self.areas.body = chunks[2];

        self.navbar.draw(frame, chunks[0], &self.state);
        self.tabs.draw(frame, chunks[1], &self.state);
        self.player_pane.draw(frame, chunks[2], &self.state);
        draw_keys_bar(frame, chunks[3], self.input_mode(), &self.state);

        self.schedule.draw(frame, chunks[2], &self.state);
        self.help.draw(frame, area, &self.state);
        if !self.toast.is_empty() {
            self.toast.draw(frame, area);
        }
    }
}
