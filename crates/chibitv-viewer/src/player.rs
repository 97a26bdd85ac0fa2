/// Playback controller: owns at most one media pipeline and drives it through
/// its lifecycle.
///
/// ```text
///   Absent ─mount─▶ Constructing ─attach─▶ Attached ─load+play─▶ Playing
///      ▲                                                            │
///      └────────── Released ◀── pause · unload · detach · release ──┘
/// ```
///
/// The controller runs as a single task fed by `PlayerHandle`.  Commands are
/// handled strictly in order, so an `Unmount` has finished tearing the old
/// pipeline down before a following `Mount` constructs the next one.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chibitv_proto::config::PlayerConfig;
use chibitv_proto::platform;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Where decoded video ends up.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSurface {
    /// Video output driver name; empty lets the pipeline choose.
    pub video_output: String,
    /// Native window to embed into, if any.
    pub window_id: Option<i64>,
    pub title: String,
}

impl RenderSurface {
    /// Resolve the surface for this run.  `None` means there is nothing to
    /// render into and mounting is skipped.
    pub fn resolve(config: &PlayerConfig) -> Option<Self> {
        Self::resolve_with(config, platform::has_display())
    }

    fn resolve_with(config: &PlayerConfig, has_display: bool) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        if config.window_id.is_none() && !has_display {
            return None;
        }
        Some(Self {
            video_output: config.video_output.clone(),
            window_id: config.window_id,
            title: "chibitv".to_string(),
        })
    }

    pub fn describe(&self) -> String {
        match (self.window_id, self.video_output.as_str()) {
            (Some(wid), "") => format!("window {}", wid),
            (Some(wid), vo) => format!("window {} ({})", wid, vo),
            (None, "") => "own window".to_string(),
            (None, vo) => format!("own window ({})", vo),
        }
    }
}

/// Knobs handed to the pipeline when it is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub url: String,
    pub prebuffer_bytes: u64,
    /// Drop buffered backlog rather than let live latency grow.
    pub low_latency: bool,
    /// Demux on a worker thread.
    pub worker_demux: bool,
    pub volume: f32,
}

impl PipelineSettings {
    pub fn from_config(url: String, config: &PlayerConfig) -> Self {
        Self {
            url,
            prebuffer_bytes: config.prebuffer_bytes,
            low_latency: config.low_latency,
            worker_demux: true,
            volume: config.volume,
        }
    }
}

/// One live decoding pipeline.  Methods map one-to-one onto lifecycle steps.
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    async fn attach(&mut self, surface: &RenderSurface) -> anyhow::Result<()>;
    async fn load(&mut self, url: &str) -> anyhow::Result<()>;
    async fn play(&mut self) -> anyhow::Result<()>;
    async fn pause(&mut self) -> anyhow::Result<()>;
    async fn unload(&mut self) -> anyhow::Result<()>;
    async fn detach(&mut self) -> anyhow::Result<()>;
    /// Free every resource.  The pipeline is dropped right after.
    async fn release(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn construct(&self, settings: &PipelineSettings)
        -> anyhow::Result<Box<dyn MediaPipeline>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Construct,
    Attach,
    Load,
    Play,
    Pause,
    Unload,
    Detach,
    Release,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Construct => "construct",
            Step::Attach => "attach",
            Step::Load => "load",
            Step::Play => "play",
            Step::Pause => "pause",
            Step::Unload => "unload",
            Step::Detach => "detach",
            Step::Release => "release",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no render surface available")]
    NoSurface,
    #[error("pipeline {0} failed: {1}")]
    Step(Step, #[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Absent,
    Constructing,
    Attached,
    Playing,
    Released,
}

/// Published through a `watch` channel for the UI.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerStatus {
    pub lifecycle: Lifecycle,
    /// Pipelines constructed so far.
    pub mounts: u64,
    /// Description of the render surface, `None` when there is none.
    pub surface: Option<String>,
    /// Last failure reported by a mount step, cleared on the next mount.
    pub error: Option<String>,
}

pub struct PlaybackController {
    factory: Arc<dyn PipelineFactory>,
    surface: Option<RenderSurface>,
    settings: PipelineSettings,
    current: Option<Box<dyn MediaPipeline>>,
    status_tx: watch::Sender<PlayerStatus>,
}

impl PlaybackController {
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        surface: Option<RenderSurface>,
        settings: PipelineSettings,
    ) -> Self {
        let status = PlayerStatus {
            surface: surface.as_ref().map(RenderSurface::describe),
            ..PlayerStatus::default()
        };
        let (status_tx, _) = watch::channel(status);
        Self {
            factory,
            surface,
            settings,
            current: None,
            status_tx,
        }
    }

    pub fn status(&self) -> watch::Receiver<PlayerStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.current.is_some()
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.status_tx.send_modify(|s| s.lifecycle = lifecycle);
    }

    fn fail(&self, err: PipelineError) -> PipelineError {
        warn!("player: {}", err);
        self.status_tx.send_modify(|s| s.error = Some(err.to_string()));
        err
    }

    /// Construct, attach and start a pipeline.  A second mount while one is
    /// live is a no-op.
    ///
    /// Once construction succeeded the pipeline stays owned by the controller
    /// even if a later step fails; it is torn down by the next `unmount`.
    pub async fn mount(&mut self) -> Result<(), PipelineError> {
        if self.current.is_some() {
            debug!("player: already mounted");
            return Ok(());
        }
        let Some(surface) = self.surface.clone() else {
            info!("player: no render surface, skipping mount");
            return Err(PipelineError::NoSurface);
        };

        self.status_tx.send_modify(|s| {
            s.lifecycle = Lifecycle::Constructing;
            s.mounts += 1;
            s.error = None;
        });
        info!("player: mounting {}", self.settings.url);

        let mut pipeline = match self.factory.construct(&self.settings).await {
            Ok(p) => p,
            Err(e) => {
                self.set_lifecycle(Lifecycle::Absent);
                return Err(self.fail(PipelineError::Step(Step::Construct, e)));
            }
        };

        let started = start(
            pipeline.as_mut(),
            &surface,
            &self.settings.url,
            &self.status_tx,
        )
        .await;
        self.current = Some(pipeline);
        started.map_err(|e| self.fail(e))
    }

    /// Tear the live pipeline down: pause, unload, detach, release.  Every
    /// step runs even if an earlier one failed.
    pub async fn unmount(&mut self) {
        let Some(mut pipeline) = self.current.take() else {
            return;
        };
        info!("player: unmounting");

        if let Err(e) = pipeline.pause().await {
            warn!("player: {} failed during teardown: {}", Step::Pause, e);
        }
        if let Err(e) = pipeline.unload().await {
            warn!("player: {} failed during teardown: {}", Step::Unload, e);
        }
        if let Err(e) = pipeline.detach().await {
            warn!("player: {} failed during teardown: {}", Step::Detach, e);
        }
        if let Err(e) = pipeline.release().await {
            warn!("player: {} failed during teardown: {}", Step::Release, e);
        }
        drop(pipeline);

        self.set_lifecycle(Lifecycle::Released);
    }

    /// Move the controller onto its own task.
    pub fn spawn(mut self) -> PlayerHandle {
        let (tx, mut rx) = mpsc::channel::<PlayerCommand>(16);
        let status = self.status();

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    PlayerCommand::Mount => {
                        // Failures are already on the status channel.
                        let _ = self.mount().await;
                    }
                    PlayerCommand::Unmount => self.unmount().await,
                    PlayerCommand::Shutdown(ack) => {
                        self.unmount().await;
                        let _ = ack.send(());
                        return;
                    }
                }
            }
            // Every handle is gone.
            self.unmount().await;
        });

        PlayerHandle { tx, status }
    }
}

async fn start(
    pipeline: &mut dyn MediaPipeline,
    surface: &RenderSurface,
    url: &str,
    status_tx: &watch::Sender<PlayerStatus>,
) -> Result<(), PipelineError> {
    pipeline
        .attach(surface)
        .await
        .map_err(|e| PipelineError::Step(Step::Attach, e))?;
    status_tx.send_modify(|s| s.lifecycle = Lifecycle::Attached);

    pipeline
        .load(url)
        .await
        .map_err(|e| PipelineError::Step(Step::Load, e))?;
    pipeline
        .play()
        .await
        .map_err(|e| PipelineError::Step(Step::Play, e))?;
    status_tx.send_modify(|s| s.lifecycle = Lifecycle::Playing);
    Ok(())
}

enum PlayerCommand {
    Mount,
    Unmount,
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front end of a spawned `PlaybackController`.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlayerCommand>,
    status: watch::Receiver<PlayerStatus>,
}

impl PlayerHandle {
    pub async fn mount(&self) {
        if self.tx.send(PlayerCommand::Mount).await.is_err() {
            warn!("player: controller gone, mount dropped");
        }
    }

    pub async fn unmount(&self) {
        if self.tx.send(PlayerCommand::Unmount).await.is_err() {
            warn!("player: controller gone, unmount dropped");
        }
    }

    /// Tear down and stop the controller, waiting until the pipeline is
    /// released.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(PlayerCommand::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn status(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }
}

/// In-memory pipeline for controller tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every lifecycle call as "<step>#<instance>".
    #[derive(Default)]
    struct Journal {
        calls: Vec<String>,
        live: u32,
        max_live: u32,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeFactory {
        journal: Arc<Mutex<Journal>>,
        failing: Arc<Mutex<HashSet<Step>>>,
    }

    impl FakeFactory {
        pub(crate) fn fail_on(&self, step: Step) {
            self.failing.lock().unwrap().insert(step);
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.journal.lock().unwrap().calls.clone()
        }

        pub(crate) fn max_live(&self) -> u32 {
            self.journal.lock().unwrap().max_live
        }
    }

    struct FakePipeline {
        id: usize,
        journal: Arc<Mutex<Journal>>,
        failing: Arc<Mutex<HashSet<Step>>>,
    }

    impl FakePipeline {
        fn record(&self, step: Step) -> anyhow::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .calls
                .push(format!("{}#{}", step, self.id));
            if self.failing.lock().unwrap().contains(&step) {
                anyhow::bail!("{} exploded", step);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MediaPipeline for FakePipeline {
        async fn attach(&mut self, _surface: &RenderSurface) -> anyhow::Result<()> {
            self.record(Step::Attach)
        }
        async fn load(&mut self, _url: &str) -> anyhow::Result<()> {
            self.record(Step::Load)
        }
        async fn play(&mut self) -> anyhow::Result<()> {
            self.record(Step::Play)
        }
        async fn pause(&mut self) -> anyhow::Result<()> {
            self.record(Step::Pause)
        }
        async fn unload(&mut self) -> anyhow::Result<()> {
            self.record(Step::Unload)
        }
        async fn detach(&mut self) -> anyhow::Result<()> {
            self.record(Step::Detach)
        }
        async fn release(&mut self) -> anyhow::Result<()> {
            self.journal.lock().unwrap().live -= 1;
            self.record(Step::Release)
        }
    }

    #[async_trait]
    impl PipelineFactory for FakeFactory {
        async fn construct(
            &self,
            _settings: &PipelineSettings,
        ) -> anyhow::Result<Box<dyn MediaPipeline>> {
            let id = {
                let mut j = self.journal.lock().unwrap();
                let id = j.calls.iter().filter(|c| c.starts_with("construct")).count() + 1;
                j.calls.push(format!("construct#{}", id));
                id
            };
            if self.failing.lock().unwrap().contains(&Step::Construct) {
                anyhow::bail!("no decoder");
            }
            {
                let mut j = self.journal.lock().unwrap();
                j.live += 1;
                j.max_live = j.max_live.max(j.live);
            }
            Ok(Box::new(FakePipeline {
                id,
                journal: self.journal.clone(),
                failing: self.failing.clone(),
            }))
        }
    }

    pub(crate) fn surface() -> RenderSurface {
        RenderSurface {
            video_output: String::new(),
            window_id: None,
            title: "test".into(),
        }
    }
}
