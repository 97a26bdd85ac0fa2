/// mpv-backed media pipeline.
///
/// Each mount spawns its own mpv process, idle and windowless, and talks to it
/// over JSON IPC:
///
/// ```text
///   MpvFactory::construct()
///         │  spawn mpv --idle --input-ipc-server=<per-instance socket>
///         ├── writer_task   ← MpvRequest via mpsc, serialised → socket
///         └── reader_task   ← JSON lines from socket
///                                ├── response (request_id) → oneshot reply
///                                └── event                 → event_task (logging)
/// ```
///
/// Platform notes:
/// - Unix:    Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chibitv_proto::config::PlayerConfig;
use chibitv_proto::platform;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::player::{MediaPipeline, PipelineFactory, PipelineSettings, RenderSurface};

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: Duration = Duration::from_secs(5);
const QUIT_GRACE: Duration = Duration::from_secs(2);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line, '\n' included
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
        self.send(json!(["set_property", name, value])).await?;
        Ok(())
    }
}

/// Command line for one pipeline instance.
pub fn launch_args(settings: &PipelineSettings, instance: u64) -> Vec<String> {
    let mut args = vec![
        "--idle=yes".to_string(),
        "--force-window=no".to_string(),
        "--keep-open=no".to_string(),
        platform::mpv_socket_arg(instance),
        "--quiet".to_string(),
        format!(
            "--volume={}",
            (settings.volume * 100.0).clamp(0.0, 100.0).round() as i64
        ),
        "--cache=yes".to_string(),
        format!("--demuxer-max-bytes={}", settings.prebuffer_bytes),
        format!(
            "--demuxer-thread={}",
            if settings.worker_demux { "yes" } else { "no" }
        ),
    ];
    if settings.low_latency {
        args.push("--profile=low-latency".to_string());
        args.push("--cache-pause=no".to_string());
    }
    args
}

pub struct MpvFactory {
    binary: Option<PathBuf>,
    next_instance: AtomicU64,
}

impl MpvFactory {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            binary: config.mpv_path.clone(),
            next_instance: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PipelineFactory for MpvFactory {
    async fn construct(
        &self,
        settings: &PipelineSettings,
    ) -> anyhow::Result<Box<dyn MediaPipeline>> {
        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
        let binary = self
            .binary
            .clone()
            .or_else(platform::find_mpv_binary)
            .ok_or_else(|| anyhow!("mpv binary not found"))?;
        let socket_name = platform::mpv_socket_name(instance);

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&socket_name).await;

        let stderr_path = platform::data_dir().join("mpv-stderr.log");
        std::fs::create_dir_all(platform::data_dir())?;
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)
            .with_context(|| format!("opening {:?}", stderr_path))?;

        info!("mpv: spawning instance {} ({:?})", instance, binary);
        let child = tokio::process::Command::new(&binary)
            .args(launch_args(settings, instance))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {:?}", binary))?;
        debug!("mpv: pid {:?}", child.id());

        // On failure `child` is dropped here and killed with it.
        let (event_tx, event_rx) = mpsc::channel(64);
        let handle = connect(&socket_name, event_tx).await?;
        let events = tokio::spawn(event_task(instance, event_rx));

        Ok(Box::new(MpvPipeline {
            instance,
            handle,
            child: Some(child),
            socket_name,
            events,
        }))
    }
}

pub struct MpvPipeline {
    instance: u64,
    handle: MpvHandle,
    child: Option<tokio::process::Child>,
    socket_name: String,
    events: JoinHandle<()>,
}

#[async_trait]
impl MediaPipeline for MpvPipeline {
    async fn attach(&mut self, surface: &RenderSurface) -> anyhow::Result<()> {
        // Options set before the first file load decide how the VO opens.
        if !surface.video_output.is_empty() {
            self.handle
                .set_property("vo", json!(surface.video_output))
                .await?;
        }
        if let Some(wid) = surface.window_id {
            self.handle.set_property("wid", json!(wid)).await?;
        }
        self.handle
            .set_property("title", json!(surface.title))
            .await?;
        self.handle.set_property("force-window", json!("yes")).await
    }

    async fn load(&mut self, url: &str) -> anyhow::Result<()> {
        debug!("mpv[{}]: loadfile {}", self.instance, url);
        self.handle.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        self.handle.set_property("pause", json!(false)).await
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.handle.set_property("pause", json!(true)).await
    }

    async fn unload(&mut self) -> anyhow::Result<()> {
        self.handle.send(json!(["stop"])).await?;
        Ok(())
    }

    async fn detach(&mut self) -> anyhow::Result<()> {
        self.handle.set_property("force-window", json!("no")).await
    }

    async fn release(&mut self) -> anyhow::Result<()> {
        // mpv closes the IPC connection as it exits, so no reply is expected.
        let _ = self.handle.send(json!(["quit"])).await;

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("mpv[{}]: exited {}", self.instance, status),
                Ok(Err(e)) => warn!("mpv[{}]: wait failed: {}", self.instance, e),
                Err(_) => {
                    warn!("mpv[{}]: did not quit, killing", self.instance);
                    child.kill().await?;
                }
            }
        }
        self.events.abort();

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;
        Ok(())
    }
}

impl Drop for MpvPipeline {
    fn drop(&mut self) {
        self.events.abort();
    }
}

#[cfg(unix)]
async fn connect(socket_name: &str, event_tx: mpsc::Sender<Value>) -> anyhow::Result<MpvHandle> {
    use tokio::net::UnixStream;

    let socket_path = PathBuf::from(socket_name);
    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if !socket_path.exists() {
        anyhow::bail!("mpv IPC socket did not appear");
    }

    let stream = UnixStream::connect(&socket_path).await?;
    info!("mpv: connected to {}", socket_name);
    Ok(start_io_tasks(stream, event_tx))
}

#[cfg(windows)]
async fn connect(socket_name: &str, event_tx: mpsc::Sender<Value>) -> anyhow::Result<MpvHandle> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let pipe_path = format!(r"\\.\pipe\{}", socket_name);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(client) = ClientOptions::new().open(&pipe_path) {
            info!("mpv: connected to {}", pipe_path);
            return Ok(start_io_tasks(client, event_tx));
        }
    }
    anyhow::bail!("mpv named pipe did not appear")
}

fn start_io_tasks<S>(stream: S, event_tx: mpsc::Sender<Value>) -> MpvHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

/// Turn one IPC reply into a result.
fn reply_result(val: Value) -> anyhow::Result<Value> {
    match val["error"].as_str() {
        Some("success") => Ok(val),
        other => Err(anyhow!("mpv error: {}", other.unwrap_or("unknown error"))),
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow!("mpv IPC {}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<Value>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    match pending.lock().await.remove(&req_id) {
                        Some(tx) => {
                            let _ = tx.send(reply_result(val));
                        }
                        None => debug!("mpv reader: response for unknown req={}", req_id),
                    }
                } else {
                    let _ = event_tx.send(val).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "read error").await;
                break;
            }
        }
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register first so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: req={} {}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

/// mpv reports its own playback trouble as events; surface them in the log.
async fn event_task(instance: u64, mut rx: mpsc::Receiver<Value>) {
    while let Some(event) = rx.recv().await {
        match event.get("event").and_then(Value::as_str) {
            Some("end-file") if event["reason"] == "error" => warn!(
                "mpv[{}]: playback error: {}",
                instance,
                event["file_error"].as_str().unwrap_or("unknown")
            ),
            Some("file-loaded") => info!("mpv[{}]: stream loaded", instance),
            Some(name) => debug!("mpv[{}]: event {}", instance, name),
            None => {}
        }
    }
}
