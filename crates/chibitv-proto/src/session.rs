//! Session reconciler: polls the server-held stream slot and serialises
//! service switches against it.
//!
//! All confirmed state lives in one `watch` cell.  Writers are the poll
//! futures (periodic and post-mutation) and the mutation bookkeeping; readers
//! subscribe and render.  The cell never holds an optimistic guess: the
//! selected service is always whatever the last applied poll reported, and an
//! in-flight switch only shows up as `mutation_pending()`.
//!
//! Ordering: every poll draws a sequence number when it is issued.  A response
//! is applied only if its number is higher than the last applied one, so a
//! slow poll issued before a switch can never overwrite the state confirmed by
//! the switch's own re-poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiResult, ViewerApi};
use crate::model::{Event, ServiceId, Session};

/// Snapshot published to subscribers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Last confirmed session.  `None` until the first successful poll.
    pub session: Option<Session>,
    /// Bumped every time `session` changes.
    pub rev: u64,
    /// True when the most recent poll failed; the session shown is then the
    /// last known one.
    pub stale: bool,
    pending_mutations: u32,
    mutations_started: u64,
    applied_seq: u64,
}

impl SessionState {
    pub fn selected_service_id(&self) -> Option<ServiceId> {
        self.session.as_ref().and_then(Session::active_service_id)
    }

    pub fn current_event(&self) -> Option<&Event> {
        self.session.as_ref().and_then(|s| s.current_event.as_ref())
    }

    pub fn mutation_pending(&self) -> bool {
        self.pending_mutations > 0
    }

    /// Number of service switches started so far.  Lets an observer that
    /// missed a short-lived pending window still notice a switch happened.
    pub fn mutation_epoch(&self) -> u64 {
        self.mutations_started
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }
}

struct Inner {
    api: Arc<dyn ViewerApi>,
    stream_id: u32,
    state_tx: watch::Sender<SessionState>,
    next_seq: AtomicU64,
}

/// Cheaply cloneable handle; all clones share one state cell.
#[derive(Clone)]
pub struct SessionReconciler {
    inner: Arc<Inner>,
}

impl SessionReconciler {
    pub fn new(api: Arc<dyn ViewerApi>, stream_id: u32) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(Inner {
                api,
                stream_id,
                state_tx,
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.inner.stream_id
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Fetch the session once and merge it into the state cell.
    ///
    /// Returns `Ok(true)` if the response was applied and `Ok(false)` if a
    /// newer response had already been applied.
    pub async fn poll(&self) -> ApiResult<bool> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.inner.api.stream(self.inner.stream_id).await;

        match result {
            Ok(stream) => {
                let session = Session::from(stream);
                let mut applied = false;
                self.inner.state_tx.send_if_modified(|state| {
                    if seq <= state.applied_seq {
                        debug!(
                            "session poll #{} discarded (already applied #{})",
                            seq, state.applied_seq
                        );
                        return false;
                    }
                    applied = true;
                    state.applied_seq = seq;
                    let was_stale = std::mem::replace(&mut state.stale, false);
                    if state.session.as_ref() == Some(&session) {
                        return was_stale;
                    }
                    debug!(
                        "session poll #{} → service {:?}",
                        seq,
                        session.active_service_id()
                    );
                    state.session = Some(session);
                    state.rev += 1;
                    true
                });
                Ok(applied)
            }
            Err(e) => {
                warn!("session poll #{} failed: {}", seq, e);
                self.inner.state_tx.send_if_modified(|state| {
                    if seq <= state.applied_seq || state.stale {
                        return false;
                    }
                    state.stale = true;
                    true
                });
                Err(e)
            }
        }
    }

    /// Ask the server to switch the slot to `service_id`.
    ///
    /// `mutation_pending()` is true from the moment this is called until the
    /// request has failed, or until it succeeded and the follow-up poll has
    /// resolved.
    pub async fn select_service(&self, service_id: ServiceId) -> ApiResult<()> {
        let _pending = PendingGuard::enter(&self.inner.state_tx);
        info!("switching stream {} to service {}", self.inner.stream_id, service_id);

        let result = self
            .inner
            .api
            .select_service(self.inner.stream_id, service_id)
            .await;

        match &result {
            Ok(()) => {
                // Failure here is already logged by poll(); the periodic
                // poller will converge on its own.
                let _ = self.poll().await;
            }
            Err(e) => warn!("switch to service {} failed: {}", service_id, e),
        }
        result
    }

    /// Poll every `period` until the returned task is aborted.
    ///
    /// Each tick runs in its own task so a hung request never holds back the
    /// next one.  A poll still unanswered when the next tick fires is
    /// aborted; at most one periodic request is in flight.
    pub fn spawn_polling(&self, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut in_flight = AbortOnDrop(None);
            loop {
                ticker.tick().await;
                if let Some(previous) = in_flight.0.take() {
                    if !previous.is_finished() {
                        debug!("previous session poll still unanswered, aborting it");
                        previous.abort();
                    }
                }
                let poller = this.clone();
                in_flight.0 = Some(tokio::spawn(async move {
                    let _ = poller.poll().await;
                }));
            }
        })
    }
}

/// Aborts the held poll when the polling task itself is aborted.
struct AbortOnDrop(Option<JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Holds one pending-mutation count for as long as it lives, so the flag also
/// clears if the mutation future is dropped.
struct PendingGuard<'a> {
    state_tx: &'a watch::Sender<SessionState>,
}

impl<'a> PendingGuard<'a> {
    fn enter(state_tx: &'a watch::Sender<SessionState>) -> Self {
        state_tx.send_modify(|state| {
            state.pending_mutations += 1;
            state.mutations_started += 1;
        });
        Self { state_tx }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.state_tx.send_modify(|state| {
            state.pending_mutations = state.pending_mutations.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::model::{RawEvent, Service, StreamState};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    /// In-memory server.  `stream()` snapshots the slot when called, then
    /// optionally waits on the next queued gate before answering.
    #[derive(Default)]
    struct FakeApi {
        services: Vec<Service>,
        active: Mutex<Option<ServiceId>>,
        stream_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
        patch_gate: Mutex<Option<oneshot::Receiver<bool>>>,
        fail_streams: Mutex<bool>,
        hang_streams: AtomicBool,
        stream_calls: AtomicU64,
        open_streams: AtomicU64,
    }

    /// Counts a `stream()` request as open until its future completes or is
    /// dropped.
    struct OpenRequest<'a>(&'a AtomicU64);

    impl<'a> OpenRequest<'a> {
        fn enter(open: &'a AtomicU64) -> Self {
            open.fetch_add(1, Ordering::SeqCst);
            Self(open)
        }
    }

    impl Drop for OpenRequest<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FakeApi {
        fn new(active: Option<ServiceId>) -> Self {
            Self {
                services: vec![service(1, "A"), service(2, "B")],
                active: Mutex::new(active),
                ..Default::default()
            }
        }

        fn gate_next_stream(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.stream_gates.lock().unwrap().push_back(rx);
            tx
        }

        fn gate_next_patch(&self) -> oneshot::Sender<bool> {
            let (tx, rx) = oneshot::channel();
            *self.patch_gate.lock().unwrap() = Some(rx);
            tx
        }

        fn calls(&self) -> u64 {
            self.stream_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ViewerApi for FakeApi {
        async fn services(&self) -> ApiResult<Vec<Service>> {
            Ok(self.services.clone())
        }

        async fn events(&self, _service_id: ServiceId) -> ApiResult<Vec<RawEvent>> {
            Ok(vec![])
        }

        async fn stream(&self, stream_id: u32) -> ApiResult<StreamState> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);
            let _open = OpenRequest::enter(&self.open_streams);
            if self.hang_streams.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let fail = *self.fail_streams.lock().unwrap();
            let active = *self.active.lock().unwrap();
            let gate = self.stream_gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if fail {
                return Err(ApiError::StreamNotFound(stream_id));
            }
            Ok(StreamState {
                service: active.and_then(|id| self.services.iter().find(|s| s.id == id).cloned()),
                event: None,
            })
        }

        async fn select_service(&self, stream_id: u32, service_id: ServiceId) -> ApiResult<()> {
            let gate = self.patch_gate.lock().unwrap().take();
            let ok = match gate {
                Some(gate) => gate.await.unwrap_or(false),
                None => true,
            };
            if !ok {
                return Err(ApiError::StreamNotFound(stream_id));
            }
            *self.active.lock().unwrap() = Some(service_id);
            Ok(())
        }

        fn stream_url(&self, stream_id: u32) -> String {
            format!("http://fake/streams/{}/stream.ts", stream_id)
        }
    }

    fn service(id: ServiceId, name: &str) -> Service {
        Service {
            id,
            name: name.to_string(),
            provider_name: String::new(),
        }
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if cond() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never became true");
    }

    fn setup(active: Option<ServiceId>) -> (Arc<FakeApi>, SessionReconciler) {
        let api = Arc::new(FakeApi::new(active));
        let reconciler = SessionReconciler::new(api.clone(), 0);
        (api, reconciler)
    }

    #[tokio::test]
    async fn test_poll_publishes_server_state() {
        let (_api, reconciler) = setup(Some(1));
        let mut rx = reconciler.subscribe();
        assert!(!reconciler.snapshot().is_loaded());

        assert!(reconciler.poll().await.unwrap());
        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.selected_service_id(), Some(1));
        assert!(!state.mutation_pending());
        assert_eq!(state.rev, 1);

        // Same answer again: applied, but nothing to publish.
        assert!(reconciler.poll().await.unwrap());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_pending_clears_only_after_repoll() {
        let (api, reconciler) = setup(Some(1));
        reconciler.poll().await.unwrap();

        let patch = api.gate_next_patch();
        let task = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.select_service(2).await })
        };
        until(|| reconciler.snapshot().mutation_pending()).await;
        assert_eq!(reconciler.snapshot().selected_service_id(), Some(1));
        assert_eq!(reconciler.snapshot().mutation_epoch(), 1);

        // Hold the follow-up poll so we can observe the window between the
        // mutation succeeding and the re-poll resolving.
        let repoll = api.gate_next_stream();
        let calls_before = api.calls();
        patch.send(true).unwrap();
        until(|| api.calls() > calls_before).await;
        let state = reconciler.snapshot();
        assert!(state.mutation_pending());
        assert_eq!(state.selected_service_id(), Some(1));

        repoll.send(()).unwrap();
        task.await.unwrap().unwrap();
        let state = reconciler.snapshot();
        assert!(!state.mutation_pending());
        assert_eq!(state.selected_service_id(), Some(2));
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_confirmed_state() {
        let (api, reconciler) = setup(Some(1));
        reconciler.poll().await.unwrap();
        let calls_before = api.calls();

        let patch = api.gate_next_patch();
        let task = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.select_service(2).await })
        };
        until(|| reconciler.snapshot().mutation_pending()).await;
        patch.send(false).unwrap();

        assert!(task.await.unwrap().is_err());
        let state = reconciler.snapshot();
        assert!(!state.mutation_pending());
        assert_eq!(state.selected_service_id(), Some(1));
        // No re-poll after a failed mutation.
        assert_eq!(api.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_stale_poll_cannot_overwrite_confirmed_switch() {
        let (api, reconciler) = setup(Some(1));
        reconciler.poll().await.unwrap();

        // A periodic poll goes out while service 1 is still active and hangs.
        let slow_gate = api.gate_next_stream();
        let slow = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.poll().await })
        };
        until(|| api.calls() == 2).await;

        // The switch and its re-poll complete first.
        reconciler.select_service(2).await.unwrap();
        assert_eq!(reconciler.snapshot().selected_service_id(), Some(2));

        // The stale answer arrives last and is dropped.
        slow_gate.send(()).unwrap();
        assert!(!slow.await.unwrap().unwrap());
        let state = reconciler.snapshot();
        assert_eq!(state.selected_service_id(), Some(2));
        assert!(!state.mutation_pending());
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_last_known_state() {
        let (api, reconciler) = setup(Some(1));
        reconciler.poll().await.unwrap();

        *api.fail_streams.lock().unwrap() = true;
        assert!(reconciler.poll().await.is_err());
        let state = reconciler.snapshot();
        assert!(state.stale);
        assert_eq!(state.selected_service_id(), Some(1));

        *api.fail_streams.lock().unwrap() = false;
        reconciler.poll().await.unwrap();
        assert!(!reconciler.snapshot().stale);
    }

    #[tokio::test]
    async fn test_overlapping_mutations_hold_pending_until_last_settles() {
        let (api, reconciler) = setup(Some(1));
        reconciler.poll().await.unwrap();

        let first_patch = api.gate_next_patch();
        let first = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.select_service(2).await })
        };
        until(|| reconciler.snapshot().mutation_pending()).await;
        // The second call takes no gate and finishes straight away.
        reconciler.select_service(1).await.unwrap();
        assert!(reconciler.snapshot().mutation_pending());

        first_patch.send(true).unwrap();
        first.await.unwrap().unwrap();
        assert!(!reconciler.snapshot().mutation_pending());
    }

    #[tokio::test]
    async fn test_dropped_mutation_clears_pending() {
        let (api, reconciler) = setup(Some(1));
        let _patch = api.gate_next_patch();
        let task = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.select_service(2).await })
        };
        until(|| reconciler.snapshot().mutation_pending()).await;
        task.abort();
        let _ = task.await;
        assert!(!reconciler.snapshot().mutation_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_polling_runs_on_interval() {
        let (api, reconciler) = setup(Some(2));
        let handle = reconciler.spawn_polling(Duration::from_secs(5));

        until(|| api.calls() == 1).await;
        assert_eq!(reconciler.snapshot().selected_service_id(), Some(2));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        until(|| api.calls() == 3).await;

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_server_keeps_one_poll_in_flight() {
        let (api, reconciler) = setup(Some(1));
        api.hang_streams.store(true, Ordering::SeqCst);
        let handle = reconciler.spawn_polling(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(600)).await;
        until(|| api.open_streams.load(Ordering::SeqCst) == 1).await;
        assert!(api.calls() > 100);
        assert!(!reconciler.snapshot().is_loaded());

        handle.abort();
        let _ = handle.await;
        until(|| api.open_streams.load(Ordering::SeqCst) == 0).await;
    }
}
