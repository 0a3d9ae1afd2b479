//! Terminal session controller.
//!
//! Owns the instance id → session map, drives every session through its
//! lifecycle and routes backend output to the bound display surface.
//!
//! Each session gets a worker task that talks to the backend. The worker
//! serializes all backend calls for its instance (create, writes, resizes,
//! destroy) and owns the output subscription, so teardown always drops the
//! stream before the backend destroy call goes out. The controller itself is
//! only ever mutated from the task that owns it.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::title::{detect_directory_change, DirectoryChange};
use super::types::{
    CreateRequest, Dimensions, InstanceId, ResizeRequest, SessionState, WriteRequest,
};
use crate::backend::{OutputStream, SessionBackend};
use crate::error::{BackendOperation, SessionError};
use crate::surface::{SurfaceHandle, WeakSurface};

/// How long `shutdown` waits for backends to confirm teardown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Work queued for a session's worker.
#[derive(Debug)]
enum SessionOp {
    Create(CreateRequest),
    Write(Vec<u8>),
    Resize(Dimensions),
    Destroy,
}

/// Completions reported by session workers.
#[derive(Debug)]
pub enum ControllerEvent {
    Created {
        instance_id: InstanceId,
        result: Result<(), SessionError>,
    },
    Output {
        instance_id: InstanceId,
        bytes: Vec<u8>,
    },
    /// The backend closed the output stream on its own.
    StreamEnded { instance_id: InstanceId },
    /// A fire-and-forget write or resize failed.
    OperationFailed { error: SessionError },
    Destroyed {
        instance_id: InstanceId,
        result: Result<(), SessionError>,
    },
}

/// Lifecycle outcomes the application reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Opened(InstanceId),
    OpenFailed {
        instance_id: InstanceId,
        error: SessionError,
    },
    /// The session died underneath us and is being torn down.
    Lost {
        instance_id: InstanceId,
        error: SessionError,
    },
    Closed(InstanceId),
}

/// Local record of one session.
struct Session {
    state: SessionState,
    dimensions: Dimensions,
    command: String,
    ops: mpsc::UnboundedSender<SessionOp>,
    worker: JoinHandle<()>,
    /// A close arrived while the create was still in flight.
    close_requested: bool,
}

impl Session {
    fn transition(&mut self, instance_id: InstanceId, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(instance_id, from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }
}

pub struct SessionController {
    backend: Arc<dyn SessionBackend>,
    sessions: HashMap<InstanceId, Session>,
    /// Mounted surfaces. Absent means nothing is bound.
    surfaces: HashMap<InstanceId, WeakSurface>,
    next_id: InstanceId,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            sessions: HashMap::new(),
            surfaces: HashMap::new(),
            next_id: 0,
            events_tx,
            events_rx,
        }
    }

    /// Start a new session and return its freshly allocated instance id.
    ///
    /// The session is `Creating` until the backend acknowledges; the outcome
    /// arrives as a [`SessionNotice`] from [`handle_event`](Self::handle_event).
    pub fn open(&mut self, command: &str, dimensions: Dimensions) -> InstanceId {
        let instance_id = self.next_id;
        self.next_id += 1;

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(
            instance_id,
            Arc::clone(&self.backend),
            ops_rx,
            self.events_tx.clone(),
        ));

        let mut session = Session {
            state: SessionState::Uninitialized,
            dimensions,
            command: command.to_string(),
            ops: ops_tx,
            worker,
            close_requested: false,
        };
        session.transition(instance_id, SessionState::Creating);

        // The worker was just spawned and holds the receiver.
        let _ = session.ops.send(SessionOp::Create(CreateRequest {
            instance_id,
            cols: dimensions.cols,
            rows: dimensions.rows,
            command: command.to_string(),
        }));

        info!(instance_id, command, cols = dimensions.cols, rows = dimensions.rows, "opening session");
        self.sessions.insert(instance_id, session);
        instance_id
    }

    /// Mount a surface for an instance, replacing any previous binding.
    pub fn bind_surface(&mut self, instance_id: InstanceId, surface: &SurfaceHandle) {
        self.surfaces.insert(instance_id, Rc::downgrade(surface));
    }

    /// Unmount the surface of an instance. Output arriving afterwards is dropped.
    pub fn unbind_surface(&mut self, instance_id: InstanceId) {
        self.surfaces.remove(&instance_id);
    }

    fn bound_surface(&self, instance_id: InstanceId) -> Option<SurfaceHandle> {
        self.surfaces.get(&instance_id).and_then(WeakSurface::upgrade)
    }

    /// Look up a session that still accepts work: `Active`, or `Creating`
    /// with no close pending. Work queued while creating runs after the
    /// create lands and is dropped if the create fails.
    fn live_session(&self, instance_id: InstanceId) -> Result<&Session, SessionError> {
        let session = self
            .sessions
            .get(&instance_id)
            .ok_or(SessionError::UnknownInstance(instance_id))?;
        let live = match session.state {
            SessionState::Active => true,
            SessionState::Creating => !session.close_requested,
            SessionState::Uninitialized | SessionState::Destroying | SessionState::Destroyed => {
                false
            }
        };
        if !live {
            return Err(SessionError::NotActive {
                instance_id,
                state: session.state,
            });
        }
        Ok(session)
    }

    /// Queue keyboard input for a live session.
    pub fn write(&mut self, instance_id: InstanceId, input: &[u8]) -> Result<(), SessionError> {
        let session = self.live_session(instance_id)?;
        session
            .ops
            .send(SessionOp::Write(input.to_vec()))
            .map_err(|_| worker_gone(instance_id, BackendOperation::Write))
    }

    /// Queue a resize. Returns `false` when the dimensions did not change.
    pub fn resize(
        &mut self,
        instance_id: InstanceId,
        dimensions: Dimensions,
    ) -> Result<bool, SessionError> {
        if self.live_session(instance_id)?.dimensions == dimensions {
            return Ok(false);
        }
        let Some(session) = self.sessions.get_mut(&instance_id) else {
            return Err(SessionError::UnknownInstance(instance_id));
        };

        session
            .ops
            .send(SessionOp::Resize(dimensions))
            .map_err(|_| worker_gone(instance_id, BackendOperation::Resize))?;
        session.dimensions = dimensions;
        debug!(instance_id, cols = dimensions.cols, rows = dimensions.rows, "resize queued");
        Ok(true)
    }

    /// Refit every live session's surface into `area` and resize the ones
    /// whose grid changed. Background sessions are included so they are
    /// already sized when their tab comes to the front, and sessions still
    /// being created get their resize queued behind the create.
    ///
    /// Returns the number of resize requests issued.
    pub fn resize_all(&mut self, area: Dimensions) -> usize {
        let mut issued = 0;
        for instance_id in self.instance_ids() {
            if self.live_session(instance_id).is_err() {
                continue;
            }
            let Some(surface) = self.bound_surface(instance_id) else {
                continue;
            };
            let fitted = match surface.try_borrow_mut() {
                Ok(mut surface) => surface.fit(area),
                Err(_) => {
                    warn!(instance_id, "surface busy, skipping fit");
                    None
                }
            };
            let Some(dimensions) = fitted else {
                continue;
            };

            match self.resize(instance_id, dimensions) {
                Ok(true) => issued += 1,
                Ok(false) => {}
                Err(e) => warn!(instance_id, error = %e, "resize failed"),
            }
        }
        issued
    }

    /// Tear a session down.
    ///
    /// The surface is unbound and output stops immediately. If the session is
    /// still being created, teardown starts once creation settles.
    pub fn close(&mut self, instance_id: InstanceId) -> Result<(), SessionError> {
        let state = self
            .sessions
            .get(&instance_id)
            .map(|s| s.state)
            .ok_or(SessionError::UnknownInstance(instance_id))?;

        self.unbind_surface(instance_id);
        match state {
            SessionState::Creating => {
                if let Some(session) = self.sessions.get_mut(&instance_id) {
                    session.close_requested = true;
                }
                debug!(instance_id, "close deferred until create settles");
            }
            SessionState::Active => self.begin_teardown(instance_id),
            SessionState::Uninitialized | SessionState::Destroying | SessionState::Destroyed => {}
        }
        Ok(())
    }

    fn begin_teardown(&mut self, instance_id: InstanceId) {
        self.unbind_surface(instance_id);
        let Some(session) = self.sessions.get_mut(&instance_id) else {
            return;
        };
        session.transition(instance_id, SessionState::Destroying);

        if session.ops.send(SessionOp::Destroy).is_err() {
            // Worker already exited; nothing left to tear down.
            warn!(instance_id, "session worker gone before destroy");
            self.finish_teardown(instance_id);
        } else {
            info!(instance_id, "closing session");
        }
    }

    fn finish_teardown(&mut self, instance_id: InstanceId) {
        if let Some(mut session) = self.sessions.remove(&instance_id) {
            session.transition(instance_id, SessionState::Destroyed);
        }
        self.surfaces.remove(&instance_id);
    }

    /// Translate a title reported by an instance's surface into a directory
    /// change, if it carries one.
    pub fn handle_title(
        &self,
        instance_id: InstanceId,
        title: &str,
        delimiter: char,
    ) -> Option<DirectoryChange> {
        let session = self.sessions.get(&instance_id)?;
        if session.state.is_closing() {
            return None;
        }
        let change = detect_directory_change(instance_id, title, delimiter);
        if change.is_none() {
            trace!(instance_id, title, "title carries no directory");
        }
        change
    }

    /// Wait for the next worker completion.
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        self.events_rx.recv().await
    }

    /// Apply a worker completion to the session map.
    pub fn handle_event(&mut self, event: ControllerEvent) -> Option<SessionNotice> {
        match event {
            ControllerEvent::Created {
                instance_id,
                result,
            } => self.on_created(instance_id, result),
            ControllerEvent::Output { instance_id, bytes } => {
                self.route_output(instance_id, &bytes);
                None
            }
            ControllerEvent::StreamEnded { instance_id } => {
                let active = self
                    .sessions
                    .get(&instance_id)
                    .is_some_and(|s| s.state == SessionState::Active);
                if !active {
                    return None;
                }
                let error = SessionError::SubscriptionLost { instance_id };
                warn!(instance_id, error = %error, "forcing session teardown");
                self.begin_teardown(instance_id);
                Some(SessionNotice::Lost { instance_id, error })
            }
            ControllerEvent::OperationFailed { error } => {
                warn!(instance_id = ?error.instance_id(), error = %error, "backend operation failed");
                None
            }
            ControllerEvent::Destroyed {
                instance_id,
                result,
            } => {
                if let Err(e) = result {
                    error!(instance_id, error = %e, "backend destroy failed");
                }
                self.finish_teardown(instance_id);
                info!(instance_id, "session closed");
                Some(SessionNotice::Closed(instance_id))
            }
        }
    }

    fn on_created(
        &mut self,
        instance_id: InstanceId,
        result: Result<(), SessionError>,
    ) -> Option<SessionNotice> {
        let session = self.sessions.get_mut(&instance_id)?;
        if session.state != SessionState::Creating {
            return None;
        }

        match result {
            Ok(()) if session.close_requested => {
                debug!(instance_id, "created after close was requested");
                self.begin_teardown(instance_id);
                None
            }
            Ok(()) => {
                session.transition(instance_id, SessionState::Active);
                info!(instance_id, command = %session.command, "session active");
                Some(SessionNotice::Opened(instance_id))
            }
            Err(error) => {
                error!(instance_id, error = %error, "session creation failed");
                self.finish_teardown(instance_id);
                Some(SessionNotice::OpenFailed { instance_id, error })
            }
        }
    }

    fn route_output(&self, instance_id: InstanceId, bytes: &[u8]) {
        let active = self
            .sessions
            .get(&instance_id)
            .is_some_and(|s| s.state == SessionState::Active);
        if !active {
            trace!(instance_id, len = bytes.len(), "dropping output for inactive session");
            return;
        }
        let Some(surface) = self.bound_surface(instance_id) else {
            trace!(instance_id, len = bytes.len(), "no surface bound, dropping output");
            return;
        };
        match surface.try_borrow_mut() {
            Ok(mut surface) => surface.write(bytes),
            Err(_) => warn!(instance_id, "surface busy, dropping output"),
        };
    }

    /// Close every session and wait for the backend to confirm.
    pub async fn shutdown(&mut self) {
        for instance_id in self.instance_ids() {
            if let Err(e) = self.close(instance_id) {
                warn!(instance_id, error = %e, "close during shutdown failed");
            }
        }

        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            while !self.sessions.is_empty() {
                let Some(event) = self.next_event().await else {
                    break;
                };
                self.handle_event(event);
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = self.sessions.len(), "shutdown timed out");
            for (_, session) in self.sessions.drain() {
                session.worker.abort();
            }
        }
    }

    pub fn state(&self, instance_id: InstanceId) -> Option<SessionState> {
        self.sessions.get(&instance_id).map(|s| s.state)
    }

    pub fn dimensions(&self, instance_id: InstanceId) -> Option<Dimensions> {
        self.sessions.get(&instance_id).map(|s| s.dimensions)
    }

    pub fn is_bound(&self, instance_id: InstanceId) -> bool {
        self.bound_surface(instance_id).is_some()
    }

    /// Ids of all known sessions, in creation order.
    pub fn instance_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of sessions in the `Active` state, in creation order.
    pub fn active_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.state == SessionState::Active)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Best effort: workers still run if the runtime outlives us.
        for session in self.sessions.values() {
            if !session.state.is_closing() {
                let _ = session.ops.send(SessionOp::Destroy);
            }
        }
    }
}

fn worker_gone(instance_id: InstanceId, operation: BackendOperation) -> SessionError {
    SessionError::backend(instance_id, operation, "session worker has stopped")
}

/// Create the backend session and open its output stream.
async fn open_session(
    backend: &dyn SessionBackend,
    request: CreateRequest,
) -> Result<OutputStream, SessionError> {
    let instance_id = request.instance_id;
    backend.create(request).await?;

    match backend.subscribe(instance_id).await {
        Ok(stream) => Ok(stream),
        Err(error) => {
            // The process exists but is unreachable; do not leave it behind.
            if let Err(e) = backend.destroy(instance_id).await {
                warn!(instance_id, error = %e, "cleanup after failed subscribe");
            }
            Err(error)
        }
    }
}

async fn next_chunk(output: &mut Option<OutputStream>) -> Option<Vec<u8>> {
    match output {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_worker(
    instance_id: InstanceId,
    backend: Arc<dyn SessionBackend>,
    mut ops: mpsc::UnboundedReceiver<SessionOp>,
    events: mpsc::UnboundedSender<ControllerEvent>,
) {
    let mut output: Option<OutputStream> = None;

    loop {
        tokio::select! {
            op = ops.recv() => {
                let Some(op) = op else {
                    break; // controller dropped
                };
                match op {
                    SessionOp::Create(request) => match open_session(backend.as_ref(), request).await {
                        Ok(stream) => {
                            output = Some(stream);
                            let _ = events.send(ControllerEvent::Created { instance_id, result: Ok(()) });
                        }
                        Err(error) => {
                            let _ = events.send(ControllerEvent::Created { instance_id, result: Err(error) });
                            break;
                        }
                    },
                    SessionOp::Write(input) => {
                        if let Err(error) = backend.write(WriteRequest { instance_id, input }).await {
                            let _ = events.send(ControllerEvent::OperationFailed { error });
                        }
                    }
                    SessionOp::Resize(dimensions) => {
                        let request = ResizeRequest {
                            instance_id,
                            cols: dimensions.cols,
                            rows: dimensions.rows,
                        };
                        if let Err(error) = backend.resize(request).await {
                            let _ = events.send(ControllerEvent::OperationFailed { error });
                        }
                    }
                    SessionOp::Destroy => {
                        // Unsubscribe strictly before the backend teardown.
                        drop(output.take());
                        let result = backend.destroy(instance_id).await;
                        let _ = events.send(ControllerEvent::Destroyed { instance_id, result });
                        break;
                    }
                }
            }
            chunk = next_chunk(&mut output), if output.is_some() => match chunk {
                Some(bytes) => {
                    let _ = events.send(ControllerEvent::Output { instance_id, bytes });
                }
                None => {
                    output = None;
                    let _ = events.send(ControllerEvent::StreamEnded { instance_id });
                }
            },
        }
    }
    trace!(instance_id, "session worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use crate::surface::DisplaySurface;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create(CreateRequest),
        Subscribe(InstanceId),
        Write(InstanceId, Vec<u8>),
        Resize(InstanceId, Dimensions),
        Destroy {
            instance_id: InstanceId,
            stream_open: bool,
        },
    }

    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<Call>>,
        streams: Mutex<HashMap<InstanceId, mpsc::UnboundedSender<Vec<u8>>>>,
        failing_creates: Mutex<HashSet<InstanceId>>,
        failing_writes: Mutex<HashSet<InstanceId>>,
    }

    impl MockBackend {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, id: InstanceId) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| match call {
                    Call::Create(req) => req.instance_id == id,
                    Call::Subscribe(i) | Call::Write(i, _) | Call::Resize(i, _) => *i == id,
                    Call::Destroy { instance_id, .. } => *instance_id == id,
                })
                .collect()
        }

        fn emit(&self, id: InstanceId, bytes: &[u8]) {
            // Streams of torn-down instances are gone; emitting then is a no-op.
            if let Some(tx) = self.streams.lock().unwrap().get(&id) {
                let _ = tx.send(bytes.to_vec());
            }
        }

        fn end_stream(&self, id: InstanceId) {
            self.streams.lock().unwrap().remove(&id);
        }

        fn fail_create(&self, id: InstanceId) {
            self.failing_creates.lock().unwrap().insert(id);
        }

        fn fail_writes(&self, id: InstanceId) {
            self.failing_writes.lock().unwrap().insert(id);
        }
    }

    #[async_trait]
    impl SessionBackend for MockBackend {
        async fn create(&self, request: CreateRequest) -> Result<(), SessionError> {
            let id = request.instance_id;
            self.calls.lock().unwrap().push(Call::Create(request));
            if self.failing_creates.lock().unwrap().contains(&id) {
                return Err(SessionError::backend(id, BackendOperation::Create, "spawn failed"));
            }
            Ok(())
        }

        async fn subscribe(&self, instance_id: InstanceId) -> Result<OutputStream, SessionError> {
            self.calls.lock().unwrap().push(Call::Subscribe(instance_id));
            let (tx, rx) = mpsc::unbounded_channel();
            self.streams.lock().unwrap().insert(instance_id, tx);
            Ok(rx)
        }

        async fn write(&self, request: WriteRequest) -> Result<(), SessionError> {
            let id = request.instance_id;
            self.calls.lock().unwrap().push(Call::Write(id, request.input));
            if self.failing_writes.lock().unwrap().contains(&id) {
                return Err(SessionError::backend(id, BackendOperation::Write, "broken pipe"));
            }
            Ok(())
        }

        async fn resize(&self, request: ResizeRequest) -> Result<(), SessionError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Resize(request.instance_id, request.dimensions()));
            Ok(())
        }

        async fn destroy(&self, instance_id: InstanceId) -> Result<(), SessionError> {
            let stream_open = self
                .streams
                .lock()
                .unwrap()
                .remove(&instance_id)
                .is_some_and(|tx| !tx.is_closed());
            self.calls.lock().unwrap().push(Call::Destroy {
                instance_id,
                stream_open,
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        chunks: Vec<Vec<u8>>,
        refreshes: usize,
        cannot_fit: bool,
    }

    impl DisplaySurface for RecordingSurface {
        fn write(&mut self, bytes: &[u8]) {
            self.chunks.push(bytes.to_vec());
        }

        fn refresh(&mut self) {
            self.refreshes += 1;
        }

        fn fit(&mut self, area: Dimensions) -> Option<Dimensions> {
            (!self.cannot_fit).then_some(area)
        }
    }

    fn setup() -> (Arc<MockBackend>, SessionController) {
        let backend = Arc::new(MockBackend::default());
        let controller = SessionController::new(backend.clone());
        (backend, controller)
    }

    fn mount(controller: &mut SessionController, id: InstanceId) -> Rc<RefCell<RecordingSurface>> {
        let surface = Rc::new(RefCell::new(RecordingSurface::default()));
        let handle: SurfaceHandle = surface.clone();
        controller.bind_surface(id, &handle);
        surface
    }

    /// Process completions until the workers go quiet.
    async fn settle(controller: &mut SessionController) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(10), controller.next_event()).await
        {
            notices.extend(controller.handle_event(event));
        }
        notices
    }

    #[tokio::test(start_paused = true)]
    async fn output_reaches_bound_surface_in_order() {
        let (backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::new(80, 24));
        let surface = mount(&mut controller, id);

        assert_eq!(controller.state(id), Some(SessionState::Creating));
        assert_eq!(settle(&mut controller).await, vec![SessionNotice::Opened(id)]);
        assert_eq!(controller.state(id), Some(SessionState::Active));
        assert_eq!(
            backend.calls_for(id)[0],
            Call::Create(CreateRequest {
                instance_id: id,
                cols: 80,
                rows: 24,
                command: "zsh".to_string(),
            })
        );

        backend.emit(id, b"a");
        backend.emit(id, b"b");
        backend.emit(id, b"c");
        settle(&mut controller).await;

        assert_eq!(
            surface.borrow().chunks,
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn session_map_tracks_exactly_the_active_ids() {
        let (_backend, mut controller) = setup();
        let a = controller.open("zsh", Dimensions::default());
        let b = controller.open("bash", Dimensions::default());
        let c = controller.open("fish", Dimensions::default());
        settle(&mut controller).await;
        assert_eq!(controller.instance_ids(), vec![a, b, c]);
        assert_eq!(controller.active_ids(), vec![a, b, c]);

        controller.close(b).unwrap();
        settle(&mut controller).await;
        assert_eq!(controller.instance_ids(), vec![a, c]);
        assert_eq!(controller.active_ids(), vec![a, c]);

        let d = controller.open("zsh", Dimensions::default());
        controller.close(a).unwrap();
        settle(&mut controller).await;
        assert_eq!(controller.instance_ids(), vec![c, d]);
        assert_eq!(controller.active_ids(), vec![c, d]);
        assert!(d > c, "instance ids are never reused");
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_unsubscribes_before_backend_teardown() {
        let (backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::default());
        let surface = mount(&mut controller, id);
        settle(&mut controller).await;

        controller.close(id).unwrap();
        assert_eq!(controller.state(id), Some(SessionState::Destroying));
        assert!(!controller.is_bound(id));

        // Output racing the teardown never reaches the surface.
        backend.emit(id, b"late");
        let notices = settle(&mut controller).await;

        assert_eq!(notices, vec![SessionNotice::Closed(id)]);
        assert_eq!(controller.state(id), None);
        assert!(surface.borrow().chunks.is_empty());
        assert_eq!(
            backend.calls_for(id).last(),
            Some(&Call::Destroy {
                instance_id: id,
                stream_open: false,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn output_never_crosses_instances() {
        let (backend, mut controller) = setup();
        let a = controller.open("zsh", Dimensions::default());
        let b = controller.open("zsh", Dimensions::default());
        let surface_a = mount(&mut controller, a);
        let surface_b = mount(&mut controller, b);
        settle(&mut controller).await;

        for i in 0..5u8 {
            backend.emit(a, &[b'a', b'0' + i]);
            backend.emit(b, &[b'b', b'0' + i]);
        }
        settle(&mut controller).await;

        assert_eq!(surface_a.borrow().chunks.len(), 5);
        assert_eq!(surface_b.borrow().chunks.len(), 5);
        assert!(surface_a.borrow().chunks.iter().all(|c| c[0] == b'a'));
        assert!(surface_b.borrow().chunks.iter().all(|c| c[0] == b'b'));
    }

    #[tokio::test(start_paused = true)]
    async fn output_without_surface_is_dropped() {
        let (backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::default());
        settle(&mut controller).await;

        backend.emit(id, b"nobody listening");
        assert!(settle(&mut controller).await.is_empty());
        assert_eq!(controller.state(id), Some(SessionState::Active));

        // A surface dropped by its owner counts as unbound too.
        let surface = mount(&mut controller, id);
        drop(surface);
        assert!(!controller.is_bound(id));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_create_is_reported_and_isolated() {
        let (backend, mut controller) = setup();
        backend.fail_create(0);
        let bad = controller.open("nope", Dimensions::default());
        let good = controller.open("zsh", Dimensions::default());

        let notices = settle(&mut controller).await;
        assert!(notices.contains(&SessionNotice::Opened(good)));
        assert!(notices.iter().any(|n| matches!(
            n,
            SessionNotice::OpenFailed { instance_id, error: SessionError::BackendUnavailable { .. } }
                if *instance_id == bad
        )));
        assert_eq!(controller.state(bad), None);
        assert_eq!(controller.active_ids(), vec![good]);
        assert!(!backend.calls_for(bad).contains(&Call::Subscribe(bad)));
    }

    #[tokio::test(start_paused = true)]
    async fn close_while_creating_waits_for_create_to_settle() {
        let (backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::default());
        controller.close(id).unwrap();
        assert_eq!(controller.state(id), Some(SessionState::Creating));

        let notices = settle(&mut controller).await;
        assert_eq!(notices, vec![SessionNotice::Closed(id)]);
        assert_eq!(controller.state(id), None);

        let calls = backend.calls_for(id);
        assert!(matches!(calls[0], Call::Create(_)));
        assert_eq!(calls[1], Call::Subscribe(id));
        assert_eq!(
            calls[2],
            Call::Destroy {
                instance_id: id,
                stream_open: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn writes_while_creating_run_after_the_create() {
        let (backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::new(80, 24));

        controller.write(id, b"ls\r").unwrap();
        assert_eq!(
            controller.write(99, b"ls\r"),
            Err(SessionError::UnknownInstance(99))
        );

        settle(&mut controller).await;
        assert_eq!(controller.resize(id, Dimensions::new(80, 24)), Ok(false));
        assert_eq!(controller.resize(id, Dimensions::new(120, 40)), Ok(true));
        assert_eq!(controller.dimensions(id), Some(Dimensions::new(120, 40)));
        settle(&mut controller).await;

        let calls = backend.calls_for(id);
        assert!(matches!(calls[0], Call::Create(_)));
        assert_eq!(calls[1], Call::Subscribe(id));
        assert_eq!(calls[2], Call::Write(id, b"ls\r".to_vec()));
        assert!(calls.contains(&Call::Resize(id, Dimensions::new(120, 40))));
        assert!(!calls.contains(&Call::Resize(id, Dimensions::new(80, 24))));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_sessions_reject_writes() {
        let (backend, mut controller) = setup();
        let pending = controller.open("zsh", Dimensions::default());
        controller.close(pending).unwrap();
        assert!(matches!(
            controller.write(pending, b"x"),
            Err(SessionError::NotActive { state: SessionState::Creating, .. })
        ));

        let active = controller.open("zsh", Dimensions::default());
        settle(&mut controller).await;
        controller.close(active).unwrap();
        assert!(matches!(
            controller.write(active, b"x"),
            Err(SessionError::NotActive { state: SessionState::Destroying, .. })
        ));
        assert!(controller.resize(active, Dimensions::new(100, 30)).is_err());
        settle(&mut controller).await;

        for id in [pending, active] {
            assert!(!backend.calls_for(id).iter().any(|c| matches!(c, Call::Write(..))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resize_before_create_lands_reaches_the_backend() {
        let (backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::new(80, 24));
        let _surface = mount(&mut controller, id);
        assert_eq!(controller.state(id), Some(SessionState::Creating));

        assert_eq!(controller.resize_all(Dimensions::new(100, 30)), 1);
        assert_eq!(controller.dimensions(id), Some(Dimensions::new(100, 30)));

        assert_eq!(settle(&mut controller).await, vec![SessionNotice::Opened(id)]);
        assert_eq!(controller.dimensions(id), Some(Dimensions::new(100, 30)));
        assert_eq!(
            backend.calls_for(id)[1..],
            [
                Call::Subscribe(id),
                Call::Resize(id, Dimensions::new(100, 30)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resize_queued_behind_a_failed_create_is_dropped() {
        let (backend, mut controller) = setup();
        backend.fail_create(0);
        let id = controller.open("zsh", Dimensions::new(80, 24));
        let _surface = mount(&mut controller, id);

        assert_eq!(controller.resize_all(Dimensions::new(100, 30)), 1);
        let notices = settle(&mut controller).await;

        assert!(matches!(notices[..], [SessionNotice::OpenFailed { .. }]));
        assert_eq!(controller.state(id), None);
        assert_eq!(backend.calls_for(id).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resize_all_fans_out_to_surfaces_that_can_fit() {
        let (backend, mut controller) = setup();
        let a = controller.open("zsh", Dimensions::new(80, 24));
        let b = controller.open("zsh", Dimensions::new(80, 24));
        let c = controller.open("zsh", Dimensions::new(80, 24));
        let _surface_a = mount(&mut controller, a);
        let surface_b = mount(&mut controller, b);
        surface_b.borrow_mut().cannot_fit = true;
        // c has no surface at all.
        settle(&mut controller).await;

        assert_eq!(controller.resize_all(Dimensions::new(100, 30)), 1);
        // Same area again changes nothing.
        assert_eq!(controller.resize_all(Dimensions::new(100, 30)), 0);
        settle(&mut controller).await;

        assert!(backend.calls_for(a).contains(&Call::Resize(a, Dimensions::new(100, 30))));
        assert!(!backend.calls_for(b).iter().any(|c| matches!(c, Call::Resize(..))));
        assert!(!backend.calls_for(c).iter().any(|c| matches!(c, Call::Resize(..))));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_stream_forces_teardown() {
        let (backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::default());
        let other = controller.open("zsh", Dimensions::default());
        settle(&mut controller).await;

        backend.end_stream(id);
        let notices = settle(&mut controller).await;

        assert_eq!(
            notices,
            vec![
                SessionNotice::Lost {
                    instance_id: id,
                    error: SessionError::SubscriptionLost { instance_id: id },
                },
                SessionNotice::Closed(id),
            ]
        );
        assert_eq!(controller.active_ids(), vec![other]);
        assert!(backend
            .calls_for(id)
            .iter()
            .any(|c| matches!(c, Call::Destroy { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_does_not_affect_other_sessions() {
        let (backend, mut controller) = setup();
        let broken = controller.open("zsh", Dimensions::default());
        let healthy = controller.open("zsh", Dimensions::default());
        let surface = mount(&mut controller, healthy);
        settle(&mut controller).await;
        backend.fail_writes(broken);

        controller.write(broken, b"x").unwrap();
        controller.write(healthy, b"y").unwrap();
        settle(&mut controller).await;
        backend.emit(healthy, b"ok");
        settle(&mut controller).await;

        assert_eq!(controller.active_ids(), vec![broken, healthy]);
        assert_eq!(surface.borrow().chunks, vec![b"ok".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn titles_become_directory_changes() {
        let (_backend, mut controller) = setup();
        let id = controller.open("zsh", Dimensions::default());
        settle(&mut controller).await;

        let change = controller.handle_title(id, "zsh:~/projects/app", ':').unwrap();
        assert_eq!(change.name, "app");
        assert_eq!(controller.handle_title(id, "zsh", ':'), None);
        assert_eq!(controller.handle_title(42, "zsh:~/x", ':'), None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_destroys_every_session() {
        let (backend, mut controller) = setup();
        let a = controller.open("zsh", Dimensions::default());
        let b = controller.open("zsh", Dimensions::default());
        settle(&mut controller).await;
        let c = controller.open("zsh", Dimensions::default());

        controller.shutdown().await;

        assert!(controller.is_empty());
        for id in [a, b, c] {
            assert!(backend
                .calls_for(id)
                .iter()
                .any(|call| matches!(call, Call::Destroy { stream_open: false, .. })));
        }
    }
}
