//! Local pseudo-terminal backend built on `portable-pty`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, CommandBuilder, PtyPair, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{OutputStream, SessionBackend};
use crate::error::{BackendOperation, SessionError};
use crate::session::{CreateRequest, Dimensions, InstanceId, ResizeRequest, WriteRequest};

/// Size of a single read from the pty master.
const READ_CHUNK: usize = 4096;

/// Pty master writer, shared with the blocking pool during writes.
type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// One spawned shell and its pty.
struct PtyInstance {
    pair: PtyPair,
    writer: SharedWriter,
    child: Box<dyn Child + Send + Sync>,
    /// Held until the controller subscribes, so early output is not lost.
    output_rx: Option<OutputStream>,
}

/// Spawns each session as a child process attached to its own pty.
pub struct PtyBackend {
    instances: Mutex<HashMap<InstanceId, PtyInstance>>,
}

impl PtyBackend {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn lock(
        &self,
        instance_id: InstanceId,
        operation: BackendOperation,
    ) -> Result<MutexGuard<'_, HashMap<InstanceId, PtyInstance>>, SessionError> {
        self.instances.lock().map_err(|e| {
            SessionError::backend(
                instance_id,
                operation,
                format!("instance map lock poisoned: {e}"),
            )
        })
    }

    fn spawn(request: &CreateRequest) -> Result<PtyInstance, SessionError> {
        let fail = |message: String| {
            SessionError::backend(request.instance_id, BackendOperation::Create, message)
        };

        let mut parts = request.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| fail("empty command".to_string()))?;

        let pair = native_pty_system()
            .openpty(pty_size(Dimensions::new(request.cols, request.rows)))
            .map_err(|e| fail(format!("unable to open pty: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(parts);
        if let Some(home) = dirs::home_dir() {
            cmd.cwd(home);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| fail(format!("unable to spawn `{}`: {e}", request.command)))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| fail(format!("unable to take pty writer: {e}")))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| fail(format!("unable to clone pty reader: {e}")))?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let instance_id = request.instance_id;

        thread::spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        if output_tx.send(buf[..n].to_vec()).is_err() {
                            break; // unsubscribed
                        }
                    }
                    Err(_) => break,
                }
            }
            debug!(instance_id, "pty reader finished");
        });

        Ok(PtyInstance {
            pair,
            writer: Arc::new(Mutex::new(writer)),
            child,
            output_rx: Some(output_rx),
        })
    }
}

impl Default for PtyBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn pty_size(dimensions: Dimensions) -> PtySize {
    PtySize {
        rows: dimensions.rows,
        cols: dimensions.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn resize_pair(
    pair: &PtyPair,
    instance_id: InstanceId,
    dimensions: Dimensions,
) -> Result<(), SessionError> {
    pair.master.resize(pty_size(dimensions)).map_err(|e| {
        SessionError::backend(instance_id, BackendOperation::Resize, e.to_string())
    })
}

/// Blocking write of keyboard input to a pty master.
fn write_input<W: Write>(writer: &Mutex<W>, input: &[u8]) -> io::Result<()> {
    let mut writer = writer
        .lock()
        .map_err(|e| io::Error::other(format!("writer lock poisoned: {e}")))?;
    writer.write_all(input)?;
    writer.flush()
}

fn not_found(instance_id: InstanceId, operation: BackendOperation) -> SessionError {
    SessionError::backend(
        instance_id,
        operation,
        format!("instance {instance_id} not found"),
    )
}

#[async_trait]
impl SessionBackend for PtyBackend {
    async fn create(&self, request: CreateRequest) -> Result<(), SessionError> {
        let mut instances = self.lock(request.instance_id, BackendOperation::Create)?;

        // Re-creating a live instance only adopts the new size.
        if let Some(existing) = instances.get(&request.instance_id) {
            debug!(
                instance_id = request.instance_id,
                "instance already exists, resizing"
            );
            return resize_pair(
                &existing.pair,
                request.instance_id,
                Dimensions::new(request.cols, request.rows),
            );
        }

        let instance = Self::spawn(&request)?;
        info!(
            instance_id = request.instance_id,
            command = %request.command,
            cols = request.cols,
            rows = request.rows,
            "spawned pty session"
        );
        instances.insert(request.instance_id, instance);
        Ok(())
    }

    async fn subscribe(&self, instance_id: InstanceId) -> Result<OutputStream, SessionError> {
        let mut instances = self.lock(instance_id, BackendOperation::Subscribe)?;
        let instance = instances
            .get_mut(&instance_id)
            .ok_or_else(|| not_found(instance_id, BackendOperation::Subscribe))?;

        instance.output_rx.take().ok_or_else(|| {
            SessionError::backend(
                instance_id,
                BackendOperation::Subscribe,
                "output stream already taken",
            )
        })
    }

    async fn write(&self, request: WriteRequest) -> Result<(), SessionError> {
        let instance_id = request.instance_id;
        let writer = {
            let instances = self.lock(instance_id, BackendOperation::Write)?;
            let instance = instances
                .get(&instance_id)
                .ok_or_else(|| not_found(instance_id, BackendOperation::Write))?;
            Arc::clone(&instance.writer)
        };

        // A full pty buffer blocks the write until the shell drains it.
        let fail = move |message: String| {
            SessionError::backend(instance_id, BackendOperation::Write, message)
        };
        tokio::task::spawn_blocking(move || write_input(&*writer, &request.input))
            .await
            .map_err(|e| fail(format!("write task failed: {e}")))?
            .map_err(|e| fail(e.to_string()))
    }

    async fn resize(&self, request: ResizeRequest) -> Result<(), SessionError> {
        let instances = self.lock(request.instance_id, BackendOperation::Resize)?;
        let instance = instances
            .get(&request.instance_id)
            .ok_or_else(|| not_found(request.instance_id, BackendOperation::Resize))?;

        resize_pair(&instance.pair, request.instance_id, request.dimensions())
    }

    async fn destroy(&self, instance_id: InstanceId) -> Result<(), SessionError> {
        let mut instance = self
            .lock(instance_id, BackendOperation::Destroy)?
            .remove(&instance_id)
            .ok_or_else(|| not_found(instance_id, BackendOperation::Destroy))?;

        // The child may already have exited on its own.
        if let Err(e) = instance.child.kill() {
            warn!(instance_id, error = %e, "failed to kill pty child");
        }
        info!(instance_id, "destroyed pty session");
        Ok(())
    }
}
