//! Session backend seam.
//!
//! A backend owns the actual shell processes and their pseudo-terminals. The
//! controller only issues lifecycle requests and consumes output chunks.

pub mod pty;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::session::{CreateRequest, InstanceId, ResizeRequest, WriteRequest};

pub use pty::PtyBackend;

/// Raw output chunks for one instance, in the order the backend produced them.
///
/// Dropping the receiver is the unsubscribe.
pub type OutputStream = mpsc::UnboundedReceiver<Vec<u8>>;

#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn create(&self, request: CreateRequest) -> Result<(), SessionError>;

    /// Open the output stream for an instance that was created successfully.
    async fn subscribe(&self, instance_id: InstanceId) -> Result<OutputStream, SessionError>;

    async fn write(&self, request: WriteRequest) -> Result<(), SessionError>;

    async fn resize(&self, request: ResizeRequest) -> Result<(), SessionError>;

    async fn destroy(&self, instance_id: InstanceId) -> Result<(), SessionError>;
}
