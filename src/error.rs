//! Error taxonomy shared by the session controller, backends and the
//! suggestion pipeline.

use std::fmt;

use thiserror::Error;

use crate::session::{InstanceId, SessionState};

/// Which backend call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOperation {
    Create,
    Subscribe,
    Write,
    Resize,
    Destroy,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendOperation::Create => "create",
            BackendOperation::Subscribe => "subscribe",
            BackendOperation::Write => "write",
            BackendOperation::Resize => "resize",
            BackendOperation::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the session and suggestion layers.
///
/// None of these propagate past the controller or coalescer: they are logged
/// at the call site and only ever affect the instance they name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A create/write/resize/destroy call to the backend failed.
    #[error("backend {operation} failed for instance {instance_id}: {message}")]
    BackendUnavailable {
        instance_id: InstanceId,
        operation: BackendOperation,
        message: String,
    },

    /// The output stream of an instance terminated while it was still active.
    #[error("output stream for instance {instance_id} ended unexpectedly")]
    SubscriptionLost { instance_id: InstanceId },

    /// The AI service errored or answered with something unusable.
    #[error("suggestion query failed: {0}")]
    QueryFailed(String),

    /// No session is known under this id.
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    /// The session exists but is not in a state that accepts the request.
    #[error("instance {instance_id} is {state:?}, not active")]
    NotActive {
        instance_id: InstanceId,
        state: SessionState,
    },
}

impl SessionError {
    pub fn backend(
        instance_id: InstanceId,
        operation: BackendOperation,
        message: impl Into<String>,
    ) -> Self {
        SessionError::BackendUnavailable {
            instance_id,
            operation,
            message: message.into(),
        }
    }

    /// The instance this error concerns, if any.
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            SessionError::BackendUnavailable { instance_id, .. }
            | SessionError::SubscriptionLost { instance_id }
            | SessionError::NotActive { instance_id, .. } => Some(*instance_id),
            SessionError::UnknownInstance(id) => Some(*id),
            SessionError::QueryFailed(_) => None,
        }
    }
}
