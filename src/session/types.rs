//! Shared session types: identifiers, dimensions, lifecycle states and the
//! request payloads sent to a backend.

use serde::{Deserialize, Serialize};

/// Stable identifier of one terminal session, assigned by the controller.
pub type InstanceId = u32;

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// A zero-sized area cannot host a terminal.
    pub fn is_empty(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Lifecycle of a session.
///
/// ```text
/// Uninitialized -> Creating -> Active -> Destroying -> Destroyed
///                      \____________________________/
///                           (creation failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Creating,
    Active,
    Destroying,
    Destroyed,
}

impl SessionState {
    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, Creating)
                | (Creating, Active)
                | (Creating, Destroying)
                | (Creating, Destroyed)
                | (Active, Destroying)
                | (Destroying, Destroyed)
        )
    }

    /// Terminal and transitional teardown states.
    pub fn is_closing(self) -> bool {
        matches!(self, SessionState::Destroying | SessionState::Destroyed)
    }
}

/// Request to spawn a new session in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub instance_id: InstanceId,
    pub cols: u16,
    pub rows: u16,
    pub command: String,
}

/// Keyboard input for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub instance_id: InstanceId,
    pub input: Vec<u8>,
}

/// New dimensions for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub instance_id: InstanceId,
    pub cols: u16,
    pub rows: u16,
}

impl ResizeRequest {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.cols, self.rows)
    }
}
