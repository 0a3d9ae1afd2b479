//! Display surfaces: the visual terminal widgets sessions render into.
//!
//! The controller never owns a surface. It keeps weak handles in a lookup
//! table and forwards raw output while a surface is bound.

pub mod vt;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::session::{Dimensions, InstanceId};

pub use vt::{CellAttrs, ScreenCell, ScreenRow, ScreenState, TermColor, VtSurface};

/// Shared handle to a mounted surface.
pub type SurfaceHandle = Rc<RefCell<dyn DisplaySurface>>;

/// Non-owning handle kept by the controller.
pub type WeakSurface = Weak<RefCell<dyn DisplaySurface>>;

/// What the core needs from a terminal widget.
pub trait DisplaySurface {
    /// Feed raw output bytes, verbatim.
    fn write(&mut self, bytes: &[u8]);

    /// Redraw from the current screen buffer without new output.
    fn refresh(&mut self);

    /// Recompute the grid that fits into `area`.
    ///
    /// Returns `None` when the surface cannot compute a fit right now (for
    /// example a zero-sized container).
    fn fit(&mut self, area: Dimensions) -> Option<Dimensions>;
}

/// Text snapshot of the terminal after a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    /// All lines currently visible, newline separated.
    pub viewport: String,
    /// The line holding the cursor, i.e. what the user is typing.
    pub cursor_line: String,
    /// True when the render was caused by newly appended output rather than a
    /// plain redraw of unchanged content.
    pub is_appending: bool,
}

/// Events a surface reports back to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Local edit (keystrokes) to forward to the session.
    Data(Vec<u8>),
    /// The surface settled on new dimensions.
    Resize(Dimensions),
    /// The terminal title changed (OSC 0/2).
    TitleChange(String),
    OutputSnapshot(OutputSnapshot),
}

/// A surface event tagged with the instance it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceMessage {
    pub instance_id: InstanceId,
    pub event: SurfaceEvent,
}
