//! Terminal session lifecycle.
//!
//! This module provides:
//! - `SessionController` - owns every session and routes its output
//! - Lifecycle and request types shared with backends
//! - Directory inference from terminal titles

pub mod controller;
pub mod title;
pub mod types;

pub use controller::{ControllerEvent, SessionController, SessionNotice};
pub use title::{detect_directory_change, DirectoryChange, DEFAULT_TITLE_DELIMITER};
pub use types::{
    CreateRequest, Dimensions, InstanceId, ResizeRequest, SessionState, WriteRequest,
};
