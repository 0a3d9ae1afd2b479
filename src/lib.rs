//! termtabs library crate.
//!
//! This library provides the core functionality for termtabs, including:
//! - Terminal session lifecycle and output routing
//! - Debounced AI command suggestions
//! - Tab model and terminal UI components

pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod handlers;
pub mod logging;
pub mod session;
pub mod suggest;
pub mod surface;
pub mod tabs;
pub mod ui;
