//! Input handlers.

pub mod keyboard;
