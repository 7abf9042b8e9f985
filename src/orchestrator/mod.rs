//! Application-level orchestration.
//!
//! This module owns the run lifecycle (start/cancel/join), the command loop that
//! connects input sources to the active run, and the global cancel key listener.
//! CLI layers call into this module to keep responsibilities separated.

mod controller;
mod listener;
mod session;

pub use controller::InjectionController;
pub(crate) use listener::{parse_cancel_key, spawn_cancel_listener};
pub(crate) use session::{run_session, CancelSource, UiCommand};
