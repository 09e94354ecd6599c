//! Operation orchestration.
//!
//! This module owns the per-session operation slot and its lifecycle: start
//! requests, the reset pre-flight gate, terminal outcomes, and the
//! privilege-elevation sub-flow. UI/CLI layers drive it with commands and
//! consume its events; they never touch the slot directly.

mod controller;
mod machine;

pub(crate) use controller::{run_controller, UiCommand};
