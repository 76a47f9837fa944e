//! `injector-core` — media injection bot orchestration.
//!
//! Drives a fleet of short-lived worker processes that join a conferencing
//! session and stream pre-recorded audio/video assets into it. The library
//! covers the full lifecycle: injection input validation, per-bot spatial
//! identity derivation, worker argv construction, process spawning and
//! tracking, and stop/clear teardown.
//!
//! The worker binary itself is opaque; this crate only knows its argument
//! grammar and how to signal it.

pub mod catalog;
pub mod command;
pub mod config;
pub mod identity;
pub mod orchestrator;
pub mod registry;

/// Directory name holding per-conversation asset folders, relative to the
/// invocation directory unless overridden on the command line.
pub const CONVERSATIONS_DIR: &str = "conversations";

/// Injection input filename looked up by default.
pub const INJECTION_INPUT: &str = "injection-input.json";

/// Resolve the invoking user's name for the per-user state directory.
///
/// Falls back to `unknown` when neither `USER` nor `USERNAME` is set.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Default registry root: a fixed per-user temporary directory.
///
/// This is the sole state persisted across runs; `--clear` deletes it.
pub fn default_registry_root() -> std::path::PathBuf {
    std::env::temp_dir()
        .join(current_user())
        .join("media-injection")
}
