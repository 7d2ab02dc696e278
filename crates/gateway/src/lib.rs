//! The HTTP gateway binary's library half: shared [`state::AppState`],
//! the [`bootstrap`] wiring function, the [`api`] router/handlers, and
//! the [`cli`] surface, split out so integration tests can drive the
//! router directly without spawning a process.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
