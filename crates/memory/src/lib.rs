//! Memory Service: background distillation of a session's ledger events
//! into observations and reflections (spec §4.9).
//!
//! Runs after each completed run of a session. Never fails the originating
//! run — every error here is logged and swallowed.

pub mod observer;
pub mod reflector;
pub mod service;

pub use service::{MemoryParams, MemoryService};
