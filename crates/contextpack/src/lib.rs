//! Context Assembler + Message-History Projector (spec §4.7).
//!
//! [`assembler`] builds the system prompt handed to the Engine Adapter;
//! [`projector`] folds a run's events back into an ordered conversation.
//! [`builder`]/[`injection`]/[`truncation`] are the workspace-file layer
//! that produces the assembler's `base_prompt` input (ambient: AGENTS.md /
//! SOUL.md / etc. injection, same shape as this crate's teacher origin).

pub mod assembler;
pub mod builder;
pub mod injection;
pub mod projector;
pub mod report;
pub mod truncation;

pub use assembler::{AssembleRequest, Assembler, SelectedSkill};
pub use projector::project_messages;
