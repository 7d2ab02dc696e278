//! The Engine Adapter (spec §4.6): turns a provider-agnostic streaming
//! chat loop into the canonical ledger event sequence, driving the
//! tool-call loop up to `maxSteps` and coupling gated tool calls to the
//! Approval Gate.

mod adapter;

pub use adapter::{EngineAdapter, EngineRunOutcome};
