//! IFC Playground - actor-based orchestration for background script execution
//!
//! A session actor owns the lifecycle of one background context (a worker
//! actor hosting a script runtime), publishes snapshots and notices for
//! presentation layers, and recommends a raw-inspection fallback when the
//! background path keeps failing.

pub mod actors;
pub mod config;
pub mod inspect;
pub mod payload;
pub mod preferences;
pub mod results;
pub mod runtime;

pub use actors::session::{
    FallbackReason, SessionActor, SessionArguments, SessionError, SessionMsg, SessionNotice,
};
pub use actors::worker::{BackgroundContext, ContextId, WorkerActor, WorkerEvents};
pub use config::{ReplacementPolicy, SessionConfig};
pub use payload::{sanitize_script, FilePayload};
pub use runtime::{ContextError, RuntimeFactory, ScriptRuntime};
