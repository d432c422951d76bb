//! Seam to the external processing engine.
//!
//! A [`ScriptRuntime`] is hosted by exactly one background context
//! (`WorkerActor`). The session never talks to a runtime directly; it only
//! sees the envelopes the worker emits on the runtime's behalf.

pub mod process;

use async_trait::async_trait;
use bytes::Bytes;
use shared_types::ExecutionResult;

use crate::actors::worker::WorkerEvents;

pub use process::{ProcessRuntime, ProcessRuntimeFactory};

/// The external engine that brings up an environment and executes scripts.
///
/// Errors are plain human-readable strings; no structured codes cross the
/// worker boundary.
#[async_trait]
pub trait ScriptRuntime: Send + 'static {
    /// Bring the environment up. May emit `progress`/`debug` through `events`.
    async fn initialize(&mut self, events: &WorkerEvents) -> Result<(), String>;

    /// Execute `script` against the IFC `file`.
    async fn execute(
        &mut self,
        script: &str,
        file: Bytes,
        events: &WorkerEvents,
    ) -> Result<ExecutionResult, String>;
}

/// Creates one runtime per background context.
pub trait RuntimeFactory: Send + Sync + 'static {
    fn create(&self) -> Result<Box<dyn ScriptRuntime>, ContextError>;
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The host cannot run a background context at all.
    #[error("Background workers are not supported on this host: {0}")]
    Unsupported(String),

    #[error("Failed to spawn background context: {0}")]
    SpawnFailed(String),

    #[error("Background context is closed: {0}")]
    Closed(String),
}

impl ContextError {
    /// Fatal errors must not offer a retry affordance.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ContextError::Unsupported(_))
    }
}
