//! WorkerActor - the background context that hosts a script runtime
//!
//! One worker owns one [`ScriptRuntime`]. It answers `init` and `run`
//! requests and reports every outcome back to its session as a
//! [`WorkerMessage`] tagged with the worker's [`ContextId`]. Work never
//! leaves the worker as a return value; the session only learns about it
//! through those envelopes.

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use shared_types::WorkerMessage;
use ulid::Ulid;

use crate::actors::session::SessionMsg;
use crate::runtime::{ContextError, RuntimeFactory, ScriptRuntime};

const READY_MESSAGE: &str = "Environment ready!";

/// Identity of one background context. Messages from a context the session
/// no longer considers authoritative are discarded by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Ulid);

impl ContextId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Outbound half of a worker: every envelope is stamped with the context id.
#[derive(Clone)]
pub struct WorkerEvents {
    context: ContextId,
    session: ActorRef<SessionMsg>,
}

impl WorkerEvents {
    pub fn new(context: ContextId, session: ActorRef<SessionMsg>) -> Self {
        Self { context, session }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn emit(&self, message: WorkerMessage) {
        let message_type = message.type_name();
        if let Err(e) = self.session.cast(SessionMsg::Inbound {
            context: self.context,
            message,
        }) {
            tracing::debug!(
                context_id = %self.context,
                message_type,
                error = %e,
                "Session gone, dropping worker message"
            );
        }
    }

    pub fn progress(&self, message: impl Into<String>) {
        self.emit(WorkerMessage::progress(message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(WorkerMessage::debug(message));
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct WorkerActor;

pub struct WorkerArguments {
    pub runtime: Box<dyn ScriptRuntime>,
    pub events: WorkerEvents,
}

pub struct WorkerState {
    runtime: Box<dyn ScriptRuntime>,
    events: WorkerEvents,
    initialized: bool,
}

#[async_trait]
impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerState;
    type Arguments = WorkerArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(context_id = %args.events.context(), "WorkerActor starting");
        Ok(WorkerState {
            runtime: args.runtime,
            events: args.events,
            initialized: false,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Init => self.handle_init(state).await,
            WorkerMessage::Run { script, file } => self.handle_run(state, script, file).await,
            other => {
                tracing::debug!(
                    context_id = %state.events.context(),
                    message_type = other.type_name(),
                    "Worker ignoring non-request message"
                );
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::debug!(context_id = %state.events.context(), "WorkerActor stopped");
        Ok(())
    }
}

impl WorkerActor {
    async fn handle_init(&self, state: &mut WorkerState) {
        if state.initialized {
            state.events.emit(WorkerMessage::ready(READY_MESSAGE));
            return;
        }

        state.events.debug("Worker: starting environment bring-up");
        match state.runtime.initialize(&state.events).await {
            Ok(()) => {
                state.initialized = true;
                state.events.emit(WorkerMessage::ready(READY_MESSAGE));
            }
            Err(message) => {
                state.events.debug(format!("Worker ERROR: {message}"));
                state.events.emit(WorkerMessage::error(message));
            }
        }
    }

    async fn handle_run(&self, state: &mut WorkerState, script: String, file: bytes::Bytes) {
        if !state.initialized {
            state.events.emit(WorkerMessage::error(
                "Environment not initialized. Please initialize first.",
            ));
            return;
        }
        // Zero-byte files are accepted.
        if script.trim().is_empty() {
            state
                .events
                .emit(WorkerMessage::error("Missing script or file data."));
            return;
        }

        state.events.progress("Running script...");
        match state.runtime.execute(&script, file, &state.events).await {
            Ok(data) => state.events.emit(WorkerMessage::Result { data }),
            Err(message) => {
                state.events.debug(format!("Worker ERROR: {message}"));
                state
                    .events
                    .emit(WorkerMessage::error(format!("Script execution error: {message}")));
            }
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Session-side handle to a linked worker actor.
pub struct BackgroundContext {
    id: ContextId,
    actor: ActorRef<WorkerMessage>,
}

impl BackgroundContext {
    /// Create a runtime and spawn a worker for it, linked under `session`.
    pub async fn spawn(
        factory: &dyn RuntimeFactory,
        session: &ActorRef<SessionMsg>,
    ) -> Result<Self, ContextError> {
        let id = ContextId::new();
        let runtime = factory.create()?;
        let events = WorkerEvents::new(id, session.clone());

        let (actor, _handle) = Actor::spawn_linked(
            None,
            WorkerActor,
            WorkerArguments { runtime, events },
            session.get_cell(),
        )
        .await
        .map_err(|e| ContextError::SpawnFailed(e.to_string()))?;

        Ok(Self { id, actor })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Whether a supervision event refers to this context's actor.
    pub fn is_actor(&self, actor_id: ractor::ActorId) -> bool {
        self.actor.get_id() == actor_id
    }

    pub fn post(&self, message: WorkerMessage) -> Result<(), ContextError> {
        self.actor
            .cast(message)
            .map_err(|e| ContextError::Closed(e.to_string()))
    }

    /// Kill the worker immediately; in-flight work is abandoned.
    pub fn terminate(self) {
        tracing::debug!(context_id = %self.id, "Terminating background context");
        self.actor.kill();
    }
}
