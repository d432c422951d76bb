//! SessionActor - lifecycle and state machine for one playground session
//!
//! The session owns at most one authoritative background context (a linked
//! `WorkerActor`) plus, while a replacement is in flight, one candidate.
//! Callers drive it through `initialize`/`run_script`/`retry`/`dispose`;
//! outcomes arrive later as `Inbound` envelopes from the worker and are folded
//! into a [`SessionSnapshot`] published on a watch channel. Discrete events
//! (state changes, stall and escalation prompts, fallback advice, context
//! replacement) go out on a broadcast channel as [`SessionNotice`]s.
//!
//! ```text
//! idle --initialize--> initializing --ready--> ready --run--> processing
//!   |                       |                                   |
//!   +--------run------------+---------------> processing      result -> ready
//!                           +--error--> error <--error----------+
//!                                         |
//!                                       retry --> initializing
//! ```

mod state;
mod timers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use shared_types::{ErrorKind, ExecutionResult, SessionSnapshot, SessionStatus, WorkerMessage};
use tokio::sync::{broadcast, watch};

use crate::actors::worker::{BackgroundContext, ContextId};
use crate::config::SessionConfig;
use crate::payload::{sanitize_script, FilePayload};
use crate::runtime::{ContextError, RuntimeFactory};

pub use state::{DebugLog, IllegalTransition, SessionRecord};
use timers::{InitWatchdog, ReplacementTimer};

const NOTICE_CAPACITY: usize = 64;

/// Actor that orchestrates one background context
#[derive(Debug, Default)]
pub struct SessionActor;

pub struct SessionArguments {
    pub config: SessionConfig,
    pub runtime_factory: Arc<dyn RuntimeFactory>,
}

pub struct SessionState {
    config: SessionConfig,
    runtime_factory: Arc<dyn RuntimeFactory>,
    record: SessionRecord,
    context: Option<BackgroundContext>,
    candidate: Option<BackgroundContext>,
    /// A run was queued behind `init` on a fresh context that has not answered yet.
    bring_up_pending: bool,
    watchdog: InitWatchdog,
    replacement: ReplacementTimer,
    notices: broadcast::Sender<SessionNotice>,
    snapshots: watch::Sender<SessionSnapshot>,
}

#[derive(Debug)]
pub enum SessionMsg {
    Initialize {
        reply: RpcReplyPort<Result<(), SessionError>>,
    },
    Run {
        script: String,
        file: FilePayload,
        reply: RpcReplyPort<Result<(), SessionError>>,
    },
    Retry {
        reply: RpcReplyPort<Result<(), SessionError>>,
    },
    Dispose {
        reply: RpcReplyPort<()>,
    },
    GetSnapshot {
        reply: RpcReplyPort<SessionSnapshot>,
    },
    Subscribe {
        reply: RpcReplyPort<broadcast::Receiver<SessionNotice>>,
    },
    WatchSnapshot {
        reply: RpcReplyPort<watch::Receiver<SessionSnapshot>>,
    },
    /// Envelope emitted by a background context
    Inbound {
        context: ContextId,
        message: WorkerMessage,
    },
    StallTimerFired {
        generation: u64,
    },
    EscalationTimerFired {
        generation: u64,
    },
    ReplacementDue {
        generation: u64,
    },
}

/// Discrete events for presentation layers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    StateChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// Initialization is taking longer than the stall timeout.
    InitializationStalled {
        elapsed: Duration,
        /// Debug log at the time of the stall, when verbose diagnostics are on.
        debug_log: Option<Vec<String>>,
    },
    /// Initialization is still pending; offer retry or fallback.
    EscalationPrompt { elapsed: Duration },
    FallbackRecommended { reason: FallbackReason },
    ContextReplaced {
        previous: ContextId,
        current: ContextId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    HostUnsupported,
    RepeatedFailures { failures: u32 },
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(
        "Worker is not ready (status: {status}). Please initialize first or wait for current operation to complete."
    )]
    NotReady { status: SessionStatus },

    #[error("Initialization already in progress")]
    AlreadyInitializing,

    #[error("Worker is busy processing a script")]
    Busy,

    #[error("Script is empty after sanitization")]
    EmptyScript,

    #[error("Retry is not available while {status}")]
    RetryNotAllowed { status: SessionStatus },

    #[error("Background workers are not supported: {0}")]
    HostUnsupported(String),

    #[error("Background context failed: {0}")]
    Context(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::HostUnsupported(_) => ErrorKind::HostUnsupported,
            SessionError::Context(_) => ErrorKind::BringUp,
            _ => ErrorKind::CallerMisuse,
        }
    }
}

// ============================================================================
// State helpers
// ============================================================================

impl SessionState {
    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.record.snapshot());
    }

    fn transition(&mut self, next: SessionStatus) -> bool {
        match self.record.transition(next) {
            Ok(from) => {
                tracing::info!(from = %from, to = %next, "Session state changed");
                self.notify(SessionNotice::StateChanged { from, to: next });
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected session transition");
                false
            }
        }
    }

    /// Enter `error`. Outside `initializing`/`processing` only the message is kept.
    fn fail(&mut self, message: String, kind: ErrorKind, count_failure: bool) {
        self.watchdog.disarm();
        match self.record.fail(message.clone(), kind, count_failure) {
            Ok(from) => {
                tracing::warn!(from = %from, kind = ?kind, error = %message, "Session failed");
                self.notify(SessionNotice::StateChanged {
                    from,
                    to: SessionStatus::Error,
                });
                if self.record.fallback_recommended() {
                    let reason = self.fallback_reason();
                    tracing::warn!(reason = ?reason, "Fallback mode recommended");
                    self.notify(SessionNotice::FallbackRecommended { reason });
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Recording error without state change");
                self.record.note_error(message, kind);
            }
        }
    }

    fn fallback_reason(&self) -> FallbackReason {
        if self.record.host_supported() {
            FallbackReason::RepeatedFailures {
                failures: self.record.consecutive_failures(),
            }
        } else {
            FallbackReason::HostUnsupported
        }
    }

    fn release_context(&mut self) -> bool {
        self.bring_up_pending = false;
        match self.context.take() {
            Some(context) => {
                context.terminate();
                true
            }
            None => false,
        }
    }

    fn discard_candidate(&mut self, why: &str) {
        if let Some(candidate) = self.candidate.take() {
            tracing::debug!(context_id = %candidate.id(), why, "Discarding replacement context");
            self.record
                .push_debug(format!("Replacement worker discarded: {why}"));
            candidate.terminate();
        }
    }

    fn is_authoritative(&self, context: ContextId) -> bool {
        self.context.as_ref().is_some_and(|c| c.id() == context)
    }

    fn is_candidate(&self, context: ContextId) -> bool {
        self.candidate.as_ref().is_some_and(|c| c.id() == context)
    }
}

// ============================================================================
// Actor
// ============================================================================

#[async_trait]
impl Actor for SessionActor {
    type Msg = SessionMsg;
    type State = SessionState;
    type Arguments = SessionArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(session = %myself.get_id(), "SessionActor starting");
        let record = SessionRecord::new(
            args.config.debug_log_capacity,
            args.config.fallback_threshold,
        );
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (snapshots, _) = watch::channel(record.snapshot());

        Ok(SessionState {
            config: args.config,
            runtime_factory: args.runtime_factory,
            record,
            context: None,
            candidate: None,
            bring_up_pending: false,
            watchdog: InitWatchdog::default(),
            replacement: ReplacementTimer::default(),
            notices,
            snapshots,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SessionMsg::Initialize { reply } => {
                let result = self.handle_initialize(&myself, state).await;
                state.publish();
                let _ = reply.send(result);
            }
            SessionMsg::Run {
                script,
                file,
                reply,
            } => {
                let result = self.handle_run(&myself, state, script, file).await;
                state.publish();
                let _ = reply.send(result);
            }
            SessionMsg::Retry { reply } => {
                let result = self.handle_retry(&myself, state).await;
                state.publish();
                let _ = reply.send(result);
            }
            SessionMsg::Dispose { reply } => {
                self.handle_dispose(state);
                state.publish();
                let _ = reply.send(());
            }
            SessionMsg::GetSnapshot { reply } => {
                let _ = reply.send(state.record.snapshot());
            }
            SessionMsg::Subscribe { reply } => {
                let _ = reply.send(state.notices.subscribe());
            }
            SessionMsg::WatchSnapshot { reply } => {
                let _ = reply.send(state.snapshots.subscribe());
            }
            SessionMsg::Inbound { context, message } => {
                self.handle_inbound(&myself, state, context, message);
                state.publish();
            }
            SessionMsg::StallTimerFired { generation } => {
                self.handle_stall(state, generation);
                state.publish();
            }
            SessionMsg::EscalationTimerFired { generation } => {
                self.handle_escalation(state, generation);
                state.publish();
            }
            SessionMsg::ReplacementDue { generation } => {
                self.handle_replacement_due(&myself, state, generation)
                    .await;
                state.publish();
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (actor_id, reason) = match &event {
            SupervisionEvent::ActorFailed(actor_cell, err) => {
                (actor_cell.get_id(), err.to_string())
            }
            SupervisionEvent::ActorTerminated(actor_cell, _, reason) => (
                actor_cell.get_id(),
                reason.as_deref().unwrap_or("worker stopped").to_string(),
            ),
            _ => return Ok(()),
        };

        if state
            .candidate
            .as_ref()
            .is_some_and(|c| c.is_actor(actor_id))
        {
            state.candidate = None;
            state
                .record
                .push_debug(format!("Replacement worker exited: {reason}"));
        } else if state.context.as_ref().is_some_and(|c| c.is_actor(actor_id)) {
            state.context = None;
            let message = format!("Worker error: {reason}");
            tracing::error!(actor_id = %actor_id, reason = %reason, "Background context died");
            state.record.push_debug(message.clone());
            match state.record.status() {
                SessionStatus::Initializing => state.fail(message, ErrorKind::BringUp, true),
                SessionStatus::Processing => state.fail(message, ErrorKind::Execution, true),
                _ => state.record.note_error(message, ErrorKind::Execution),
            }
        }

        state.publish();
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.watchdog.disarm();
        state.replacement.cancel();
        if let Some(candidate) = state.candidate.take() {
            candidate.terminate();
        }
        state.release_context();
        tracing::info!(session = %myself.get_id(), "SessionActor stopped");
        Ok(())
    }
}

impl SessionActor {
    async fn handle_initialize(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
    ) -> Result<(), SessionError> {
        match state.record.status() {
            SessionStatus::Initializing => {
                state
                    .record
                    .push_debug("Initialization already in progress; request ignored");
                return Err(SessionError::AlreadyInitializing);
            }
            SessionStatus::Processing => {
                state
                    .record
                    .push_debug("Cannot initialize while a script is running");
                return Err(SessionError::Busy);
            }
            SessionStatus::Ready if state.context.is_some() => {
                state.record.push_debug("Environment already ready");
                return Ok(());
            }
            SessionStatus::Ready => {
                // Disposed while ready: bring a fresh context up behind the scenes.
                return match self.ensure_context(myself, state).await {
                    Ok(_) => self.post_init(state).map_err(|err| {
                        self.context_failure(state, err, ErrorKind::BringUp)
                    }),
                    Err(err) => Err(self.context_failure(state, err, ErrorKind::BringUp)),
                };
            }
            SessionStatus::Idle | SessionStatus::Error => {}
        }

        if !state.record.host_supported() {
            return Err(SessionError::HostUnsupported(
                state.record.last_error().unwrap_or_default().to_string(),
            ));
        }

        self.begin_initialization(myself, state).await
    }

    async fn handle_run(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
        script: String,
        file: FilePayload,
    ) -> Result<(), SessionError> {
        if !state.record.host_supported() {
            return Err(SessionError::HostUnsupported(
                state.record.last_error().unwrap_or_default().to_string(),
            ));
        }

        let status = state.record.status();
        if !status.accepts_run() {
            return Err(self.reject(state, SessionError::NotReady { status }));
        }

        let script = sanitize_script(&script);
        if script.trim().is_empty() {
            return Err(self.reject(state, SessionError::EmptyScript));
        }

        state.replacement.cancel();
        state.transition(SessionStatus::Processing);
        state.record.clear_error();
        state.record.clear_result();
        state.record.set_progress("Reading file...");
        state.record.push_debug(format!(
            "File read: {}, size: {} bytes",
            file.name,
            file.size()
        ));

        let posted = match self.ensure_context(myself, state).await {
            // A fresh context has never seen init; FIFO delivery runs it first.
            Ok(true) => {
                state.bring_up_pending = true;
                self.post_init(state)
                    .and_then(|()| self.post_run(state, script, file))
            }
            Ok(false) => self.post_run(state, script, file),
            Err(err) => Err(err),
        };
        if let Err(err) = posted {
            return Err(self.context_failure(state, err, ErrorKind::Execution));
        }

        state.record.push_debug("Sent script and file to worker");
        Ok(())
    }

    async fn handle_retry(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
    ) -> Result<(), SessionError> {
        if !state.record.host_supported() {
            return Err(SessionError::HostUnsupported(
                state.record.last_error().unwrap_or_default().to_string(),
            ));
        }

        match state.record.status() {
            SessionStatus::Error => {}
            SessionStatus::Initializing => {
                // The pending bring-up is abandoned along with its context.
                state.watchdog.disarm();
                if state.release_context() {
                    state.record.push_debug("Stalled worker terminated");
                }
            }
            status => return Err(SessionError::RetryNotAllowed { status }),
        }

        state.record.record_retry();
        tracing::info!(retry_count = state.record.retry_count(), "Retrying initialization");
        state
            .record
            .push_debug(format!("Retry attempt {}", state.record.retry_count()));
        self.begin_initialization(myself, state).await
    }

    fn handle_dispose(&self, state: &mut SessionState) {
        state.watchdog.disarm();
        state.replacement.cancel();

        let mut terminated = false;
        if let Some(candidate) = state.candidate.take() {
            candidate.terminate();
            terminated = true;
        }
        terminated |= state.release_context();
        if !terminated {
            return;
        }

        tracing::info!("Background context disposed");
        state.record.push_debug("Worker terminated");
        match state.record.status() {
            SessionStatus::Initializing => {
                state.fail("Worker terminated".to_string(), ErrorKind::BringUp, false)
            }
            SessionStatus::Processing => {
                state.fail("Worker terminated".to_string(), ErrorKind::Execution, false)
            }
            _ => {}
        }
    }

    fn handle_inbound(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
        context: ContextId,
        message: WorkerMessage,
    ) {
        if state.is_candidate(context) {
            self.handle_candidate_message(state, message);
            return;
        }
        if !state.is_authoritative(context) {
            tracing::debug!(
                context_id = %context,
                message_type = message.type_name(),
                "Discarding message from superseded context"
            );
            return;
        }

        let status = state.record.status();
        match message {
            WorkerMessage::Progress { message } => state.record.set_progress(message),
            WorkerMessage::Debug { message } => state.record.push_debug(message),
            WorkerMessage::Ready { message } => match status {
                SessionStatus::Processing if state.bring_up_pending => {
                    state.bring_up_pending = false;
                    state.record.set_progress(message);
                    state
                        .record
                        .push_debug("Environment ready; running queued script");
                }
                SessionStatus::Initializing => {
                    state.watchdog.disarm();
                    state.transition(SessionStatus::Ready);
                    state.record.set_progress(message);
                }
                SessionStatus::Ready => {
                    tracing::debug!(context_id = %context, "Ignoring duplicate ready");
                }
                _ => state
                    .record
                    .push_debug(format!("Ignoring ready while {status}")),
            },
            WorkerMessage::Result { data } => match status {
                SessionStatus::Processing => self.complete_run(myself, state, data),
                _ => state
                    .record
                    .push_debug(format!("Ignoring result while {status}")),
            },
            WorkerMessage::Error { message } => {
                state.record.push_debug(format!("ERROR: {message}"));
                match status {
                    SessionStatus::Initializing => state.fail(message, ErrorKind::BringUp, true),
                    SessionStatus::Processing => {
                        let kind = if state.bring_up_pending {
                            ErrorKind::BringUp
                        } else {
                            ErrorKind::Execution
                        };
                        state.bring_up_pending = false;
                        state.fail(message, kind, true)
                    }
                    // The first failure stays the recorded cause.
                    SessionStatus::Error => {
                        tracing::debug!(context_id = %context, "Keeping first recorded error");
                    }
                    _ => state.record.note_error(message, ErrorKind::Execution),
                }
            }
            WorkerMessage::Init | WorkerMessage::Run { .. } => state.record.push_debug(format!(
                "Dropped unexpected '{}' message from worker",
                message.type_name()
            )),
            WorkerMessage::Unknown => state
                .record
                .push_debug("Dropped worker message with unrecognized type"),
        }
    }

    fn complete_run(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
        data: ExecutionResult,
    ) {
        state.transition(SessionStatus::Ready);
        state.record.complete(data);
        state.record.set_progress("Script completed");
        if state.config.replacement.enabled {
            state
                .replacement
                .schedule(myself, state.config.replacement.grace);
        }
    }

    fn handle_candidate_message(&self, state: &mut SessionState, message: WorkerMessage) {
        match message {
            WorkerMessage::Ready { .. } if state.record.status() == SessionStatus::Ready => {
                let Some(candidate) = state.candidate.take() else {
                    return;
                };
                let current = candidate.id();
                if let Some(previous) = state.context.replace(candidate) {
                    let previous_id = previous.id();
                    previous.terminate();
                    tracing::info!(previous = %previous_id, current = %current, "Background context replaced");
                    state.record.push_debug("Worker replaced successfully");
                    state.notify(SessionNotice::ContextReplaced {
                        previous: previous_id,
                        current,
                    });
                }
            }
            WorkerMessage::Ready { .. } => state.discard_candidate("session is busy"),
            WorkerMessage::Error { message } => state.discard_candidate(&message),
            other => {
                tracing::debug!(
                    message_type = other.type_name(),
                    "Replacement context message"
                );
            }
        }
    }

    fn handle_stall(&self, state: &mut SessionState, generation: u64) {
        if !state.watchdog.is_current(generation)
            || state.record.status() != SessionStatus::Initializing
        {
            return;
        }
        tracing::warn!(
            elapsed_ms = state.config.stall_timeout.as_millis() as u64,
            "Worker initialization is taking too long"
        );
        state
            .record
            .push_debug("Worker initialization is taking too long");
        let debug_log = state
            .config
            .verbose_diagnostics
            .then(|| state.record.debug_lines());
        state.notify(SessionNotice::InitializationStalled {
            elapsed: state.config.stall_timeout,
            debug_log,
        });
    }

    fn handle_escalation(&self, state: &mut SessionState, generation: u64) {
        if !state.watchdog.is_current(generation)
            || state.record.status() != SessionStatus::Initializing
        {
            return;
        }
        tracing::warn!(
            elapsed_ms = state.config.escalation_timeout.as_millis() as u64,
            "Initialization still pending; offering retry or fallback"
        );
        state
            .record
            .push_debug("Initialization still pending; retry or switch to fallback mode");
        state.notify(SessionNotice::EscalationPrompt {
            elapsed: state.config.escalation_timeout,
        });
    }

    async fn handle_replacement_due(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
        generation: u64,
    ) {
        if !state.replacement.is_current(generation) || !state.config.replacement.enabled {
            return;
        }
        if state.record.status() != SessionStatus::Ready
            || state.context.is_none()
            || state.candidate.is_some()
        {
            tracing::debug!(status = %state.record.status(), "Skipping context replacement");
            return;
        }

        let candidate =
            match BackgroundContext::spawn(state.runtime_factory.as_ref(), myself).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not create replacement context");
                    state
                        .record
                        .push_debug(format!("Replacement worker unavailable: {e}"));
                    return;
                }
            };

        if let Err(e) = candidate.post(WorkerMessage::Init) {
            tracing::warn!(error = %e, "Replacement context rejected init");
            candidate.terminate();
            return;
        }
        state
            .record
            .push_debug(format!("Starting replacement worker ({})", candidate.id()));
        state.candidate = Some(candidate);
    }

    async fn begin_initialization(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
    ) -> Result<(), SessionError> {
        if state.record.status() != SessionStatus::Initializing {
            state.transition(SessionStatus::Initializing);
        }
        state.record.clear_error();
        state.record.set_progress("Initializing environment...");

        if let Err(err) = self.ensure_context(myself, state).await {
            return Err(self.context_failure(state, err, ErrorKind::BringUp));
        }

        state.record.push_debug("Sending init message to worker");
        state.watchdog.arm(
            myself,
            state.config.stall_timeout,
            state.config.escalation_timeout,
        );

        self.post_init(state)
            .map_err(|err| self.context_failure(state, err, ErrorKind::BringUp))
    }

    fn post_init(&self, state: &SessionState) -> Result<(), ContextError> {
        match &state.context {
            Some(context) => context.post(WorkerMessage::Init),
            None => Err(ContextError::Closed("no background context".to_string())),
        }
    }

    fn post_run(
        &self,
        state: &SessionState,
        script: String,
        file: FilePayload,
    ) -> Result<(), ContextError> {
        match &state.context {
            Some(context) => context.post(WorkerMessage::Run {
                script,
                file: file.data,
            }),
            None => Err(ContextError::Closed("no background context".to_string())),
        }
    }

    async fn ensure_context(
        &self,
        myself: &ActorRef<SessionMsg>,
        state: &mut SessionState,
    ) -> Result<bool, ContextError> {
        if state.context.is_some() {
            return Ok(false);
        }
        let context = BackgroundContext::spawn(state.runtime_factory.as_ref(), myself).await?;
        tracing::info!(context_id = %context.id(), "Background context created");
        state
            .record
            .push_debug(format!("Worker created ({})", context.id()));
        state.context = Some(context);
        Ok(true)
    }

    fn context_failure(
        &self,
        state: &mut SessionState,
        err: ContextError,
        kind: ErrorKind,
    ) -> SessionError {
        let message = err.to_string();
        state.record.push_debug(format!("ERROR: {message}"));
        if err.is_fatal() {
            state.record.mark_host_unsupported();
            state.fail(message.clone(), ErrorKind::HostUnsupported, true);
            SessionError::HostUnsupported(message)
        } else {
            state.release_context();
            state.fail(message.clone(), kind, true);
            SessionError::Context(message)
        }
    }

    fn reject(&self, state: &mut SessionState, err: SessionError) -> SessionError {
        tracing::warn!(error = %err, "Rejected session request");
        state.record.push_debug(format!("ERROR: {err}"));
        state.record.note_error(err.to_string(), err.kind());
        err
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Spawn a session with its own runtime factory.
pub async fn spawn_session(
    config: SessionConfig,
    runtime_factory: Arc<dyn RuntimeFactory>,
) -> Result<(ActorRef<SessionMsg>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(
        None,
        SessionActor,
        SessionArguments {
            config,
            runtime_factory,
        },
    )
    .await
}

pub async fn initialize(
    session: &ActorRef<SessionMsg>,
) -> Result<Result<(), SessionError>, ractor::RactorErr<SessionMsg>> {
    ractor::call!(session, |reply| SessionMsg::Initialize { reply })
}

pub async fn run_script(
    session: &ActorRef<SessionMsg>,
    script: impl Into<String>,
    file: FilePayload,
) -> Result<Result<(), SessionError>, ractor::RactorErr<SessionMsg>> {
    ractor::call!(session, |reply| SessionMsg::Run {
        script: script.into(),
        file,
        reply,
    })
}

pub async fn retry(
    session: &ActorRef<SessionMsg>,
) -> Result<Result<(), SessionError>, ractor::RactorErr<SessionMsg>> {
    ractor::call!(session, |reply| SessionMsg::Retry { reply })
}

pub async fn dispose(session: &ActorRef<SessionMsg>) -> Result<(), ractor::RactorErr<SessionMsg>> {
    ractor::call!(session, |reply| SessionMsg::Dispose { reply })
}

pub async fn snapshot(
    session: &ActorRef<SessionMsg>,
) -> Result<SessionSnapshot, ractor::RactorErr<SessionMsg>> {
    ractor::call!(session, |reply| SessionMsg::GetSnapshot { reply })
}

pub async fn subscribe(
    session: &ActorRef<SessionMsg>,
) -> Result<broadcast::Receiver<SessionNotice>, ractor::RactorErr<SessionMsg>> {
    ractor::call!(session, |reply| SessionMsg::Subscribe { reply })
}

pub async fn watch(
    session: &ActorRef<SessionMsg>,
) -> Result<watch::Receiver<SessionSnapshot>, ractor::RactorErr<SessionMsg>> {
    ractor::call!(session, |reply| SessionMsg::WatchSnapshot { reply })
}
