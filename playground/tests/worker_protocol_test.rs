//! Worker protocol tests
//!
//! Spawn a WorkerActor under a probe actor that stands in for the session and
//! records every envelope the worker emits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ifc_playground::actors::session::SessionMsg;
use ifc_playground::actors::worker::{WorkerActor, WorkerArguments};
use ifc_playground::{ContextId, ScriptRuntime, WorkerEvents};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use shared_types::{ExecutionResult, WorkerMessage};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Forwards every inbound envelope to the test.
struct ProbeSession;

#[ractor::async_trait]
impl Actor for ProbeSession {
    type Msg = SessionMsg;
    type State = mpsc::UnboundedSender<(ContextId, WorkerMessage)>;
    type Arguments = mpsc::UnboundedSender<(ContextId, WorkerMessage)>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(args)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let SessionMsg::Inbound { context, message } = message {
            let _ = state.send((context, message));
        }
        Ok(())
    }
}

struct EchoRuntime {
    init_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ScriptRuntime for EchoRuntime {
    async fn initialize(&mut self, events: &WorkerEvents) -> Result<(), String> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        events.progress("Loading packages...");
        Ok(())
    }

    async fn execute(
        &mut self,
        script: &str,
        file: Bytes,
        _events: &WorkerEvents,
    ) -> Result<ExecutionResult, String> {
        if script == "raise" {
            return Err("boom".to_string());
        }
        Ok(ExecutionResult::new(
            format!("{script} on {} bytes", file.len()),
            serde_json::Map::new(),
        ))
    }
}

struct Fixture {
    worker: ActorRef<WorkerMessage>,
    context: ContextId,
    inbound: mpsc::UnboundedReceiver<(ContextId, WorkerMessage)>,
    init_calls: Arc<AtomicUsize>,
}

impl Fixture {
    async fn start() -> Self {
        let (tx, inbound) = mpsc::unbounded_channel();
        let (probe, _) = Actor::spawn(None, ProbeSession, tx)
            .await
            .expect("Failed to spawn probe");

        let context = ContextId::new();
        let init_calls = Arc::new(AtomicUsize::new(0));
        let (worker, _) = Actor::spawn(
            None,
            WorkerActor,
            WorkerArguments {
                runtime: Box::new(EchoRuntime {
                    init_calls: init_calls.clone(),
                }),
                events: WorkerEvents::new(context, probe),
            },
        )
        .await
        .expect("Failed to spawn worker");

        Self {
            worker,
            context,
            inbound,
            init_calls,
        }
    }

    /// Next envelope that is not a progress or debug line.
    async fn next_terminal(&mut self) -> WorkerMessage {
        timeout(Duration::from_secs(5), async {
            loop {
                let (context, message) = self.inbound.recv().await.expect("probe closed");
                assert_eq!(context, self.context);
                match message {
                    WorkerMessage::Progress { .. } | WorkerMessage::Debug { .. } => continue,
                    other => return other,
                }
            }
        })
        .await
        .expect("timed out waiting for worker")
    }

    fn send(&self, message: WorkerMessage) {
        self.worker.cast(message).expect("worker gone");
    }
}

fn run(script: &str, file: &'static [u8]) -> WorkerMessage {
    WorkerMessage::Run {
        script: script.to_string(),
        file: Bytes::from_static(file),
    }
}

#[tokio::test]
async fn test_run_before_init_is_an_error() {
    let mut fixture = Fixture::start().await;
    fixture.send(run("print(1)", b"ISO-10303-21;"));
    assert_eq!(
        fixture.next_terminal().await,
        WorkerMessage::error("Environment not initialized. Please initialize first.")
    );
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let mut fixture = Fixture::start().await;
    fixture.send(WorkerMessage::Init);
    assert_eq!(
        fixture.next_terminal().await,
        WorkerMessage::ready("Environment ready!")
    );

    fixture.send(WorkerMessage::Init);
    assert_eq!(
        fixture.next_terminal().await,
        WorkerMessage::ready("Environment ready!")
    );
    assert_eq!(fixture.init_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_requests_are_answered_in_order() {
    let mut fixture = Fixture::start().await;
    fixture.send(WorkerMessage::progress("not a request"));
    fixture.send(WorkerMessage::Init);
    fixture.send(run("count", b""));
    fixture.send(run("   ", b"ISO-10303-21;"));
    fixture.send(run("raise", b"ISO-10303-21;"));
    fixture.send(run("count", b"ISO-10303-21;"));

    assert_eq!(
        fixture.next_terminal().await,
        WorkerMessage::ready("Environment ready!")
    );
    match fixture.next_terminal().await {
        WorkerMessage::Result { data } => assert_eq!(data.captured_output, "count on 0 bytes"),
        other => panic!("expected result for an empty file, got {other:?}"),
    }
    assert_eq!(
        fixture.next_terminal().await,
        WorkerMessage::error("Missing script or file data.")
    );
    assert_eq!(
        fixture.next_terminal().await,
        WorkerMessage::error("Script execution error: boom")
    );
    match fixture.next_terminal().await {
        WorkerMessage::Result { data } => assert_eq!(data.captured_output, "count on 13 bytes"),
        other => panic!("expected result, got {other:?}"),
    }
}
