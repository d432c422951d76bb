//! Runtime backed by an external engine process.
//!
//! The child speaks the worker protocol as newline-delimited JSON: requests
//! go to its stdin, envelopes come back on stdout. Lines that are not valid
//! envelopes are relayed as debug output; a terminal envelope that does not
//! decode fails the request.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use shared_types::{ExecutionResult, WorkerMessage, MSG_ERROR, MSG_READY, MSG_RESULT};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{ContextError, RuntimeFactory, ScriptRuntime};
use crate::actors::worker::WorkerEvents;

#[derive(Debug, Clone)]
pub struct ProcessRuntimeFactory {
    program: String,
    args: Vec<String>,
}

impl ProcessRuntimeFactory {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Resolve the program as a path, or by searching `PATH`.
    fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 || program.is_absolute() {
            return program.is_file().then(|| program.to_path_buf());
        }
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|candidate| candidate.is_file())
        })
    }
}

impl RuntimeFactory for ProcessRuntimeFactory {
    fn create(&self) -> Result<Box<dyn ScriptRuntime>, ContextError> {
        let program = self.resolve_program().ok_or_else(|| {
            ContextError::Unsupported(format!("runtime program '{}' not found", self.program))
        })?;
        Ok(Box::new(ProcessRuntime::new(program, self.args.clone())))
    }
}

struct EngineProcess {
    // Held for kill_on_drop.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

pub struct ProcessRuntime {
    program: PathBuf,
    args: Vec<String>,
    process: Option<EngineProcess>,
}

impl ProcessRuntime {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            process: None,
        }
    }

    fn start(&mut self) -> Result<&mut EngineProcess, String> {
        if self.process.is_none() {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| format!("failed to start {}: {e}", self.program.display()))?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| "runtime stdin unavailable".to_string())?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| "runtime stdout unavailable".to_string())?;

            tracing::info!(program = %self.program.display(), pid = ?child.id(), "Runtime process started");
            self.process = Some(EngineProcess {
                _child: child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
            });
        }
        self.process
            .as_mut()
            .ok_or_else(|| "runtime process unavailable".to_string())
    }

    /// Send one request and wait for its terminal envelope.
    async fn exchange(
        &mut self,
        request: &WorkerMessage,
        events: &WorkerEvents,
    ) -> Result<WorkerMessage, String> {
        let process = self.start()?;
        let outcome = Self::exchange_with(process, request, events).await;
        if outcome.is_err() {
            // Next request starts a fresh process.
            self.process = None;
        }
        outcome
    }

    async fn exchange_with(
        process: &mut EngineProcess,
        request: &WorkerMessage,
        events: &WorkerEvents,
    ) -> Result<WorkerMessage, String> {
        let mut line = serde_json::to_string(request).map_err(|e| e.to_string())?;
        line.push('\n');
        process
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("runtime stdin closed: {e}"))?;
        process
            .stdin
            .flush()
            .await
            .map_err(|e| format!("runtime stdin closed: {e}"))?;

        loop {
            let Some(line) = process
                .stdout
                .next_line()
                .await
                .map_err(|e| format!("runtime stdout failed: {e}"))?
            else {
                return Err("runtime process exited".to_string());
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<WorkerMessage>(&line) {
                Ok(WorkerMessage::Progress { message }) => events.progress(message),
                Ok(WorkerMessage::Debug { message }) => events.debug(message),
                Ok(
                    terminal @ (WorkerMessage::Ready { .. }
                    | WorkerMessage::Result { .. }
                    | WorkerMessage::Error { .. }),
                ) => return Ok(terminal),
                Ok(other) => events.debug(format!(
                    "runtime sent unexpected '{}' message",
                    other.type_name()
                )),
                Err(e) => match terminal_type(&line) {
                    Some(kind) => {
                        return Err(format!("runtime sent malformed '{kind}' message: {e}"))
                    }
                    None => events.debug(format!("runtime: {line}")),
                },
            }
        }
    }
}

/// The `type` tag of a JSON line when it names a terminal envelope.
fn terminal_type(line: &str) -> Option<&'static str> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    match value.get("type")?.as_str()? {
        MSG_READY => Some(MSG_READY),
        MSG_RESULT => Some(MSG_RESULT),
        MSG_ERROR => Some(MSG_ERROR),
        _ => None,
    }
}

#[async_trait]
impl ScriptRuntime for ProcessRuntime {
    async fn initialize(&mut self, events: &WorkerEvents) -> Result<(), String> {
        events.progress("Starting runtime process...");
        match self.exchange(&WorkerMessage::Init, events).await? {
            WorkerMessage::Ready { message } => {
                if !message.is_empty() {
                    events.debug(message);
                }
                Ok(())
            }
            WorkerMessage::Error { message } => Err(message),
            other => Err(format!(
                "runtime answered init with '{}'",
                other.type_name()
            )),
        }
    }

    async fn execute(
        &mut self,
        script: &str,
        file: Bytes,
        events: &WorkerEvents,
    ) -> Result<ExecutionResult, String> {
        if self.process.is_none() {
            // The previous process was reset after a failed exchange.
            self.initialize(events).await?;
        }
        let request = WorkerMessage::Run {
            script: script.to_string(),
            file,
        };
        match self.exchange(&request, events).await? {
            WorkerMessage::Result { data } => Ok(data),
            WorkerMessage::Error { message } => Err(message),
            other => Err(format!("runtime answered run with '{}'", other.type_name())),
        }
    }
}
