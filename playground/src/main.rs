//! ifc-playground - run an analysis script against an IFC file
//!
//! Spawns a session backed by an external runtime process, initializes it,
//! runs the script and prints the result. When the background path is not
//! viable the raw-file inspection is printed instead.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use ifc_playground::actors::session::{self, SessionNotice};
use ifc_playground::config::{load_env_file, SessionConfig};
use ifc_playground::inspect::inspect_file;
use ifc_playground::preferences::{load_preferences, FilePreferenceStore};
use ifc_playground::results::{OutputMode, ResultView};
use ifc_playground::runtime::ProcessRuntimeFactory;
use ifc_playground::FilePayload;
use shared_types::{SessionSnapshot, SessionStatus};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputArg {
    Text,
    Json,
}

impl From<OutputArg> for OutputMode {
    fn from(value: OutputArg) -> Self {
        match value {
            OutputArg::Text => OutputMode::Text,
            OutputArg::Json => OutputMode::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ifc-playground")]
#[command(about = "Run an analysis script against an IFC file in a background runtime", long_about = None)]
#[command(version)]
struct Cli {
    /// External runtime program speaking the worker protocol over stdio
    #[arg(long, env = "IFC_PLAYGROUND_RUNTIME", default_value = "ifc-runtime")]
    runtime: String,

    /// Extra argument passed to the runtime program (repeatable)
    #[arg(long = "runtime-arg")]
    runtime_args: Vec<String>,

    /// Preference store (JSON key/value file)
    #[arg(long, env = "IFC_PLAYGROUND_PREFS")]
    prefs: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    output: OutputArg,

    /// Script to run
    #[arg(long)]
    script: PathBuf,

    /// IFC file to run the script against
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Before parsing so .env can supply argument defaults.
    load_env_file();
    let cli = Cli::parse();

    let preferences = cli
        .prefs
        .as_ref()
        .map(|path| load_preferences(&FilePreferenceStore::new(path)));
    let config = SessionConfig::from_env().with_stored_preferences(preferences.as_ref());

    let script = tokio::fs::read_to_string(&cli.script)
        .await
        .with_context(|| format!("reading script {}", cli.script.display()))?;
    let file = FilePayload::from_path(&cli.file)
        .await
        .with_context(|| format!("reading IFC file {}", cli.file.display()))?;

    let factory = Arc::new(ProcessRuntimeFactory::new(cli.runtime, cli.runtime_args));
    let (session_ref, handle) = session::spawn_session(config, factory)
        .await
        .context("spawning session")?;

    let mut notices = rpc(session::subscribe(&session_ref).await)?;
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                SessionNotice::InitializationStalled { debug_log, .. } => {
                    eprintln!("Worker initialization is taking too long...");
                    for line in debug_log.unwrap_or_default() {
                        eprintln!("  {line}");
                    }
                }
                SessionNotice::EscalationPrompt { .. } => {
                    eprintln!("Still initializing; waiting for the runtime...");
                }
                other => tracing::debug!(notice = ?other, "Session notice"),
            }
        }
    });

    let mut updates = rpc(session::watch(&session_ref).await)?;
    let outcome = drive(&session_ref, &mut updates, script, file, cli.output.into()).await;

    rpc(session::dispose(&session_ref).await)?;
    session_ref.stop(None);
    let _ = handle.await;
    outcome
}

async fn drive(
    session_ref: &ractor::ActorRef<session::SessionMsg>,
    updates: &mut watch::Receiver<SessionSnapshot>,
    script: String,
    file: FilePayload,
    mode: OutputMode,
) -> anyhow::Result<()> {
    if let Err(err) = rpc(session::initialize(session_ref).await)? {
        tracing::warn!(error = %err, "Initialization rejected");
    }
    let ready = settle(updates).await?;
    if ready.status != SessionStatus::Ready {
        if ready.fallback_recommended || !ready.host_supported {
            eprintln!("Background execution unavailable; showing raw file inspection.");
            println!("{}", inspect_file(&file.name, &file.data));
            return Ok(());
        }
        bail!(
            "initialization failed: {}",
            ready.last_error.unwrap_or_default()
        );
    }

    rpc(session::run_script(session_ref, script, file).await)?.context("run rejected")?;
    let finished = settle(updates).await?;
    match (finished.status, finished.last_result) {
        (SessionStatus::Ready, Some(result)) => {
            println!("{}", ResultView::new(&result).render(mode));
            Ok(())
        }
        _ => bail!("{}", finished.last_error.unwrap_or_default()),
    }
}

fn rpc<T>(result: Result<T, ractor::RactorErr<session::SessionMsg>>) -> anyhow::Result<T> {
    result.map_err(|e| anyhow::anyhow!("session unavailable: {e}"))
}

/// Wait until the session is no longer busy.
async fn settle(updates: &mut watch::Receiver<SessionSnapshot>) -> anyhow::Result<SessionSnapshot> {
    let snapshot = updates
        .wait_for(|s| {
            !matches!(
                s.status,
                SessionStatus::Initializing | SessionStatus::Processing
            )
        })
        .await?
        .clone();
    Ok(snapshot)
}
