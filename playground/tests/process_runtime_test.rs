//! Process runtime tests
//!
//! A small POSIX shell script plays the external engine, speaking the worker
//! protocol as NDJSON over stdio.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use ifc_playground::actors::session::{self, SessionError};
use ifc_playground::runtime::ProcessRuntimeFactory;
use ifc_playground::{FilePayload, SessionConfig};
use shared_types::{ErrorKind, SessionSnapshot, SessionStatus};
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

const ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"type":"init"'*)
      printf '%s\n' '{"type":"progress","message":"booting"}'
      printf '%s\n' 'plain stdout noise'
      printf '%s\n' '{"type":"ready","message":"Environment ready!"}'
      ;;
    *'"script":"nullerr"'*)
      printf '%s\n' '{"type":"error","message":null}'
      ;;
    *'"script":"badresult"'*)
      printf '%s\n' '{"type":"result","data":"not an object"}'
      ;;
    *'"script":"fail"'*)
      printf '%s\n' '{"type":"error","message":"boom"}'
      ;;
    *'"type":"run"'*)
      printf '%s\n' '{"type":"debug","message":"running"}'
      printf '%s\n' '{"type":"result","data":{"output":"ok","results":{"walls":3}}}'
      ;;
  esac
done
"#;

async fn settle(updates: &mut watch::Receiver<SessionSnapshot>) -> SessionSnapshot {
    timeout(
        Duration::from_secs(10),
        updates.wait_for(|s| {
            !matches!(
                s.status,
                SessionStatus::Initializing | SessionStatus::Processing
            )
        }),
    )
    .await
    .expect("timed out waiting for session")
    .expect("snapshot channel closed")
    .clone()
}

fn payload() -> FilePayload {
    FilePayload::new("model.ifc", Bytes::from_static(b"ISO-10303-21;"))
}

#[tokio::test]
async fn test_session_over_process_runtime() {
    if !Path::new("/bin/sh").exists() {
        eprintln!("skipping: /bin/sh not available");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = dir.path().join("engine.sh");
    std::fs::write(&engine, ENGINE).unwrap();

    let factory = ProcessRuntimeFactory::new("/bin/sh", vec![engine.display().to_string()]);
    let (session_ref, handle) = session::spawn_session(SessionConfig::default(), Arc::new(factory))
        .await
        .expect("Failed to spawn session");
    let mut updates = session::watch(&session_ref).await.expect("rpc failed");

    session::initialize(&session_ref)
        .await
        .expect("rpc failed")
        .expect("initialize rejected");
    let ready = settle(&mut updates).await;
    assert_eq!(ready.status, SessionStatus::Ready);
    assert!(ready.debug_log.iter().any(|l| l == "runtime: plain stdout noise"));

    session::run_script(&session_ref, "print(len(walls))", payload())
        .await
        .expect("rpc failed")
        .expect("run rejected");
    let done = settle(&mut updates).await;
    assert_eq!(done.status, SessionStatus::Ready);
    let result = done.last_result.expect("result");
    assert_eq!(result.captured_output, "ok");
    assert_eq!(result.structured_data["walls"], 3);

    session::run_script(&session_ref, "fail", payload())
        .await
        .expect("rpc failed")
        .expect("run rejected");
    let failed = settle(&mut updates).await;
    assert_eq!(failed.status, SessionStatus::Error);
    assert_eq!(
        failed.last_error.as_deref(),
        Some("Script execution error: boom")
    );

    session::dispose(&session_ref).await.expect("rpc failed");
    session_ref.stop(None);
    let _ = handle.await;
}

#[tokio::test]
async fn test_null_and_malformed_terminal_envelopes_settle_the_run() {
    if !Path::new("/bin/sh").exists() {
        eprintln!("skipping: /bin/sh not available");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = dir.path().join("engine.sh");
    std::fs::write(&engine, ENGINE).unwrap();

    let factory = ProcessRuntimeFactory::new("/bin/sh", vec![engine.display().to_string()]);
    let (session_ref, handle) = session::spawn_session(SessionConfig::default(), Arc::new(factory))
        .await
        .expect("Failed to spawn session");
    let mut updates = session::watch(&session_ref).await.expect("rpc failed");

    session::initialize(&session_ref)
        .await
        .expect("rpc failed")
        .expect("initialize rejected");
    assert_eq!(settle(&mut updates).await.status, SessionStatus::Ready);

    session::run_script(&session_ref, "nullerr", payload())
        .await
        .expect("rpc failed")
        .expect("run rejected");
    let failed = settle(&mut updates).await;
    assert_eq!(failed.status, SessionStatus::Error);
    assert_eq!(
        failed.last_error.as_deref(),
        Some("Script execution error: Unknown error")
    );

    session::retry(&session_ref)
        .await
        .expect("rpc failed")
        .expect("retry rejected");
    assert_eq!(settle(&mut updates).await.status, SessionStatus::Ready);

    session::run_script(&session_ref, "badresult", payload())
        .await
        .expect("rpc failed")
        .expect("run rejected");
    let failed = settle(&mut updates).await;
    assert_eq!(failed.status, SessionStatus::Error);
    let message = failed.last_error.expect("error recorded");
    assert!(
        message.starts_with("Script execution error: runtime sent malformed 'result' message"),
        "{message}"
    );

    // The engine process was reset; the next run brings a fresh one up first.
    session::retry(&session_ref)
        .await
        .expect("rpc failed")
        .expect("retry rejected");
    assert_eq!(settle(&mut updates).await.status, SessionStatus::Ready);
    session::run_script(&session_ref, "print(1)", payload())
        .await
        .expect("rpc failed")
        .expect("run rejected");
    let done = settle(&mut updates).await;
    assert_eq!(done.status, SessionStatus::Ready);
    assert_eq!(done.last_result.expect("result").captured_output, "ok");

    session::dispose(&session_ref).await.expect("rpc failed");
    session_ref.stop(None);
    let _ = handle.await;
}

#[tokio::test]
async fn test_missing_runtime_program_is_unsupported() {
    let factory = ProcessRuntimeFactory::new("ifc-runtime-that-does-not-exist", Vec::new());
    let (session_ref, handle) = session::spawn_session(SessionConfig::default(), Arc::new(factory))
        .await
        .expect("Failed to spawn session");

    let outcome = session::initialize(&session_ref).await.expect("rpc failed");
    assert!(matches!(outcome, Err(SessionError::HostUnsupported(_))));

    let snapshot = session::snapshot(&session_ref).await.expect("rpc failed");
    assert_eq!(snapshot.status, SessionStatus::Error);
    assert_eq!(snapshot.last_error_kind, Some(ErrorKind::HostUnsupported));
    assert!(snapshot.fallback_recommended);

    session_ref.stop(None);
    let _ = handle.await;
}
