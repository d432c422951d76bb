//! Shared types between the playground runtime and its frontend
//!
//! These types are used by both:
//! - the session and worker actors (native Rust)
//! - the browser frontend (via the generated TypeScript bindings)
//!
//! Serializable with serde for JSON over the worker boundary.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

// ============================================================================
// Session Status
// ============================================================================

/// Finite states of an orchestration session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub enum SessionStatus {
    #[default]
    Idle,
    Initializing,
    Ready,
    Processing,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Initializing => "initializing",
            SessionStatus::Ready => "ready",
            SessionStatus::Processing => "processing",
            SessionStatus::Error => "error",
        }
    }

    /// Whether `self -> next` is one of the legal session transitions.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Ready)
                | (Initializing, Error)
                | (Ready, Processing)
                | (Idle, Processing)
                | (Processing, Ready)
                | (Processing, Error)
                | (Error, Initializing)
        )
    }

    /// A `run` request is only accepted from these states.
    pub fn accepts_run(self) -> bool {
        matches!(self, SessionStatus::Idle | SessionStatus::Ready)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of the last error recorded on a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub enum ErrorKind {
    /// The host cannot run a background context at all. Not retryable.
    HostUnsupported,
    /// The context exists but environment setup failed.
    BringUp,
    /// A run failed after the environment was ready.
    Execution,
    /// The caller asked for something the current state does not allow.
    CallerMisuse,
}

// ============================================================================
// Worker Protocol
// ============================================================================

/// Message envelope exchanged across the worker boundary
///
/// JSON form is `{ "type": "<name>", ...payload }`. Unrecognized types decode
/// to [`WorkerMessage::Unknown`] so a newer runtime never breaks an older caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub enum WorkerMessage {
    /// Caller → worker: bring the environment up
    Init,

    /// Caller → worker: execute a script against a file
    Run {
        script: String,
        /// Base64 on JSON transports, moved as-is in process.
        #[serde(with = "base64_bytes")]
        #[ts(type = "string")]
        file: Bytes,
    },

    /// Worker → caller: human-readable status update
    Progress {
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
    },

    /// Worker → caller: diagnostic line
    Debug {
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
    },

    /// Worker → caller: environment bring-up succeeded
    Ready {
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
    },

    /// Worker → caller: execution succeeded
    Result { data: ExecutionResult },

    /// Worker → caller: bring-up or execution failed
    Error {
        #[serde(default = "unknown_error", deserialize_with = "error_message")]
        message: String,
    },

    #[serde(other)]
    #[ts(skip)]
    Unknown,
}

impl WorkerMessage {
    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::Debug {
            message: message.into(),
        }
    }

    pub fn ready(message: impl Into<String>) -> Self {
        Self::Ready {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The wire `type` tag of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerMessage::Init => MSG_INIT,
            WorkerMessage::Run { .. } => MSG_RUN,
            WorkerMessage::Progress { .. } => MSG_PROGRESS,
            WorkerMessage::Debug { .. } => MSG_DEBUG,
            WorkerMessage::Ready { .. } => MSG_READY,
            WorkerMessage::Result { .. } => MSG_RESULT,
            WorkerMessage::Error { .. } => MSG_ERROR,
            WorkerMessage::Unknown => "unknown",
        }
    }

    /// True for messages a caller sends to the worker.
    pub fn is_request(&self) -> bool {
        matches!(self, WorkerMessage::Init | WorkerMessage::Run { .. })
    }
}

/// Terminal payload of a successful execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub struct ExecutionResult {
    /// Full text trace produced during execution
    #[serde(
        rename = "output",
        alias = "capturedOutput",
        default,
        deserialize_with = "null_as_default"
    )]
    pub captured_output: String,

    /// Producer-defined analysis payload; a missing key means "view not applicable"
    #[serde(
        rename = "results",
        alias = "structuredData",
        default,
        deserialize_with = "null_as_default"
    )]
    #[ts(type = "Record<string, unknown>")]
    pub structured_data: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionResult {
    pub fn new(
        captured_output: impl Into<String>,
        structured_data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            captured_output: captured_output.into(),
            structured_data,
        }
    }
}

/// Presentation hints carried under [`UI_METADATA_KEY`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub struct UiMetadata {
    #[serde(default)]
    pub has_multiple_views: bool,
    #[serde(default)]
    pub view_options: Vec<ViewOption>,
    #[serde(default)]
    pub default_view: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub struct ViewOption {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// Session Snapshot
// ============================================================================

/// Read-only view of a session, published after every mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub progress_message: String,
    pub debug_log: Vec<String>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub last_result: Option<ExecutionResult>,
    pub retry_count: u32,
    pub consecutive_failures: u32,
    pub fallback_recommended: bool,
    pub host_supported: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            progress_message: String::new(),
            debug_log: Vec::new(),
            last_error: None,
            last_error_kind: None,
            last_result: None,
            retry_count: 0,
            consecutive_failures: 0,
            fallback_recommended: false,
            host_supported: true,
            updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Preferences
// ============================================================================

/// Tab shown when the playground opens
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub enum ViewTab {
    #[default]
    Viewer,
    Console,
    Editor,
    Results,
    Info,
}

/// User preferences persisted as a flat JSON document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export, export_to = "../../bindings/protocol.ts")]
pub struct Preferences {
    pub auto_run_scripts: bool,
    pub default_tab: ViewTab,
    pub python_version: String,
    /// Verbose diagnostics: surface the debug log when initialization stalls
    pub show_debug_info: bool,
    pub max_console_lines: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_run_scripts: false,
            default_tab: ViewTab::Viewer,
            python_version: "3.11".to_string(),
            show_debug_info: false,
            max_console_lines: 1000,
        }
    }
}

// ============================================================================
// Constants
// ============================================================================

/// Message type tags
pub const MSG_INIT: &str = "init";
pub const MSG_RUN: &str = "run";
pub const MSG_PROGRESS: &str = "progress";
pub const MSG_DEBUG: &str = "debug";
pub const MSG_READY: &str = "ready";
pub const MSG_RESULT: &str = "result";
pub const MSG_ERROR: &str = "error";

/// Reserved structured-data key holding presentation hints
pub const UI_METADATA_KEY: &str = "__ui_metadata";

/// Storage key the preference document lives under
pub const PREFERENCES_STORAGE_KEY: &str = "ifcPlaygroundSettings";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

const UNKNOWN_ERROR: &str = "Unknown error";

fn unknown_error() -> String {
    UNKNOWN_ERROR.to_string()
}

/// A missing, null or empty error message still reports a failure.
fn error_message<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|m| !m.is_empty())
        .unwrap_or_else(unknown_error))
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ts_rs::Config;

    #[test]
    fn test_envelope_type_tags_are_lowercase() {
        let json = serde_json::to_string(&WorkerMessage::Init).unwrap();
        assert_eq!(json, r#"{"type":"init"}"#);

        let json = serde_json::to_value(WorkerMessage::progress("Loading")).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["message"], "Loading");
    }

    #[test]
    fn test_run_file_travels_as_base64() {
        let msg = WorkerMessage::Run {
            script: "print(1)".to_string(),
            file: Bytes::from_static(b"ISO-10303-21;"),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "run");
        assert_eq!(json["file"], "SVNPLTEwMzAzLTIxOw==");

        let back: WorkerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"telemetry","cpu":0.5}"#).unwrap();
        assert_eq!(msg, WorkerMessage::Unknown);
    }

    #[test]
    fn test_missing_message_defaults_to_empty() {
        let msg: WorkerMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(msg, WorkerMessage::ready(""));
    }

    #[test]
    fn test_null_messages_still_decode() {
        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"progress","message":null}"#).unwrap();
        assert_eq!(msg, WorkerMessage::progress(""));

        for raw in [
            r#"{"type":"error","message":null}"#,
            r#"{"type":"error","message":""}"#,
            r#"{"type":"error"}"#,
        ] {
            let msg: WorkerMessage = serde_json::from_str(raw).unwrap();
            assert_eq!(msg, WorkerMessage::error("Unknown error"), "{raw}");
        }

        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(msg, WorkerMessage::error("boom"));
    }

    #[test]
    fn test_result_accepts_runtime_and_descriptive_field_names() {
        let from_runtime: WorkerMessage = serde_json::from_str(
            r#"{"type":"result","data":{"output":null,"results":{"x":1}}}"#,
        )
        .unwrap();
        let from_alias: WorkerMessage = serde_json::from_str(
            r#"{"type":"result","data":{"capturedOutput":"ok","structuredData":{"x":1}}}"#,
        )
        .unwrap();

        match from_runtime {
            WorkerMessage::Result { data } => {
                assert_eq!(data.captured_output, "");
                assert_eq!(data.structured_data["x"], 1);
            }
            other => panic!("expected result, got {other:?}"),
        }
        match from_alias {
            WorkerMessage::Result { data } => {
                assert_eq!(data.captured_output, "ok");
                assert_eq!(data.structured_data["x"], 1);
            }
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn test_result_serializes_with_runtime_field_names() {
        let mut data = serde_json::Map::new();
        data.insert("x".to_string(), serde_json::json!(1));
        let json = serde_json::to_value(ExecutionResult::new("ok", data)).unwrap();
        assert_eq!(json, serde_json::json!({"output": "ok", "results": {"x": 1}}));
    }

    #[test]
    fn test_status_transition_table() {
        use SessionStatus::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Error.can_transition_to(Initializing));
        assert!(Processing.can_transition_to(Ready));
        assert!(!Error.can_transition_to(Ready));
        assert!(!Initializing.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Initializing));
        assert!(Ready.accepts_run() && Idle.accepts_run());
        assert!(!Processing.accepts_run());
    }

    #[test]
    fn test_preferences_fill_missing_fields() {
        let prefs: Preferences = serde_json::from_str(r#"{"defaultTab":"results"}"#).unwrap();
        assert_eq!(prefs.default_tab, ViewTab::Results);
        assert_eq!(prefs.max_console_lines, 1000);
        assert!(!prefs.show_debug_info);

        let json = serde_json::to_value(Preferences::default()).unwrap();
        assert_eq!(json["maxConsoleLines"], 1000);
        assert_eq!(json["defaultTab"], "viewer");
    }

    #[test]
    fn export_types() {
        // The export_to attribute in each type's #[ts] macro specifies the output file
        let config = Config::default();
        SessionStatus::export(&config).unwrap();
        ErrorKind::export(&config).unwrap();
        WorkerMessage::export(&config).unwrap();
        ExecutionResult::export(&config).unwrap();
        UiMetadata::export(&config).unwrap();
        ViewOption::export(&config).unwrap();
        SessionSnapshot::export(&config).unwrap();
        ViewTab::export(&config).unwrap();
        Preferences::export(&config).unwrap();
    }
}
