//! Session bookkeeping owned by the SessionActor.
//!
//! `SessionRecord` holds everything a snapshot exposes and enforces the
//! transition table. It does no I/O so the rules can be tested directly.

use std::collections::VecDeque;

use chrono::Utc;
use shared_types::{ErrorKind, ExecutionResult, SessionSnapshot, SessionStatus};

/// Bounded, append-only diagnostic log. Oldest lines are evicted first.
#[derive(Debug, Clone)]
pub struct DebugLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    status: SessionStatus,
    progress_message: String,
    debug_log: DebugLog,
    last_error: Option<String>,
    last_error_kind: Option<ErrorKind>,
    last_result: Option<ExecutionResult>,
    retry_count: u32,
    consecutive_failures: u32,
    fallback_threshold: u32,
    host_supported: bool,
}

impl SessionRecord {
    pub fn new(debug_log_capacity: usize, fallback_threshold: u32) -> Self {
        Self {
            status: SessionStatus::Idle,
            progress_message: String::new(),
            debug_log: DebugLog::new(debug_log_capacity),
            last_error: None,
            last_error_kind: None,
            last_result: None,
            retry_count: 0,
            consecutive_failures: 0,
            fallback_threshold: fallback_threshold.max(1),
            host_supported: true,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn host_supported(&self) -> bool {
        self.host_supported
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transition(&mut self, next: SessionStatus) -> Result<SessionStatus, IllegalTransition> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(IllegalTransition { from, to: next });
        }
        self.status = next;
        Ok(from)
    }

    /// Enter `error`, recording the message. `count_failure` feeds the
    /// fallback threshold.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        kind: ErrorKind,
        count_failure: bool,
    ) -> Result<SessionStatus, IllegalTransition> {
        let from = self.transition(SessionStatus::Error)?;
        self.last_error = Some(message.into());
        self.last_error_kind = Some(kind);
        if count_failure {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        Ok(from)
    }

    /// Record an error without changing state.
    pub fn note_error(&mut self, message: impl Into<String>, kind: ErrorKind) {
        self.last_error = Some(message.into());
        self.last_error_kind = Some(kind);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
        self.last_error_kind = None;
    }

    pub fn set_progress(&mut self, message: impl Into<String>) {
        self.progress_message = message.into();
    }

    pub fn push_debug(&mut self, line: impl Into<String>) {
        self.debug_log.push(line);
    }

    pub fn debug_lines(&self) -> Vec<String> {
        self.debug_log.to_vec()
    }

    pub fn clear_result(&mut self) {
        self.last_result = None;
    }

    /// A successful run resets the failure streak.
    pub fn complete(&mut self, result: ExecutionResult) {
        self.last_result = Some(result);
        self.consecutive_failures = 0;
    }

    pub fn record_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub fn mark_host_unsupported(&mut self) {
        self.host_supported = false;
    }

    pub fn fallback_recommended(&self) -> bool {
        !self.host_supported
            || (self.status == SessionStatus::Error
                && self.consecutive_failures >= self.fallback_threshold)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            progress_message: self.progress_message.clone(),
            debug_log: self.debug_log.to_vec(),
            last_error: self.last_error.clone(),
            last_error_kind: self.last_error_kind,
            last_result: self.last_result.clone(),
            retry_count: self.retry_count,
            consecutive_failures: self.consecutive_failures,
            fallback_recommended: self.fallback_recommended(),
            host_supported: self.host_supported,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_log_evicts_oldest() {
        let mut log = DebugLog::new(3);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.to_vec(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_zero_capacity_keeps_latest_line() {
        let mut log = DebugLog::new(0);
        log.push("a");
        log.push("b");
        assert_eq!(log.to_vec(), vec!["b"]);
    }

    #[test]
    fn test_illegal_transition_leaves_status() {
        let mut record = SessionRecord::new(10, 2);
        let err = record.transition(SessionStatus::Ready).unwrap_err();
        assert_eq!(err.from, SessionStatus::Idle);
        assert_eq!(err.to, SessionStatus::Ready);
        assert_eq!(record.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_failures_accumulate_until_success() {
        let mut record = SessionRecord::new(10, 2);
        record.transition(SessionStatus::Initializing).unwrap();
        record.fail("boom", ErrorKind::BringUp, true).unwrap();
        assert!(!record.fallback_recommended());

        record.transition(SessionStatus::Initializing).unwrap();
        record.fail("boom again", ErrorKind::BringUp, true).unwrap();
        assert_eq!(record.consecutive_failures(), 2);
        assert!(record.fallback_recommended());
        assert_eq!(record.snapshot().last_error.as_deref(), Some("boom again"));

        record.transition(SessionStatus::Initializing).unwrap();
        record.transition(SessionStatus::Ready).unwrap();
        record.transition(SessionStatus::Processing).unwrap();
        record.transition(SessionStatus::Ready).unwrap();
        record.complete(ExecutionResult::default());
        assert_eq!(record.consecutive_failures(), 0);
        assert!(!record.fallback_recommended());
    }

    #[test]
    fn test_unsupported_host_always_recommends_fallback() {
        let mut record = SessionRecord::new(10, 5);
        record.mark_host_unsupported();
        let snapshot = record.snapshot();
        assert!(snapshot.fallback_recommended);
        assert!(!snapshot.host_supported);
    }

    #[test]
    fn test_fail_from_ready_is_rejected() {
        let mut record = SessionRecord::new(10, 2);
        record.transition(SessionStatus::Initializing).unwrap();
        record.transition(SessionStatus::Ready).unwrap();
        assert!(record.fail("late", ErrorKind::Execution, true).is_err());
        assert_eq!(record.status(), SessionStatus::Ready);
        assert_eq!(record.consecutive_failures(), 0);
        assert!(record.last_error().is_none());
    }
}
