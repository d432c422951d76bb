//! Session configuration from the process environment.

use std::time::Duration;

use shared_types::Preferences;

pub const STALL_TIMEOUT_ENV: &str = "IFC_PLAYGROUND_STALL_TIMEOUT_MS";
pub const ESCALATION_TIMEOUT_ENV: &str = "IFC_PLAYGROUND_ESCALATION_TIMEOUT_MS";
pub const FALLBACK_THRESHOLD_ENV: &str = "IFC_PLAYGROUND_FALLBACK_THRESHOLD";
pub const DEBUG_LOG_CAPACITY_ENV: &str = "IFC_PLAYGROUND_DEBUG_LOG_CAPACITY";
pub const REPLACE_AFTER_RUN_ENV: &str = "IFC_PLAYGROUND_REPLACE_AFTER_RUN";
pub const REPLACEMENT_GRACE_ENV: &str = "IFC_PLAYGROUND_REPLACEMENT_GRACE_MS";

/// Make-before-break replacement of the background context after each
/// successful run. Off unless the host is known to reclaim long-lived
/// contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacementPolicy {
    pub enabled: bool,
    pub grace: Duration,
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            grace: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Initialization still pending after this long raises a stall notice.
    pub stall_timeout: Duration,
    /// Initialization still pending after this long prompts for retry/fallback.
    pub escalation_timeout: Duration,
    /// Consecutive failures before fallback is recommended.
    pub fallback_threshold: u32,
    pub debug_log_capacity: usize,
    /// Attach the debug log to stall notices.
    pub verbose_diagnostics: bool,
    pub replacement: ReplacementPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_millis(10_000),
            escalation_timeout: Duration::from_millis(15_000),
            fallback_threshold: 2,
            debug_log_capacity: 1000,
            verbose_diagnostics: false,
            replacement: ReplacementPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            stall_timeout: millis(STALL_TIMEOUT_ENV, defaults.stall_timeout),
            escalation_timeout: millis(ESCALATION_TIMEOUT_ENV, defaults.escalation_timeout),
            fallback_threshold: lookup(FALLBACK_THRESHOLD_ENV)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.fallback_threshold),
            debug_log_capacity: lookup(DEBUG_LOG_CAPACITY_ENV)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.debug_log_capacity),
            verbose_diagnostics: defaults.verbose_diagnostics,
            replacement: ReplacementPolicy {
                enabled: lookup(REPLACE_AFTER_RUN_ENV)
                    .map(|v| v != "0" && v.to_lowercase() != "false")
                    .unwrap_or(defaults.replacement.enabled),
                grace: millis(REPLACEMENT_GRACE_ENV, defaults.replacement.grace),
            },
        }
    }

    /// Apply the user's console and diagnostics preferences.
    pub fn with_preferences(mut self, preferences: &Preferences) -> Self {
        self.debug_log_capacity = preferences.max_console_lines.max(1) as usize;
        self.verbose_diagnostics = preferences.show_debug_info;
        self
    }

    /// Without a preference store the environment settings stand.
    pub fn with_stored_preferences(self, preferences: Option<&Preferences>) -> Self {
        match preferences {
            Some(preferences) => self.with_preferences(preferences),
            None => self,
        }
    }
}

/// Load `.env` from the current directory or the nearest ancestor that has one.
pub fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    for dir in cwd.ancestors() {
        let candidate = dir.join(".env");
        if !candidate.exists() {
            continue;
        }
        match dotenvy::from_path(&candidate) {
            Ok(_) => tracing::info!(path = %candidate.display(), "Loaded environment from .env"),
            Err(e) => tracing::warn!(
                path = %candidate.display(),
                error = %e,
                "Failed to load .env file"
            ),
        }
        return;
    }

    tracing::debug!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}
