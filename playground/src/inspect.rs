//! Fallback mode: raw IFC inspection without a background runtime.

use std::sync::OnceLock;

use regex::Regex;

/// Preview length shown in fallback mode, in characters.
pub const PREVIEW_CHARS: usize = 10_000;

const STEP_HEADER: &str = "ISO-10303-21;";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInspection {
    pub name: String,
    pub size_bytes: usize,
    /// Content starts with the STEP physical file header.
    pub is_step: bool,
    pub schemas: Vec<String>,
    pub entity_count: usize,
    pub preview: String,
    pub truncated: bool,
}

fn file_schema_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)FILE_SCHEMA\s*\(\s*\((.*?)\)\s*\)").expect("valid FILE_SCHEMA regex")
    })
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*#\d+\s*=").expect("valid entity regex"))
}

pub fn inspect_file(name: &str, bytes: &[u8]) -> FileInspection {
    let text = String::from_utf8_lossy(bytes);

    let schemas = file_schema_regex()
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|list| {
            list.as_str()
                .split(',')
                .map(|s| s.trim().trim_matches('\'').trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut chars = text.chars();
    let preview: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    let truncated = chars.next().is_some();

    FileInspection {
        name: name.to_string(),
        size_bytes: bytes.len(),
        is_step: text.trim_start_matches('\u{FEFF}').trim_start().starts_with(STEP_HEADER),
        schemas,
        entity_count: entity_regex().find_iter(&text).count(),
        preview,
        truncated,
    }
}

impl std::fmt::Display for FileInspection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "File: {}", self.name)?;
        writeln!(f, "Size: {} bytes", self.size_bytes)?;
        writeln!(
            f,
            "Format: {}",
            if self.is_step {
                "STEP physical file (ISO 10303-21)"
            } else {
                "unknown"
            }
        )?;
        if !self.schemas.is_empty() {
            writeln!(f, "Schema: {}", self.schemas.join(", "))?;
        }
        writeln!(f, "Entities: {}", self.entity_count)?;
        writeln!(f)?;
        write!(f, "{}", self.preview)?;
        if self.truncated {
            write!(f, "\n... (truncated)")?;
        }
        Ok(())
    }
}
