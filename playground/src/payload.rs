//! Script payload preparation: the script text and the file it runs against.

use std::path::Path;

use bytes::Bytes;

/// Characters editors and paste buffers sneak into scripts.
const INVISIBLE_CHARS: [char; 5] = ['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

/// Placeholder some editors leave behind where the caret was.
const CURSOR_MARKER: &str = "<CURRENT_CURSOR_POSITION>";

/// Strip invisible characters and cursor markers from a script.
///
/// Idempotent: removal repeats until no marker remains, so markers that only
/// appear once an inner one is removed are caught too.
pub fn sanitize_script(script: &str) -> String {
    let mut cleaned: String = script
        .chars()
        .filter(|c| !INVISIBLE_CHARS.contains(c))
        .collect();

    while cleaned.contains(CURSOR_MARKER) {
        cleaned = cleaned.replace(CURSOR_MARKER, "");
    }
    cleaned
}

/// The IFC file handed to a run. Ownership moves into the worker with the
/// `run` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub data: Bytes,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, data))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
