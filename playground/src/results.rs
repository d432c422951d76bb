//! Result channel: turns an `ExecutionResult` into something a presentation
//! layer can render without knowing the producer's payload shape.

use serde_json::{Map, Value};
use shared_types::{ExecutionResult, UiMetadata, UI_METADATA_KEY};

/// How a finished run is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// The captured output trace
    #[default]
    Text,
    /// Pretty-printed structured data
    Json,
}

/// Sections a producer can populate through well-known keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultSection {
    Properties,
    Structure,
    Materials,
    Types,
    Raw,
}

impl ResultSection {
    /// Default-section priority, highest first.
    pub const PRIORITY: [ResultSection; 5] = [
        ResultSection::Properties,
        ResultSection::Structure,
        ResultSection::Materials,
        ResultSection::Types,
        ResultSection::Raw,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ResultSection::Properties => "properties",
            ResultSection::Structure => "structure",
            ResultSection::Materials => "materials",
            ResultSection::Types => "types",
            ResultSection::Raw => "raw",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResultSection::Properties => "Properties",
            ResultSection::Structure => "Structure",
            ResultSection::Materials => "Materials",
            ResultSection::Types => "Element Types",
            ResultSection::Raw => "Raw Data",
        }
    }

    /// Structured-data key backing the section. `Raw` shows everything.
    pub fn data_key(&self) -> Option<&'static str> {
        match self {
            ResultSection::Properties => Some("properties"),
            ResultSection::Structure => Some("spatial_tree"),
            ResultSection::Materials => Some("material_usage"),
            ResultSection::Types => Some("type_counts"),
            ResultSection::Raw => None,
        }
    }
}

/// Read-only view over one execution result.
#[derive(Debug, Clone)]
pub struct ResultView<'a> {
    result: &'a ExecutionResult,
    metadata: Option<UiMetadata>,
}

impl<'a> ResultView<'a> {
    pub fn new(result: &'a ExecutionResult) -> Self {
        let metadata = result
            .structured_data
            .get(UI_METADATA_KEY)
            .and_then(|v| serde_json::from_value::<UiMetadata>(v.clone()).ok());
        Self { result, metadata }
    }

    pub fn captured_output(&self) -> &str {
        &self.result.captured_output
    }

    pub fn structured_data(&self) -> &Map<String, Value> {
        &self.result.structured_data
    }

    /// Presentation hints, or `None` when absent or malformed.
    pub fn ui_metadata(&self) -> Option<&UiMetadata> {
        self.metadata.as_ref()
    }

    pub fn raw_json(&self) -> String {
        serde_json::to_string_pretty(&self.result.structured_data).unwrap_or_else(|_| "{}".into())
    }

    pub fn render(&self, mode: OutputMode) -> String {
        match mode {
            OutputMode::Text => self.captured_output().to_string(),
            OutputMode::Json => self.raw_json(),
        }
    }

    /// Populated sections in priority order. `Raw` is always last.
    pub fn sections(&self) -> Vec<ResultSection> {
        ResultSection::PRIORITY
            .into_iter()
            .filter(|s| self.has_section(*s))
            .collect()
    }

    pub fn default_section(&self) -> ResultSection {
        self.sections()
            .into_iter()
            .next()
            .unwrap_or(ResultSection::Raw)
    }

    pub fn section_data(&self, section: ResultSection) -> Option<&Value> {
        section
            .data_key()
            .and_then(|key| self.result.structured_data.get(key))
            .filter(|v| is_populated(v))
    }

    /// Initial view mode for a section. Alternative views only apply when
    /// the producer advertises them.
    pub fn default_view_mode(&self, section: ResultSection) -> &str {
        let Some(metadata) = self.metadata.as_ref().filter(|m| m.has_multiple_views) else {
            return "raw";
        };
        match section {
            ResultSection::Structure => "tree",
            ResultSection::Properties | ResultSection::Materials => {
                metadata.default_view.as_deref().unwrap_or("structured")
            }
            ResultSection::Types | ResultSection::Raw => "raw",
        }
    }

    fn has_section(&self, section: ResultSection) -> bool {
        section == ResultSection::Raw || self.section_data(section).is_some()
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
