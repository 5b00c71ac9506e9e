//! Workspace state documents and structural schema detection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Current-format workspace state.
///
/// Only the `projects` container is inspected by the engine; everything
/// else rides along opaquely in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// Top-level project entries. Contents are opaque to persistence.
    pub projects: Vec<Value>,

    /// Remaining top-level fields, preserved verbatim across round trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkspaceState {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self {
            projects: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Legacy-format workspace state (`pages` container).
///
/// Produced only at the load/import boundary; migrated to
/// [`WorkspaceState`] before anything else sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyWorkspaceState {
    /// Top-level page entries from the old schema.
    pub pages: Vec<Value>,

    /// Remaining top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shape violations detected at the document boundary.
#[derive(Debug, Error)]
pub enum StateShapeError {
    /// The document is not a JSON object at the top level.
    #[error("state document is not an object")]
    NotAnObject,

    /// Neither recognized container is present.
    #[error("state document is missing both a 'projects' and a 'pages' sequence")]
    MissingContainers,

    /// A recognized container key exists but is not a sequence.
    #[error("state document field '{container}' is not a sequence")]
    ContainerNotSequence { container: &'static str },

    /// The payload is not valid wire text, or a container entry failed to
    /// decode.
    #[error("failed to decode state document")]
    Decode(#[from] serde_json::Error),
}

/// A workspace state document, tagged by which schema it uses.
///
/// Serialized form carries no version field; the variant is detected
/// structurally from the top-level container key. [`StateDocument::from_value`]
/// is the single place that detection happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateDocument {
    /// Current schema (`projects`).
    Current(WorkspaceState),
    /// Legacy schema (`pages`).
    Legacy(LegacyWorkspaceState),
}

impl From<WorkspaceState> for StateDocument {
    fn from(state: WorkspaceState) -> Self {
        Self::Current(state)
    }
}

impl StateDocument {
    /// Detect the schema of a raw JSON value and decode it.
    ///
    /// A document with both containers is treated as current format.
    /// A document with neither is a hard shape error, never coerced to an
    /// empty workspace.
    pub fn from_value(value: Value) -> Result<Self, StateShapeError> {
        let Value::Object(ref fields) = value else {
            return Err(StateShapeError::NotAnObject);
        };

        if let Some(projects) = fields.get("projects") {
            if !projects.is_array() {
                return Err(StateShapeError::ContainerNotSequence {
                    container: "projects",
                });
            }
            let state: WorkspaceState = serde_json::from_value(value)?;
            return Ok(Self::Current(state));
        }

        if let Some(pages) = fields.get("pages") {
            if !pages.is_array() {
                return Err(StateShapeError::ContainerNotSequence { container: "pages" });
            }
            let state: LegacyWorkspaceState = serde_json::from_value(value)?;
            return Ok(Self::Legacy(state));
        }

        Err(StateShapeError::MissingContainers)
    }

    /// Parse wire text and detect its schema.
    pub fn from_json_str(payload: &str) -> Result<Self, StateShapeError> {
        let value: Value = serde_json::from_str(payload)?;
        Self::from_value(value)
    }

    /// Whether this document uses the legacy `pages` schema.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// Migrate to the current schema.
    ///
    /// Legacy pages become project entries in order; unrecognized
    /// top-level fields are preserved.
    pub fn into_current(self) -> WorkspaceState {
        match self {
            Self::Current(state) => state,
            Self::Legacy(legacy) => WorkspaceState {
                projects: legacy.pages,
                extra: legacy.extra,
            },
        }
    }

    /// Estimate the serialized size in bytes without serializing.
    ///
    /// Structural walk: string lengths plus fixed per-token costs. Numbers
    /// are costed at a fixed width, so this is a routing heuristic, not an
    /// exact byte count.
    pub fn estimate_wire_size(&self) -> usize {
        match self {
            Self::Current(state) => {
                estimate_fields("projects", &state.projects, &state.extra)
            }
            Self::Legacy(legacy) => estimate_fields("pages", &legacy.pages, &legacy.extra),
        }
    }
}

fn estimate_fields(container: &str, entries: &[Value], extra: &Map<String, Value>) -> usize {
    let mut total = 2 + container.len() + 4;
    total += 2 + entries.len();
    for entry in entries {
        total += estimate_value(entry);
    }
    for (key, value) in extra {
        total += key.len() + 4 + estimate_value(value);
    }
    total
}

fn estimate_value(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 12,
        Value::String(s) => s.len() + 2,
        Value::Array(items) => {
            2 + items.len() + items.iter().map(estimate_value).sum::<usize>()
        }
        Value::Object(fields) => {
            2 + fields.len()
                + fields
                    .iter()
                    .map(|(k, v)| k.len() + 4 + estimate_value(v))
                    .sum::<usize>()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_current_schema() {
        let doc = StateDocument::from_value(json!({"projects": [{"name": "p1"}]})).unwrap();
        assert!(!doc.is_legacy());
        assert_eq!(doc.into_current().projects.len(), 1);
    }

    #[test]
    fn test_detect_legacy_schema() {
        let doc = StateDocument::from_value(json!({"pages": [{"name": "old"}]})).unwrap();
        assert!(doc.is_legacy());

        let migrated = doc.into_current();
        assert_eq!(migrated.projects, vec![json!({"name": "old"})]);
    }

    #[test]
    fn test_missing_both_containers() {
        let result = StateDocument::from_value(json!({"theme": "dark"}));
        assert!(matches!(result, Err(StateShapeError::MissingContainers)));

        let result = StateDocument::from_value(json!({}));
        assert!(matches!(result, Err(StateShapeError::MissingContainers)));
    }

    #[test]
    fn test_non_object_rejected() {
        let result = StateDocument::from_value(json!([1, 2, 3]));
        assert!(matches!(result, Err(StateShapeError::NotAnObject)));
    }

    #[test]
    fn test_container_must_be_sequence() {
        let result = StateDocument::from_value(json!({"projects": "nope"}));
        assert!(matches!(
            result,
            Err(StateShapeError::ContainerNotSequence { container: "projects" })
        ));
    }

    #[test]
    fn test_extra_fields_survive_round_trip() {
        let doc =
            StateDocument::from_value(json!({"projects": [], "theme": "dark", "zoom": 1.5}))
                .unwrap();
        let payload = serde_json::to_string(&doc).unwrap();
        let reparsed = StateDocument::from_json_str(&payload).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn test_estimate_tracks_payload_growth() {
        let small = StateDocument::from_value(json!({"projects": []})).unwrap();
        let big = StateDocument::from_value(json!({
            "projects": [{"blob": "x".repeat(10_000)}]
        }))
        .unwrap();
        assert!(big.estimate_wire_size() > small.estimate_wire_size() + 10_000);
    }
}
