//! Types for the opaque result set handed over by the external accessibility rule engine.
//!
//! The engine's output arrives already grouped by rule: one violation object per rule id,
//! each carrying the list of affected nodes. Nothing here interprets rule semantics; the
//! fields are carried verbatim into [`crate::payload::ViolationRecord`]s by the scan builder.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Literal marker used when no guideline tag can be resolved for a rule.
pub const GUIDELINE_NOT_APPLICABLE: &str = "n/a";

/// The full result set from one analysis pass over one page state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerResults {
    #[serde(default)]
    pub violations: Vec<AnalyzerViolation>,
}

/// One rule found broken, with every node matching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerViolation {
    pub id: String,

    /// The engine's impact string; absent or unrecognized values map to `Severity::Unknown`.
    #[serde(default)]
    pub impact: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub help: String,

    #[serde(default)]
    pub help_url: String,

    /// Rule category tags as declared by the engine, e.g. `["cat.color", "wcag2aa", "wcag143"]`.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub nodes: Vec<AnalyzerNode>,
}

/// One affected DOM node. A node may map to more than one selector when the engine reports
/// composite targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerNode {
    #[serde(default)]
    pub target: Vec<String>,

    /// Serialized outer HTML of the node at scan time.
    #[serde(default)]
    pub html: String,
}

lazy_static! {
    static ref WCAG_TAG: Regex = Regex::new(r"^wcag\d+").expect("WCAG tag pattern should compile");
}

/// Resolve the guideline tag displayed for a rule.
///
/// Display convention, preserved exactly: the first tag matching `wcagNNx` wins; otherwise
/// the second declared tag; otherwise the literal [`GUIDELINE_NOT_APPLICABLE`] marker.
pub fn guideline_tag(tags: &[String]) -> String {
    if let Some(tag) = tags.iter().find(|t| WCAG_TAG.is_match(t)) {
        return tag.clone();
    }
    tags.get(1)
        .cloned()
        .unwrap_or_else(|| GUIDELINE_NOT_APPLICABLE.to_string())
}
