use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------
// Severity
// -------------------------------------------------------------------------------------------------
/// The severity of an accessibility violation, as reported by the rule engine.
///
/// Variants are declared in increasing order of severity, so the derived `Ord` can be used
/// directly for display sorting. `Unknown` covers absent or unrecognized engine impact strings
/// and sorts below everything else.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    #[default]
    Unknown,
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl Severity {
    /// Map the rule engine's optional impact string to a severity.
    ///
    /// Anything absent or unrecognized becomes `Unknown` rather than an error: the engine's
    /// impact vocabulary is not under our control.
    pub fn from_impact(impact: Option<&str>) -> Self {
        impact
            .and_then(|s| s.parse().ok())
            .unwrap_or(Severity::Unknown)
    }
}

/// Display color for severities without a palette entry.
pub const FALLBACK_COLOR: &str = "#95a5a6";

// -------------------------------------------------------------------------------------------------
// SeverityPalette
// -------------------------------------------------------------------------------------------------
/// The four display colors used when rendering violations, one per recognized severity.
///
/// The producer side of a scan payload carries whatever palette it was given only as a
/// passthrough; the reporter overwrites it with its configured palette (or this default) at
/// consumption time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SeverityPalette {
    pub minor: String,
    pub moderate: String,
    pub serious: String,
    pub critical: String,
}

impl Default for SeverityPalette {
    fn default() -> Self {
        SeverityPalette {
            minor: "#f1c40f".to_string(),
            moderate: "#e67e22".to_string(),
            serious: "#d35400".to_string(),
            critical: "#c0392b".to_string(),
        }
    }
}

impl SeverityPalette {
    /// Total mapping from severity to display color. `Unknown` always resolves to the neutral
    /// fallback gray; there is no way for a lookup to miss.
    pub fn color_for(&self, severity: Severity) -> &str {
        match severity {
            Severity::Minor => &self.minor,
            Severity::Moderate => &self.moderate,
            Severity::Serious => &self.serious,
            Severity::Critical => &self.critical,
            Severity::Unknown => FALLBACK_COLOR,
        }
    }
}
