use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::severity::{Severity, SeverityPalette};

/// The fixed marker name under which scan payloads travel on the test driver's generic
/// attachment channel. The reporter recognizes payload attachments by this name alone.
pub const SCAN_ATTACHMENT_NAME: &str = "curbcut-a11y-scan";

// -------------------------------------------------------------------------------------------------
// TargetRecord
// -------------------------------------------------------------------------------------------------
/// One affected element instance implicated by a violation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    /// Full CSS path uniquely identifying the element at scan time.
    /// Not guaranteed valid after DOM mutation.
    pub selector: String,

    /// Serialized outer HTML of the element at scan time.
    #[serde(default)]
    pub markup_snippet: String,

    /// File name of an evidence screenshot, or empty if none was captured.
    #[serde(default)]
    pub screenshot_ref: String,

    /// Human-readable step descriptions active when the violation was found.
    /// Driver-reported steps are merged in later, after pre-existing entries.
    #[serde(default)]
    pub context_steps: Vec<String>,
}

// -------------------------------------------------------------------------------------------------
// ViolationRecord
// -------------------------------------------------------------------------------------------------
/// One distinct rule violated on a page scan, aggregating every matching element.
///
/// `rule_id` is unique within one payload's violation set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    /// Stable rule identifier from the rule engine.
    pub rule_id: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub help_text: String,

    #[serde(default)]
    pub help_url: String,

    /// Resolved guideline reference, e.g. a WCAG tag, or a literal "n/a".
    #[serde(default)]
    pub guideline_tag: String,

    /// One record per affected element, in analyzer discovery order.
    /// Elements that were not visible at capture time are counted but produce no entry here.
    #[serde(default)]
    pub targets: Vec<TargetRecord>,

    /// Number of affected element instances. Always >= `targets.len()`: evidence capture
    /// requires visibility, counting does not.
    #[serde(default)]
    pub total_count: usize,
}

// -------------------------------------------------------------------------------------------------
// IssueTrackerRef
// -------------------------------------------------------------------------------------------------
/// Organization/project identifiers used by the renderer to build issue-tracker deep links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueTrackerRef {
    pub organization: String,
    pub project: String,
}

// -------------------------------------------------------------------------------------------------
// ScanPayload
// -------------------------------------------------------------------------------------------------
/// The unit exchanged between scan time and report time.
///
/// Produced once per page scan and attached to the current test; read back out by the
/// reporter, possibly in a different process phase. The shape is deliberately lenient on
/// parse: unknown fields are ignored and absent optional fields take documented defaults,
/// but a structurally malformed document is an error for the caller to absorb.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    /// Scan identity; defaults to the page URL, may be overridden by the producer.
    /// Used both for display and for derived output file naming.
    pub page_key: String,

    #[serde(default)]
    pub violations: Vec<ViolationRecord>,

    /// Name of the video file associated with this scan. Resolved late: the reporter
    /// overwrites this once the actual video asset has been relocated.
    #[serde(default)]
    pub evidence_video_ref: String,

    /// Display palette. Producer-side values are passthrough only; the reporter overwrites
    /// this with its configured palette at consumption time.
    #[serde(default)]
    pub severity_color_map: SeverityPalette,

    /// Reporter configuration wins over the producer value when both are present.
    #[serde(default)]
    pub issue_tracker_ref: Option<IssueTrackerRef>,
}

impl ScanPayload {
    /// Parse a payload from JSON bytes, validating structure at the boundary.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to parse scan payload")
    }

    /// Serialize this payload for the driver's attachment channel.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize scan payload")
    }

    /// The attachment carrying this payload, tagged with the fixed marker name.
    pub fn attachment(&self) -> Result<ScanAttachment> {
        Ok(ScanAttachment {
            name: SCAN_ATTACHMENT_NAME,
            content_type: "application/json",
            body: self.to_json_bytes()?,
        })
    }

    /// Sum of `total_count` across every violation in this payload.
    pub fn total_violation_count(&self) -> usize {
        self.violations.iter().map(|v| v.total_count).sum()
    }
}

/// A payload ready for the test driver's generic attachment channel.
#[derive(Debug, Clone)]
pub struct ScanAttachment {
    pub name: &'static str,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_minimal_payload_defaults_optional_fields() {
        let payload = ScanPayload::from_json_bytes(br#"{"pageKey": "https://example.com"}"#)
            .expect("minimal payload should parse");
        assert_eq!(payload.page_key, "https://example.com");
        assert!(payload.violations.is_empty());
        assert_eq!(payload.evidence_video_ref, "");
        assert_eq!(payload.severity_color_map, SeverityPalette::default());
        assert_eq!(payload.issue_tracker_ref, None);
        assert_eq!(payload.total_violation_count(), 0);
    }

    #[test]
    fn parse_full_payload() {
        let bytes = indoc! {br##"
            {
                "pageKey": "Login Page",
                "violations": [
                    {
                        "ruleId": "color-contrast",
                        "severity": "serious",
                        "description": "Elements must have sufficient color contrast",
                        "helpUrl": "https://example.org/rules/color-contrast",
                        "guidelineTag": "wcag2aa",
                        "targets": [
                            {"selector": "#login > button", "markupSnippet": "<button>Go</button>"}
                        ],
                        "totalCount": 3
                    }
                ],
                "issueTrackerRef": {"organization": "acme", "project": "storefront"},
                "anUnknownField": 17
            }
        "##};
        let payload = ScanPayload::from_json_bytes(bytes).expect("payload should parse");
        let violation = &payload.violations[0];
        assert_eq!(violation.rule_id, "color-contrast");
        assert_eq!(violation.severity, crate::severity::Severity::Serious);
        assert_eq!(violation.total_count, 3);
        assert_eq!(violation.targets.len(), 1);
        assert!(violation.total_count >= violation.targets.len());
        assert_eq!(
            payload.issue_tracker_ref,
            Some(IssueTrackerRef {
                organization: "acme".to_string(),
                project: "storefront".to_string(),
            })
        );
        assert_eq!(payload.total_violation_count(), 3);
    }

    #[test]
    fn parse_malformed_payload_is_an_error() {
        assert!(ScanPayload::from_json_bytes(b"{\"pageKey\": ").is_err());
        assert!(ScanPayload::from_json_bytes(b"[1, 2, 3]").is_err());
        // a missing pageKey is structural, not optional
        assert!(ScanPayload::from_json_bytes(b"{}").is_err());
    }

    #[test]
    fn attachment_carries_marker_name_and_json_body() {
        let payload = ScanPayload::from_json_bytes(br#"{"pageKey": "p"}"#).unwrap();
        let attachment = payload.attachment().unwrap();
        assert_eq!(attachment.name, SCAN_ATTACHMENT_NAME);
        assert_eq!(attachment.content_type, "application/json");
        let round: ScanPayload = serde_json::from_slice(&attachment.body).unwrap();
        assert_eq!(round.page_key, "p");
    }
}
