//! The violation-scan aggregator: one analyzer result set in, one normalized
//! [`ScanPayload`] out, with per-element evidence collected through the
//! [`ElementProbe`] capability boundary.

use anyhow::Result;
use tracing::{debug, warn};

use crate::analyzer::{guideline_tag, AnalyzerResults, AnalyzerViolation};
use crate::payload::{ScanPayload, TargetRecord, ViolationRecord};
use crate::severity::Severity;

// -------------------------------------------------------------------------------------------------
// ScanOptions
// -------------------------------------------------------------------------------------------------
/// Options recognized at the scan-time boundary.
///
/// `rules`, `tags`, and `extra` are passed opaquely to the analyzer invocation and never
/// interpreted here; `include` restricts the scanned surface the same way.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// CSS selector restricting the scan's surface, passed through to the analyzer.
    pub include: Option<String>,

    /// Echo violations to the console as they are aggregated. Default on.
    pub verbose: bool,

    /// Per-rule enable/disable map, passed opaquely to the analyzer.
    pub rules: serde_json::Map<String, serde_json::Value>,

    /// Category filter, passed opaquely to the analyzer.
    pub tags: Vec<String>,

    /// Override for the scan's display/filename identity. Defaults to the page URL.
    pub page_key: Option<String>,

    /// Open-ended passthrough for analyzer-specific options.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            include: None,
            verbose: true,
            rules: serde_json::Map::new(),
            tags: Vec::new(),
            page_key: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl ScanOptions {
    /// Assemble the opaque option object handed to the analyzer invocation.
    pub fn analyzer_options(&self) -> serde_json::Value {
        let mut opts = self.extra.clone();
        if let Some(include) = &self.include {
            opts.insert("include".to_string(), serde_json::Value::String(include.clone()));
        }
        if !self.rules.is_empty() {
            opts.insert("rules".to_string(), serde_json::Value::Object(self.rules.clone()));
        }
        if !self.tags.is_empty() {
            opts.insert(
                "runOnly".to_string(),
                serde_json::json!({ "type": "tag", "values": self.tags }),
            );
        }
        serde_json::Value::Object(opts)
    }
}

// -------------------------------------------------------------------------------------------------
// ElementProbe
// -------------------------------------------------------------------------------------------------
/// The DOM-side capability boundary used for evidence collection.
///
/// The crate ships no browser driver; scan callers supply an implementation backed by
/// whatever automation stack runs the page. Every operation is best-effort from the
/// aggregator's point of view: probe failures degrade evidence, never the scan.
pub trait ElementProbe {
    /// The page's URL, used as the default scan identity.
    fn page_url(&self) -> String;

    /// Display an inline annotation describing the violation on the affected element.
    fn annotate(&self, selector: &str, violation: &AnalyzerViolation) -> Result<()>;

    /// Whether the element is currently visible.
    fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Highlight the element and capture a screenshot of it.
    /// Returns the file name of the captured image.
    fn capture(&self, selector: &str, rule_id: &str, target_index: usize) -> Result<String>;

    /// Human-readable step descriptions active at scan time. May be empty.
    fn active_steps(&self) -> Vec<String> {
        Vec::new()
    }
}

// -------------------------------------------------------------------------------------------------
// build_scan
// -------------------------------------------------------------------------------------------------
/// Build one normalized scan payload from an analyzer result set.
///
/// For every rule, every affected node, and every composite target selector: annotate the
/// element, check live visibility, and capture evidence only when the element is visible.
/// Elements that are not visible still count toward `total_count` but produce no
/// `TargetRecord`. A result set with zero violations still produces a payload.
pub fn build_scan(
    results: &AnalyzerResults,
    probe: &dyn ElementProbe,
    options: &ScanOptions,
) -> Result<ScanPayload> {
    let page_key = options
        .page_key
        .clone()
        .unwrap_or_else(|| probe.page_url());

    let mut violations = Vec::with_capacity(results.violations.len());
    for violation in &results.violations {
        violations.push(build_violation(violation, probe, options)?);
    }

    debug!(
        "scan of {page_key:?}: {} violated rules, {} affected elements",
        violations.len(),
        violations.iter().map(|v: &ViolationRecord| v.total_count).sum::<usize>(),
    );

    Ok(ScanPayload {
        page_key,
        violations,
        evidence_video_ref: String::new(),
        severity_color_map: Default::default(),
        issue_tracker_ref: None,
    })
}

fn build_violation(
    violation: &AnalyzerViolation,
    probe: &dyn ElementProbe,
    options: &ScanOptions,
) -> Result<ViolationRecord> {
    let severity = Severity::from_impact(violation.impact.as_deref());
    let steps = probe.active_steps();

    let mut targets = Vec::new();
    let mut counted = 0usize;
    for node in &violation.nodes {
        if node.target.is_empty() {
            // the engine reported a node it could not address; count it, no evidence
            counted += 1;
            continue;
        }
        for selector in &node.target {
            counted += 1;
            if let Err(e) = probe.annotate(selector, violation) {
                warn!("failed to annotate {selector:?} for rule {}: {e:#}", violation.id);
            }
            let visible = match probe.is_visible(selector) {
                Ok(visible) => visible,
                Err(e) => {
                    warn!("visibility check failed for {selector:?}: {e:#}");
                    false
                }
            };
            if !visible {
                continue;
            }
            let screenshot_ref = match probe.capture(selector, &violation.id, targets.len()) {
                Ok(name) => name,
                Err(e) => {
                    warn!("failed to capture {selector:?} for rule {}: {e:#}", violation.id);
                    String::new()
                }
            };
            targets.push(TargetRecord {
                selector: selector.clone(),
                markup_snippet: node.html.clone(),
                screenshot_ref,
                context_steps: steps.clone(),
            });
        }
    }

    if options.verbose {
        echo_violation(violation, severity, counted);
    }

    Ok(ViolationRecord {
        rule_id: violation.id.clone(),
        severity,
        description: violation.description.clone(),
        help_text: violation.help.clone(),
        help_url: violation.help_url.clone(),
        guideline_tag: guideline_tag(&violation.tags),
        targets,
        total_count: counted,
    })
}

fn echo_violation(violation: &AnalyzerViolation, severity: Severity, count: usize) {
    let style = match severity {
        Severity::Critical | Severity::Serious => console::Style::new().red().bold(),
        Severity::Moderate | Severity::Minor => console::Style::new().yellow(),
        Severity::Unknown => console::Style::new().dim(),
    };
    println!(
        "{} [{severity}] {} ({count} affected)",
        style.apply_to(&violation.id),
        violation.help,
    );
}
