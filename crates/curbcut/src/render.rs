//! The render boundary: a named template plus JSON-able data in, HTML text out.
//!
//! The session aggregator only depends on the [`RenderEngine`] contract; the built-in
//! [`HtmlRenderer`] assembles self-contained pages by string building. Render failures are
//! fatal by design: a report that silently fails to render is worse than a crashed run
//! telling the operator immediately.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::payload::ScanPayload;
use crate::session::{RunSummary, TestOutcomeRecord};
use crate::util::format_duration;

// -------------------------------------------------------------------------------------------------
// Template
// -------------------------------------------------------------------------------------------------
/// The closed set of page templates the reporter renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Template {
    /// The run-level summary page.
    Summary,
    /// One per-test execution-detail page.
    TestDetail,
    /// One per-scan violation evidence page.
    ScanPage,
}

/// Pure rendering contract: template name plus data, HTML text out.
pub trait RenderEngine: Send + Sync {
    fn render(&self, template: Template, data: &serde_json::Value) -> Result<String>;
}

/// Data for [`Template::ScanPage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPageData {
    pub test_title: String,
    pub payload: ScanPayload,
}

/// Data for [`Template::TestDetail`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPageData {
    pub test: TestOutcomeRecord,
}

// -------------------------------------------------------------------------------------------------
// HtmlRenderer
// -------------------------------------------------------------------------------------------------
/// The built-in engine: self-contained HTML pages, no external assets.
pub struct HtmlRenderer;

impl RenderEngine for HtmlRenderer {
    fn render(&self, template: Template, data: &serde_json::Value) -> Result<String> {
        match template {
            Template::Summary => {
                let summary: RunSummary = serde_json::from_value(data.clone())
                    .context("Malformed data for summary template")?;
                Ok(summary_page(&summary))
            }
            Template::TestDetail => {
                let data: TestPageData = serde_json::from_value(data.clone())
                    .context("Malformed data for test-detail template")?;
                Ok(test_page(&data))
            }
            Template::ScanPage => {
                let data: ScanPageData = serde_json::from_value(data.clone())
                    .context("Malformed data for scan-page template")?;
                Ok(scan_page(&data))
            }
        }
    }
}

/// Convert driver error text to HTML: ANSI SGR color/bold sequences become styled spans,
/// everything else is escaped. Non-SGR escape sequences are dropped.
fn ansi_to_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut open_spans = 0usize;
    for (slice, is_ansi) in console::AnsiCodeIterator::new(s) {
        if !is_ansi {
            out.push_str(&escape_html(slice));
            continue;
        }
        let params = match slice.strip_prefix("\x1b[").and_then(|r| r.strip_suffix('m')) {
            Some(params) => params,
            None => continue,
        };
        for code in params.split(';') {
            match code {
                "" | "0" => {
                    for _ in 0..open_spans {
                        out.push_str("</span>");
                    }
                    open_spans = 0;
                }
                "1" => {
                    out.push_str("<span style=\"font-weight:bold\">");
                    open_spans += 1;
                }
                _ => {
                    if let Some(color) = sgr_foreground_color(code) {
                        out.push_str(&format!("<span style=\"color:{color}\">"));
                        open_spans += 1;
                    }
                }
            }
        }
    }
    for _ in 0..open_spans {
        out.push_str("</span>");
    }
    out
}

fn sgr_foreground_color(code: &str) -> Option<&'static str> {
    Some(match code {
        "30" | "90" => "#7f8c8d",
        "31" | "91" => "#c0392b",
        "32" | "92" => "#27ae60",
        "33" | "93" => "#f39c12",
        "34" | "94" => "#2980b9",
        "35" | "95" => "#8e44ad",
        "36" | "96" => "#16a085",
        "37" | "97" => "#bdc3c7",
        _ => return None,
    })
}

/// Escape text for HTML element and attribute contexts.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const PAGE_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 2rem; color: #2c3e50; }
h1, h2 { margin: 0.5rem 0; }
table { border-collapse: collapse; margin: 1rem 0; width: 100%; }
th, td { border: 1px solid #dfe4e8; padding: 0.4rem 0.6rem; text-align: left; vertical-align: top; }
th { background: #f4f6f7; }
.badge { display: inline-block; padding: 0.1rem 0.5rem; border-radius: 0.6rem; color: #fff; font-size: 0.85rem; }
.passed { background: #27ae60; } .failed { background: #c0392b; } .skipped { background: #7f8c8d; }
.timed-out, .interrupted { background: #8e44ad; }
.flaky { background: #f39c12; }
pre { background: #f4f6f7; padding: 0.6rem; overflow-x: auto; }
code { background: #f4f6f7; padding: 0 0.2rem; }
.muted { color: #7f8c8d; }
"#;

fn page_head(title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n<style>{PAGE_STYLE}</style>\n</head>\n<body>\n",
        escape_html(title)
    )
}

fn status_badge(record: &TestOutcomeRecord) -> String {
    let class = match record.status {
        crate::session::TestStatus::Passed => "passed",
        crate::session::TestStatus::Failed => "failed",
        crate::session::TestStatus::Skipped => "skipped",
        crate::session::TestStatus::TimedOut => "timed-out",
        crate::session::TestStatus::Interrupted => "interrupted",
    };
    let mut badge = format!("<span class=\"badge {class}\">{}</span>", record.status);
    if record.is_flaky {
        badge.push_str(" <span class=\"badge flaky\">flaky</span>");
    }
    badge
}

// -------------------------------------------------------------------------------------------------
// summary page
// -------------------------------------------------------------------------------------------------
fn summary_page(summary: &RunSummary) -> String {
    let mut html = page_head("Accessibility Run Summary");
    let totals = &summary.totals;
    write!(
        html,
        "<h1>Run Summary</h1>\n\
         <p>Status: <strong>{}</strong> &middot; Duration: {} &middot; \
          {} tests: {} passed, {} failed, {} skipped, {} flaky</p>\n",
        escape_html(&summary.run_status),
        format_duration(summary.duration_ms),
        totals.total,
        totals.passed,
        totals.failed,
        totals.skipped,
        totals.flaky,
    )
    .expect("writing to a String cannot fail");

    html.push_str(&rule_aggregate_table(&summary.rule_aggregate, "Violations by rule"));

    for browser in &summary.per_browser {
        write!(
            html,
            "<h2>{}</h2>\n<p class=\"muted\">{} tests: {} passed, {} failed, {} skipped, {} flaky</p>\n",
            escape_html(&browser.key),
            browser.totals.total,
            browser.totals.passed,
            browser.totals.failed,
            browser.totals.skipped,
            browser.totals.flaky,
        )
        .expect("writing to a String cannot fail");
        if !browser.rule_aggregate.is_empty() {
            html.push_str(&rule_aggregate_table(&browser.rule_aggregate, "Violations"));
        }
    }

    for group in &summary.groups {
        write!(html, "<h2>{}</h2>\n<table>\n<tr><th>#</th><th>Test</th><th>Status</th>\
                      <th>Duration</th><th>Browser</th><th>A11y</th></tr>\n",
               escape_html(&group.key))
            .expect("writing to a String cannot fail");
        for test in &group.tests {
            let a11y = if test.a11y_report_ref.is_empty() {
                "<span class=\"muted\">no scan</span>".to_string()
            } else {
                format!(
                    "<a href=\"{}\">{} violations</a>",
                    escape_html(&test.a11y_report_ref),
                    test.a11y_error_count
                )
            };
            write!(
                html,
                "<tr><td>{}</td><td><a href=\"{}\">{}</a></td><td>{}</td>\
                 <td>{}</td><td>{}</td><td>{}</td></tr>\n",
                test.sequence_number,
                escape_html(&test.execution_ref),
                escape_html(&test.title),
                status_badge(test),
                format_duration(test.duration_ms),
                escape_html(&test.browser_key),
                a11y,
            )
            .expect("writing to a String cannot fail");
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn rule_aggregate_table(
    aggregate: &std::collections::HashMap<String, crate::session::RuleStats>,
    heading: &str,
) -> String {
    if aggregate.is_empty() {
        return format!("<p class=\"muted\">{}: none</p>\n", escape_html(heading));
    }
    // deterministic display order: severity descending, then count descending, then rule id
    let mut entries: Vec<_> = aggregate.iter().collect();
    entries.sort_by(|(a_id, a), (b_id, b)| {
        b.severity
            .cmp(&a.severity)
            .then(b.count.cmp(&a.count))
            .then(a_id.cmp(b_id))
    });

    let mut html = format!(
        "<h2>{}</h2>\n<table>\n<tr><th>Rule</th><th>Severity</th><th>Count</th><th>Help</th></tr>\n",
        escape_html(heading)
    );
    for (rule_id, stats) in entries {
        let help = if stats.help_url.is_empty() {
            escape_html(&stats.description)
        } else {
            format!(
                "<a href=\"{}\">{}</a>",
                escape_html(&stats.help_url),
                escape_html(&stats.description)
            )
        };
        write!(
            html,
            "<tr><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(rule_id),
            stats.severity,
            stats.count,
            help,
        )
        .expect("writing to a String cannot fail");
    }
    html.push_str("</table>\n");
    html
}

// -------------------------------------------------------------------------------------------------
// test detail page
// -------------------------------------------------------------------------------------------------
fn test_page(data: &TestPageData) -> String {
    let test = &data.test;
    let mut html = page_head(&test.title);
    write!(
        html,
        "<h1>{}</h1>\n<p>{} &middot; {} &middot; {} &middot; #{}</p>\n",
        escape_html(&test.title),
        status_badge(test),
        format_duration(test.duration_ms),
        escape_html(&test.browser_key),
        test.sequence_number,
    )
    .expect("writing to a String cannot fail");

    list_section(&mut html, "Preconditions", &test.preconditions);
    list_section(&mut html, "Steps", &test.steps);
    list_section(&mut html, "Postconditions", &test.postconditions);

    if !test.errors.is_empty() {
        html.push_str("<h2>Errors</h2>\n");
        for error in &test.errors {
            write!(html, "<pre>{}</pre>\n", ansi_to_html(error))
                .expect("writing to a String cannot fail");
        }
    }

    if !test.a11y_report_ref.is_empty() {
        // the execution page sits inside the test folder; link within it
        let local = test
            .a11y_report_ref
            .rsplit('/')
            .next()
            .unwrap_or(&test.a11y_report_ref);
        write!(
            html,
            "<h2>Accessibility</h2>\n<p><a href=\"{}\">{} violations found</a></p>\n",
            escape_html(local),
            test.a11y_error_count,
        )
        .expect("writing to a String cannot fail");
    }

    if !test.video_ref.is_empty() {
        write!(
            html,
            "<h2>Video</h2>\n<video controls width=\"640\" src=\"{}\"></video>\n",
            escape_html(&test.video_ref)
        )
        .expect("writing to a String cannot fail");
    }
    if !test.screenshot_refs.is_empty() {
        html.push_str("<h2>Screenshots</h2>\n");
        for screenshot in &test.screenshot_refs {
            write!(html, "<img src=\"{0}\" alt=\"{0}\" width=\"480\">\n", escape_html(screenshot))
                .expect("writing to a String cannot fail");
        }
    }
    list_section(&mut html, "Attachments", &test.attachment_refs);

    html.push_str("</body>\n</html>\n");
    html
}

fn list_section(html: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    write!(html, "<h2>{}</h2>\n<ol>\n", escape_html(heading))
        .expect("writing to a String cannot fail");
    for item in items {
        write!(html, "<li>{}</li>\n", escape_html(item)).expect("writing to a String cannot fail");
    }
    html.push_str("</ol>\n");
}

// -------------------------------------------------------------------------------------------------
// scan page
// -------------------------------------------------------------------------------------------------
fn scan_page(data: &ScanPageData) -> String {
    let payload = &data.payload;
    let mut html = page_head(&format!("Accessibility scan: {}", payload.page_key));
    write!(
        html,
        "<h1>{}</h1>\n<p class=\"muted\">Test: {}</p>\n",
        escape_html(&payload.page_key),
        escape_html(&data.test_title),
    )
    .expect("writing to a String cannot fail");

    if payload.violations.is_empty() {
        html.push_str("<p><strong>No accessibility violations found.</strong></p>\n");
    }

    for violation in &payload.violations {
        let color = payload.severity_color_map.color_for(violation.severity);
        write!(
            html,
            "<h2><span class=\"badge\" style=\"background:{}\">{}</span> <code>{}</code></h2>\n\
             <p>{}</p>\n\
             <p class=\"muted\">Guideline: {} &middot; {} affected &middot; <a href=\"{}\">{}</a>{}</p>\n",
            escape_html(color),
            violation.severity,
            escape_html(&violation.rule_id),
            escape_html(&violation.description),
            escape_html(&violation.guideline_tag),
            violation.total_count,
            escape_html(&violation.help_url),
            escape_html(&violation.help_text),
            issue_tracker_link(payload, &violation.rule_id),
        )
        .expect("writing to a String cannot fail");

        if violation.targets.is_empty() {
            continue;
        }
        html.push_str(
            "<table>\n<tr><th>Selector</th><th>Markup</th><th>Steps</th><th>Evidence</th></tr>\n",
        );
        for target in &violation.targets {
            let evidence = if target.screenshot_ref.is_empty() {
                "<span class=\"muted\">not captured</span>".to_string()
            } else {
                format!(
                    "<a href=\"{0}\"><img src=\"{0}\" width=\"240\" alt=\"evidence\"></a>",
                    escape_html(&target.screenshot_ref)
                )
            };
            let steps = if target.context_steps.is_empty() {
                String::new()
            } else {
                format!(
                    "<ol><li>{}</li></ol>",
                    target
                        .context_steps
                        .iter()
                        .map(|s| escape_html(s))
                        .collect::<Vec<_>>()
                        .join("</li><li>")
                )
            };
            write!(
                html,
                "<tr><td><code>{}</code></td><td><pre>{}</pre></td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&target.selector),
                escape_html(&target.markup_snippet),
                steps,
                evidence,
            )
            .expect("writing to a String cannot fail");
        }
        html.push_str("</table>\n");
    }

    if !payload.evidence_video_ref.is_empty() {
        write!(
            html,
            "<h2>Video</h2>\n<video controls width=\"640\" src=\"{}\"></video>\n",
            escape_html(&payload.evidence_video_ref)
        )
        .expect("writing to a String cannot fail");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn issue_tracker_link(payload: &ScanPayload, rule_id: &str) -> String {
    match &payload.issue_tracker_ref {
        None => String::new(),
        Some(tracker) => {
            let title: String = format!("Accessibility: {rule_id} on {}", payload.page_key)
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { ' ' })
                .collect();
            let title = title.split_whitespace().collect::<Vec<_>>().join("%20");
            format!(
                " &middot; <a href=\"https://dev.azure.com/{}/{}/_workitems/create/Bug?title={}\">file issue</a>",
                escape_html(&tracker.organization),
                escape_html(&tracker.project),
                title,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{IssueTrackerRef, TargetRecord, ViolationRecord};
    use crate::session::TestStatus;
    use crate::severity::Severity;
    use pretty_assertions::assert_eq;

    #[test]
    fn escape_html_covers_special_characters() {
        assert_eq!(
            escape_html(r#"<img alt="a & b's">"#),
            "&lt;img alt=&quot;a &amp; b&#39;s&quot;&gt;"
        );
    }

    fn sample_payload() -> ScanPayload {
        ScanPayload {
            page_key: "https://example.com/home".to_string(),
            violations: vec![ViolationRecord {
                rule_id: "color-contrast".to_string(),
                severity: Severity::Serious,
                description: "Elements must have sufficient color contrast".to_string(),
                help_text: "Fix contrast".to_string(),
                help_url: "https://rules.example/color-contrast".to_string(),
                guideline_tag: "wcag2aa".to_string(),
                targets: vec![TargetRecord {
                    selector: "#cta > button".to_string(),
                    markup_snippet: "<button>Buy</button>".to_string(),
                    screenshot_ref: "color-contrast-0.png".to_string(),
                    context_steps: vec!["Open home page".to_string()],
                }],
                total_count: 2,
            }],
            evidence_video_ref: "video.webm".to_string(),
            severity_color_map: Default::default(),
            issue_tracker_ref: Some(IssueTrackerRef {
                organization: "acme".to_string(),
                project: "storefront".to_string(),
            }),
        }
    }

    #[test]
    fn scan_page_renders_violations_and_links() {
        let data = ScanPageData {
            test_title: "checkout works".to_string(),
            payload: sample_payload(),
        };
        let html = HtmlRenderer
            .render(Template::ScanPage, &serde_json::to_value(&data).unwrap())
            .unwrap();
        assert!(html.contains("color-contrast"));
        assert!(html.contains("#d35400"), "serious violations use the serious palette color");
        assert!(html.contains("dev.azure.com/acme/storefront"));
        assert!(html.contains("&lt;button&gt;Buy&lt;/button&gt;"));
        assert!(html.contains("video.webm"));
    }

    #[test]
    fn unknown_severity_renders_with_fallback_gray() {
        let mut payload = sample_payload();
        payload.violations[0].severity = Severity::Unknown;
        let data = ScanPageData {
            test_title: "t".to_string(),
            payload,
        };
        let html = HtmlRenderer
            .render(Template::ScanPage, &serde_json::to_value(&data).unwrap())
            .unwrap();
        assert!(html.contains(crate::severity::FALLBACK_COLOR));
    }

    #[test]
    fn zero_violation_scan_renders_success_message() {
        let mut payload = sample_payload();
        payload.violations.clear();
        payload.issue_tracker_ref = None;
        let data = ScanPageData {
            test_title: "t".to_string(),
            payload,
        };
        let html = HtmlRenderer
            .render(Template::ScanPage, &serde_json::to_value(&data).unwrap())
            .unwrap();
        assert!(html.contains("No accessibility violations found"));
    }

    #[test]
    fn malformed_template_data_is_fatal() {
        let err = HtmlRenderer
            .render(Template::Summary, &serde_json::json!({"totals": "nope"}))
            .unwrap_err();
        assert!(err.to_string().contains("summary template"));
    }

    #[test]
    fn summary_sorts_rules_by_severity_then_count() {
        let mut summary = RunSummary::default();
        let mk = |rule: &str, severity: Severity, count: usize| ViolationRecord {
            rule_id: rule.to_string(),
            severity,
            description: String::new(),
            help_text: String::new(),
            help_url: String::new(),
            guideline_tag: String::new(),
            targets: Vec::new(),
            total_count: count,
        };
        summary.fold_rules(
            &[
                mk("minor-many", Severity::Minor, 9),
                mk("critical-few", Severity::Critical, 1),
                mk("serious-some", Severity::Serious, 4),
            ],
            "chromium",
        );
        summary.run_status = "failed".to_string();
        let html = HtmlRenderer
            .render(Template::Summary, &serde_json::to_value(&summary).unwrap())
            .unwrap();
        let critical = html.find("critical-few").unwrap();
        let serious = html.find("serious-some").unwrap();
        let minor = html.find("minor-many").unwrap();
        assert!(critical < serious && serious < minor);
    }

    #[test]
    fn ansi_sequences_become_styled_spans() {
        assert_eq!(
            ansi_to_html("\u{1b}[31mexpected\u{1b}[0m <nav> to be visible"),
            "<span style=\"color:#c0392b\">expected</span> &lt;nav&gt; to be visible"
        );
        // bold + color stack and close together on reset
        assert_eq!(
            ansi_to_html("\u{1b}[1;32mok\u{1b}[0m"),
            "<span style=\"font-weight:bold\"><span style=\"color:#27ae60\">ok</span></span>"
        );
        // unterminated styling is closed at the end of the text
        assert_eq!(
            ansi_to_html("\u{1b}[33mwarn"),
            "<span style=\"color:#f39c12\">warn</span>"
        );
        assert_eq!(ansi_to_html("plain"), "plain");
    }

    #[test]
    fn test_page_embeds_converted_errors_and_evidence() {
        let test = TestOutcomeRecord {
            sequence_number: 3,
            title: "menu is accessible".to_string(),
            status: TestStatus::Failed,
            is_flaky: false,
            group_key: "specs/menu.spec.ts".to_string(),
            browser_key: "firefox".to_string(),
            duration_ms: 2_100,
            video_ref: "video.webm".to_string(),
            screenshot_refs: vec!["failure.png".to_string()],
            attachment_refs: Vec::new(),
            steps: vec!["Open menu".to_string()],
            preconditions: vec!["Signed in".to_string()],
            postconditions: Vec::new(),
            errors: vec!["\u{1b}[31mexpected\u{1b}[0m <nav> to be visible".to_string()],
            execution_ref: "3-menu-is-accessible/execution-menu-is-accessible.html".to_string(),
            a11y_report_ref: "3-menu-is-accessible/example-com-menu.html".to_string(),
            a11y_error_count: 5,
        };
        let html = HtmlRenderer
            .render(
                Template::TestDetail,
                &serde_json::to_value(&TestPageData { test }).unwrap(),
            )
            .unwrap();
        assert!(html.contains("menu is accessible"));
        // ANSI coloring becomes a styled span; the escape bytes themselves never reach the page
        assert!(html.contains("<span style=\"color:#c0392b\">expected</span> &lt;nav&gt; to be visible"));
        assert!(!html.contains('\u{1b}'));
        // a11y link is local to the test folder
        assert!(html.contains("href=\"example-com-menu.html\""));
        assert!(html.contains("5 violations found"));
    }

    #[test]
    fn template_names_are_kebab_case() {
        assert_eq!(Template::Summary.to_string(), "summary");
        assert_eq!(Template::TestDetail.to_string(), "test-detail");
        assert_eq!(Template::ScanPage.to_string(), "scan-page");
    }
}
