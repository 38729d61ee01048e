//! The report/session aggregator: consumes one event per finished test, merges every
//! accessibility payload attached to it, accumulates the run-level summary, and drives
//! rendering of the per-scan, per-test, and run-level pages.
//!
//! Each test-end event spawns an independently-suspending task; the run-end call is the one
//! mandatory synchronization barrier and awaits every in-flight task before finalizing.

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assets;
use crate::payload::{IssueTrackerRef, ScanPayload, ViolationRecord, SCAN_ATTACHMENT_NAME};
use crate::render::{HtmlRenderer, RenderEngine, ScanPageData, Template, TestPageData};
use crate::severity::{Severity, SeverityPalette};
use crate::util::{relative_group_key, sanitize_page_key, sanitize_slug};

/// Default name of the report output folder.
pub const DEFAULT_OUTPUT_DIR: &str = "accessibility-report";

/// Step categories that carry structural metadata rather than functional steps.
/// Steps in these categories are excluded from the functional step list so they do not
/// duplicate the condition lists and payload plumbing.
const RESERVED_STEP_CATEGORIES: [&str; 4] =
    ["precondition", "postcondition", "description", SCAN_ATTACHMENT_NAME];

/// Environment variables consulted for issue-tracker linking when the reporter
/// configuration does not supply organization/project identifiers.
pub const ENV_TRACKER_ORGANIZATION: &str = "CURBCUT_ADO_ORGANIZATION";
pub const ENV_TRACKER_PROJECT: &str = "CURBCUT_ADO_PROJECT";

// -------------------------------------------------------------------------------------------------
// TestStatus
// -------------------------------------------------------------------------------------------------
/// Final status of one finished test, as reported by the driver.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    TimedOut,
    Interrupted,
}

// -------------------------------------------------------------------------------------------------
// Driver-facing descriptors
// -------------------------------------------------------------------------------------------------
/// What the driver tells us about the test itself.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestDescriptor {
    pub title: String,

    /// Path of the source file declaring the test; relativized against the run root to form
    /// the group key.
    pub file_path: PathBuf,

    /// Execution environment identifier, e.g. a browser project name.
    #[serde(default)]
    pub browser: String,
}

/// One node of the driver's structured step trace (hierarchical, arbitrarily nested).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriverStep {
    pub title: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub steps: Vec<DriverStep>,
}

/// One attachment carried on the driver's generic attachment channel.
/// Either `path` (a file on disk) or `body` (inline content) is populated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,

    #[serde(default)]
    pub content_type: String,

    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub body: Option<String>,
}

/// What the driver tells us about the test's final result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultDescriptor {
    pub status: TestStatus,

    #[serde(default)]
    pub duration_ms: u64,

    /// Zero-based attempt index; anything above zero means the test was retried.
    #[serde(default)]
    pub retry: u32,

    /// Raw error texts, possibly containing ANSI escapes.
    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub steps: Vec<DriverStep>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A test retried at least once that ultimately passed.
pub fn is_flaky(status: TestStatus, retry: u32) -> bool {
    retry > 0 && status == TestStatus::Passed
}

// -------------------------------------------------------------------------------------------------
// TestOutcomeRecord
// -------------------------------------------------------------------------------------------------
/// One fully-assembled record per finished test. Immutable after render; never merged with
/// other tests.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcomeRecord {
    /// 1-based, assigned in completion order of the driver's events.
    pub sequence_number: u64,

    pub title: String,
    pub status: TestStatus,
    pub is_flaky: bool,

    /// Source-file-relative path; buckets tests in the summary.
    pub group_key: String,

    pub browser_key: String,
    pub duration_ms: u64,

    /// Relocated evidence references; empty string means no asset.
    pub video_ref: String,
    pub screenshot_refs: Vec<String>,
    pub attachment_refs: Vec<String>,

    pub steps: Vec<String>,
    pub preconditions: Vec<String>,
    pub postconditions: Vec<String>,

    /// Raw error texts as reported by the driver; ANSI escapes are converted to styled
    /// markup at render time.
    pub errors: Vec<String>,

    /// Output-relative path of this test's execution-detail page.
    pub execution_ref: String,

    /// Output-relative path of the last processed payload's rendered report, if any.
    pub a11y_report_ref: String,

    /// Sum of violation counts across every payload attached to this test.
    pub a11y_error_count: usize,
}

// -------------------------------------------------------------------------------------------------
// RunSummary
// -------------------------------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunTotals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub flaky: usize,
    pub total: usize,
}

impl RunTotals {
    fn apply(&mut self, status: TestStatus, flaky: bool) {
        self.total += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Failed | TestStatus::TimedOut | TestStatus::Interrupted => {
                self.failed += 1
            }
        }
        if flaky {
            self.flaky += 1;
        }
    }
}

/// Accumulated per-rule violation statistics across every scan in a scope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    /// Accumulates `total_count` across every scan: a rule violated on 3 pages with 2 targets
    /// each contributes 6, never deduplicated.
    pub count: usize,
    pub severity: Severity,
    pub help_url: String,
    pub description: String,
}

/// Tests bucketed under one group key, in completion order of their processing tasks.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestGroup {
    pub key: String,
    pub tests: Vec<TestOutcomeRecord>,
}

/// Per-browser slice of the run summary, created lazily on first sighting of the browser.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSummary {
    pub key: String,
    pub totals: RunTotals,
    pub rule_aggregate: HashMap<String, RuleStats>,
}

/// Process-scoped accumulation for the whole execution: initialized empty at run start,
/// mutated exactly once per test completion, finalized and rendered at run end.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub totals: RunTotals,

    /// Append-only; group insertion order is task completion order, which may differ from
    /// `sequence_number` order under concurrent interleaving.
    pub groups: Vec<TestGroup>,

    pub rule_aggregate: HashMap<String, RuleStats>,

    pub per_browser: Vec<BrowserSummary>,

    /// Stamped at finalization.
    #[serde(default)]
    pub run_status: String,

    #[serde(default)]
    pub duration_ms: u64,
}

impl RunSummary {
    fn browser_mut(&mut self, key: &str) -> &mut BrowserSummary {
        if let Some(i) = self.per_browser.iter().position(|b| b.key == key) {
            return &mut self.per_browser[i];
        }
        self.per_browser.push(BrowserSummary {
            key: key.to_string(),
            totals: RunTotals::default(),
            rule_aggregate: HashMap::new(),
        });
        self.per_browser.last_mut().expect("browser summary was just pushed")
    }

    /// Fold one payload's violations into both the run-scoped and the browser-scoped rule
    /// aggregate. Always additive, never overwritten.
    pub fn fold_rules(&mut self, violations: &[ViolationRecord], browser_key: &str) {
        for violation in violations {
            fold_rule(&mut self.rule_aggregate, violation);
        }
        let browser = self.browser_mut(browser_key);
        for violation in violations {
            fold_rule(&mut browser.rule_aggregate, violation);
        }
    }

    /// Record one finished test: pass/fail/skip/flaky counters in both scopes, and append to
    /// its group bucket.
    pub fn record_outcome(&mut self, record: TestOutcomeRecord) {
        self.totals.apply(record.status, record.is_flaky);
        self.browser_mut(&record.browser_key)
            .totals
            .apply(record.status, record.is_flaky);

        match self.groups.iter_mut().find(|g| g.key == record.group_key) {
            Some(group) => group.tests.push(record),
            None => self.groups.push(TestGroup {
                key: record.group_key.clone(),
                tests: vec![record],
            }),
        }
    }
}

fn fold_rule(aggregate: &mut HashMap<String, RuleStats>, violation: &ViolationRecord) {
    let stats = aggregate
        .entry(violation.rule_id.clone())
        .or_insert_with(|| RuleStats {
            count: 0,
            severity: violation.severity,
            help_url: violation.help_url.clone(),
            description: violation.description.clone(),
        });
    stats.count += violation.total_count;
}

// -------------------------------------------------------------------------------------------------
// ReporterConfig
// -------------------------------------------------------------------------------------------------
/// Reporter configuration supplied by the embedding test harness.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub output_dir: PathBuf,

    /// Optional severity palette overrides; configuration always wins over producer-supplied
    /// palette values.
    pub colors: Option<SeverityPalette>,

    /// Issue-tracker identifiers for deep-linking. When absent, the
    /// `CURBCUT_ADO_ORGANIZATION`/`CURBCUT_ADO_PROJECT` environment variables are consulted.
    pub issue_tracker: Option<IssueTrackerRef>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        ReporterConfig {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            colors: None,
            issue_tracker: None,
        }
    }
}

fn issue_tracker_from_env() -> Option<IssueTrackerRef> {
    let organization = std::env::var(ENV_TRACKER_ORGANIZATION).ok()?;
    let project = std::env::var(ENV_TRACKER_PROJECT).ok()?;
    Some(IssueTrackerRef {
        organization,
        project,
    })
}

// -------------------------------------------------------------------------------------------------
// Reporter
// -------------------------------------------------------------------------------------------------
struct RunState {
    summary: RunSummary,
    next_sequence: u64,
}

/// Everything one per-test task needs, cloned out of the reporter at spawn time.
#[derive(Clone)]
struct TaskContext {
    config: Arc<ReporterConfig>,
    engine: Arc<dyn RenderEngine>,
    state: Arc<Mutex<RunState>>,
    root_dir: PathBuf,
    sequence: u64,
}

/// The session aggregator.
///
/// Lifecycle calls arrive in order: [`Reporter::on_run_begin`], zero or more
/// [`Reporter::on_test_end`] (each of which spawns an independently-suspending processing
/// task; the caller must be inside a tokio runtime), then [`Reporter::on_run_end`], which
/// awaits every in-flight task before finalizing and rendering the run summary.
pub struct Reporter {
    config: Arc<ReporterConfig>,
    engine: Arc<dyn RenderEngine>,
    state: Arc<Mutex<RunState>>,
    tasks: Vec<JoinHandle<Result<()>>>,
    root_dir: PathBuf,
}

impl Reporter {
    pub fn new(config: ReporterConfig) -> Self {
        Self::with_engine(config, Arc::new(HtmlRenderer))
    }

    /// Create a reporter with a custom render engine.
    pub fn with_engine(mut config: ReporterConfig, engine: Arc<dyn RenderEngine>) -> Self {
        if config.issue_tracker.is_none() {
            config.issue_tracker = issue_tracker_from_env();
        }
        Reporter {
            config: Arc::new(config),
            engine,
            state: Arc::new(Mutex::new(RunState {
                summary: RunSummary::default(),
                next_sequence: 0,
            })),
            tasks: Vec::new(),
            root_dir: PathBuf::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        // The summary is only ever touched synchronously between suspension points;
        // poisoning would mean a panic inside such a critical section.
        self.state.lock().expect("run summary lock poisoned")
    }

    /// Record the run root used for group-key relativization.
    pub fn on_run_begin(&mut self, root_dir: &Path) {
        self.root_dir = root_dir.to_path_buf();
        debug!("run started; root directory {}", root_dir.display());
    }

    /// Accept one finished test and schedule its processing.
    ///
    /// The sequence number is assigned synchronously here, so it reflects the completion
    /// order of the driver's events; the processing task itself runs concurrently with other
    /// tests' tasks and is joined at run end.
    pub fn on_test_end(&mut self, test: TestDescriptor, result: ResultDescriptor) {
        let sequence = {
            let mut state = self.state();
            state.next_sequence += 1;
            state.next_sequence
        };
        let ctx = TaskContext {
            config: self.config.clone(),
            engine: self.engine.clone(),
            state: self.state.clone(),
            root_dir: self.root_dir.clone(),
            sequence,
        };
        self.tasks.push(tokio::spawn(process_test(ctx, test, result)));
    }

    /// The mandatory synchronization barrier: await every in-flight per-test task, finalize
    /// the summary, and render it. Render failures propagate.
    pub async fn on_run_end(&mut self, status: &str, duration_ms: u64) -> Result<()> {
        for task in self.tasks.drain(..) {
            task.await.context("per-test processing task panicked")??;
        }

        let data = {
            let mut state = self.state();
            state.summary.run_status = status.to_string();
            state.summary.duration_ms = duration_ms;
            serde_json::to_value(&state.summary).context("Failed to assemble summary data")?
        };
        let html = self
            .engine
            .render(Template::Summary, &data)
            .context("Failed to render run summary")?;

        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir).await.with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;
        let summary_path = output_dir.join("summary.html");
        tokio::fs::write(&summary_path, html)
            .await
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;

        let totals = self.state().summary.totals;
        info!(
            "run finished ({status}): {} tests, {} passed, {} failed, {} skipped, {} flaky",
            totals.total, totals.passed, totals.failed, totals.skipped, totals.flaky
        );
        Ok(())
    }

    /// A snapshot of the accumulated summary.
    pub fn summary(&self) -> RunSummary {
        self.state().summary.clone()
    }
}

// -------------------------------------------------------------------------------------------------
// per-test processing
// -------------------------------------------------------------------------------------------------
async fn process_test(
    ctx: TaskContext,
    test: TestDescriptor,
    result: ResultDescriptor,
) -> Result<()> {
    let title_slug = {
        let slug = sanitize_slug(&test.title);
        if slug.is_empty() {
            "test".to_string()
        } else {
            slug
        }
    };
    let dir_name = format!("{}-{}", ctx.sequence, title_slug);
    let test_dir = ctx.config.output_dir.join(&dir_name);

    let group_key = relative_group_key(&ctx.root_dir, &test.file_path);
    let browser_key = if test.browser.is_empty() {
        "unknown".to_string()
    } else {
        test.browser.clone()
    };

    let preconditions = collect_condition_steps(&result.steps, "precondition");
    let postconditions = collect_condition_steps(&result.steps, "postcondition");
    let functional_steps: Vec<String> = result
        .steps
        .iter()
        .filter(|s| !RESERVED_STEP_CATEGORIES.contains(&s.category.as_str()))
        .map(|s| s.title.clone())
        .collect();
    let mut flat_driver_steps = Vec::new();
    flatten_steps(&result.steps, &mut flat_driver_steps);

    // partition attachments: payloads, video candidates, screenshots, the rest
    let mut payload_attachments = Vec::new();
    let mut video_candidates = Vec::new();
    let mut screenshot_attachments = Vec::new();
    let mut other_attachments = Vec::new();
    for attachment in &result.attachments {
        if attachment.name == SCAN_ATTACHMENT_NAME {
            payload_attachments.push(attachment);
        } else if attachment.content_type.starts_with("video/") {
            if let Some(path) = &attachment.path {
                video_candidates.push(path.clone());
            }
        } else if attachment.content_type.starts_with("image/") {
            screenshot_attachments.push(attachment);
        } else {
            other_attachments.push(attachment);
        }
    }

    // asset trouble degrades evidence, never the test record or the run
    let video_ref = match assets::relocate_video(&video_candidates, &test_dir).await {
        Ok(name) => name,
        Err(e) => {
            warn!("failed to relocate video for {:?}: {e:#}; continuing without video", test.title);
            String::new()
        }
    };

    let mut screenshot_refs = Vec::new();
    for attachment in &screenshot_attachments {
        match relocate_attachment(attachment, &test_dir).await {
            Ok(name) if !name.is_empty() => screenshot_refs.push(name),
            Ok(_) => {}
            Err(e) => warn!("failed to relocate {:?} on {:?}: {e:#}; skipping", attachment.name, test.title),
        }
    }
    let mut attachment_refs = Vec::new();
    for attachment in &other_attachments {
        match relocate_attachment(attachment, &test_dir).await {
            Ok(name) if !name.is_empty() => attachment_refs.push(name),
            Ok(_) => {}
            Err(e) => warn!("failed to relocate {:?} on {:?}: {e:#}; skipping", attachment.name, test.title),
        }
    }

    // every payload attached to this test, in arrival order
    let multiple_payloads = payload_attachments.len() > 1;
    let mut a11y_report_ref = String::new();
    let mut a11y_error_count = 0usize;
    for (index, attachment) in payload_attachments.iter().enumerate() {
        let bytes = match read_attachment_bytes(attachment).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("payload attachment on {:?} has neither body nor path; skipping", test.title);
                continue;
            }
            Err(e) => {
                warn!("failed to read payload attachment on {:?}: {e:#}; skipping", test.title);
                continue;
            }
        };
        // one bad payload must never drop the rest of the test's data
        let mut payload = match ScanPayload::from_json_bytes(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("skipping malformed scan payload on {:?}: {e:#}", test.title);
                continue;
            }
        };

        merge_driver_steps(&mut payload, &flat_driver_steps);

        let mut stem = sanitize_page_key(&payload.page_key);
        if stem.is_empty() {
            stem = format!("accessibility-{title_slug}");
        }
        if multiple_payloads {
            stem = format!("{stem}-{}", index + 1);
        }
        let file_name = format!("{stem}.html");

        // configuration always wins over producer-supplied values
        if let Some(colors) = &ctx.config.colors {
            payload.severity_color_map = colors.clone();
        } else {
            payload.severity_color_map = SeverityPalette::default();
        }
        if let Some(tracker) = &ctx.config.issue_tracker {
            payload.issue_tracker_ref = Some(tracker.clone());
        }
        if !video_ref.is_empty() {
            payload.evidence_video_ref = video_ref.clone();
        }

        a11y_error_count += payload.total_violation_count();

        let data = serde_json::to_value(ScanPageData {
            test_title: test.title.clone(),
            payload: payload.clone(),
        })
        .context("Failed to assemble scan page data")?;
        let html = ctx
            .engine
            .render(Template::ScanPage, &data)
            .with_context(|| format!("Failed to render scan report {file_name}"))?;
        tokio::fs::create_dir_all(&test_dir)
            .await
            .with_context(|| format!("Failed to create {}", test_dir.display()))?;
        let path = test_dir.join(&file_name);
        tokio::fs::write(&path, html)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // single synchronous critical section, no suspension point inside
        {
            let mut state = ctx.state.lock().expect("run summary lock poisoned");
            state.summary.fold_rules(&payload.violations, &browser_key);
        }

        // only the final scan's report is linked from the test's summary row;
        // earlier scans remain reachable via their own files
        a11y_report_ref = format!("{dir_name}/{file_name}");
    }

    let record = TestOutcomeRecord {
        sequence_number: ctx.sequence,
        title: test.title.clone(),
        status: result.status,
        is_flaky: is_flaky(result.status, result.retry),
        group_key,
        browser_key,
        duration_ms: result.duration_ms,
        video_ref,
        screenshot_refs,
        attachment_refs,
        steps: functional_steps,
        preconditions,
        postconditions,
        errors: result.errors.clone(),
        execution_ref: format!("{dir_name}/execution-{title_slug}.html"),
        a11y_report_ref,
        a11y_error_count,
    };

    let data = serde_json::to_value(TestPageData {
        test: record.clone(),
    })
    .context("Failed to assemble test page data")?;
    let html = ctx
        .engine
        .render(Template::TestDetail, &data)
        .with_context(|| format!("Failed to render execution page for {:?}", test.title))?;
    tokio::fs::create_dir_all(&test_dir)
        .await
        .with_context(|| format!("Failed to create {}", test_dir.display()))?;
    let execution_path = ctx.config.output_dir.join(&record.execution_ref);
    tokio::fs::write(&execution_path, html)
        .await
        .with_context(|| format!("Failed to write {}", execution_path.display()))?;

    {
        let mut state = ctx.state.lock().expect("run summary lock poisoned");
        state.summary.record_outcome(record);
    }

    Ok(())
}

async fn relocate_attachment(attachment: &Attachment, test_dir: &Path) -> Result<String> {
    if let Some(path) = &attachment.path {
        assets::relocate_file(path, test_dir, None).await
    } else if let Some(body) = &attachment.body {
        assets::relocate_bytes(body.as_bytes(), test_dir, &attachment.name).await
    } else {
        Ok(String::new())
    }
}

async fn read_attachment_bytes(attachment: &Attachment) -> Result<Option<Vec<u8>>> {
    if let Some(body) = &attachment.body {
        return Ok(Some(body.clone().into_bytes()));
    }
    if let Some(path) = &attachment.path {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        return Ok(Some(bytes));
    }
    Ok(None)
}

fn collect_condition_steps(steps: &[DriverStep], category: &str) -> Vec<String> {
    steps
        .iter()
        .filter(|s| s.category == category)
        .map(|s| s.title.clone())
        .collect()
}

/// Depth-first flattening of the driver's step trace, order preserved, reserved structural
/// categories excluded.
fn flatten_steps(steps: &[DriverStep], out: &mut Vec<String>) {
    for step in steps {
        if !RESERVED_STEP_CATEGORIES.contains(&step.category.as_str()) {
            out.push(step.title.clone());
        }
        flatten_steps(&step.steps, out);
    }
}

/// Append every driver step not already present verbatim to each target's step list.
/// Exact string equality, no fuzzy matching; driver steps go after pre-existing ones.
fn merge_driver_steps(payload: &mut ScanPayload, driver_steps: &[String]) {
    for violation in &mut payload.violations {
        for target in &mut violation.targets {
            for step in driver_steps {
                if !target.context_steps.iter().any(|existing| existing == step) {
                    target.context_steps.push(step.clone());
                }
            }
        }
    }
}
