//! Curbcut turns accessibility scan results and test outcomes into browsable HTML reports.
//!
//! The crate is split along the seams of the pipeline:
//!
//! - [`analyzer`] — types for the opaque result set produced by the external rule engine
//! - [`scan`] — builds one normalized [`payload::ScanPayload`] per page scan, collecting
//!   per-element evidence through the [`scan::ElementProbe`] capability boundary
//! - [`assets`] — relocates evidence files (videos, screenshots, attachments) into the
//!   per-test output folder, with a bounded readiness poll for videos
//! - [`session`] — the reporter core: consumes one event per finished test, merges any
//!   number of attached scan payloads, accumulates the run-level summary, and drives
//!   rendering
//! - [`render`] — the render boundary: a named template plus JSON-able data in, HTML out

pub mod analyzer;
pub mod assets;
pub mod payload;
pub mod render;
pub mod scan;
pub mod session;
pub mod severity;
pub mod util;

pub use payload::{IssueTrackerRef, ScanPayload, TargetRecord, ViolationRecord, SCAN_ATTACHMENT_NAME};
pub use render::{HtmlRenderer, RenderEngine, Template};
pub use scan::{build_scan, ElementProbe, ScanOptions};
pub use session::{
    Attachment, Reporter, ReporterConfig, ResultDescriptor, RunSummary, TestDescriptor,
    TestOutcomeRecord, TestStatus, DEFAULT_OUTPUT_DIR,
};
pub use severity::{Severity, SeverityPalette};
