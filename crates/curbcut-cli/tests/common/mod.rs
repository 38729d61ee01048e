//! Integration Test Utilities and Common Code

#![allow(dead_code)]

use indoc::indoc;

pub use assert_cmd::prelude::*;
pub use assert_fs::prelude::*;
pub use assert_fs::{fixture::ChildPath, TempDir};
pub use predicates::str::{contains, is_empty, RegexPredicate};
pub use std::path::Path;
pub use std::process::Command;

/// Build a `Command` for the `curbcut` binary with variadic command-line arguments.
///
/// The arguments can be anything that is allowed by `Command::arg`.
#[macro_export]
macro_rules! curbcut {
    ( $( $arg:expr ),* ) => {
        {
            let mut cmd = curbcut_cmd();
            $(
                cmd.arg($arg);
            )*
            cmd
        }
    }
}

/// Build an `assert_cmd::assert::Assert` by calling `curbcut!(args).assert().success()`.
#[macro_export]
macro_rules! curbcut_success {
    ( $( $arg:expr ),* ) => { curbcut!($( $arg ),*).assert().success() }
}

/// Build an `assert_cmd::assert::Assert` by calling `curbcut!(args).assert().failure()`.
#[macro_export]
macro_rules! curbcut_failure {
    ( $( $arg:expr ),* ) => { curbcut!($( $arg ),*).assert().failure() }
}

/// Get the command for the `curbcut` binary under test.
pub fn curbcut_cmd() -> Command {
    let mut cmd = Command::cargo_bin("curbcut").expect("curbcut should be executable");
    // Keep issue-tracker settings from the host environment out of the tests
    cmd.env_remove("CURBCUT_ADO_ORGANIZATION");
    cmd.env_remove("CURBCUT_ADO_PROJECT");
    cmd
}

/// Create a `RegexPredicate` from the given pattern.
pub fn is_match(pat: &str) -> RegexPredicate {
    predicates::str::is_match(pat).expect("pattern should compile")
}

/// A mock rendering environment: a temp directory holding a run-event stream and a place for
/// the report tree to land.
pub struct RenderEnv {
    pub root: TempDir,
    pub output: ChildPath,
}

impl RenderEnv {
    pub fn new() -> Self {
        let root = TempDir::new().expect("should be able to create tempdir");
        assert!(root.is_dir());
        let output = root.child("report");
        assert!(!output.exists());
        Self { root, output }
    }

    /// Write a run-event JSONL file with the given lines and return its path.
    pub fn events_file(&self, lines: &[String]) -> ChildPath {
        let events = self.root.child("run.jsonl");
        events
            .write_str(&(lines.join("\n") + "\n"))
            .expect("should be able to write events file");
        events
    }

    /// Path of the report output directory.
    pub fn outpath(&self) -> &Path {
        self.output.path()
    }
}

/// A scan payload with one serious `color-contrast` violation carrying `total_count` targets'
/// worth of violations, scanned on the given page.
pub fn scan_payload(page_key: &str, total_count: usize) -> String {
    format!(
        indoc! {r##"
        {{
            "pageKey": "{page_key}",
            "violations": [
                {{
                    "ruleId": "color-contrast",
                    "severity": "serious",
                    "description": "Elements must have sufficient color contrast",
                    "helpText": "Ensure the contrast ratio is at least 4.5:1",
                    "helpUrl": "https://dequeuniversity.com/rules/axe/4.4/color-contrast",
                    "guidelineTag": "wcag2aa",
                    "targets": [
                        {{
                            "selector": "#cta",
                            "markupSnippet": "<button id=\"cta\">Go</button>",
                            "screenshotRef": "",
                            "contextSteps": []
                        }}
                    ],
                    "totalCount": {total_count}
                }}
            ]
        }}
        "##},
        page_key = page_key,
        total_count = total_count,
    )
}

/// A `runBegin` event record.
pub fn run_begin_event(root_dir: &Path) -> String {
    serde_json::json!({
        "event": "runBegin",
        "rootDir": root_dir,
    })
    .to_string()
}

/// A `testEnd` event record for a passed test with the given attachments.
pub fn test_end_event(
    title: &str,
    file_path: &str,
    status: &str,
    attachments: serde_json::Value,
) -> String {
    serde_json::json!({
        "event": "testEnd",
        "test": {
            "title": title,
            "filePath": file_path,
            "browser": "chromium",
        },
        "result": {
            "status": status,
            "durationMs": 742,
            "retry": 0,
            "errors": [],
            "steps": [],
            "attachments": attachments,
        },
    })
    .to_string()
}

/// A `runEnd` event record.
pub fn run_end_event(status: &str, duration_ms: u64) -> String {
    serde_json::json!({
        "event": "runEnd",
        "status": status,
        "durationMs": duration_ms,
    })
    .to_string()
}
