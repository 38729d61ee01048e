//! Tests for the `curbcut render` command

use super::*;

use pretty_assertions::assert_eq;

fn payload_attachment(body: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "curbcut-a11y-scan",
        "contentType": "application/json",
        "body": body,
    })
}

#[test]
fn render_full_run() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        test_end_event(
            "Checkout flow",
            "checkout.spec.ts",
            "passed",
            serde_json::json!([payload_attachment(&scan_payload("https://example.com/home", 3))]),
        ),
        test_end_event("Search box", "search.spec.ts", "failed", serde_json::json!([])),
        run_end_event("failed", 9000),
    ]);

    curbcut_success!("render", events.path(), "--output", env.outpath())
        .stdout(contains("Rendered 2 tests"))
        .stdout(contains("color-contrast"))
        .stdout(contains("serious"));

    env.output.child("summary.html").assert(predicates::path::is_file());
    env.output
        .child("1-checkout-flow/execution-checkout-flow.html")
        .assert(predicates::path::is_file());
    env.output
        .child("1-checkout-flow/example-com-home.html")
        .assert(predicates::path::is_file());
    env.output
        .child("2-search-box/execution-search-box.html")
        .assert(predicates::path::is_file());
}

#[test]
fn render_quiet_suppresses_summary() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        run_end_event("passed", 100),
    ]);

    curbcut_success!("render", events.path(), "--output", env.outpath(), "--quiet")
        .stdout(is_empty());

    env.output.child("summary.html").assert(predicates::path::is_file());
}

#[test]
fn render_suffixes_repeated_page_keys() {
    let env = RenderEnv::new();
    let payload = scan_payload("https://example.com/home", 1);
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        test_end_event(
            "Repeated scans",
            "repeat.spec.ts",
            "passed",
            serde_json::json!([
                payload_attachment(&payload),
                payload_attachment(&payload),
            ]),
        ),
        run_end_event("passed", 100),
    ]);

    curbcut_success!("render", events.path(), "--output", env.outpath(), "--quiet");

    env.output
        .child("1-repeated-scans/example-com-home-1.html")
        .assert(predicates::path::is_file());
    env.output
        .child("1-repeated-scans/example-com-home-2.html")
        .assert(predicates::path::is_file());
}

#[test]
fn render_survives_malformed_payload() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        test_end_event(
            "Broken scan",
            "broken.spec.ts",
            "passed",
            serde_json::json!([payload_attachment("this is not json")]),
        ),
        run_end_event("passed", 100),
    ]);

    // a bad payload is logged and skipped; the run still renders
    curbcut_success!("render", events.path(), "--output", env.outpath())
        .stdout(contains("Rendered 1 tests"));

    env.output
        .child("1-broken-scan/execution-broken-scan.html")
        .assert(predicates::path::is_file());
}

#[test]
fn render_missing_events_file_fails() {
    let env = RenderEnv::new();
    curbcut_failure!("render", env.root.child("absent.jsonl").path())
        .stderr(contains("Failed to open events file"));
}

#[test]
fn render_requires_run_end_record() {
    let env = RenderEnv::new();
    let events = env.events_file(&[run_begin_event(env.root.path())]);
    curbcut_failure!("render", events.path(), "--output", env.outpath())
        .stderr(contains("no runEnd record"));
}

#[test]
fn render_rejects_malformed_event_with_line_number() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        "{\"event\": \"mystery\"}".to_string(),
        run_end_event("passed", 100),
    ]);
    curbcut_failure!("render", events.path(), "--output", env.outpath())
        .stderr(contains("line 2"));
}

#[test]
fn render_rejects_short_palette() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        run_end_event("passed", 100),
    ]);
    curbcut_failure!(
        "render",
        events.path(),
        "--output",
        env.outpath(),
        "--severity-colors",
        "#fff,#f80"
    )
    .stderr(contains("exactly 4"));
}

#[test]
fn render_rejects_unpaired_tracker_flags() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        run_end_event("passed", 100),
    ]);
    curbcut_failure!(
        "render",
        events.path(),
        "--output",
        env.outpath(),
        "--ado-organization",
        "contoso"
    )
    .stderr(contains("must be given together"));
}

#[test]
fn render_scan_page_links_issue_tracker() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        test_end_event(
            "Tracked run",
            "tracked.spec.ts",
            "passed",
            serde_json::json!([payload_attachment(&scan_payload("https://example.com/home", 1))]),
        ),
        run_end_event("passed", 100),
    ]);

    curbcut_success!(
        "render",
        events.path(),
        "--output",
        env.outpath(),
        "--quiet",
        "--ado-organization",
        "contoso",
        "--ado-project",
        "storefront"
    );

    let page = env.output.child("1-tracked-run/example-com-home.html");
    page.assert(predicates::path::is_file());
    let html = std::fs::read_to_string(page.path()).expect("scan page should be readable");
    assert!(html.contains("https://dev.azure.com/contoso/storefront/_workitems/create/Bug"));
}

#[test]
fn render_totals_reflect_statuses() {
    let env = RenderEnv::new();
    let events = env.events_file(&[
        run_begin_event(env.root.path()),
        test_end_event("one", "a.spec.ts", "passed", serde_json::json!([])),
        test_end_event("two", "a.spec.ts", "timedOut", serde_json::json!([])),
        test_end_event("three", "b.spec.ts", "skipped", serde_json::json!([])),
        run_end_event("failed", 5000),
    ]);

    let assert = curbcut_success!("render", events.path(), "--output", env.outpath())
        .stdout(contains("Rendered 3 tests"))
        .stdout(contains("1 passed, 1 failed, 1 skipped"));
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert_eq!(stdout.contains("color-contrast"), false);
}
