//! Tests for the `curbcut schema` command

use super::*;

#[test]
fn schema_writes_to_stdout() {
    curbcut_success!("schema")
        .stdout(contains("ScanPayload"))
        .stdout(contains("pageKey"))
        .stdout(contains("severityColorMap"));
}

#[test]
fn schema_writes_to_file() {
    let env = RenderEnv::new();
    let schema = env.root.child("scan-payload.schema.json");
    curbcut_success!("schema", "-o", schema.path()).stdout(is_empty());
    schema.assert(contains("pageKey"));
}
