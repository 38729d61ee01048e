use anyhow::{Context, Result};
use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use tracing::info;

use curbcut::ScanPayload;

use crate::args::{GlobalArgs, SchemaArgs};

pub fn run(_global_args: &GlobalArgs, args: &SchemaArgs) -> Result<()> {
    let schema = schemars::schema_for!(ScanPayload);

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(stdout())),
    };
    writeln!(writer, "{}", serde_json::to_string_pretty(&schema)?)?;
    if let Some(output) = &args.output {
        info!("Wrote JSON schema to {}", output.display());
    }
    Ok(())
}
