use anyhow::{bail, Context, Result};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{debug, info};

use curbcut::session::{Reporter, ReporterConfig, ResultDescriptor, RunSummary, TestDescriptor};
use curbcut::util::format_duration;
use curbcut::{IssueTrackerRef, SeverityPalette};

use crate::args::{GlobalArgs, RenderArgs};

/// One record of the run-event stream, in driver emission order.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum RunEvent {
    #[serde(rename_all = "camelCase")]
    RunBegin {
        #[serde(default)]
        root_dir: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    TestEnd {
        test: TestDescriptor,
        result: ResultDescriptor,
    },
    #[serde(rename_all = "camelCase")]
    RunEnd {
        #[serde(default)]
        status: String,
        #[serde(default)]
        duration_ms: u64,
    },
}

pub fn run(global_args: &GlobalArgs, args: &RenderArgs) -> Result<()> {
    let config = ReporterConfig {
        output_dir: args.output.clone(),
        colors: args
            .severity_colors
            .as_deref()
            .map(parse_palette)
            .transpose()?,
        issue_tracker: match (&args.ado_organization, &args.ado_project) {
            (Some(organization), Some(project)) => Some(IssueTrackerRef {
                organization: organization.clone(),
                project: project.clone(),
            }),
            (None, None) => None,
            _ => bail!("--ado-organization and --ado-project must be given together"),
        },
    };

    let file = std::fs::File::open(&args.events)
        .with_context(|| format!("Failed to open events file {}", args.events.display()))?;
    let reader = std::io::BufReader::new(file);

    let progress_enabled = global_args.use_progress();
    let progress = if progress_enabled {
        let style = ProgressStyle::with_template("{spinner} {msg} {human_pos} tests")
            .expect("progress bar style template should compile");
        ProgressBar::new_spinner().with_style(style).with_message("Rendering")
    } else {
        ProgressBar::hidden()
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to initialize async runtime")?;

    let mut reporter = Reporter::new(config);
    let summary = runtime.block_on(async {
        let mut run_ended = false;
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.context("Failed to read events file")?;
            if line.trim().is_empty() {
                continue;
            }
            let event: RunEvent = serde_json::from_str(&line).with_context(|| {
                format!("Failed to parse run event on line {}", line_num + 1)
            })?;
            match event {
                RunEvent::RunBegin { root_dir } => {
                    debug!("run begins; root {}", root_dir.display());
                    reporter.on_run_begin(&root_dir);
                }
                RunEvent::TestEnd { test, result } => {
                    progress.inc(1);
                    reporter.on_test_end(test, result);
                }
                RunEvent::RunEnd {
                    status,
                    duration_ms,
                } => {
                    reporter.on_run_end(&status, duration_ms).await?;
                    run_ended = true;
                }
            }
        }
        if !run_ended {
            bail!("events file {} has no runEnd record", args.events.display());
        }
        Ok::<_, anyhow::Error>(reporter.summary())
    })?;
    progress.finish_and_clear();

    if !global_args.quiet {
        print_summary(&summary, &args.output);
    }
    info!("wrote report to {}", args.output.display());
    Ok(())
}

fn parse_palette(arg: &str) -> Result<SeverityPalette> {
    let colors: Vec<&str> = arg.split(',').map(str::trim).collect();
    match colors.as_slice() {
        [minor, moderate, serious, critical] => Ok(SeverityPalette {
            minor: minor.to_string(),
            moderate: moderate.to_string(),
            serious: serious.to_string(),
            critical: critical.to_string(),
        }),
        _ => bail!(
            "--severity-colors expects exactly 4 comma-separated colors, got {}",
            colors.len()
        ),
    }
}

fn print_summary(summary: &RunSummary, output: &std::path::Path) {
    use prettytable::format::{FormatBuilder, LinePosition, LineSeparator};
    use prettytable::row;

    let totals = &summary.totals;
    println!(
        "Rendered {} tests in {}: {} passed, {} failed, {} skipped, {} flaky",
        HumanCount(totals.total as u64),
        format_duration(summary.duration_ms),
        totals.passed,
        totals.failed,
        totals.skipped,
        totals.flaky,
    );

    if !summary.rule_aggregate.is_empty() {
        let f = FormatBuilder::new()
            .column_separator(' ')
            .separators(&[LinePosition::Title], LineSeparator::new('─', '─', '─', '─'))
            .padding(1, 1)
            .build();

        let mut entries: Vec<_> = summary.rule_aggregate.iter().collect();
        entries.sort_by(|(a_id, a), (b_id, b)| {
            b.severity
                .cmp(&a.severity)
                .then(b.count.cmp(&a.count))
                .then(a_id.cmp(b_id))
        });

        let mut table: prettytable::Table = entries
            .iter()
            .map(|(rule_id, stats)| {
                row![
                    l -> rule_id,
                    l -> stats.severity,
                    r -> HumanCount(stats.count as u64),
                ]
            })
            .collect();
        table.set_format(f);
        table.set_titles(row![
            lb -> "Rule",
            cb -> "Severity",
            cb -> "Violations",
        ]);
        table.printstd();
    }

    println!("Summary: {}", output.join("summary.html").display());
}
