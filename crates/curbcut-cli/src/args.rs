use clap::{crate_description, ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use strum::Display;

use curbcut::session::{ENV_TRACKER_ORGANIZATION, ENV_TRACKER_PROJECT};
use curbcut::DEFAULT_OUTPUT_DIR;

// -----------------------------------------------------------------------------
// command-line args
// -----------------------------------------------------------------------------
#[derive(Parser, Debug)]
#[command(
    name("curbcut"),
    bin_name("curbcut"),

    author,   // retrieved from Cargo.toml `authors`
    version,  // retrieved from Cargo.toml `version`
    about,    // retrieved from Cargo.toml `description`

    long_about = concat!(
        crate_description!(),
    ),
)]
#[deny(missing_docs)]
/// Render accessibility test runs into browsable HTML reports
pub struct CommandLineArgs {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global_args: GlobalArgs,
}

impl CommandLineArgs {
    pub fn parse_args() -> Self {
        let mut args = Self::parse();

        // If `NO_COLOR` is set in the environment, disable colored output
        //
        // https://no-color.org/
        if std::env::var("NO_COLOR").is_ok() {
            args.global_args.color = Mode::Never
        }

        args
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a recorded run-event stream into an HTML report tree
    ///
    /// The input is a JSONL file of run events as emitted by a test driver integration: one
    /// `runBegin` record, zero or more `testEnd` records (each carrying the test descriptor,
    /// its result, and any attachments, including accessibility scan payloads), and one
    /// `runEnd` record.
    ///
    /// One HTML page is written per test, one per attached accessibility scan, and one
    /// run-level summary, along with relocated evidence files (videos, screenshots, other
    /// attachments).
    #[command(display_order = 1)]
    Render(RenderArgs),

    /// Print the JSON schema of the scan payload interchange format
    #[command(display_order = 2)]
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Global Options")]
pub struct GlobalArgs {
    /// Enable verbose output
    ///
    /// This can be repeated up to 3 times to enable successively more verbose output.
    #[arg(global = true, long, short, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error feedback messages
    #[arg(global = true, long, short)]
    pub quiet: bool,

    /// Enable or disable colored output
    ///
    /// When this is "auto", colors are enabled when stdout is a tty.
    #[arg(global = true, long, default_value_t = Mode::Auto, value_name = "MODE")]
    pub color: Mode,

    /// Enable or disable progress bars
    ///
    /// When this is "auto", progress bars are enabled when stderr is a tty.
    #[arg(global = true, long, default_value_t = Mode::Auto, value_name = "MODE")]
    pub progress: Mode,
}

impl GlobalArgs {
    pub fn use_color<T: IsTerminal>(&self, out: T) -> bool {
        match self.color {
            Mode::Never => false,
            Mode::Always => true,
            Mode::Auto => out.is_terminal(),
        }
    }

    pub fn use_progress(&self) -> bool {
        match self.progress {
            Mode::Never => false,
            Mode::Always => true,
            Mode::Auto => std::io::stderr().is_terminal(),
        }
    }
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Auto,
    Never,
    Always,
}

// -----------------------------------------------------------------------------
// `render` command
// -----------------------------------------------------------------------------
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path of the run-event JSONL file to render
    #[arg(value_name = "EVENTS")]
    pub events: PathBuf,

    /// Write the report tree to this directory
    #[arg(long, short, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Override the severity display palette
    ///
    /// Four comma-separated colors for minor, moderate, serious, and critical violations,
    /// e.g. `#ff0,#f80,#f40,#f00`.
    #[arg(long, value_name = "COLORS")]
    pub severity_colors: Option<String>,

    /// Issue tracker organization used for deep links in rendered reports
    #[arg(long, value_name = "NAME", env = ENV_TRACKER_ORGANIZATION)]
    pub ado_organization: Option<String>,

    /// Issue tracker project used for deep links in rendered reports
    #[arg(long, value_name = "NAME", env = ENV_TRACKER_PROJECT)]
    pub ado_project: Option<String>,
}

// -----------------------------------------------------------------------------
// `schema` command
// -----------------------------------------------------------------------------
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Write the schema to the specified path instead of stdout
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,
}
