//! Stitch command-line tool
//!
//! Weaves compiled modules against a native descriptor table and inspects
//! the result.
//!
//! Exit codes: `0` on success, `1` when the weave reports errors, `2` for
//! usage, I/O, decode and configuration failures.

mod commands;
mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};

use output::StyledOutput;

#[derive(Parser)]
#[command(name = "stitch")]
#[command(about = "Post-compilation weaver for native-backed managed types", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// When to use colors
    #[arg(long, global = true, value_parser = ["auto", "always", "never"])]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weave a compiled module
    Weave(WeaveArgs),

    /// Print the types and members of a module
    Inspect {
        /// Module file
        module: PathBuf,
    },
}

/// Arguments of `stitch weave`
#[derive(Args, Debug, Clone)]
pub struct WeaveArgs {
    /// Compiled module to weave
    pub input: PathBuf,

    /// Where to write the woven module; the input is replaced when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Native descriptor table (JSON)
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    /// Module providing the helper library types
    #[arg(long)]
    pub helpers: Option<PathBuf>,

    /// Weaver configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where to write the companion debug map
    #[arg(long)]
    pub debug_map: Option<PathBuf>,

    /// Where to write the weave report (JSON)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Worker threads; 0 means one per CPU
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let choice = output::resolve_color_choice(cli.color.as_deref());
    logging::init(cli.verbose, choice);

    let mut out = StyledOutput::new(choice);
    let result = match cli.command {
        Commands::Weave(args) => commands::weave::execute(&args, &mut out),
        Commands::Inspect { module } => commands::inspect::execute(&module, &mut out),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            out.stderr_error("error");
            out.stderr_plain(&format!(": {:#}\n", e));
            ExitCode::from(2)
        }
    }
}
