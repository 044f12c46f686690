//! Command-line surface
//!
//! Argument parsing and report printing live here, outside `main.rs`, so the
//! exit-code behavior can be driven from tests through [`run`].

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};
use tracing::{debug, warn};

use crate::catalog::TypeCatalog;
use crate::config::QuantizeConfig;
use crate::error::{CuantizarError, Result};
use crate::report::TranscodeReport;
use crate::transcode::quantize_model;

/// Quantize a GGML Whisper model, optionally per tensor
///
/// Matrices are re-encoded to DEFAULT_TYPE unless a --tensor-type rule
/// claims them. Rules are full-name regular expressions tried in the order
/// given; the first match wins.
///
/// Examples:
///   cuantizar ggml-base.bin ggml-base-q5_0.bin q5_0
///   cuantizar --tensor-type 'encoder\..*=q8_0' ggml-base.bin out.bin q4_0
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "cuantizar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Per-tensor target type; repeatable, earlier rules win
    #[arg(long = "tensor-type", value_name = "PATTERN=TYPE", allow_hyphen_values = true)]
    pub tensor_types: Vec<String>,

    /// Do not print the per-tensor decision lines
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the run summary as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Source model (f32/f16 weights)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination model, overwritten if present
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Type for matrices no rule claims: a name or file-type code
    #[arg(value_name = "DEFAULT_TYPE")]
    pub default_type: String,
}

/// Parse `args` (program name first), run, and return the process exit code
///
/// `--help` and `--version` return 0; every other failure prints to stderr
/// and returns 1.
pub fn run<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let catalog = TypeCatalog::new();
    let command = Cli::command().after_help(format!("DEFAULT_TYPE values:\n{}", catalog.file_types()));

    let matches = match command.try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) => {
            print_clap_error(&e);
            return if e.use_stderr() { 1 } else { 0 };
        },
    };
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => {
            print_clap_error(&e);
            return 1;
        },
    };

    match entrypoint(&catalog, &cli) {
        Ok(_) => 0,
        Err(e) => {
            debug!(category = e.category(), "run failed");
            eprintln!("error: {e}");
            e.exit_code()
        },
    }
}

fn print_clap_error(e: &clap::Error) {
    if let Err(io_err) = e.print() {
        warn!(error = %io_err, "could not write usage message");
    }
}

/// Validate `cli`, run the transcode and print the report
///
/// # Errors
///
/// Anything from [`QuantizeConfig::new`] or [`quantize_model`].
pub fn entrypoint(catalog: &TypeCatalog, cli: &Cli) -> Result<TranscodeReport> {
    let config = QuantizeConfig::new(
        catalog,
        cli.input.clone(),
        cli.output.clone(),
        &cli.default_type,
        cli.tensor_types.as_slice(),
    )?;
    let show_decisions = !cli.quiet && !cli.json;

    if show_decisions {
        println!(
            "quantizing '{}' to '{}' (default {}, {} rules)",
            config.input.display(),
            config.output.display(),
            config.default_type,
            config.rules.len()
        );
        for (i, rule) in config.rules.rules().enumerate() {
            println!("  rule #{i}: {} -> {}", rule.pattern, rule.target);
        }
    }

    let report = quantize_model(catalog, &config, |decision| {
        if show_decisions {
            println!("{}", decision.render());
        }
    })?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CuantizarError::io("serialize report", io::Error::other(e)))?;
        println!("{json}");
    } else {
        for line in report.summary_lines() {
            println!("{line}");
        }
    }
    Ok(report)
}
