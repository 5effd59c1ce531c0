//! rattlescan command-line interface
//!
//! `rattlescan analyze <FILE>` prints a forensic report.
//! `rattlescan wipe <FILE> --yes` securely overwrites and removes a file.

use std::{path::PathBuf, process, sync::Arc};

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{debug, error, info};

use rattlescan::{
    cleaner::PRESET_NAMES, init_logging, AnalysisPipeline, CancellationToken, Disposition, Error,
    FilesystemExtractor, HashAlgorithm, LogLevel, SecureWipeEngine, Settings, WipeResult,
};

const EXIT_FAILURE: i32 = 1;
const EXIT_REFUSED: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .and_then(|l| l.parse::<LogLevel>().ok())
        .unwrap_or_default();
    if let Err(e) = init_logging(level) {
        eprintln!("warning: {}", e);
    }

    let code = match run(&matches).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            EXIT_FAILURE
        }
    };
    process::exit(code);
}

async fn run(matches: &ArgMatches) -> Result<i32, Error> {
    let settings = match matches.get_one::<String>("config") {
        Some(path) => {
            info!(config = %path, "loading settings");
            Settings::from_file(&PathBuf::from(path))?
        }
        None => Settings::default(),
    };

    match matches.subcommand() {
        Some(("analyze", sub)) => analyze(sub, settings).await,
        Some(("wipe", sub)) => wipe(sub, settings).await,
        _ => Err(Error::Config("no subcommand given".into())),
    }
}

async fn analyze(matches: &ArgMatches, settings: Settings) -> Result<i32, Error> {
    let path = file_arg(matches)?;
    let format = output_format(matches);
    let mut config = settings.analysis;

    if let Some(list) = matches.get_one::<String>("algorithms") {
        config.algorithms = parse_algorithms(list)?;
    }
    if matches.get_flag("no-trailers") {
        config.confirm_trailers = false;
    }
    if matches.get_flag("sequential") {
        config.parallel_fanout = false;
    }
    debug!(?config, "analysis configuration");

    let pipeline =
        Arc::new(AnalysisPipeline::new(config)?.with_extractor(Arc::new(FilesystemExtractor::new())));
    let report = pipeline
        .analyze_async(path, CancellationToken::new())
        .await?;

    match format {
        OutputFormat::Json => {
            let json = report
                .to_json()
                .map_err(|e| Error::InvalidState(format!("cannot serialize report: {}", e)))?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", report.to_text()),
    }
    Ok(0)
}

async fn wipe(matches: &ArgMatches, settings: Settings) -> Result<i32, Error> {
    let path = file_arg(matches)?;
    let format = output_format(matches);
    let plan = settings
        .wipe
        .select_plan(matches.get_one::<String>("plan").map(String::as_str))?;

    if !matches.get_flag("yes") {
        eprintln!(
            "Refusing to wipe {} without --yes: this permanently destroys its contents ({} plan, {} passes).",
            path.display(),
            plan.name,
            plan.len()
        );
        return Ok(EXIT_REFUSED);
    }

    let engine = Arc::new(SecureWipeEngine::new(settings.wipe)?);
    let result = engine
        .execute_async(path, plan, CancellationToken::new())
        .await?;

    match format {
        OutputFormat::Json => println!("{}", result.to_json()?),
        OutputFormat::Text => print_wipe_summary(&result),
    }

    Ok(if result.is_success() { 0 } else { EXIT_FAILURE })
}

fn print_wipe_summary(result: &WipeResult) {
    let rule = "=".repeat(70);
    println!("{rule}\n  SECURE WIPE\n{rule}");
    println!("File     : {}", result.path.display());
    println!("Plan     : {}", result.plan);
    println!(
        "Passes   : {}/{} completed",
        result.passes_completed, result.passes_planned
    );
    for pass in &result.passes {
        println!(
            "  pass {:>2} {:<20} {:?}",
            pass.index + 1,
            pass.pattern,
            pass.verification
        );
    }
    match result.disposition {
        Disposition::EntryRemoved => println!("\n✓ File overwritten and permanently deleted"),
        Disposition::EntryRetainedDueToFailure => {
            let reason = result
                .failure
                .as_ref()
                .map(|f| f.message.as_str())
                .unwrap_or("unknown failure");
            println!("\n✗ Wipe failed: {}", reason);
            if let Some(retained) = &result.retained_path {
                println!(
                    "✗ File retained at {}; its contents are NOT guaranteed destroyed",
                    retained.display()
                );
            }
        }
    }
    println!("{rule}");
}

fn file_arg(matches: &ArgMatches) -> Result<PathBuf, Error> {
    matches
        .get_one::<String>("file")
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config("missing <FILE> argument".into()))
}

fn output_format(matches: &ArgMatches) -> OutputFormat {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Text,
    }
}

fn parse_algorithms(list: &str) -> Result<Vec<HashAlgorithm>, Error> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            HashAlgorithm::parse(name)
                .ok_or_else(|| Error::Config(format!("unknown digest algorithm: {}", name)))
        })
        .collect()
}

fn format_arg() -> Arg {
    Arg::new("format")
        .short('f')
        .long("format")
        .value_parser(["text", "json"])
        .default_value("text")
        .help("Output format")
}

fn build_cli() -> Command {
    Command::new("rattlescan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Forensic file analysis and verified secure wiping")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Settings file (JSON/YAML)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("warn")
                .global(true)
                .help("Logging verbosity (RUST_LOG overrides)"),
        )
        .subcommand(
            Command::new("analyze")
                .about("Compute digests, entropy, file type and metadata")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .help("File to analyze"),
                )
                .arg(format_arg())
                .arg(
                    Arg::new("algorithms")
                        .short('a')
                        .long("algorithms")
                        .value_name("LIST")
                        .help("Comma-separated digests: md5,sha1,sha256,sha512,blake3"),
                )
                .arg(
                    Arg::new("no-trailers")
                        .long("no-trailers")
                        .action(ArgAction::SetTrue)
                        .help("Skip trailing signature confirmation"),
                )
                .arg(
                    Arg::new("sequential")
                        .long("sequential")
                        .action(ArgAction::SetTrue)
                        .help("Feed accumulators one after another instead of in parallel"),
                ),
        )
        .subcommand(
            Command::new("wipe")
                .about("Overwrite a file in place, verify, then delete it")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .help("File to destroy"),
                )
                .arg(
                    Arg::new("plan")
                        .short('p')
                        .long("plan")
                        .value_parser(PRESET_NAMES)
                        .help("Sanitization standard (default: wipe.plan from --config, else dod-5220.22-m)"),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Confirm the irreversible wipe"),
                )
                .arg(format_arg()),
        )
}
