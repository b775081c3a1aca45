//! capsync - pair color and depth frames across a fleet of capture files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{self, ExitCode};

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use capsync_core::capture::ExternalDecoder;
use capsync_core::config::{default_config_path, ConfigManager, ConfigSection, Settings};
use capsync_core::jobs::JobStore;
use capsync_core::logging::{init_tracing, LogLevel};
use capsync_core::orchestrator::{PipelineRunner, RunConfig};

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Settings file (default: per-user config, if present)")
        .value_parser(value_parser!(PathBuf));

    Command::new("capsync")
        .version(capsync_core::version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Process every capture under the input root")
                .arg(config_arg.clone())
                .arg(path_arg("input", "DIR", "Root of the capture tree"))
                .arg(path_arg("output", "DIR", "Root for pair and label folders"))
                .arg(path_arg("checkpoint", "FILE", "Checkpoint file recording job outcomes"))
                .arg(path_arg("cache", "DIR", "Fast local storage for staged copies"))
                .arg(path_arg(
                    "time-ranges",
                    "FILE",
                    "Only keep frames inside these HH:MM:SS.sss-HH:MM:SS.sss ranges",
                ))
                .arg(
                    Arg::new("max-skew")
                        .long("max-skew")
                        .value_name("SECONDS")
                        .help("Maximum color/depth timestamp difference for a pair")
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("ignore-frame-errors")
                        .long("ignore-frame-errors")
                        .help("Skip frames that fail to decode instead of failing the job")
                        .action(ArgAction::SetTrue),
                )
                .arg(log_level_arg()),
        )
        .subcommand(
            Command::new("init")
                .about("Create or normalize the settings file and store locations in it")
                .arg(config_arg.clone())
                .arg(path_arg("input", "DIR", "Root of the capture tree"))
                .arg(path_arg("output", "DIR", "Root for pair and label folders"))
                .arg(path_arg("checkpoint", "FILE", "Checkpoint file recording job outcomes"))
                .arg(path_arg("cache", "DIR", "Fast local storage for staged copies"))
                .arg(
                    Arg::new("decoder")
                        .long("decoder")
                        .value_name("PROGRAM")
                        .help("Frame extraction command"),
                )
                .arg(
                    Arg::new("decoder-arg")
                        .long("decoder-arg")
                        .value_name("ARG")
                        .help("Argument for the extraction command; {input} and {output} are substituted")
                        .action(ArgAction::Append)
                        .allow_hyphen_values(true),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Summarize a checkpoint file")
                .arg(config_arg)
                .arg(path_arg("checkpoint", "FILE", "Checkpoint file to read")),
        )
}

fn path_arg(name: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name(value_name)
        .help(help)
        .value_parser(value_parser!(PathBuf))
}

fn log_level_arg() -> Arg {
    Arg::new("log-level")
        .long("log-level")
        .value_name("LEVEL")
        .help("Log level (overridden by RUST_LOG)")
        .value_parser(["trace", "debug", "info", "warn", "error"])
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    let result = match matches.subcommand() {
        Some(("run", args)) => cmd_run(args),
        Some(("init", args)) => cmd_init(args),
        Some(("status", args)) => cmd_status(args),
        _ => unreachable!("subcommand is required"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load settings from `--config`, else the per-user file if it exists,
/// else defaults.
fn load_settings(args: &ArgMatches) -> Result<Settings> {
    let path = match args.get_one::<PathBuf>("config") {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|p| p.is_file()),
    };

    match path {
        Some(path) => {
            let mut manager = ConfigManager::new(&path);
            manager
                .load()
                .with_context(|| format!("loading config {}", path.display()))?;
            Ok(manager.into_settings())
        }
        None => Ok(Settings::default()),
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn cmd_run(args: &ArgMatches) -> Result<()> {
    let mut settings = load_settings(args)?;

    if let Some(p) = args.get_one::<PathBuf>("input") {
        settings.paths.input_root = path_string(p);
    }
    if let Some(p) = args.get_one::<PathBuf>("output") {
        settings.paths.output_root = path_string(p);
    }
    if let Some(p) = args.get_one::<PathBuf>("checkpoint") {
        settings.paths.checkpoint = path_string(p);
    }
    if let Some(p) = args.get_one::<PathBuf>("cache") {
        settings.paths.cache_dir = path_string(p);
    }
    if let Some(p) = args.get_one::<PathBuf>("time-ranges") {
        settings.correlation.time_ranges_file = Some(path_string(p));
    }
    if let Some(skew) = args.get_one::<f64>("max-skew") {
        settings.correlation.max_skew = *skew;
    }
    if args.get_flag("ignore-frame-errors") {
        settings.pipeline.ignore_frame_errors = true;
    }
    if let Some(level) = args.get_one::<String>("log-level") {
        settings.logging.level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }

    let logs_folder = PathBuf::from(&settings.paths.logs_folder);
    fs::create_dir_all(&logs_folder)
        .with_context(|| format!("creating log folder {}", logs_folder.display()))?;
    let _log_guard = init_tracing(settings.logging.level, Some(&logs_folder));

    let config = RunConfig::from_settings(&settings)?;
    tracing::debug!(?config, "Run configuration");

    if !settings.decoder.is_configured() {
        bail!("no capture decoder configured: set [decoder] program and args in the config file");
    }
    let decoder = ExternalDecoder::new(
        settings.decoder.program.clone(),
        settings.decoder.args.clone(),
    );

    let runner = PipelineRunner::new(config, decoder);

    let cancel = runner.cancel_handle();
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            process::exit(130);
        }
        eprintln!("Stopping after the current job (press Ctrl-C again to abort)");
        cancel.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let summary = runner.run()?;

    println!("Discovered:   {}", summary.discovered);
    println!("Already done: {}", summary.skipped);
    println!("Succeeded:    {}", summary.succeeded);
    println!("Failed:       {}", summary.failed);
    if summary.cancelled {
        println!("Cancelled with {} jobs not started", summary.not_started);
    }
    Ok(())
}

fn cmd_init(args: &ArgMatches) -> Result<()> {
    let path = match args.get_one::<PathBuf>("config") {
        Some(path) => path.clone(),
        None => default_config_path().context("no per-user config directory; pass --config")?,
    };

    let updated = init_config(&path, args)?;
    println!("Config: {}", path.display());
    for section in updated {
        println!("Updated [{}]", section.table_name());
    }
    Ok(())
}

/// Create (or normalize) the config at `path`, then write the sections the
/// flags touch. Returns the sections that were rewritten.
fn init_config(path: &Path, args: &ArgMatches) -> Result<Vec<ConfigSection>> {
    let mut manager = ConfigManager::new(path);
    manager
        .load_or_create()
        .with_context(|| format!("preparing config {}", path.display()))?;

    let mut updated = Vec::new();
    let settings = manager.settings_mut();

    let mut paths_changed = false;
    for (flag, field) in [
        ("input", &mut settings.paths.input_root),
        ("output", &mut settings.paths.output_root),
        ("checkpoint", &mut settings.paths.checkpoint),
        ("cache", &mut settings.paths.cache_dir),
    ] {
        if let Some(p) = args.get_one::<PathBuf>(flag) {
            *field = path_string(p);
            paths_changed = true;
        }
    }
    if paths_changed {
        updated.push(ConfigSection::Paths);
    }

    let mut decoder_changed = false;
    if let Some(program) = args.get_one::<String>("decoder") {
        settings.decoder.program = program.clone();
        decoder_changed = true;
    }
    if let Some(values) = args.get_many::<String>("decoder-arg") {
        settings.decoder.args = values.cloned().collect();
        decoder_changed = true;
    }
    if decoder_changed {
        updated.push(ConfigSection::Decoder);
    }

    for &section in &updated {
        manager
            .update_section(section)
            .with_context(|| format!("writing [{}] to {}", section.table_name(), path.display()))?;
    }
    Ok(updated)
}

fn cmd_status(args: &ArgMatches) -> Result<()> {
    let checkpoint = match args.get_one::<PathBuf>("checkpoint") {
        Some(p) => p.clone(),
        None => {
            let settings = load_settings(args)?;
            if settings.paths.checkpoint.trim().is_empty() {
                bail!("no checkpoint given: pass --checkpoint or set paths.checkpoint");
            }
            PathBuf::from(settings.paths.checkpoint)
        }
    };

    let store = JobStore::load(&checkpoint)?;
    let failed: Vec<_> = store.failed().collect();

    println!("Checkpoint: {}", checkpoint.display());
    println!("Succeeded:  {}", store.len() - failed.len());
    println!("Failed:     {}", failed.len());
    for (reference, record) in failed {
        println!(
            "  {}: {}",
            reference,
            record.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
