//! inline-timer - run a command while an elapsed-time readout ticks inline.
//!
//! ```text
//! main() -> resolve settings (flags > env > config file > defaults)
//!        -> ScopedUpdater::run(|| command.status())
//!        -> print final elapsed time, exit with the command's status
//! ```
//!
//! Logs go to a file, never to the terminal: a log line on stdout/stderr
//! would land in the middle of the readout.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{
    env,
    ffi::OsString,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::PathBuf,
    process::{Command, ExitCode, ExitStatus},
    sync::Mutex,
    thread,
    time::Duration,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use inline_timer_config::{Resolved, TimerConfig};
use inline_timer_core::{
    Precision, ScopedUpdater, Step, SubstrateKind, TimerOptions, format_elapsed,
};

#[derive(Debug, Parser)]
#[command(name = "inline-timer")]
#[command(about = "Show a live elapsed-time readout while a command runs")]
struct Cli {
    /// Draw the readout from a forked child process
    #[arg(long, conflicts_with = "thread")]
    process: bool,
    /// Draw the readout from a thread (the default)
    #[arg(long)]
    thread: bool,
    /// Digits after the decimal point
    #[arg(long, value_name = "DIGITS")]
    precision: Option<u32>,
    /// Seconds each frame stays on screen
    #[arg(long, value_name = "SECS")]
    step: Option<f64>,
    /// Name of the background thread or process
    #[arg(long)]
    name: Option<String>,
    /// Wait this many seconds instead of running a command
    #[arg(long, value_name = "SECS", conflicts_with = "command")]
    sleep: Option<f64>,
    /// Command to run while the readout is shown
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<OsString>,
}

/// What runs inside the timer scope.
#[derive(Debug)]
enum Work {
    Sleep(Duration),
    Command {
        program: OsString,
        args: Vec<OsString>,
    },
}

impl Work {
    fn from_cli(cli: &Cli) -> Result<Self> {
        if let Some(secs) = cli.sleep {
            let duration = Duration::try_from_secs_f64(secs).context("invalid --sleep")?;
            return Ok(Work::Sleep(duration));
        }
        let mut parts = cli.command.iter().cloned();
        let Some(program) = parts.next() else {
            bail!("nothing to time: pass a command after `--` or use --sleep SECS");
        };
        Ok(Work::Command {
            program,
            args: parts.collect(),
        })
    }

    fn run(&self) -> io::Result<Option<ExitStatus>> {
        match self {
            Work::Sleep(duration) => {
                thread::sleep(*duration);
                Ok(None)
            }
            Work::Command { program, args } => Command::new(program).args(args).status().map(Some),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // If we can't open a log file, prefer "no logs" over corrupting the
    // readout by writing to stdout/stderr.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.inline-timer/logs/inline-timer.log
    if let Some(config_path) = TimerConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("inline-timer.log"));
    }

    // Fallback: ./.inline-timer/logs/inline-timer.log
    candidates.push(
        PathBuf::from(".inline-timer")
            .join("logs")
            .join("inline-timer.log"),
    );

    candidates
}

/// Applies command-line flags over the file + env layers.
fn apply_flags(mut resolved: Resolved, cli: &Cli) -> Result<Resolved> {
    if cli.process {
        resolved.kind = SubstrateKind::Process;
    } else if cli.thread {
        resolved.kind = SubstrateKind::Thread;
    }

    let mut options: TimerOptions = resolved.options;
    if let Some(digits) = cli.precision {
        options.precision = Precision::new(digits).context("invalid --precision")?;
    }
    if let Some(secs) = cli.step {
        options.step = Step::from_secs_f64(secs).context("invalid --step")?;
    }
    if let Some(name) = &cli.name {
        options = options.with_name(name.as_str()).context("invalid --name")?;
    }
    resolved.options = options;
    Ok(resolved)
}

fn resolve_settings(cli: &Cli) -> Result<Resolved> {
    let config = match TimerConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            // A broken config file should not stop the command from running.
            tracing::warn!("Ignoring config: {err}");
            TimerConfig::default()
        }
    };
    let resolved = config
        .resolve(|key| env::var(key).ok())
        .context("invalid timer environment")?;
    apply_flags(resolved, cli)
}

fn exit_code(status: Option<ExitStatus>) -> ExitCode {
    match status {
        None => ExitCode::SUCCESS,
        Some(status) if status.success() => ExitCode::SUCCESS,
        Some(status) => status
            .code()
            .and_then(|code| u8::try_from(code).ok())
            .map_or(ExitCode::FAILURE, ExitCode::from),
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let work = Work::from_cli(cli)?;
    let Resolved { kind, options } = resolve_settings(cli)?;
    tracing::info!(%kind, precision = %options.precision, step = %options.step, ?work, "Starting");

    let mut updater = ScopedUpdater::new(options, kind).context("failed to create the timer")?;
    let outcome = updater
        .run(|| work.run())
        .context("failed to start the timer")?;

    let elapsed = format_elapsed(updater.elapsed(), updater.precision());
    if let Some(err) = updater.take_last_error() {
        tracing::warn!("Readout stopped early: {err}");
        eprintln!("inline-timer: readout stopped early: {err}");
    }

    let status = outcome.context("failed to run command")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}s", elapsed.as_str()).context("failed to write elapsed time")?;
    tracing::info!(elapsed = elapsed.as_str(), ?status, "Finished");

    Ok(exit_code(status))
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("inline-timer: {err:#}");
            ExitCode::FAILURE
        }
    }
}
