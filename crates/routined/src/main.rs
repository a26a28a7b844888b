use chrono::{Local, NaiveDate, NaiveTime};
use clap::{ArgAction, Args, Parser, Subcommand};
use routine_core::config::{
    load_device_config, save_device_config, ConfigError, DeviceConfig, NotifyConfig,
};
use routine_core::types::{DATE_FORMAT, TIME_FORMAT};
use routine_core::validation::{Validate, ValidationIssue, ValidationLevel};
use routine_notify::{NotificationChannel, ReportSink, StdoutSink, TcpConnector};
use routined::daemon_loop::{DaemonConfig, RoutineDaemon};
use routined::hardware::{Devices, HardwareError, IconLibrary};
use routined::logging::init_logging;
use routined::persistence::{NewRoutine, NewTimer, PersistenceError, SqliteStore};
use routined::SystemClock;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/device.toml";

#[derive(Debug, Parser)]
#[command(name = "routined", version, about = "Routine reminder daemon")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run the main loop until SIGINT/SIGTERM.
    Run(RunCliArgs),
    /// Create the routine and timer tables.
    InitDb(ConfigArgs),
    AddRoutine(AddRoutineCliArgs),
    AddTimer(AddTimerCliArgs),
    /// Print the routines scheduled for a date.
    List(ListCliArgs),
    /// Print config validation issues.
    CheckConfig(CheckConfigCliArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Debug, Args)]
struct CheckConfigCliArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Write a default config at the config path if no file exists there.
    #[arg(long)]
    write_default: bool,
}

#[derive(Debug, Args)]
struct RunCliArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Run a single tick and exit.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Args)]
struct AddRoutineCliArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long, value_parser = parse_date)]
    date: NaiveDate,
    #[arg(long, value_parser = parse_time)]
    start: NaiveTime,
    #[arg(long)]
    icon: String,
    #[arg(long)]
    minutes: u32,
    #[arg(long)]
    name: String,
    #[arg(long)]
    group: String,
}

#[derive(Debug, Args)]
struct AddTimerCliArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long)]
    work: u32,
    #[arg(long)]
    rest: u32,
    #[arg(long)]
    repeat: u32,
    #[arg(long)]
    icon: String,
}

#[derive(Debug, Args)]
struct ListCliArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Defaults to today.
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|err| format!("expected HH:MM:SS: {err}"))
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("failed to load device config at {path}: {source}")]
    LoadConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("failed to save device config at {path}: {source}")]
    SaveConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("{0}")]
    InvalidConfig(String),
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open routine store at {path}: {source}")]
    OpenStore {
        path: PathBuf,
        #[source]
        source: PersistenceError,
    },
    #[error(transparent)]
    Store(#[from] PersistenceError),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error("failed to install signal handler: {source}")]
    Signal {
        #[source]
        source: std::io::Error,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = run(cli.command) {
        tracing::error!(error = %err, "routined failed");
        eprintln!("routined failed: {err}");
        std::process::exit(1);
    }
}

fn run(command: CliCommand) -> Result<(), MainError> {
    match command {
        CliCommand::Run(args) => run_daemon(args),
        CliCommand::InitDb(args) => run_init_db(args),
        CliCommand::AddRoutine(args) => run_add_routine(args),
        CliCommand::AddTimer(args) => run_add_timer(args),
        CliCommand::List(args) => run_list(args),
        CliCommand::CheckConfig(args) => run_check_config(args),
    }
}

fn run_daemon(args: RunCliArgs) -> Result<(), MainError> {
    let config = load_config(&args.config.config)?;
    validate_device_config(&config.validate())?;
    let store = open_store(&config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .map_err(|source| MainError::Signal { source })?;
    }

    let mut daemon = RoutineDaemon::new(
        store,
        Arc::new(SystemClock::new()),
        Devices::console(),
        IconLibrary::new(&config.icons.dir),
        build_sink(&config.notify),
        DaemonConfig::from_device_config(&config),
        Arc::clone(&shutdown),
    );

    if let Err(err) = daemon.start() {
        daemon.stop();
        return Err(err.into());
    }

    if args.once {
        let summary = daemon.tick();
        tracing::info!(?summary, "exiting after a single tick (--once)");
    } else {
        tracing::info!("routined running; press Ctrl+C to stop");
        daemon.run();
    }
    daemon.stop();
    Ok(())
}

fn run_init_db(args: ConfigArgs) -> Result<(), MainError> {
    let config = load_config(&args.config)?;
    open_store(&config)?;
    println!(
        "routine store ready at {}",
        config.store.sqlite_path.display()
    );
    Ok(())
}

fn run_add_routine(args: AddRoutineCliArgs) -> Result<(), MainError> {
    let config = load_config(&args.config.config)?;
    let store = open_store(&config)?;
    let id = store.insert_routine(&NewRoutine {
        date: args.date,
        start_time: args.start,
        icon: args.icon,
        minutes: args.minutes,
        name: args.name,
        group: args.group,
    })?;
    println!("added routine {id}");
    Ok(())
}

fn run_add_timer(args: AddTimerCliArgs) -> Result<(), MainError> {
    let config = load_config(&args.config.config)?;
    let store = open_store(&config)?;
    let id = store.insert_timer(&NewTimer {
        work_minutes: args.work,
        rest_minutes: args.rest,
        repeat_count: args.repeat,
        icon: args.icon,
    })?;
    println!("added timer {id}");
    Ok(())
}

fn run_list(args: ListCliArgs) -> Result<(), MainError> {
    let config = load_config(&args.config.config)?;
    let store = open_store(&config)?;
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let routines = store.list_routines_for_date(date)?;
    if routines.is_empty() {
        println!("no routines on {date}");
        return Ok(());
    }
    for routine in routines {
        println!(
            "{}\t{}\t{}m\t{}\t{}\t{}",
            routine.id,
            routine.start_time.format(TIME_FORMAT),
            routine.minutes,
            routine.status,
            routine.group,
            routine.name
        );
    }
    Ok(())
}

fn run_check_config(args: CheckConfigCliArgs) -> Result<(), MainError> {
    let path = &args.config.config;
    if args.write_default && write_default_config(path)? {
        println!("wrote default device config to {}", path.display());
    }
    let config = load_config(path)?;
    let issues = config.validate();
    if issues.is_empty() {
        println!("{}: ok", path.display());
    }
    for issue in &issues {
        println!("{:?} {}: {}", issue.level, issue.code, issue.message);
    }
    validate_device_config(&issues)
}

/// A missing file means defaults; an unreadable or malformed one is fatal.
fn load_config(path: &Path) -> Result<DeviceConfig, MainError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no device config found; using defaults");
        return Ok(DeviceConfig::default());
    }
    load_device_config(path).map_err(|source| MainError::LoadConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns false when a file already exists at `path`; it is left untouched.
fn write_default_config(path: &Path) -> Result<bool, MainError> {
    if path.exists() {
        tracing::info!(path = %path.display(), "device config exists; not overwriting");
        return Ok(false);
    }
    save_device_config(path, &DeviceConfig::default()).map_err(|source| {
        MainError::SaveConfig {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(true)
}

fn validate_device_config(issues: &[ValidationIssue]) -> Result<(), MainError> {
    for issue in issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Warning)
    {
        tracing::warn!(code = issue.code, "{}", issue.message);
    }

    let errors = issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .collect::<Vec<_>>();
    if errors.is_empty() {
        return Ok(());
    }

    let rendered = errors
        .iter()
        .map(|issue| format!("{}: {}", issue.code, issue.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(MainError::InvalidConfig(format!(
        "device config validation failed ({rendered})"
    )))
}

fn open_store(config: &DeviceConfig) -> Result<SqliteStore, MainError> {
    let path = &config.store.sqlite_path;
    ensure_parent_dir(path)?;
    let store = SqliteStore::open(path).map_err(|source| MainError::OpenStore {
        path: path.clone(),
        source,
    })?;
    store.migrate()?;
    Ok(store)
}

fn ensure_parent_dir(path: &Path) -> Result<(), MainError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).map_err(|source| MainError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn build_sink(notify: &NotifyConfig) -> Box<dyn ReportSink> {
    match notify.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            tracing::info!(endpoint, "group reports go to stream endpoint");
            Box::new(NotificationChannel::new(TcpConnector::new(
                endpoint,
                Duration::from_millis(notify.connect_timeout_ms),
            )))
        }
        _ => {
            tracing::info!("no notify endpoint configured; group reports go to stdout");
            Box::new(StdoutSink)
        }
    }
}
