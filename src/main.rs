//! Memwatch - watch and edit the memory of a live process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use memwatch::config::{ConfigError, ConfigLoader};
use memwatch::display;
use memwatch::memory::{
    Address, MemoryError, PointerChain, PointerWidth, Value, ValueParseError, ValueType,
};
use memwatch::process::{
    ProcessError, ProcessFinder, ProcessHandle, ProcessTracker, SystemFinder,
};
use memwatch::watch::WatchError;

#[derive(Parser)]
#[command(
    name = "memwatch",
    about = "Watch and edit the memory of a live process",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to a process and print value changes until Ctrl-C.
    Watch {
        /// Config file (defaults to ./.memwatch.toml, then the user config dir).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Process name, overriding the config file.
        #[arg(short, long)]
        process: Option<String>,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Read one value.
    Read {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        location: LocationArgs,
        /// Value type (u8, i32, f64, bytes/16, ...).
        #[arg(short = 't', long = "type")]
        value_type: ValueType,
    },
    /// Write one value.
    Write {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        location: LocationArgs,
        /// Value type (u8, i32, f64, bytes/16, ...).
        #[arg(short = 't', long = "type")]
        value_type: ValueType,
        /// Value to write.
        #[arg(long, allow_hyphen_values = true)]
        value: String,
    },
    /// Resolve a pointer chain and print the final address.
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
        /// Pointer chain, e.g. "game+0x1A0 -> 0x10 -> 0x20".
        #[arg(long, allow_hyphen_values = true)]
        pointer: PointerChain,
        /// Pointer width (32 or 64); detected from the target by default.
        #[arg(long)]
        width: Option<PointerWidth>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Target process id.
    #[arg(long)]
    pid: Option<u32>,
    /// Target process name.
    #[arg(long)]
    process: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct LocationArgs {
    /// Absolute address.
    #[arg(long)]
    address: Option<Address>,
    /// Pointer chain, e.g. "game+0x1A0 -> 0x10".
    #[arg(long, allow_hyphen_values = true)]
    pointer: Option<PointerChain>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Value(#[from] ValueParseError),

    #[error("Pointer chain is unresolved: {0}")]
    Unresolved(PointerChain),

    #[error("No address or pointer chain given")]
    NoLocation,

    #[error("No process name given (use --process or set `process` in the config)")]
    NoProcessName,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn open_target(target: &TargetArgs) -> Result<ProcessHandle, CliError> {
    let finder = SystemFinder;
    let handle = match (target.pid, &target.process) {
        (Some(pid), _) => finder.open(pid).await?,
        (None, Some(name)) => finder
            .find_by_name(name)
            .await?
            .ok_or_else(|| ProcessError::NotFound(name.clone()))?,
        (None, None) => return Err(CliError::NoProcessName),
    };
    tracing::info!(pid = handle.pid(), name = %handle.name(), "Opened process");
    Ok(handle)
}

fn locate(handle: &ProcessHandle, location: &LocationArgs) -> Result<Address, CliError> {
    match (&location.address, &location.pointer) {
        (Some(address), _) => Ok(*address),
        (None, Some(chain)) => chain
            .resolve(handle, handle.target_width())
            .ok_or_else(|| CliError::Unresolved(chain.clone())),
        (None, None) => Err(CliError::NoLocation),
    }
}

async fn run_watch(
    config: Option<PathBuf>,
    process: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let loader = config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = loader.load()?;
    if process.is_some() {
        config.process = process;
    }
    let name = config.process.clone().ok_or(CliError::NoProcessName)?;

    let tracker = ProcessTracker::new(config.tracker_config(), Arc::new(SystemFinder));
    let registry = tracker.registry();
    for (spec, descriptor) in config.watches.iter().zip(config.descriptors()) {
        registry.add(descriptor).await?;
        if spec.start {
            registry.start(&spec.name).await?;
        }
    }
    if !json {
        let mut infos = Vec::new();
        for watch_name in registry.names().await {
            infos.push(registry.get(&watch_name).await?);
        }
        display::print_watches(&infos);
    }

    let mut events = BroadcastStream::new(registry.subscribe());
    let waiter = tracker.clone();
    let wait_name = name.clone();
    let mut attach = tokio::spawn(async move { waiter.wait_for_process(&wait_name).await });
    let mut attaching = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(process = %name, "Waiting for process");
    let mut result: Result<(), CliError> = Ok(());
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            joined = &mut attach, if attaching => {
                attaching = false;
                match joined {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        result = Err(err.into());
                        break;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Attach task failed");
                        break;
                    }
                }
            }
            item = events.next() => match item {
                Some(Ok(event)) if json => display::print_event_json(&event),
                Some(Ok(event)) => display::print_event(&event),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Event consumer lagged");
                }
                None => break,
            },
        }
    }

    tracker.shutdown().await;
    result
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Watch {
            config,
            process,
            json,
        } => run_watch(config, process, json).await,
        Commands::Read {
            target,
            location,
            value_type,
        } => {
            let handle = open_target(&target).await?;
            let address = locate(&handle, &location)?;
            let value = handle.read_value(address, value_type)?;
            display::print_value(address, &value);
            Ok(())
        }
        Commands::Write {
            target,
            location,
            value_type,
            value,
        } => {
            let value = Value::parse(value_type, &value)?;
            let handle = open_target(&target).await?;
            let address = locate(&handle, &location)?;
            handle.write_value(address, &value)?;
            display::print_written(address, &value);
            Ok(())
        }
        Commands::Resolve {
            target,
            pointer,
            width,
        } => {
            let handle = open_target(&target).await?;
            let width = width.unwrap_or_else(|| handle.target_width());
            let address = pointer.resolve(&handle, width);
            display::print_resolved(&pointer, address);
            if address.is_some() {
                Ok(())
            } else {
                Err(CliError::Unresolved(pointer))
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli.command).await {
        eprintln!("{} {err}", "[ERROR]".red().bold());
        std::process::exit(1);
    }
}
