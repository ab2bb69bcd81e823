//! Archive Engine Core
//!
//! The main entry point for ae-core, handling:
//! - Configuration checks and archive registration
//! - Replay of recorded acquisition feeds through the archives
//! - Trend, slice and event queries against configured archives
//! - Event acknowledgment

use std::path::PathBuf;
use std::sync::Arc;

use ae_archive::ArchiveHolder;
use ae_common::{
    format_error_human, DataFilter, Error, EventId, OutputFormat, Severity, StructuredError,
    SCHEMA_VERSION,
};
use ae_core::exit_codes::ExitCode;
use ae_core::feed::{read_feed, replay};
use ae_core::logging::{init_logging, LogConfig, LogContext, LogFormat};
use ae_core::service::AcquisitionService;
use ae_core::setup::{load_archive_config, start_holder, LoadedConfig};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

/// Archive Engine - store and query acquisition data
#[derive(Parser)]
#[command(name = "ae-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to archives.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and register every archive
    Check,

    /// Run the acquisition service over a recorded feed
    Replay(ReplayArgs),

    /// Print channel trends from a historical archive
    Trend(TrendArgs),

    /// Print channel values at one timestamp
    Slice(SliceArgs),

    /// Print row timestamps of a historical archive
    Timestamps(RangeArgs),

    /// Print events from an event archive
    Events(EventsArgs),

    /// Print one event by id
    Event(EventArgs),

    /// Acknowledge an event in every event archive
    Ack(AckArgs),

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Feed file (JSON lines)
    #[arg(long, short = 'i')]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// Archive bit
    #[arg(long)]
    bit: usize,

    /// Range start (RFC 3339, inclusive)
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Range end (RFC 3339, inclusive)
    #[arg(long)]
    to: Option<DateTime<Utc>>,
}

impl RangeArgs {
    fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.from.unwrap_or(DateTime::<Utc>::MIN_UTC),
            self.to.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

#[derive(Args, Debug)]
struct TrendArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// Channel numbers (comma separated)
    #[arg(long, value_delimiter = ',', required = true)]
    cnl: Vec<i32>,
}

#[derive(Args, Debug)]
struct SliceArgs {
    /// Archive bit
    #[arg(long)]
    bit: usize,

    /// Channel numbers (comma separated)
    #[arg(long, value_delimiter = ',', required = true)]
    cnl: Vec<i32>,

    /// Row timestamp (RFC 3339)
    #[arg(long)]
    at: DateTime<Utc>,
}

#[derive(Args, Debug)]
struct EventsArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// Only events of these channels
    #[arg(long, value_delimiter = ',')]
    cnl: Vec<i32>,

    /// Only events of these objects
    #[arg(long, value_delimiter = ',')]
    obj: Vec<i32>,

    /// Only events of these devices
    #[arg(long, value_delimiter = ',')]
    device: Vec<i32>,

    /// Minimum severity (inclusive)
    #[arg(long)]
    min_severity: Option<i32>,

    /// Maximum severity (inclusive)
    #[arg(long)]
    max_severity: Option<i32>,

    /// Only events in this severity band or above
    #[arg(long, value_enum)]
    severity: Option<Severity>,

    /// Only acknowledged events
    #[arg(long, conflicts_with = "unacked")]
    acked: bool,

    /// Only unacknowledged events
    #[arg(long)]
    unacked: bool,

    /// Include hidden events
    #[arg(long)]
    hidden: bool,

    /// Maximum number of events
    #[arg(long)]
    limit: Option<usize>,

    /// Newest first
    #[arg(long)]
    desc: bool,
}

impl EventsArgs {
    fn filter(&self) -> DataFilter {
        let mut filter = DataFilter::visible()
            .with_cnl_nums(self.cnl.iter().copied())
            .with_obj_nums(self.obj.iter().copied())
            .with_device_nums(self.device.iter().copied())
            .with_severity_range(self.min_severity, self.max_severity)
            .with_hidden(self.hidden);
        if let Some(band) = self.severity {
            filter = filter.with_min_band(band);
        }
        if self.acked {
            filter = filter.with_ack(true);
        } else if self.unacked {
            filter = filter.with_ack(false);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }
        if self.desc {
            filter = filter.descending();
        }
        filter
    }
}

#[derive(Args, Debug)]
struct EventArgs {
    /// Archive bit
    #[arg(long)]
    bit: usize,

    /// Event id
    #[arg(long)]
    id: i64,
}

#[derive(Args, Debug)]
struct AckArgs {
    /// Event id
    #[arg(long)]
    id: i64,

    /// Acknowledging user
    #[arg(long)]
    user: i32,

    /// Acknowledgment time (RFC 3339, defaults to now)
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(None, cli.global.log_format);
    let level = log_config.level.adjusted(cli.global.verbose, cli.global.quiet);
    init_logging(&log_config.with_level(level));

    let log = LogContext::generate();
    let exit_code = match &cli.command {
        Commands::Check => run_check(&cli.global, &log),
        Commands::Replay(args) => run_replay(&cli.global, &log, args),
        Commands::Trend(args) => run_trend(&cli.global, &log, args),
        Commands::Slice(args) => run_slice(&cli.global, &log, args),
        Commands::Timestamps(args) => run_timestamps(&cli.global, &log, args),
        Commands::Events(args) => run_events(&cli.global, &log, args),
        Commands::Event(args) => run_event(&cli.global, &log, args),
        Commands::Ack(args) => run_ack(&cli.global, &log, args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_check(global: &GlobalOpts, log: &LogContext) -> ExitCode {
    let (loaded, holder) = match open(global, log) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let archives = holder.describe();
    let summary = format!(
        "config ok: {} archive(s) from {}",
        archives.len(),
        loaded.source
    );
    emit(
        global,
        log,
        "check",
        serde_json::json!({
            "source": loaded.source.to_string(),
            "path": loaded.path.as_ref().map(|p| p.display().to_string()),
            "heartbeat_secs": loaded.config.heartbeat_secs,
            "call_budget_ms": loaded.config.call_budget_ms,
            "registered_mask": holder.registered_bits(),
            "archives": archives,
        }),
        summary,
    );
    ExitCode::Clean
}

fn run_replay(global: &GlobalOpts, log: &LogContext, args: &ReplayArgs) -> ExitCode {
    let records = match read_feed(&args.input) {
        Ok(records) => records,
        Err(err) => {
            let err = Error::from(err);
            let code = match err.category() {
                ae_common::ErrorCategory::Io => ExitCode::IoError,
                _ => ExitCode::ArgsError,
            };
            output_error(global, &err);
            return code;
        }
    };
    let (loaded, holder) = match open(global, log) {
        Ok(opened) => opened,
        Err(code) => return code,
    };

    let mut service =
        AcquisitionService::new(Arc::new(holder), log.clone(), loaded.config.heartbeat());
    let stats = replay(&mut service, records, log);
    let summary = format!(
        "replayed {} cycle(s), {} event(s), {} ack(s)",
        stats.cycles, stats.events, stats.acks
    );
    emit(
        global,
        log,
        "replay",
        serde_json::json!({
            "input": args.input.display().to_string(),
            "stats": stats,
        }),
        summary,
    );
    ExitCode::Clean
}

fn run_trend(global: &GlobalOpts, log: &LogContext, args: &TrendArgs) -> ExitCode {
    let holder = match open(global, log) {
        Ok((_, holder)) => holder,
        Err(code) => return code,
    };
    let (start, end) = args.range.bounds();
    let bundle = holder.get_trends(&args.cnl, start, end, args.range.bit);
    let summary = format!(
        "{} row(s) for {} channel(s) from bit {}",
        bundle.len(),
        bundle.cnl_nums.len(),
        args.range.bit
    );
    let empty = bundle.is_empty();
    emit(
        global,
        log,
        "trend",
        serde_json::json!({ "bit": args.range.bit, "bundle": bundle }),
        summary,
    );
    outcome(empty)
}

fn run_slice(global: &GlobalOpts, log: &LogContext, args: &SliceArgs) -> ExitCode {
    let holder = match open(global, log) {
        Ok((_, holder)) => holder,
        Err(code) => return code,
    };
    let slice = holder.get_slice(&args.cnl, args.at, args.bit);
    let empty = slice.is_undefined();
    let summary = format!(
        "slice at {} from bit {}: {}",
        args.at,
        args.bit,
        if empty { "no data" } else { "found" }
    );
    emit(
        global,
        log,
        "slice",
        serde_json::json!({ "bit": args.bit, "slice": slice }),
        summary,
    );
    outcome(empty)
}

fn run_timestamps(global: &GlobalOpts, log: &LogContext, args: &RangeArgs) -> ExitCode {
    let holder = match open(global, log) {
        Ok((_, holder)) => holder,
        Err(code) => return code,
    };
    let (start, end) = args.bounds();
    let timestamps = holder.get_timestamps(start, end, args.bit);
    let summary = format!("{} timestamp(s) from bit {}", timestamps.len(), args.bit);
    let empty = timestamps.is_empty();
    emit(
        global,
        log,
        "timestamps",
        serde_json::json!({ "bit": args.bit, "timestamps": timestamps }),
        summary,
    );
    outcome(empty)
}

fn run_events(global: &GlobalOpts, log: &LogContext, args: &EventsArgs) -> ExitCode {
    let holder = match open(global, log) {
        Ok((_, holder)) => holder,
        Err(code) => return code,
    };
    let (start, end) = args.range.bounds();
    let events = holder.get_events(start, end, &args.filter(), args.range.bit);
    let summary = format!("{} event(s) from bit {}", events.len(), args.range.bit);
    let empty = events.is_empty();
    emit(
        global,
        log,
        "events",
        serde_json::json!({ "bit": args.range.bit, "events": events }),
        summary,
    );
    outcome(empty)
}

fn run_event(global: &GlobalOpts, log: &LogContext, args: &EventArgs) -> ExitCode {
    let holder = match open(global, log) {
        Ok((_, holder)) => holder,
        Err(code) => return code,
    };
    let event = holder.get_event_by_id(EventId(args.id), args.bit);
    let summary = match &event {
        Some(event) => format!(
            "event {} at {}: severity {} ({}) acked={}",
            event.id,
            event.timestamp,
            event.severity,
            event.severity_band(),
            event.is_acknowledged()
        ),
        None => format!("event {} not found in bit {}", args.id, args.bit),
    };
    let empty = event.is_none();
    emit(
        global,
        log,
        "event",
        serde_json::json!({ "bit": args.bit, "event": event }),
        summary,
    );
    outcome(empty)
}

fn run_ack(global: &GlobalOpts, log: &LogContext, args: &AckArgs) -> ExitCode {
    let (loaded, holder) = match open(global, log) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let timestamp = args.at.unwrap_or_else(Utc::now);
    let mut service =
        AcquisitionService::new(Arc::new(holder), log.clone(), loaded.config.heartbeat());
    let applied = service.ack_event(EventId(args.id), timestamp, args.user);
    service.stop();
    let summary = format!("event {} acknowledged in {} archive(s)", args.id, applied);
    emit(
        global,
        log,
        "ack",
        serde_json::json!({
            "id": args.id,
            "user_id": args.user,
            "timestamp": timestamp,
            "archives": applied,
        }),
        summary,
    );
    outcome(applied == 0)
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "ae_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    match global.format {
        OutputFormat::Json => print_json(&version_info, true),
        OutputFormat::Jsonl => print_json(&version_info, false),
        OutputFormat::Summary => {
            println!("ae-core {}", env!("CARGO_PKG_VERSION"));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Load the configuration and register its archives.
fn open(global: &GlobalOpts, log: &LogContext) -> Result<(LoadedConfig, ArchiveHolder), ExitCode> {
    let loaded = load_archive_config(global.config.as_deref(), log).map_err(|err| {
        output_error(global, &err);
        ExitCode::for_error(&err)
    })?;
    let holder = start_holder(&loaded.config, log).map_err(|err| {
        output_error(global, &err);
        ExitCode::for_error(&err)
    })?;
    Ok((loaded, holder))
}

fn outcome(empty: bool) -> ExitCode {
    if empty {
        ExitCode::Empty
    } else {
        ExitCode::Clean
    }
}

/// Print a command payload on stdout in the requested format.
fn emit(
    global: &GlobalOpts,
    log: &LogContext,
    command: &str,
    payload: serde_json::Value,
    summary: String,
) {
    match global.format {
        OutputFormat::Summary => println!("[{}] {}", log.run_id, summary),
        format => {
            let mut response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": log.run_id,
                "generated_at": Utc::now().to_rfc3339(),
                "command": command,
            });
            if let (Some(target), serde_json::Value::Object(fields)) =
                (response.as_object_mut(), payload)
            {
                target.extend(fields);
            }
            print_json(&response, format == OutputFormat::Json);
        }
    }
}

fn print_json(value: &serde_json::Value, pretty: bool) {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match text {
        Ok(text) => println!("{}", text),
        Err(err) => eprintln!("failed to serialize output: {}", err),
    }
}

/// Print an error on stderr in the requested format.
fn output_error(global: &GlobalOpts, err: &Error) {
    match global.format {
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(err, false));
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            let structured = StructuredError::from(err);
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "error",
                "headline": err.headline(),
                "error": structured,
                "remediation": err.remediation(),
            });
            match serde_json::to_string(&response) {
                Ok(text) => eprintln!("{}", text),
                Err(_) => eprintln!("{}", structured.to_json()),
            }
        }
    }
}
