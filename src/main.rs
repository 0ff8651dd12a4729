use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use ticketscan::console::{EventPrinter, OperatorConsole, HELP};
use ticketscan::{
    ConsoleFeedback, EventBus, EventFilter, EventReceiver, FeedbackEmitter, PermissionQuery,
    SessionControllerBuilder, SimulatedDecoderService, SimulatedPermissions, TicketScanConfig,
};
use ticketscan::feedback::{HapticOutput, ToneOutput};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "ticketscan")]
#[command(about = "Continuous QR ticket check-in scanner session")]
#[command(version)]
#[command(long_about = "Runs a ticket check-in scanning session against a simulated camera. \
Type ticket codes to present them to the camera; lines starting with ':' are operator and \
environment commands (:help lists them). Session events are printed to stdout, logs go to stderr.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ticketscan.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Print session events as JSON lines
    #[arg(long, help = "Print session events as JSON lines instead of text")]
    json_events: bool,

    /// Do not ring the terminal bell for scan outcomes
    #[arg(long, help = "Disable the terminal bell used as audio feedback")]
    no_bell: bool,

    /// Initial answer of the simulated camera permission query
    #[arg(long, value_name = "STATE", default_value = "prompt", value_parser = parse_permission)]
    permission: PermissionQuery,
}

fn parse_permission(value: &str) -> std::result::Result<PermissionQuery, String> {
    match value.to_ascii_lowercase().as_str() {
        "granted" => Ok(PermissionQuery::Granted),
        "denied" => Ok(PermissionQuery::Denied),
        "prompt" => Ok(PermissionQuery::Prompt),
        "unsupported" => Ok(PermissionQuery::Unsupported),
        other => Err(format!(
            "unknown permission state '{}' (granted, denied, prompt, unsupported)",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let guard = init_logging(&args)?;

    info!("Starting ticketscan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match TicketScanConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let decoder = Arc::new(SimulatedDecoderService::with_resolution(
        config.decoder.viewport,
    ));
    let permissions = Arc::new(SimulatedPermissions::new(args.permission));

    let backend = Arc::new(ConsoleFeedback::new(!args.no_bell));
    let tones: Arc<dyn ToneOutput> = backend.clone();
    let haptics: Arc<dyn HapticOutput> = backend;
    let feedback = FeedbackEmitter::new(config.feedback.clone(), Some(tones), Some(haptics));

    let mut controller = SessionControllerBuilder::new()
        .config(config.clone())
        .decoder(decoder.clone())
        .permissions(permissions.clone())
        .feedback(feedback)
        .event_bus(Arc::clone(&event_bus))
        .build()
        .map_err(|e| {
            error!("Failed to create scanning session: {}", e);
            e
        })?;

    let shutdown = CancellationToken::new();
    let snapshots = controller.watch_snapshots();

    let printer = EventPrinter::new(
        EventReceiver::new(event_bus.subscribe(), EventFilter::All, "stdout".to_string()),
        args.json_events,
    );
    let printer_task = tokio::spawn(printer.run(shutdown.clone()));

    let (inputs, session_task) =
        controller.spawn(config.system.input_queue_capacity, shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_token.cancel();
        }
    });

    if !args.json_events {
        println!("{}", HELP);
    }

    let console = OperatorConsole::new(inputs, decoder, permissions, snapshots, shutdown.clone());
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    if let Err(e) = console.run(stdin).await {
        error!("Operator console failed: {}", e);
        shutdown.cancel();
    }

    let session_result = session_task.await?;
    printer_task.await?;

    if let Err(e) = &session_result {
        error!("Scanning session ended with error: {}", e);
    }
    info!("ticketscan stopped");

    // Stdin may still be blocked in a read; flush logs and exit explicitly
    drop(guard);
    std::process::exit(if session_result.is_ok() { 0 } else { 1 });
}

fn init_logging(args: &Args) -> Result<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ticketscan={}", log_level)));

    // stdout carries session events, so logs go to stderr
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(false)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .compact()
                .with_writer(writer)
                .with_target(false)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# ticketscan configuration file");
    println!("# Every key is optional; values below are the built-in defaults.");
    println!("# Environment overrides use TICKETSCAN__<SECTION>__<KEY>.");
    println!();
    println!("{}", toml::to_string_pretty(&TicketScanConfig::default())?);
    Ok(())
}
