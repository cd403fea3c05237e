use anyhow::Result;
use camrelay::{RelayApp, RelayConfig};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "camrelay")]
#[command(about = "IP camera still-image proxy and MJPEG relay")]
#[command(version)]
#[command(long_about = "Proxies still images from configured IP cameras, re-streams them to \
clients as MJPEG, and publishes camera, download-manager and switch states over a small \
HTTP API.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camrelay.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the relay")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Print the effective configuration and exit
    #[arg(long, help = "Print the loaded configuration, with secrets masked, and exit")]
    show_config: bool,

    /// Build every entity but don't start serving
    #[arg(long, help = "Perform dry run - build entities but don't start the server")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting camrelay v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match RelayConfig::load_from_file(&args.config) {
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

    if args.show_config {
        println!("{}", config.to_redacted_toml()?);
        return Ok(());
    }

    if args.validate_config {
        println!(
            "✓ Configuration is valid ({} cameras, {} sensor platforms, {} switch platforms)",
            config.cameras.len(),
            config.sensors.len(),
            config.switches.len()
        );
        return Ok(());
    }

    let mut app = RelayApp::new(config).await.map_err(|e| {
        error!("Failed to create relay: {}", e);
        e
    })?;

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize relay: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - entities built but server not started");
        println!("✓ Dry run completed successfully");
        return Ok(());
    }

    app.start().await.map_err(|e| {
        error!("Failed to start relay: {}", e);
        e
    })?;

    let exit_code = app.run().await.map_err(|e| {
        error!("Relay error during execution: {}", e);
        e
    })?;

    info!("camrelay exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
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

    // Request traces come from tower-http under its own target
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("camrelay={},tower_http={}", log_level, log_level))
    });

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# camrelay configuration file");
    println!("# Every key can be overridden with CAMRELAY_<SECTION>__<KEY>, e.g. CAMRELAY_SERVER__PORT");
    println!();

    let default_config = r#"[server]
# Address and port to listen on
ip = "0.0.0.0"
port = 8123
# Required on every /api request except /api/health when set, via the
# X-HA-Access header or the api_password query parameter
# api_password = "change-me"

[system]
# Seconds between sensor and switch polls
refresh_interval_seconds = 30
# Seconds a switch ignores polled status after a command
switch_debounce_seconds = 5
# Capacity of the state change broadcast channel
state_bus_capacity = 100

[[cameras]]
name = "Front Door"
base_url = "http://10.0.0.5:80/"
username = "admin"
password = "secret"
# "generic" or "dlink"; derived from brand when omitted
# platform = "dlink"
# brand = "dlink"
# model = "dcs-930l"
# Relative to base_url
# still_image_url = "image.jpg"

# [[sensors]]
# platform = "sabnzbd"
# name = "SABnzbd"
# base_url = "http://192.168.1.20:8080/"
# api_key = "0123456789abcdef"
# monitored_variables = [
#   { type = "current_status" },
#   { type = "speed" },
#   { type = "queue_size" },
#   { type = "queue_remaining" },
#   { type = "disk_size" },
#   { type = "disk_free" },
# ]

# [[switches]]
# platform = "vera"
# vera_controller_url = "http://192.168.1.30:3480/"
# device_data = [
#   { vera_id = 12, name = "Porch Light" },
#   { vera_id = 13, exclude = true },
# ]
"#;

    println!("{}", default_config);
}
