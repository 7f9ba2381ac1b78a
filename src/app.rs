//! Core application runner for `tag-bridge`.
//!
//! This module is decoupled from process setup (logging, signals, exit codes)
//! so the whole pipeline can be driven in tests with a fake scanner and a
//! loopback listener.

use crate::broadcast::Broadcaster;
use crate::logging::LogFormat;
use crate::rate_limit::parse_duration;
use crate::scanner::{Advertisement, ScanError};
use crate::server::{self, AppState};
use crate::source::ble::{BleAdapter, DEFAULT_COMPANY_ID, parse_company_id};
use crate::source::gateway::GatewayRelay;
use crate::source::serial::{self, DEFAULT_BAUD_RATE, SerialAdapter, SerialConfig};
use crate::source::{LimiterScope, Limiters, RateWindows};
use clap::Parser;
use clap::builder::BoolishValueParser;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Which sources a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Profile {
    /// Radio scanning, serial reader and gateway relay
    #[default]
    Local,
    /// No radio scanning; sightings arrive from gateways (and serial, if enabled)
    GatewayOnly,
}

/// Configuration for the bridge.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Address the subscriber and gateway sockets listen on
    #[arg(long, env = "BRIDGE_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Deployment profile
    #[arg(long, env = "BRIDGE_PROFILE", value_enum, default_value_t)]
    pub profile: Profile,

    /// Scan for BLE beacons (local profile only)
    #[arg(
        long,
        env = "ENABLE_BLE",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        value_name = "BOOL"
    )]
    pub ble: bool,

    /// Manufacturer company id of the beacons, hex (0xFFFF) or decimal
    #[arg(
        long,
        env = "BLE_COMPANY_ID",
        default_value_t = DEFAULT_COMPANY_ID,
        value_parser = parse_company_id
    )]
    pub company_id: u16,

    /// Read identifiers from a serial reader
    #[arg(
        long,
        env = "ENABLE_SERIAL",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        value_name = "BOOL"
    )]
    pub serial: bool,

    /// Serial device path. Auto-discovered when not given.
    #[arg(long, env = "SERIAL_PORT")]
    pub serial_port: Option<String>,

    /// Serial baud rate
    #[arg(long, env = "SERIAL_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub serial_baud: u32,

    /// Shared secret gateways must present. Without it every gateway is refused.
    #[arg(long, env = "GATEWAY_TOKEN", hide_env_values = true)]
    pub gateway_token: Option<String>,

    /// Suppress repeat sightings of a tag within this window.
    /// Accepts duration with suffix: 500ms, 5s, 1m, 2h.
    /// Without suffix, value is interpreted as milliseconds.
    #[arg(long, env = "RATE_WINDOW_MS", default_value = "5000", value_parser = parse_duration)]
    pub rate_window: Duration,

    /// Rate window for BLE sightings (defaults to --rate-window)
    #[arg(long, env = "BLE_RATE_MS", value_parser = parse_duration)]
    pub ble_rate_window: Option<Duration>,

    /// Rate window for serial sightings (defaults to --rate-window)
    #[arg(long, env = "SERIAL_RATE_MS", value_parser = parse_duration)]
    pub serial_rate_window: Option<Duration>,

    /// Rate window for gateway sightings (defaults to --rate-window)
    #[arg(long, env = "GATEWAY_RATE_MS", value_parser = parse_duration)]
    pub gateway_rate_window: Option<Duration>,

    /// Rate limit gateway sightings too
    #[arg(
        long,
        env = "GATEWAY_RATE_LIMIT",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        value_name = "BOOL"
    )]
    pub gateway_rate_limit: bool,

    /// Whether sources share one rate limiter
    #[arg(long, env = "RATE_LIMIT_SCOPE", value_enum, default_value_t)]
    pub limiter_scope: LimiterScope,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,

    /// Verbose output, log dropped sightings and socket activity
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    /// Per-source rate windows, falling back to `--rate-window`.
    pub fn rate_windows(&self) -> RateWindows {
        let base = self.rate_window;
        RateWindows {
            base,
            ble: self.ble_rate_window.unwrap_or(base),
            serial: self.serial_rate_window.unwrap_or(base),
            gateway: self.gateway_rate_window.unwrap_or(base),
        }
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port: self.serial_port.clone(),
            baud_rate: self.serial_baud,
        }
    }
}

/// Errors returned by the run loop.
///
/// Source failures are not among them: a missing radio or serial port only
/// deactivates that source.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to listen on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + '_>>
    {
        Box::pin(crate::scanner::start_scan())
    }
}

/// Bind the configured address and run until `shutdown` resolves.
pub async fn run<F>(options: Options, scanner: &dyn Scanner, shutdown: F) -> Result<(), RunError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = options.listen;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RunError::Bind { addr, source })?;
    run_with(options, scanner, listener, shutdown).await
}

/// Start the enabled sources and serve subscribers on `listener` until
/// `shutdown` resolves.
///
/// - BLE runs in the local profile when enabled; a scanner that fails to
///   start is logged and the bridge carries on without it.
/// - Serial runs when enabled, independent of the profile.
/// - The gateway relay always runs.
pub async fn run_with<F>(
    options: Options,
    scanner: &dyn Scanner,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), RunError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let broadcaster = Broadcaster::default();
    let limiters = Limiters::new(
        options.limiter_scope,
        options.rate_windows(),
        options.gateway_rate_limit,
    );

    if options.profile == Profile::Local && options.ble {
        match scanner.start_scan().await {
            Ok(advertisements) => {
                let adapter =
                    BleAdapter::new(options.company_id, limiters.ble.clone(), broadcaster.clone());
                tokio::spawn(adapter.run(advertisements));
            }
            Err(e) => warn!(error = %e, "BLE bridge inactive"),
        }
    } else {
        info!(profile = ?options.profile, "BLE bridge disabled");
    }

    if options.serial {
        let adapter = SerialAdapter::new(limiters.serial.clone(), broadcaster.clone());
        tokio::spawn(serial::start(options.serial_config(), adapter));
    } else {
        info!("serial bridge disabled");
    }

    let relay = GatewayRelay::new(
        options.gateway_token.clone(),
        limiters.gateway.clone(),
        broadcaster.clone(),
    );
    if !relay.is_configured() {
        warn!("no gateway token configured, gateway connections will be refused");
    }

    let router = server::router(AppState { broadcaster, relay });
    server::serve(listener, router, shutdown).await?;

    info!("relay stopped");
    Ok(())
}
