//! Serial source: newline-delimited ASCII identifiers from a USB reader.
//!
//! The reader prints one identifier per line. Anything that is not 8 to 32 hex
//! characters is noise and is dropped. Failure to find or open the port, and
//! any read error or close, leave the source inactive for the rest of the
//! process; there is no reconnect.

use crate::broadcast::Broadcaster;
use crate::event::{Device, NormalizedEvent};
use crate::identifier::Identifier;
use crate::rate_limit::SharedRateLimiter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

/// Default reader baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Longest line kept in memory. A valid line is at most 32 hex characters
/// plus CR/LF; anything longer is discarded up to the next newline.
pub const MAX_LINE_LEN: usize = 64;

static SERIAL_UID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-F]{8,32}$").expect("valid identifier pattern"));

/// Port naming patterns tried in order when no port is configured:
/// macOS/Linux `tty.*`, macOS `cu.*`, Windows `COMn`.
static PORT_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)tty\.").expect("valid port pattern"),
        Regex::new(r"(?i)cu\.").expect("valid port pattern"),
        Regex::new(r"(?i)COM\d+").expect("valid port pattern"),
    ]
});

/// Errors that deactivate the serial source.
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("no serial port found")]
    NoPort,
    #[error("failed to list serial ports: {0}")]
    Enumerate(String),
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("serial read error: {0}")]
    Io(#[from] io::Error),
    #[allow(dead_code)]
    #[error("serial support not available (not compiled in)")]
    NotAvailable,
}

/// Where and how to open the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Explicit device path; auto-discovered when `None`
    pub port: Option<String>,
    pub baud_rate: u32,
}

/// Normalize one reader line into an identifier.
///
/// Carriage returns are removed, whitespace trimmed and the rest uppercased.
/// Returns `None` unless the result is 8 to 32 hex characters.
///
/// # Example
/// ```
/// use tag_bridge::source::serial::parse_line;
///
/// assert_eq!(parse_line("1a2b3c4d\r").unwrap().as_str(), "1A2B3C4D");
/// assert!(parse_line("1a2b3c").is_none());
/// ```
pub fn parse_line(line: &str) -> Option<Identifier> {
    let uid = line.replace('\r', "").trim().to_ascii_uppercase();
    SERIAL_UID
        .is_match(&uid)
        .then(|| Identifier::from_normalized(uid))
}

/// Choose a port from the names the OS reports.
pub fn pick_port<S: AsRef<str>>(ports: &[S]) -> Option<String> {
    PORT_PATTERNS
        .iter()
        .find_map(|pattern| ports.iter().find(|p| pattern.is_match(p.as_ref())))
        .or_else(|| ports.first())
        .map(|p| p.as_ref().to_string())
}

/// Turns reader lines into `nfc` events.
#[derive(Debug, Clone)]
pub struct SerialAdapter {
    limiter: SharedRateLimiter,
    broadcaster: Broadcaster,
}

impl SerialAdapter {
    pub fn new(limiter: SharedRateLimiter, broadcaster: Broadcaster) -> Self {
        Self {
            limiter,
            broadcaster,
        }
    }

    /// Process one line, publishing and returning the event if accepted.
    pub fn handle_line(&self, line: &str) -> Option<NormalizedEvent> {
        let id = parse_line(line)?;
        if !self.limiter.accept(id.as_str()) {
            debug!(%id, "serial sighting rate limited");
            return None;
        }

        info!(%id, "serial NFC UID");
        let event = NormalizedEvent::now(id, Device::Serial);
        self.broadcaster.publish_nfc(event.clone());
        Some(event)
    }

    /// Read lines until end of stream or the first read error.
    ///
    /// Bytes that are not valid UTF-8 are replaced and then fail validation,
    /// so binary garbage on the line never stops the reader. Lines longer
    /// than [`MAX_LINE_LEN`] are dropped without being buffered whole.
    pub async fn run<R: AsyncRead + Unpin>(&self, reader: R) -> Result<(), SerialError> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(MAX_LINE_LEN);
        let mut discarding = false;

        loop {
            buf.clear();
            let n = (&mut reader)
                .take(MAX_LINE_LEN as u64)
                .read_until(b'\n', &mut buf)
                .await?;
            if n == 0 {
                return Ok(());
            }

            let terminated = buf.last() == Some(&b'\n');
            if discarding {
                discarding = !terminated;
                continue;
            }
            if !terminated && n == MAX_LINE_LEN {
                debug!("dropping overlong serial line");
                discarding = true;
                continue;
            }
            self.handle_line(&String::from_utf8_lossy(&buf));
        }
    }
}

/// Find, open and read the serial reader until it fails or closes.
///
/// Never returns an error: every failure is logged and the source simply
/// becomes inactive, leaving the other sources running.
pub async fn start(config: SerialConfig, adapter: SerialAdapter) {
    match open_and_run(&config, &adapter).await {
        Ok(()) => warn!("serial port closed, serial bridge inactive"),
        Err(e) => warn!(error = %e, "serial bridge inactive"),
    }
}

#[cfg(feature = "serial")]
async fn open_and_run(config: &SerialConfig, adapter: &SerialAdapter) -> Result<(), SerialError> {
    use tokio_serial::SerialPortBuilderExt;

    let path = match &config.port {
        Some(path) => path.clone(),
        None => {
            let ports = tokio_serial::available_ports()
                .map_err(|e| SerialError::Enumerate(e.to_string()))?;
            let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
            pick_port(&names).ok_or(SerialError::NoPort)?
        }
    };

    let port = tokio_serial::new(&path, config.baud_rate)
        .open_native_async()
        .map_err(|e| SerialError::Open {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    info!(%path, baud_rate = config.baud_rate, "serial port opened");

    adapter.run(port).await
}

#[cfg(not(feature = "serial"))]
async fn open_and_run(_config: &SerialConfig, _adapter: &SerialAdapter) -> Result<(), SerialError> {
    Err(SerialError::NotAvailable)
}
