//! Hub configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable                    | Default                                      |
//! |-----------------------------|----------------------------------------------|
//! | `LISTEN_ADDR`               | `0.0.0.0:6970`                               |
//! | `STATION_TOKENS`            | empty; `token=station[:name]`, comma list    |
//! | `POLLER_STATION`            | first configured station                     |
//! | `PRINTER_PORT`              | unset (no printer)                           |
//! | `PRINTER_BAUD`              | `9600`                                       |
//! | `PRINTER_TIMEOUT_MS`        | `1000`                                       |
//! | `PRINTER_DRAWER_OPEN_HIGH`  | `true`                                       |
//! | `PRINTER_RETRIES`           | `20`                                         |
//! | `PRINTER_RETRY_DELAY_MS`    | `1000`                                       |
//! | `DRAWER_POLL_SECS`          | `1`                                          |
//! | `SAT_POLL_SECS`             | `300`                                        |
//! | `PINPAD_POLL_SECS`          | `60`                                         |
//! | `TELEMETRY_POLL_SECS`       | `3600`                                       |
//! | `TILL_CHECK_HOUR`           | `6`                                          |
//! | `TILL_CHECK_TOLERANCE_SECS` | `0`                                          |
//! | `NO_TILL_OPERATIONS`        | `StartTefSaleSummaryEvent,StartTefAdminEvent`|
//! | `DEVELOPER_MODE`            | `false`                                      |
//! | `LOG_FORMAT`                | `text`; `json` for JSON lines                |

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::device::SerialPrinterConfig;
use crate::domain::{Station, StationId};
use crate::service::pollers::PollerSettings;
use crate::service::tef_service::{DEFAULT_NO_TILL_OPERATIONS, DEFAULT_PRINTER_RETRIES};
use crate::service::TefSettings;

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` is not a socket address.
    #[error("invalid LISTEN_ADDR: {0}")]
    ListenAddr(#[from] std::net::AddrParseError),

    /// A `STATION_TOKENS` entry is malformed.
    #[error("invalid STATION_TOKENS entry `{0}`, expected token=station[:name]")]
    StationToken(String),

    /// `TILL_CHECK_HOUR` is not an hour of the day.
    #[error("TILL_CHECK_HOUR must be between 0 and 23, got {0}")]
    TillCheckHour(u32),
}

/// Top-level hub configuration.
///
/// Loaded once at startup via [`HubConfig::from_env`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Stations keyed by access token.
    pub stations: Vec<(String, Station)>,

    /// Station the background pollers report to.
    pub poller_station: Option<StationId>,

    /// Serial printer, when one is attached.
    pub printer: Option<SerialPrinterConfig>,

    /// Reconnection attempts when a printer check fails.
    pub printer_retries: u32,

    /// Pause between reconnection attempts.
    pub printer_retry_delay: Duration,

    /// Drawer poll period.
    pub drawer_poll: Duration,

    /// SAT poll period.
    pub sat_poll: Duration,

    /// Pinpad poll period.
    pub pinpad_poll: Duration,

    /// Telemetry report period.
    pub telemetry_poll: Duration,

    /// Hour of day a new working day starts.
    pub till_check_hour: u32,

    /// Extra wait after `till_check_hour`.
    pub till_check_tolerance: Duration,

    /// Operations that run without an open till.
    pub no_till_operations: HashSet<String>,

    /// Disables telemetry.
    pub developer_mode: bool,

    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl HubConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a present value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:6970".to_string())
            .parse()?;

        let stations = parse_station_tokens(&lookup("STATION_TOKENS").unwrap_or_default())?;
        let poller_station = lookup("POLLER_STATION")
            .filter(|s| !s.trim().is_empty())
            .map(|s| StationId::new(s.trim()))
            .or_else(|| stations.first().map(|(_, station)| station.id.clone()));

        let printer = lookup("PRINTER_PORT")
            .filter(|port| !port.trim().is_empty())
            .map(|port| SerialPrinterConfig {
                port: port.trim().to_string(),
                baud_rate: parse_env(&lookup, "PRINTER_BAUD", 9600),
                timeout: Duration::from_millis(parse_env(&lookup, "PRINTER_TIMEOUT_MS", 1000)),
                drawer_open_when_high: parse_env_bool(&lookup, "PRINTER_DRAWER_OPEN_HIGH", true),
            });

        let till_check_hour = parse_env(&lookup, "TILL_CHECK_HOUR", 6);
        if till_check_hour > 23 {
            return Err(ConfigError::TillCheckHour(till_check_hour));
        }

        let no_till_operations = lookup("NO_TILL_OPERATIONS").map_or_else(
            || DEFAULT_NO_TILL_OPERATIONS.iter().map(ToString::to_string).collect(),
            |list| parse_list(&list),
        );

        Ok(Self {
            listen_addr,
            stations,
            poller_station,
            printer,
            printer_retries: parse_env(&lookup, "PRINTER_RETRIES", DEFAULT_PRINTER_RETRIES),
            printer_retry_delay: Duration::from_millis(parse_env(
                &lookup,
                "PRINTER_RETRY_DELAY_MS",
                1000,
            )),
            drawer_poll: Duration::from_secs(parse_env(&lookup, "DRAWER_POLL_SECS", 1)),
            sat_poll: Duration::from_secs(parse_env(&lookup, "SAT_POLL_SECS", 300)),
            pinpad_poll: Duration::from_secs(parse_env(&lookup, "PINPAD_POLL_SECS", 60)),
            telemetry_poll: Duration::from_secs(parse_env(&lookup, "TELEMETRY_POLL_SECS", 3600)),
            till_check_hour,
            till_check_tolerance: Duration::from_secs(parse_env(
                &lookup,
                "TILL_CHECK_TOLERANCE_SECS",
                0,
            )),
            no_till_operations,
            developer_mode: parse_env_bool(&lookup, "DEVELOPER_MODE", false),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }

    /// Settings for the TEF flow.
    #[must_use]
    pub fn tef_settings(&self) -> TefSettings {
        TefSettings {
            no_till_operations: self.no_till_operations.clone(),
            printer_retries: self.printer_retries,
        }
    }

    /// Settings for the pollers, or `None` when no station is configured.
    #[must_use]
    pub fn poller_settings(&self) -> Option<PollerSettings> {
        self.poller_station.clone().map(|station| PollerSettings {
            station,
            drawer_period: self.drawer_poll,
            sat_period: self.sat_poll,
            pinpad_period: self.pinpad_poll,
            telemetry_period: self.telemetry_poll,
            till_check_hour: self.till_check_hour,
            till_check_tolerance: self.till_check_tolerance,
            developer_mode: self.developer_mode,
        })
    }
}

/// Parses `token=station[:name]` entries separated by commas.
///
/// # Errors
///
/// Returns [`ConfigError::StationToken`] for an entry without a token or
/// station id.
pub fn parse_station_tokens(raw: &str) -> Result<Vec<(String, Station)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (token, station) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::StationToken(entry.to_string()))?;
            let (id, name) = station.split_once(':').unwrap_or((station, station));
            let (token, id, name) = (token.trim(), id.trim(), name.trim());
            if token.is_empty() || id.is_empty() {
                return Err(ConfigError::StationToken(entry.to_string()));
            }
            Ok((token.to_string(), Station::new(id, name)))
        })
        .collect()
}

fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
