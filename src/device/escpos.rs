//! ESC/POS receipt printer on a serial port.
//!
//! [`SerialPrinterManager`] is the hub's own [`DeviceManager`] for
//! deployments with a serial thermal printer. The port is opened lazily on
//! first use, cached, and closed when the supervisor discards it after a
//! fault. Serial I/O is blocking, so every exchange runs on the blocking pool.

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;

use super::{DeviceFault, DeviceManager, Printer};
use crate::domain::StationId;

// ---------------------------------------------------------------------------
// ESC/POS commands
// ---------------------------------------------------------------------------

/// `DLE EOT 1`: transmit printer status.
const STATUS_REQUEST: [u8; 3] = [0x10, 0x04, 0x01];

/// `ESC p 0 t1 t2`: pulse on pin 2, 50 ms on, 500 ms off.
const DRAWER_KICK: [u8; 5] = [0x1B, 0x70, 0x00, 0x19, 0xFA];

/// `GS V A 16`: feed and partial cut.
const PARTIAL_CUT: [u8; 4] = [0x1D, 0x56, 0x41, 0x10];

/// Bits of the printer status byte that are fixed by the protocol.
const STATUS_FIXED_MASK: u8 = 0b1001_0011;
/// Expected value of the fixed bits (bit 1 and bit 4 set).
const STATUS_FIXED_VALUE: u8 = 0b0001_0010;
/// Drawer kick-out connector pin 3 level.
const STATUS_DRAWER_BIT: u8 = 0b0000_0100;

/// Decodes the reply to `DLE EOT 1` into the drawer-open flag.
///
/// # Errors
///
/// Returns [`DeviceFault::InvalidReply`] when the fixed bits do not match.
pub fn drawer_open_from_status(status: u8, open_when_high: bool) -> Result<bool, DeviceFault> {
    if status & STATUS_FIXED_MASK != STATUS_FIXED_VALUE {
        return Err(DeviceFault::InvalidReply(format!(
            "unexpected status byte {status:#04x}"
        )));
    }
    let high = status & STATUS_DRAWER_BIT != 0;
    Ok(high == open_when_high)
}

/// Encodes a text block for the printer: Latin-1 where possible, `?`
/// otherwise, with `\n` line endings and a trailing line feed.
#[must_use]
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text
        .chars()
        .filter(|c| *c != '\r')
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    if bytes.last() != Some(&b'\n') {
        bytes.push(b'\n');
    }
    bytes
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Serial settings of the receipt printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPrinterConfig {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
    /// Whether a high drawer pin level means "open".
    pub drawer_open_when_high: bool,
}

// ---------------------------------------------------------------------------
// Printer handle
// ---------------------------------------------------------------------------

/// Serial connection to an ESC/POS printer.
///
/// Handles are shared, so closing the port empties the slot for every
/// holder and later exchanges fail with [`DeviceFault::Disconnected`].
pub struct SerialPrinter {
    port_name: String,
    port: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
    drawer_open_when_high: bool,
}

impl fmt::Debug for SerialPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPrinter")
            .field("port", &self.port_name)
            .field("drawer_open_when_high", &self.drawer_open_when_high)
            .finish_non_exhaustive()
    }
}

impl SerialPrinter {
    /// Opens the configured serial port.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceFault::Serial`] if the port cannot be opened.
    pub async fn open(config: &SerialPrinterConfig) -> Result<Self, DeviceFault> {
        let name = config.port.clone();
        let baud_rate = config.baud_rate;
        let timeout = config.timeout;
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&name, baud_rate).timeout(timeout).open()
        })
        .await
        .map_err(|e| DeviceFault::Serial(format!("open task failed: {e}")))?
        .map_err(|e| {
            DeviceFault::Serial(format!(
                "failed to open {} @ {baud_rate}: {e}",
                config.port
            ))
        })?;

        tracing::info!(port = %config.port, baud = baud_rate, "printer port opened");
        Ok(Self {
            port_name: config.port.clone(),
            port: Arc::new(Mutex::new(Some(port))),
            drawer_open_when_high: config.drawer_open_when_high,
        })
    }

    /// Writes `command` and reads exactly `reply_len` bytes back.
    async fn exchange(&self, command: Vec<u8>, reply_len: usize) -> Result<Vec<u8>, DeviceFault> {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut slot = port.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(port) = slot.as_mut() else {
                return Err(DeviceFault::Disconnected);
            };
            port.write_all(&command)
                .and_then(|()| port.flush())
                .map_err(|e| DeviceFault::Serial(format!("write failed: {e}")))?;
            let mut reply = vec![0u8; reply_len];
            port.read_exact(&mut reply)
                .map_err(|e| DeviceFault::Serial(format!("read failed: {e}")))?;
            Ok(reply)
        })
        .await
        .map_err(|e| DeviceFault::Serial(format!("serial task failed: {e}")))?
    }

    /// Closes the port, releasing its exclusive lock.
    ///
    /// Waits for an exchange in flight to finish first.
    pub async fn close(&self) {
        let port = Arc::clone(&self.port);
        let closed = tokio::task::spawn_blocking(move || {
            port.lock().unwrap_or_else(PoisonError::into_inner).take().is_some()
        })
        .await;
        match closed {
            Ok(true) => tracing::info!(port = %self.port_name, "printer port closed"),
            Ok(false) => {}
            Err(e) => tracing::warn!(port = %self.port_name, error = %e, "closing printer port failed"),
        }
    }
}

#[async_trait]
impl Printer for SerialPrinter {
    async fn is_drawer_open(&self) -> Result<bool, DeviceFault> {
        let reply = self.exchange(STATUS_REQUEST.to_vec(), 1).await?;
        let status = reply
            .first()
            .copied()
            .ok_or_else(|| DeviceFault::InvalidReply("empty status reply".to_string()))?;
        drawer_open_from_status(status, self.drawer_open_when_high)
    }

    async fn open_drawer(&self) -> Result<(), DeviceFault> {
        self.exchange(DRAWER_KICK.to_vec(), 0).await.map(|_| ())
    }

    async fn print_line(&self, text: &str) -> Result<(), DeviceFault> {
        self.exchange(encode_line(text), 0).await.map(|_| ())
    }

    async fn cut_paper(&self) -> Result<(), DeviceFault> {
        self.exchange(PARTIAL_CUT.to_vec(), 0).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Device manager
// ---------------------------------------------------------------------------

/// Device manager for a single serial printer shared by all stations.
#[derive(Debug)]
pub struct SerialPrinterManager {
    config: Option<SerialPrinterConfig>,
    cached: tokio::sync::Mutex<Option<Arc<SerialPrinter>>>,
}

impl SerialPrinterManager {
    /// Creates a manager; `None` means no printer is configured.
    #[must_use]
    pub fn new(config: Option<SerialPrinterConfig>) -> Self {
        Self {
            config,
            cached: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl DeviceManager for SerialPrinterManager {
    async fn printer_configured(&self, _station: &StationId) -> bool {
        self.config.is_some()
    }

    async fn printer(&self) -> Result<Option<Arc<dyn Printer>>, DeviceFault> {
        let Some(config) = &self.config else {
            return Ok(None);
        };
        let mut cached = self.cached.lock().await;
        if let Some(printer) = cached.as_ref() {
            return Ok(Some(Arc::clone(printer) as Arc<dyn Printer>));
        }
        let printer = Arc::new(SerialPrinter::open(config).await?);
        *cached = Some(Arc::clone(&printer));
        Ok(Some(printer as Arc<dyn Printer>))
    }

    async fn discard_printer(&self) {
        let discarded = self.cached.lock().await.take();
        if let Some(printer) = discarded {
            printer.close().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_with_pin_low_is_closed_when_open_high() {
        assert!(matches!(drawer_open_from_status(0x12, true), Ok(false)));
    }

    #[test]
    fn status_with_pin_high_is_open_when_open_high() {
        assert!(matches!(drawer_open_from_status(0x16, true), Ok(true)));
    }

    #[test]
    fn inverted_drawer_polarity() {
        assert!(matches!(drawer_open_from_status(0x12, false), Ok(true)));
        assert!(matches!(drawer_open_from_status(0x16, false), Ok(false)));
    }

    #[test]
    fn other_status_bits_are_ignored() {
        // Offline (bit 3) and paper-feed (bit 6) do not affect the drawer.
        assert!(matches!(drawer_open_from_status(0x1E, true), Ok(true)));
        assert!(matches!(drawer_open_from_status(0x52, true), Ok(false)));
    }

    #[test]
    fn malformed_status_is_invalid_reply() {
        assert!(matches!(
            drawer_open_from_status(0xFF, true),
            Err(DeviceFault::InvalidReply(_))
        ));
        assert!(matches!(
            drawer_open_from_status(0x00, true),
            Err(DeviceFault::InvalidReply(_))
        ));
    }

    #[test]
    fn encode_line_appends_line_feed() {
        assert_eq!(encode_line("ABC"), b"ABC\n".to_vec());
        assert_eq!(encode_line("ABC\n"), b"ABC\n".to_vec());
    }

    #[test]
    fn encode_line_maps_latin1_and_replaces_rest() {
        assert_eq!(encode_line("Cartão"), vec![b'C', b'a', b'r', b't', 0xE3, b'o', b'\n']);
        assert_eq!(encode_line("€1\r\n"), b"?1\n".to_vec());
    }

    #[tokio::test]
    async fn unconfigured_manager_has_no_printer() {
        let manager = SerialPrinterManager::new(None);
        assert!(!manager.printer_configured(&StationId::from("s1")).await);
        assert!(matches!(manager.printer().await, Ok(None)));
    }

    #[tokio::test]
    async fn missing_port_is_serial_fault() {
        let manager = SerialPrinterManager::new(Some(SerialPrinterConfig {
            port: "/dev/pos-device-hub-missing-port".to_string(),
            baud_rate: 9600,
            timeout: Duration::from_millis(100),
            drawer_open_when_high: true,
        }));
        assert!(manager.printer_configured(&StationId::from("s1")).await);
        assert!(matches!(manager.printer().await, Err(DeviceFault::Serial(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn discard_releases_port_held_by_stale_handle() {
        let Ok((mut master, slave)) = serialport::TTYPort::pair() else {
            panic!("pseudo terminal pair");
        };
        let Some(path) = slave.name() else {
            panic!("pseudo terminal has a path");
        };
        let manager = SerialPrinterManager::new(Some(SerialPrinterConfig {
            port: path,
            baud_rate: 9600,
            timeout: Duration::from_secs(2),
            drawer_open_when_high: true,
        }));

        let Ok(Some(stale)) = manager.printer().await else {
            panic!("first open succeeds");
        };
        manager.discard_printer().await;
        assert!(matches!(
            stale.is_drawer_open().await,
            Err(DeviceFault::Disconnected)
        ));

        let Ok(Some(fresh)) = manager.printer().await else {
            panic!("reopen succeeds while the stale handle is alive");
        };
        let printer_side = tokio::task::spawn_blocking(move || {
            let _ = master.set_timeout(Duration::from_secs(2));
            let mut request = [0u8; 3];
            master.read_exact(&mut request)?;
            master.write_all(&[0x16])?;
            master.flush()?;
            Ok::<_, std::io::Error>(request)
        });
        assert!(matches!(fresh.is_drawer_open().await, Ok(true)));
        let Ok(Ok(request)) = printer_side.await else {
            panic!("printer side answered");
        };
        assert_eq!(request, STATUS_REQUEST);
        drop(stale);
        drop(slave);
    }
}
