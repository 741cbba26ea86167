//! Serial port discovery and opening.
//!
//! Both the unit under test and the barcode scanner are plain serial links
//! (8N1, no flow control). Enumeration uses `serialport`, async I/O uses
//! `tokio-serial`. Without the `instrument_serial` feature the functions
//! here report [`BenchError::SerialFeatureDisabled`].

use crate::error::{AppResult, BenchError};
use serde::Serialize;

/// Baud rates offered by the bench.
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [2400, 4800, 9600, 14400, 115200];

/// Baud rate used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// A serial port found on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSummary {
    /// OS device name (e.g. "/dev/ttyUSB0", "COM3")
    pub name: String,
    /// Human-readable description of the port type
    pub kind: String,
}

/// Lists the serial ports present on this machine.
#[cfg(feature = "instrument_serial")]
pub fn list_ports() -> AppResult<Vec<PortSummary>> {
    use serialport::SerialPortType;

    let ports = serialport::available_ports().map_err(|e| BenchError::Serial {
        port: "*".to_string(),
        message: e.to_string(),
    })?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let kind = match &port.port_type {
                SerialPortType::UsbPort(info) => {
                    let mut kind = format!("USB {:04x}:{:04x}", info.vid, info.pid);
                    if let Some(product) = &info.product {
                        kind.push(' ');
                        kind.push_str(product);
                    }
                    kind
                }
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => "Unknown".to_string(),
            };
            PortSummary {
                name: port.port_name,
                kind,
            }
        })
        .collect())
}

/// Lists the serial ports present on this machine.
#[cfg(not(feature = "instrument_serial"))]
pub fn list_ports() -> AppResult<Vec<PortSummary>> {
    Err(BenchError::SerialFeatureDisabled)
}

/// Opens `port` at `baud_rate`, 8N1, no flow control.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "instrument_serial")]
pub fn open_port(port: &str, baud_rate: u32) -> AppResult<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    crate::validation::is_supported_baud(baud_rate).map_err(|e| BenchError::Serial {
        port: port.to_string(),
        message: e.to_string(),
    })?;

    tokio_serial::new(port, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| BenchError::Serial {
            port: port.to_string(),
            message: e.to_string(),
        })
}

/// Opening a port needs the `instrument_serial` feature.
#[cfg(not(feature = "instrument_serial"))]
pub fn open_port(_port: &str, _baud_rate: u32) -> AppResult<tokio::io::Empty> {
    Err(BenchError::SerialFeatureDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_baud_is_supported() {
        assert!(SUPPORTED_BAUD_RATES.contains(&DEFAULT_BAUD_RATE));
    }

    #[cfg(feature = "instrument_serial")]
    #[tokio::test]
    async fn unsupported_baud_is_rejected_before_opening() {
        let err = open_port("/dev/does-not-exist", 57600)
            .err()
            .expect("57600 baud must be rejected");
        assert!(matches!(err, BenchError::Serial { .. }));
        assert!(err.to_string().contains("Baud rate"));
    }

    #[cfg(feature = "instrument_serial")]
    #[tokio::test]
    async fn missing_port_reports_its_name() {
        let err = open_port("/dev/am60-bench-missing", 115200)
            .err()
            .expect("missing port must not open");
        assert!(err.to_string().contains("/dev/am60-bench-missing"));
    }
}
