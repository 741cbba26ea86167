//! Serial barcode scanner reader.
//!
//! The scanner sends each barcode as plain text terminated by CR and/or LF.
//! The reader keeps the most recent serial number in a `watch` channel so
//! the monitor can stamp each record with whatever unit was scanned last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::monitor::MonitorEvent;

/// Upper bound on a single barcode; longer input is treated as line noise.
pub const MAX_BARCODE_LEN: usize = 128;

/// Splits a byte stream into barcodes.
#[derive(Debug, Clone, Default)]
pub struct BarcodeAssembler {
    buffer: Vec<u8>,
    // set once input overruns MAX_BARCODE_LEN, cleared by the next terminator
    discarding: bool,
}

impl BarcodeAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte; returns a barcode when a terminator completes one.
    pub fn push_byte(&mut self, byte: u8) -> Option<String> {
        if byte == b'\n' || byte == b'\r' {
            if std::mem::take(&mut self.discarding) || self.buffer.is_empty() {
                return None;
            }
            let decoded = decode_lossy(&self.buffer);
            self.buffer.clear();
            let barcode = decoded.trim();
            return (!barcode.is_empty()).then(|| barcode.to_string());
        }

        if self.discarding {
            return None;
        }
        if self.buffer.len() >= MAX_BARCODE_LEN {
            warn!(len = self.buffer.len(), "Barcode too long, discarding until end of line");
            self.buffer.clear();
            self.discarding = true;
            return None;
        }
        self.buffer.push(byte);
        None
    }

    /// Feeds a chunk; returns every barcode it completed.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|b| self.push_byte(*b)).collect()
    }
}

/// Decodes UTF-8, dropping invalid sequences instead of replacing them.
pub(crate) fn decode_lossy(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Reads barcodes from `source` until it ends or `running` is cleared.
///
/// Each barcode replaces the value in `latest` and is reported on `events`.
pub async fn run_scanner<R>(
    mut source: R,
    latest: watch::Sender<Option<String>>,
    events: mpsc::Sender<MonitorEvent>,
    running: Arc<AtomicBool>,
    poll: Duration,
) where
    R: AsyncRead + Unpin + Send,
{
    info!("Barcode scanner reader started");
    let mut assembler = BarcodeAssembler::new();
    let mut chunk = [0u8; 64];

    while running.load(Ordering::SeqCst) {
        let n = match tokio::time::timeout(poll, source.read(&mut chunk)).await {
            Err(_) => continue,
            Ok(Ok(0)) => {
                debug!("Barcode scanner stream ended");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, "Barcode scanner read error");
                let _ = events
                    .send(MonitorEvent::Error(format!("Scanner read error: {}", e)))
                    .await;
                break;
            }
        };

        for barcode in assembler.push_bytes(&chunk[..n]) {
            info!(barcode = %barcode, "Scanned barcode");
            latest.send_replace(Some(barcode.clone()));
            let _ = events.send(MonitorEvent::SerialScanned(barcode)).await;
        }
    }
    info!("Barcode scanner reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cr_lf_terminates_barcode() {
        let mut a = BarcodeAssembler::new();
        assert_eq!(a.push_bytes(b"AM60-000123\r\n"), vec!["AM60-000123"]);
    }

    #[test]
    fn empty_lines_are_ignored() {
        let mut a = BarcodeAssembler::new();
        assert!(a.push_bytes(b"\r\n\n  \r").is_empty());
    }

    #[test]
    fn barcode_split_across_chunks() {
        let mut a = BarcodeAssembler::new();
        assert!(a.push_bytes(b"SN-00").is_empty());
        assert_eq!(a.push_bytes(b"42\nSN-43\n"), vec!["SN-0042", "SN-43"]);
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let mut a = BarcodeAssembler::new();
        assert_eq!(a.push_bytes(b"SN\xff-7\n"), vec!["SN-7"]);
    }

    #[test]
    fn overlong_input_is_discarded() {
        let mut a = BarcodeAssembler::new();
        let mut noise = vec![b'#'; MAX_BARCODE_LEN + 12];
        noise.extend_from_slice(b"\r\n");
        assert!(a.push_bytes(&noise).is_empty());

        // the next line is read normally
        assert_eq!(a.push_bytes(b"AM60-000200\n"), vec!["AM60-000200"]);
    }

    #[test]
    fn barcode_at_length_limit_is_kept() {
        let mut a = BarcodeAssembler::new();
        let mut input = vec![b'7'; MAX_BARCODE_LEN];
        input.push(b'\r');
        let got = a.push_bytes(&input);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].len(), MAX_BARCODE_LEN);
    }

    #[test]
    fn literal_replacement_char_survives_decoding() {
        let bytes = "SN-\u{FFFD}-9".as_bytes();
        assert_eq!(decode_lossy(bytes), "SN-\u{FFFD}-9");
        assert_eq!(decode_lossy(b"SN-\xc3-9"), "SN--9");
    }

    #[tokio::test]
    async fn scanner_publishes_latest_serial() {
        let (latest_tx, latest_rx) = watch::channel(None);
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let running = Arc::new(AtomicBool::new(true));

        run_scanner(
            &b"SN-1\rSN-2\r"[..],
            latest_tx,
            events_tx,
            running,
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(latest_rx.borrow().as_deref(), Some("SN-2"));
        let mut scanned = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            if let MonitorEvent::SerialScanned(s) = event {
                scanned.push(s);
            }
        }
        assert_eq!(scanned, vec!["SN-1", "SN-2"]);
    }
}
