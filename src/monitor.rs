//! The bench read loop.
//!
//! A [`MonitorSession`] owns one reader task for the unit under test and,
//! optionally, one for the barcode scanner. Both are guarded by a shared
//! running flag; [`MonitorSession::stop`] clears it and waits for the tasks.
//!
//! Data flow for the unit link:
//!
//! ```text
//! bytes -> lines -> FrameAssembler -> FieldExtractor -> TestRecord -> sinks
//!            |            |                                  |
//!            +-- Line     +-- Frame                          +-- Record   (events)
//! ```
//!
//! Lines are read with a timeout. When it expires, any partial line is
//! pushed through as-is so a unit that ends its report without a newline is
//! still framed. A single line is capped at `max_buffer_bytes`; longer runs
//! without a newline are split into chunks of that size.

use crate::config::BenchConfig;
use crate::diagnostics::DiagnosticTable;
use crate::error::{AppResult, BenchError};
use crate::extract::FieldExtractor;
use crate::framing::{Frame, FrameAssembler};
use crate::record::{Column, Status, TestRecord};
use crate::scanner::{decode_lossy, run_scanner};
use crate::storage::RecordSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Boxed byte source, used for the optional scanner link.
pub type ByteSource = Box<dyn AsyncRead + Unpin + Send>;

/// Something that happened on the bench.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A line (or a partial line flushed by the read timeout) from the unit.
    Line(String),
    /// A complete diagnostic message.
    Frame(Frame),
    /// The result extracted from the preceding frame.
    Record(TestRecord),
    /// A serial number read from the barcode scanner.
    SerialScanned(String),
    /// A non-fatal problem, or the error that ended a reader.
    Error(String),
    /// The unit reader has stopped.
    Disconnected,
}

/// Settings for a monitor session.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Frame start marker
    pub start_marker: String,
    /// Frame stop marker
    pub stop_marker: String,
    /// Bound on buffered text between frames
    pub max_buffer_bytes: usize,
    /// Read timeout on the unit link
    pub read_timeout: Duration,
    /// Columns gating the unit verdict
    pub status_fields: Vec<Column>,
    /// Known diagnostic sentences
    pub diagnostics: DiagnosticTable,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&BenchConfig::default())
    }
}

impl MonitorSettings {
    /// Session settings from the bench configuration.
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            start_marker: config.framing.start_marker.clone(),
            stop_marker: config.framing.stop_marker.clone(),
            max_buffer_bytes: config.framing.max_buffer_bytes,
            read_timeout: config.device.read_timeout(),
            status_fields: config.status.fields.clone(),
            diagnostics: config.diagnostic_table(),
            event_capacity: 256,
        }
    }

    /// Override the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// One frame after extraction and storage.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// The message.
    pub frame: Frame,
    /// The extracted result.
    pub record: TestRecord,
    /// Derived unit verdict.
    pub status: Option<Status>,
    /// Sinks that failed, with their error.
    pub sink_errors: Vec<String>,
}

/// Turns lines into stored records.
///
/// This is the synchronous core of the read loop, usable on its own for
/// offline processing of captured logs.
pub struct RecordPipeline {
    framer: FrameAssembler,
    extractor: FieldExtractor,
    status_fields: Vec<Column>,
    sinks: Vec<Box<dyn RecordSink>>,
    serial: Option<watch::Receiver<Option<String>>>,
}

impl RecordPipeline {
    /// Builds a pipeline writing to `sinks`.
    pub fn new(settings: &MonitorSettings, sinks: Vec<Box<dyn RecordSink>>) -> Self {
        Self {
            framer: FrameAssembler::new(&settings.start_marker, &settings.stop_marker)
                .with_max_buffer(settings.max_buffer_bytes),
            extractor: FieldExtractor::new(settings.diagnostics.clone()),
            status_fields: settings.status_fields.clone(),
            sinks,
            serial: None,
        }
    }

    /// Stamps records with the latest value of `serial`.
    pub fn with_serial_source(mut self, serial: watch::Receiver<Option<String>>) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Feeds one line; returns every frame it completed, processed.
    pub fn process_line(&mut self, line: &str) -> Vec<ProcessedFrame> {
        self.framer
            .push_line(line)
            .into_iter()
            .map(|frame| self.process_frame(frame))
            .collect()
    }

    fn process_frame(&mut self, frame: Frame) -> ProcessedFrame {
        let (mut record, summary) = self.extractor.record_for(&frame);
        if let Some(serial) = &self.serial {
            record.set_serial_number(serial.borrow().as_deref());
        }
        let status = record.derive_status(&self.status_fields);

        info!(
            serial = record.get(Column::SerialNumber).unwrap_or("-"),
            status = status.map_or("-", Status::as_str),
            averages = summary.averages,
            checks = summary.checks,
            screens = summary.screens,
            unmatched = summary.unmatched,
            "New message received"
        );

        let mut sink_errors = Vec::new();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.write(&frame, &record) {
                if e.can_recover() {
                    warn!(sink = sink.name(), error = %e, "Failed to store result");
                } else {
                    error!(sink = sink.name(), error = %e, "Result sink unusable");
                }
                sink_errors.push(format!("{}: {}", sink.name(), e));
            }
        }

        ProcessedFrame {
            frame,
            record,
            status,
            sink_errors,
        }
    }
}

/// Counters reported when the unit reader stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Lines received
    pub lines: u64,
    /// Frames completed
    pub frames: u64,
    /// Sink writes that failed
    pub sink_failures: u64,
}

/// A running bench session.
pub struct MonitorSession {
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<ReaderStats>>,
    scanner: Option<JoinHandle<()>>,
    latest_serial: watch::Receiver<Option<String>>,
    join_timeout: Duration,
}

impl std::fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("reader", &self.reader.is_some())
            .field("scanner", &self.scanner.is_some())
            .finish()
    }
}

impl MonitorSession {
    /// Spawns the reader tasks and returns the session with its event stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<D>(
        device: D,
        scanner: Option<ByteSource>,
        settings: MonitorSettings,
        sinks: Vec<Box<dyn RecordSink>>,
    ) -> (Self, mpsc::Receiver<MonitorEvent>)
    where
        D: AsyncRead + Unpin + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel(settings.event_capacity.max(1));
        let (serial_tx, serial_rx) = watch::channel(None);
        let running = Arc::new(AtomicBool::new(true));

        let scanner = scanner.map(|source| {
            let events = events_tx.clone();
            let running = Arc::clone(&running);
            let poll = settings.read_timeout;
            tokio::spawn(async move {
                run_scanner(source, serial_tx, events, running, poll).await;
            })
        });

        let pipeline = RecordPipeline::new(&settings, sinks).with_serial_source(serial_rx.clone());
        let reader = {
            let running = Arc::clone(&running);
            let timeout = settings.read_timeout;
            let max_line = settings.max_buffer_bytes.max(1);
            tokio::spawn(async move {
                read_loop(device, pipeline, events_tx, running, timeout, max_line).await
            })
        };

        info!("Monitor session started");
        (
            Self {
                running,
                reader: Some(reader),
                scanner,
                latest_serial: serial_rx,
                join_timeout: settings.read_timeout + Duration::from_secs(1),
            },
            events_rx,
        )
    }

    /// Whether the reader is still meant to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.reader.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Most recent scanned serial number.
    pub fn latest_serial(&self) -> Option<String> {
        self.latest_serial.borrow().clone()
    }

    /// Waits for the unit reader to finish on its own (end of stream or a
    /// read error), then stops the scanner.
    pub async fn wait(&mut self) -> AppResult<ReaderStats> {
        let stats = match self.reader.take() {
            Some(handle) => handle
                .await
                .map_err(|e| BenchError::Task(format!("Reader task failed: {}", e)))?,
            None => ReaderStats::default(),
        };
        self.stop().await?;
        Ok(stats)
    }

    /// Clears the running flag and waits for the tasks to finish.
    ///
    /// Returns the reader counters, or default counters when the reader was
    /// already collected. Tasks that do not finish in time are aborted.
    pub async fn stop(&mut self) -> AppResult<ReaderStats> {
        self.running.store(false, Ordering::SeqCst);
        let mut errors = Vec::new();
        let mut stats = ReaderStats::default();

        if let Some(handle) = self.reader.take() {
            match join_with_timeout(handle, self.join_timeout).await {
                Ok(s) => stats = s,
                Err(e) => errors.push(e),
            }
        }
        if let Some(handle) = self.scanner.take() {
            if let Err(e) = join_with_timeout(handle, self.join_timeout).await {
                errors.push(e);
            }
        }

        info!("Monitor session stopped");
        if errors.is_empty() {
            Ok(stats)
        } else {
            Err(BenchError::ShutdownFailed(errors))
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// How [`forward_events`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardExit {
    /// The unit reader stopped or the event stream closed.
    Disconnected,
    /// The shutdown future resolved first.
    Shutdown,
}

/// Hands session events to `on_event` until the unit reader disconnects or
/// `shutdown` resolves.
///
/// `shutdown` is pinned once and polled across the whole loop, so a signal
/// that fires while an event is being handled is still seen. The
/// `Disconnected` event itself is not forwarded. An error from `on_event`
/// ends the loop and is returned.
pub async fn forward_events<S, F, E>(
    events: &mut mpsc::Receiver<MonitorEvent>,
    shutdown: S,
    mut on_event: F,
) -> Result<ForwardExit, E>
where
    S: Future,
    F: FnMut(MonitorEvent) -> Result<(), E>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(MonitorEvent::Disconnected) | None => return Ok(ForwardExit::Disconnected),
                Some(event) => on_event(event)?,
            },
            _ = &mut shutdown => return Ok(ForwardExit::Shutdown),
        }
    }
}

async fn join_with_timeout<T>(mut handle: JoinHandle<T>, timeout: Duration) -> AppResult<T> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(BenchError::Task(e.to_string())),
        Err(_) => {
            handle.abort();
            Err(BenchError::Task(format!(
                "Task did not stop within {:?}, aborted",
                timeout
            )))
        }
    }
}

async fn read_loop<D>(
    device: D,
    mut pipeline: RecordPipeline,
    events: mpsc::Sender<MonitorEvent>,
    running: Arc<AtomicBool>,
    timeout: Duration,
    max_line: usize,
) -> ReaderStats
where
    D: AsyncRead + Unpin + Send,
{
    info!("Reading from port...");
    let mut reader = BufReader::new(device);
    let mut pending = Vec::new();
    let mut stats = ReaderStats::default();

    while running.load(Ordering::SeqCst) {
        // read_until keeps partial input in `pending` when the timeout fires.
        // `pending` is empty here, so the take limit bounds the whole line.
        let mut limited = (&mut reader).take(max_line as u64);
        let outcome =
            tokio::time::timeout(timeout, limited.read_until(b'\n', &mut pending)).await;
        let end_of_stream = match outcome {
            Err(_) => {
                if pending.is_empty() {
                    continue;
                }
                false
            }
            Ok(Ok(0)) => true,
            Ok(Ok(_)) => false,
            Ok(Err(e)) => {
                error!(error = %e, "Error reading from port");
                send(&events, MonitorEvent::Error(format!("Error reading from port: {}", e)))
                    .await;
                break;
            }
        };

        if !pending.is_empty() {
            let line = decode_lossy(&pending);
            pending.clear();
            handle_line(&mut pipeline, &events, &mut stats, line).await;
        }

        if end_of_stream {
            info!("Device stream ended");
            break;
        }
    }

    running.store(false, Ordering::SeqCst);
    debug!(?stats, "Reader finished");
    send(&events, MonitorEvent::Disconnected).await;
    stats
}

async fn handle_line(
    pipeline: &mut RecordPipeline,
    events: &mpsc::Sender<MonitorEvent>,
    stats: &mut ReaderStats,
    line: String,
) {
    stats.lines += 1;
    let processed = pipeline.process_line(&line);
    send(events, MonitorEvent::Line(line)).await;

    for item in processed {
        stats.frames += 1;
        stats.sink_failures += item.sink_errors.len() as u64;
        send(events, MonitorEvent::Frame(item.frame)).await;
        send(events, MonitorEvent::Record(item.record)).await;
        for err in item.sink_errors {
            send(events, MonitorEvent::Error(err)).await;
        }
    }
}

async fn send(events: &mpsc::Sender<MonitorEvent>, event: MonitorEvent) {
    // A dropped receiver only means nobody is watching
    let _ = events.send(event).await;
}
