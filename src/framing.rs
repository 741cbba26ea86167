//! Message framing over a line-oriented text stream.
//!
//! The unit wraps each diagnostic report between two literal markers,
//! `START` and `STOP` by default. There is no length field, escaping or
//! checksum: a frame is simply the text from the first start marker through
//! the end of the first stop marker found in the accumulated buffer.
//!
//! # Example
//!
//! ```
//! use am60_bench::framing::FrameAssembler;
//!
//! let mut framer = FrameAssembler::new("START", "STOP");
//! assert!(framer.push_line("START\n").is_empty());
//! assert!(framer.push_line("led_avg = 2.91\n").is_empty());
//! let frames = framer.push_line("STOP\n");
//! assert_eq!(frames[0].text, "START\nled_avg = 2.91\nSTOP");
//! ```

use crate::record::TIMESTAMP_FORMAT;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, warn};

/// Default start marker.
pub const DEFAULT_START_MARKER: &str = "START";

/// Default stop marker.
pub const DEFAULT_STOP_MARKER: &str = "STOP";

/// Default upper bound on buffered text while waiting for a frame.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 64 * 1024;

/// A complete diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Local time the stop marker was seen.
    pub received_at: DateTime<Local>,
    /// Text from the start marker through the stop marker, trimmed.
    pub text: String,
}

impl Frame {
    /// Creates a frame stamped now.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            received_at: Local::now(),
            text: text.into(),
        }
    }

    /// `[YYYY-mm-dd HH:MM:SS] <text>`, as written to the capture log.
    pub fn log_entry(&self) -> String {
        format!(
            "[{}] {}",
            self.received_at.format(TIMESTAMP_FORMAT),
            self.text
        )
    }

    /// Lines of the frame body, marker lines included.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

/// Accumulates lines and cuts frames out of them.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    start_marker: String,
    stop_marker: String,
    buffer: String,
    max_buffer: usize,
}

impl FrameAssembler {
    /// Creates an assembler for the given markers.
    pub fn new(start_marker: impl Into<String>, stop_marker: impl Into<String>) -> Self {
        Self {
            start_marker: start_marker.into(),
            stop_marker: stop_marker.into(),
            buffer: String::new(),
            max_buffer: DEFAULT_MAX_BUFFER_BYTES,
        }
    }

    /// Sets the buffer bound.
    pub fn with_max_buffer(mut self, max_bytes: usize) -> Self {
        self.max_buffer = max_bytes.max(self.start_marker.len() + self.stop_marker.len());
        self
    }

    /// Appends a line and returns every frame it completed, oldest first.
    pub fn push_line(&mut self, line: &str) -> Vec<Frame> {
        self.buffer.push_str(line);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        self.enforce_bound();
        frames
    }

    /// Text received since the last complete frame.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Drops any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let start = self.buffer.find(&self.start_marker)?;
            let stop = self.buffer.find(&self.stop_marker)?;
            let end = stop + self.stop_marker.len();

            if stop < start {
                debug!(
                    discarded = end,
                    "Stop marker before start marker, discarding stale text"
                );
                self.buffer.drain(..end);
                continue;
            }

            let text = self.buffer[start..end].trim().to_string();
            self.buffer.drain(..end);
            return Some(Frame::new(text));
        }
    }

    fn enforce_bound(&mut self) {
        if self.buffer.len() <= self.max_buffer {
            return;
        }

        let cut = match self.buffer.find(&self.start_marker) {
            Some(0) => {
                warn!(
                    buffered = self.buffer.len(),
                    "Frame exceeds buffer limit without a stop marker, dropping it"
                );
                self.buffer.len()
            }
            Some(start) => start,
            None => {
                let keep = self.start_marker.len().saturating_sub(1);
                let mut cut = self.buffer.len().saturating_sub(keep);
                while !self.buffer.is_char_boundary(cut) {
                    cut += 1;
                }
                cut
            }
        };
        debug!(dropped = cut, "Trimming frame buffer");
        self.buffer.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer() -> FrameAssembler {
        FrameAssembler::new(DEFAULT_START_MARKER, DEFAULT_STOP_MARKER)
    }

    #[test]
    fn frame_spans_markers_inclusively() {
        let mut f = framer();
        assert!(f.push_line("noise\n").is_empty());
        assert!(f.push_line("START\n").is_empty());
        assert!(f.push_line("VCC voltage OK\n").is_empty());
        let frames = f.push_line("STOP\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].text, "START\nVCC voltage OK\nSTOP");
        assert_eq!(f.pending(), "\n");
    }

    #[test]
    fn trailing_text_is_kept_for_next_frame() {
        let mut f = framer();
        let frames = f.push_line("START a STOP tail START b\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].text, "START a STOP");
        let frames = f.push_line("STOP\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].text, "START b\nSTOP");
    }

    #[test]
    fn several_frames_in_one_push() {
        let mut f = framer();
        let frames = f.push_line("START 1 STOP START 2 STOP\n");
        let texts: Vec<_> = frames.iter().map(|fr| fr.text.as_str()).collect();
        assert_eq!(texts, vec!["START 1 STOP", "START 2 STOP"]);
    }

    #[test]
    fn stray_stop_is_discarded() {
        let mut f = framer();
        assert!(f.push_line("half a report\nSTOP\n").is_empty());
        let frames = f.push_line("START\nLED test passed\nSTOP\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].text, "START\nLED test passed\nSTOP");
    }

    #[test]
    fn stop_without_start_waits() {
        let mut f = framer();
        assert!(f.push_line("STOP\n").is_empty());
        assert_eq!(f.pending(), "STOP\n");
    }

    #[test]
    fn custom_markers() {
        let mut f = FrameAssembler::new("<<", ">>");
        let frames = f.push_line("x << body >> y");
        assert_eq!(frames[0].text, "<< body >>");
    }

    #[test]
    fn bound_keeps_possible_split_marker() {
        let mut f = framer().with_max_buffer(16);
        assert!(f.push_line("0123456789abcdefghijST").is_empty());
        assert_eq!(f.pending(), "ijST");
        let frames = f.push_line("ART x STOP");
        assert_eq!(frames[0].text, "START x STOP");
    }

    #[test]
    fn bound_drops_text_before_start() {
        let mut f = framer().with_max_buffer(16);
        assert!(f.push_line("0123456789abcdef START x").is_empty());
        assert_eq!(f.pending(), "START x");
    }

    #[test]
    fn bound_handles_multibyte_text() {
        let mut f = framer().with_max_buffer(12);
        assert!(f.push_line("ééééééééééé").is_empty());
        assert!(f.pending().len() <= 12);
    }

    #[test]
    fn log_entry_format() {
        let frame = Frame::new("START x STOP");
        let entry = frame.log_entry();
        assert!(entry.starts_with('['));
        assert!(entry.ends_with("] START x STOP"));
        // "[YYYY-mm-dd HH:MM:SS] "
        assert_eq!(entry.find(']'), Some(20));
    }
}
