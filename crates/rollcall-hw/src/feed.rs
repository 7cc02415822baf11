//! JSON-lines frame feed.
//!
//! The upstream detector/extractor writes one line per camera frame:
//!
//! ```text
//! {"sequence": 41, "faces": [{"bbox": {"x": 10, "y": 12, "width": 80, "height": 96}, "embedding": {"values": [...]}}]}
//! ```
//!
//! `sequence` is optional and defaults to the line count. Blank lines are skipped.

use crate::frame::{Detection, Frame, FrameError, FrameSource};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Deserialize)]
struct FeedLine {
    #[serde(default)]
    sequence: Option<u64>,
    #[serde(default)]
    faces: Vec<Detection>,
}

/// Frame source reading a JSON-lines feed from a file, FIFO or any reader.
pub struct FeedSource<R> {
    reader: R,
    line_no: usize,
    frames_read: u64,
    interval: Duration,
    next_due: Option<Instant>,
}

impl FeedSource<BufReader<File>> {
    /// Open a feed file or named pipe.
    pub fn open(path: &Path, interval: Duration) -> Result<Self, FrameError> {
        let file = File::open(path)?;
        tracing::info!(path = %path.display(), interval_ms = interval.as_millis() as u64, "frame feed opened");
        Ok(Self::from_reader(BufReader::new(file), interval))
    }
}

impl<R: BufRead> FeedSource<R> {
    pub fn from_reader(reader: R, interval: Duration) -> Self {
        Self {
            reader,
            line_no: 0,
            frames_read: 0,
            interval,
            next_due: None,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn pace(&mut self) {
        if self.interval.is_zero() {
            return;
        }
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.interval);
    }
}

impl<R: BufRead> FrameSource for FeedSource<R> {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(FrameError::EndOfStream);
            }
            self.line_no += 1;
            if !line.trim().is_empty() {
                break;
            }
        }

        let parsed: FeedLine = serde_json::from_str(line.trim()).map_err(|source| {
            FrameError::Malformed {
                line: self.line_no,
                source,
            }
        })?;

        self.pace();
        let sequence = parsed.sequence.unwrap_or(self.frames_read);
        self.frames_read += 1;
        Ok(Frame::new(sequence, parsed.faces))
    }
}
