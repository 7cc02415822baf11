//! Frame type and the acquisition/analysis seams the scan loop drives.

use rollcall_core::{BoundingBox, Embedding};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame stream ended")]
    EndOfStream,
    #[error("frame read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("face analysis failed: {0}")]
    Analysis(String),
}

/// One face found in a frame, with its embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    pub embedding: Embedding,
}

/// One captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    /// Faces the upstream detector reported for this frame.
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(sequence: u64, detections: Vec<Detection>) -> Self {
        Self {
            sequence,
            detections,
        }
    }
}

/// Yields frames on demand. Any error, including end of stream, is fatal to
/// the caller's loop.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, FrameError>;
}

/// Turns a frame into one embedding per detected face.
pub trait FaceAnalyzer {
    fn embeddings(&mut self, frame: &Frame) -> Result<Vec<Embedding>, FrameError>;
}

/// Analyzer for frames whose detections already carry embeddings.
pub struct PrecomputedAnalyzer;

impl FaceAnalyzer for PrecomputedAnalyzer {
    fn embeddings(&mut self, frame: &Frame) -> Result<Vec<Embedding>, FrameError> {
        Ok(frame
            .detections
            .iter()
            .filter(|d| !d.embedding.values.is_empty())
            .map(|d| d.embedding.clone())
            .collect())
    }
}
