//! rollcall-hw — frame acquisition for the scanning daemon.
//!
//! Defines the frame source and face analysis seams, plus a JSON-lines feed
//! adapter for frames produced by an external detector/extractor process.

pub mod feed;
pub mod frame;

pub use feed::FeedSource;
pub use frame::{Detection, FaceAnalyzer, Frame, FrameError, FrameSource, PrecomputedAnalyzer};
