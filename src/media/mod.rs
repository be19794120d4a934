//! Output option shapes and media inspection.

pub mod options;
pub mod probe;

pub use options::{AudioStreamOpts, BitRate, StreamOpts, TranscoderOpts, VideoStreamOpts};
