//! FFmpeg transcoding processes.

pub mod command;
pub mod process;
pub mod progress;
pub mod signal;

#[cfg(all(test, unix))]
pub(crate) mod fake;

pub use command::{EncoderSettings, StreamMap};
pub use process::{EncoderProcess, ProcessEvent, ProcessHandle, ProcessStatus};
pub use progress::Progress;
