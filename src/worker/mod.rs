//! Transcoder worker: queue consumption and process control.

pub mod registry;
pub mod service;

pub use registry::ProcessMap;
pub use service::TranscoderService;
