//! Semantic validation for configuration values.

use crate::config::model::AppConfig;

use super::{ValidationIssue, ValidationResult};

/// Validates semantic correctness of configuration values.
pub fn validate_config(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if !matches!(
        config.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        result.add(
            ValidationIssue::warning(
                "log_level",
                format!("Unknown log level '{}'", config.log_level),
            )
            .with_suggestion("Use one of: trace, debug, info, warn, error"),
        );
    }

    if config.worker.concurrency == 0 {
        result.add(ValidationIssue::error(
            "worker.concurrency",
            "Concurrency must be at least 1",
        ));
    }

    if config.worker.poll_interval_ms == 0 {
        result.add(
            ValidationIssue::warning("worker.poll_interval_ms", "A zero poll interval busy-loops")
                .with_suggestion("Use at least 100ms"),
        );
    }

    if config.storage.upload_dir.as_os_str().is_empty() {
        result.add(ValidationIssue::error(
            "storage.upload_dir",
            "Upload directory is required",
        ));
    }

    if config.storage.output_dir.as_os_str().is_empty() {
        result.add(ValidationIssue::error(
            "storage.output_dir",
            "Output directory is required",
        ));
    }

    if !config.storage.upload_dir.as_os_str().is_empty()
        && config.storage.upload_dir == config.storage.output_dir
    {
        result.add(
            ValidationIssue::error(
                "storage.output_dir",
                "Output directory must differ from the upload directory",
            )
            .with_suggestion("Outputs are named by job id and would collide with uploads"),
        );
    }

    if config.encoder.ffmpeg_path.as_os_str().is_empty() {
        result.add(ValidationIssue::error(
            "encoder.ffmpeg_path",
            "ffmpeg path is required",
        ));
    }

    if config.encoder.ffprobe_path.as_os_str().is_empty() {
        result.add(ValidationIssue::error(
            "encoder.ffprobe_path",
            "ffprobe path is required",
        ));
    }

    if config.prometheus.enabled && config.prometheus.port == 0 {
        result.add(ValidationIssue::error(
            "prometheus.port",
            "Port 0 is not a valid metrics port",
        ));
    }

    result
}
