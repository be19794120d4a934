//! Validation of requested output options against the registry.

use tracing::warn;

use super::{CategoryType, FormatInfo, FormatType, StreamKind};
use crate::error::CapabilityError;
use crate::media::options::TranscoderOpts;
use crate::validation::{ValidationIssue, ValidationResult};

/// Checks requested options against the capability matrix.
///
/// Rejects unknown formats, video codecs not allowed by a video format, and
/// audio codecs not allowed by an audio or video format. A video codec sent
/// with a non-video format is not checked. Stream settings the format's
/// category does not use only produce warnings.
pub fn validate(opts: &TranscoderOpts) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(name) = opts.format.as_deref() else {
        result.add(
            ValidationIssue::error("format", "Output format is required")
                .with_suggestion(format!("Supported formats: {}", supported_formats())),
        );
        return result;
    };

    let Some(info) = super::format(name) else {
        result.add(
            ValidationIssue::error("format", format!("Unsupported format '{}'", name))
                .with_suggestion(suggest_format(name)),
        );
        return result;
    };

    if let Some(video) = &opts.stream.video {
        if info.category == CategoryType::Video {
            if let Some(codec) = video.codec.as_deref() {
                check_codec(&mut result, name, info, StreamKind::Video, codec);
            }
        }
    }

    if let Some(audio) = &opts.stream.audio {
        if matches!(info.category, CategoryType::Audio | CategoryType::Video) {
            if let Some(codec) = audio.codec.as_deref() {
                check_codec(&mut result, name, info, StreamKind::Audio, codec);
            }
        }
    }

    check_unused_settings(&mut result, name, info, opts);

    result
}

/// Parses serialized options and validates them, logging any warnings.
pub fn validate_json(raw: &str) -> Result<TranscoderOpts, CapabilityError> {
    let opts = TranscoderOpts::parse(raw)?;
    let result = validate(&opts);

    for issue in result.warnings() {
        warn!(path = %issue.path, message = %issue.message, "Output option warning");
    }

    if !result.is_valid() {
        return Err(CapabilityError::Rejected(result));
    }

    Ok(opts)
}

fn check_codec(
    result: &mut ValidationResult,
    format_name: &str,
    info: &FormatInfo,
    kind: StreamKind,
    codec: &str,
) {
    if info.allows(kind, codec) {
        return;
    }

    let stream = match kind {
        StreamKind::Audio => "audio",
        StreamKind::Video => "video",
        StreamKind::Image => "image",
    };
    let allowed: Vec<&str> = info.codecs(kind).iter().map(|c| c.as_str()).collect();

    result.add(
        ValidationIssue::error(
            format!("stream.{}.codec", stream),
            format!(
                "Codec '{}' is not allowed for {} streams in {}",
                codec, stream, format_name
            ),
        )
        .with_suggestion(format!("Allowed {} codecs: {}", stream, allowed.join(", "))),
    );
}

fn check_unused_settings(
    result: &mut ValidationResult,
    format_name: &str,
    info: &FormatInfo,
    opts: &TranscoderOpts,
) {
    let category = info.category.info();

    match (&opts.stream.audio, info.category) {
        (Some(_), CategoryType::Image) => result.add(ValidationIssue::warning(
            "stream.audio",
            format!("Audio settings are ignored for image format {}", format_name),
        )),
        (Some(audio), CategoryType::Audio) => {
            for (field, parameter) in audio.parameters() {
                if !category.accepts(parameter) {
                    result.add(ValidationIssue::warning(
                        format!("stream.audio.{}", field),
                        format!("'{}' is not used by audio formats", field),
                    ));
                }
            }
        }
        _ => {}
    }

    match (&opts.stream.video, info.category) {
        (Some(_), CategoryType::Audio) => result.add(ValidationIssue::warning(
            "stream.video",
            format!("Video settings are ignored for audio format {}", format_name),
        )),
        (Some(video), kind) => {
            for (field, parameter) in video.parameters() {
                if !category.accepts(parameter) {
                    result.add(ValidationIssue::warning(
                        format!("stream.video.{}", field),
                        format!("'{}' is not used by {} formats", field, kind),
                    ));
                }
            }
        }
        _ => {}
    }
}

fn supported_formats() -> String {
    FormatType::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Suggests the closest known format name, or lists them all.
fn suggest_format(input: &str) -> String {
    let lowered = input.to_lowercase();
    let closest = FormatType::ALL
        .iter()
        .map(|f| (f.as_str(), strsim::levenshtein(&lowered, f.as_str())))
        .min_by_key(|(_, distance)| *distance);

    match closest {
        Some((name, distance)) if distance <= 2 => format!("Did you mean '{}'?", name),
        _ => format!("Supported formats: {}", supported_formats()),
    }
}
