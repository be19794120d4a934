//! FFmpeg command-line construction.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::capability::{syntax, CategoryType};
use crate::config::model::EncoderConfig;
use crate::media::options::{AudioStreamOpts, TranscoderOpts, VideoStreamOpts};
use crate::media::probe::ProbeResult;

/// Locations of the external encoder binaries.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl From<&EncoderConfig> for EncoderSettings {
    fn from(config: &EncoderConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
        }
    }
}

/// Which input streams reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMap {
    /// ffmpeg's default selection.
    Default,
    /// Only the first audio stream. Audio containers cannot carry cover art.
    FirstAudio,
    /// Real video and audio streams, leaving embedded cover art behind.
    SkipAttachedPictures,
}

impl StreamMap {
    /// Chooses the mapping from the output category and the probed input.
    pub fn choose(opts: &TranscoderOpts, probed: &ProbeResult) -> Self {
        match opts.category() {
            Some(CategoryType::Audio) => StreamMap::FirstAudio,
            Some(CategoryType::Video) if probed.has_attached_picture() => {
                StreamMap::SkipAttachedPictures
            }
            _ => StreamMap::Default,
        }
    }

    fn args(self) -> &'static [&'static str] {
        match self {
            StreamMap::Default => &[],
            StreamMap::FirstAudio => &["-map", "0:a:0"],
            StreamMap::SkipAttachedPictures => &["-map", "0:V?", "-map", "0:a?"],
        }
    }
}

/// Builds the ffmpeg arguments for one transcode.
///
/// Progress is reported as `key=value` lines on stdout; stderr carries only
/// diagnostics. The output path is always the last argument.
pub fn build_args(
    input: &Path,
    output: &Path,
    opts: &TranscoderOpts,
    streams: StreamMap,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .map(OsString::from)
        .into();
    args.push(input.as_os_str().to_owned());

    // Strip metadata
    args.extend(["-map_metadata", "-1"].map(OsString::from));
    args.extend(streams.args().iter().copied().map(OsString::from));

    if let Some(format) = opts.format.as_deref() {
        args.extend(["-f", syntax::format(format)].map(OsString::from));
    }

    if let Some(audio) = &opts.stream.audio {
        push_audio_args(&mut args, audio);
    }

    if let Some(video) = &opts.stream.video {
        push_video_args(&mut args, video);
    }

    args.extend(["-progress", "pipe:1", "-nostats"].map(OsString::from));
    args.push(output.as_os_str().to_owned());

    args
}

fn push_audio_args(args: &mut Vec<OsString>, audio: &AudioStreamOpts) {
    let mut push = |flag: &str, value: String| {
        args.push(OsString::from(flag));
        args.push(OsString::from(value));
    };

    if let Some(codec) = &audio.codec {
        push("-c:a", syntax::codec(codec).to_string());
    }
    if let Some(bit_rate) = &audio.bit_rate {
        push("-b:a", bit_rate.to_string());
    }
    if let Some(channels) = audio.channels {
        push("-ac", channels.to_string());
    }
    if let Some(sample_rate) = audio.sample_rate {
        push("-ar", sample_rate.to_string());
    }
    if let Some(sample_format) = &audio.sample_format {
        push("-sample_fmt", sample_format.clone());
    }
}

fn push_video_args(args: &mut Vec<OsString>, video: &VideoStreamOpts) {
    let mut push = |flag: &str, value: String| {
        args.push(OsString::from(flag));
        args.push(OsString::from(value));
    };

    if let Some(codec) = &video.codec {
        push("-c:v", syntax::codec(codec).to_string());
    }
    if let Some(bit_rate) = &video.bit_rate {
        push("-b:v", bit_rate.to_string());
    }
    if let (Some(width), Some(height)) = (video.width, video.height) {
        push("-s", format!("{}x{}", width, height));
    }
    if let Some(fps) = video.frames_per_second {
        push("-r", fps.to_string());
    }
    if let Some(pixel_format) = &video.pixel_format {
        push("-pix_fmt", pixel_format.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::probe::{MediaInfo, StreamSummary};

    fn probed(cover_art: bool) -> ProbeResult {
        let stream = |index, codec_type: &str, is_attached_picture| StreamSummary {
            index,
            codec_type: codec_type.to_string(),
            codec: "x".to_string(),
            is_attached_picture,
        };
        let mut streams = vec![stream(0, "audio", false)];
        if cover_art {
            streams.push(stream(1, "video", true));
        }
        ProbeResult {
            info: MediaInfo {
                format: "mp3".to_string(),
                duration: Some(10.0),
                size: 0,
                bitrate: 0,
            },
            streams,
        }
    }

    fn args_with(opts: &str, input: &ProbeResult) -> Vec<String> {
        let opts = TranscoderOpts::parse(opts).unwrap();
        let streams = StreamMap::choose(&opts, input);
        build_args(Path::new("/in/abc"), Path::new("/out/abc.mkv"), &opts, streams)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn args_of(opts: &str) -> Vec<String> {
        args_with(opts, &probed(false))
    }

    fn maps(args: &[String]) -> Vec<&str> {
        args.iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| *flag == "-map")
            .map(|(_, value)| value.as_str())
            .collect()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn video_job_translates_codecs_and_size() {
        let args = args_of(
            r#"{"format":"mkv","stream":{"video":{"codec":"avc","width":1280,"height":720,"bitRate":"2M"},
                "audio":{"codec":"opus","bitRate":128000,"channels":2}}}"#,
        );

        assert_eq!(value_after(&args, "-i"), Some("/in/abc"));
        assert_eq!(value_after(&args, "-f"), Some("matroska"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-s"), Some("1280x720"));
        assert_eq!(value_after(&args, "-b:v"), Some("2M"));
        assert_eq!(value_after(&args, "-c:a"), Some("libopus"));
        assert_eq!(value_after(&args, "-b:a"), Some("128000"));
        assert_eq!(value_after(&args, "-ac"), Some("2"));
        assert_eq!(value_after(&args, "-map_metadata"), Some("-1"));
        assert!(maps(&args).is_empty());
        assert_eq!(args.last().map(String::as_str), Some("/out/abc.mkv"));
    }

    #[test]
    fn audio_format_pins_first_audio_stream() {
        let args = args_of(r#"{"format":"m4a","stream":{"audio":{"codec":"aac","sampleRate":44100}}}"#);
        assert_eq!(maps(&args), vec!["0:a:0"]);
        assert_eq!(value_after(&args, "-f"), Some("mp4"));
        assert_eq!(value_after(&args, "-ar"), Some("44100"));
    }

    #[test]
    fn audio_format_without_stream_settings_is_pinned() {
        let args = args_with(r#"{"format":"m4a"}"#, &probed(true));
        assert_eq!(maps(&args), vec!["0:a:0"]);
    }

    #[test]
    fn video_format_with_audio_settings_keeps_video() {
        let args = args_of(r#"{"format":"mp4","stream":{"audio":{"codec":"aac"}}}"#);
        assert!(maps(&args).is_empty());
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
    }

    #[test]
    fn video_format_leaves_cover_art_behind() {
        let args = args_with(r#"{"format":"mp4","stream":{"audio":{"codec":"aac"}}}"#, &probed(true));
        assert_eq!(maps(&args), vec!["0:V?", "0:a?"]);
    }

    #[test]
    fn size_requires_both_dimensions() {
        let args = args_of(r#"{"format":"mp4","stream":{"video":{"width":640}}}"#);
        assert!(!args.contains(&"-s".to_string()));
    }

    #[test]
    fn progress_goes_to_stdout() {
        let args = args_of(r#"{"format":"wav"}"#);
        assert_eq!(value_after(&args, "-progress"), Some("pipe:1"));
        assert!(args.contains(&"-nostats".to_string()));
    }
}
