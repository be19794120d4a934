//! Translation from registry names to ffmpeg command-line tokens.
//!
//! Names without a mapping pass through unchanged.

/// Maps a format name to the ffmpeg muxer name.
pub fn format(name: &str) -> &str {
    match name {
        "mkv" => "matroska",
        "m4a" => "mp4",
        "jpg" | "png" => "image2",
        _ => name,
    }
}

/// Maps a codec name to the ffmpeg encoder name.
pub fn codec(name: &str) -> &str {
    match name {
        "avc" => "libx264",
        "hevc" => "libx265",
        "mp3" => "libmp3lame",
        "opus" => "libopus",
        "vorbis" => "libvorbis",
        "vp8" => "libvpx",
        "vp9" => "libvpx-vp9",
        "pcm" => "pcm_s16le",
        "jpg" => "mjpeg",
        "webp" => "libwebp",
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_spellings_differ_from_format_names() {
        assert_eq!(format("mkv"), "matroska");
        assert_eq!(format("m4a"), "mp4");
        assert_eq!(format("webm"), "webm");
    }

    #[test]
    fn unmapped_names_pass_through() {
        assert_eq!(codec("aac"), "aac");
        assert_eq!(codec("flac"), "flac");
        assert_eq!(codec("prores_ks"), "prores_ks");
        assert_eq!(codec("avc"), "libx264");
    }
}
