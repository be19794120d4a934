//! Shell stand-ins for ffprobe and ffmpeg used by tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::EncoderSettings;

pub(crate) const PROBE_OK: &str = r#"echo '{"format":{"format_name":"wav","duration":"10.0","size":"1764044","bit_rate":"1411200"},"streams":[{"index":0,"codec_type":"audio","codec_name":"pcm_s16le"}]}'"#;

pub(crate) const PROBE_SLOW: &str = r#"sleep 1
echo '{"format":{"format_name":"wav","duration":"10.0"},"streams":[{"index":0,"codec_type":"audio","codec_name":"pcm_s16le"}]}'"#;

pub(crate) const PROBE_VIDEO_ONLY: &str = r#"echo '{"format":{"format_name":"mov,mp4,m4a,3gp,3g2,mj2","duration":"4.0"},"streams":[{"index":0,"codec_type":"video","codec_name":"h264"}]}'"#;

pub(crate) const PROBE_FAIL: &str = r#"echo "$1: Invalid data found when processing input" >&2
exit 1"#;

pub(crate) const ENCODE_OK: &str = r#"for last; do :; done
echo out_time_us=5000000
echo progress=continue
echo out_time_us=10000000
echo progress=end
printf 'encoded' > "$last""#;

pub(crate) const ENCODE_FAIL: &str = r#"for last; do :; done
printf 'partial' > "$last"
echo "Unknown encoder 'libfoo'" >&2
exit 1"#;

pub(crate) const ENCODE_HANG: &str = r#"for last; do :; done
printf 'partial' > "$last"
echo out_time_us=1000000
echo progress=continue
sleep 30"#;

pub(crate) struct FakeTools {
    pub dir: TempDir,
    pub settings: EncoderSettings,
}

/// Writes executable ffprobe/ffmpeg scripts with the given bodies.
pub(crate) fn tools(probe_body: &str, encode_body: &str) -> FakeTools {
    let dir = tempfile::tempdir().unwrap();
    let ffprobe = write_script(dir.path(), "ffprobe", probe_body);
    let ffmpeg = write_script(dir.path(), "ffmpeg", encode_body);
    FakeTools {
        dir,
        settings: EncoderSettings { ffmpeg, ffprobe },
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
