//! Parsing of ffmpeg `-progress` output.

use serde::Serialize;

/// Progress snapshot of a running encode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    /// Percentage complete (0-100), when the input duration is known.
    pub percent: Option<f64>,
    /// Position in the output, in seconds.
    pub out_time_secs: Option<f64>,
    /// Frames written so far.
    pub frame: Option<u64>,
    /// Current encoding rate in frames per second.
    pub fps: Option<f64>,
    /// Encoding speed relative to realtime (e.g. "2.5x").
    pub speed: Option<String>,
}

impl Progress {
    /// Whole-number percentage, used for throttled progress reporting.
    pub fn rounded_percent(&self) -> Option<u8> {
        self.percent.map(|p| p.clamp(0.0, 100.0).round() as u8)
    }
}

/// Accumulates `key=value` lines into progress snapshots.
///
/// ffmpeg emits one block per update, terminated by a `progress=continue`
/// or `progress=end` line; a snapshot is produced for each terminator.
#[derive(Debug)]
pub struct ProgressParser {
    duration: Option<f64>,
    current: Progress,
}

impl ProgressParser {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration: duration.filter(|d| *d > 0.0),
            current: Progress::default(),
        }
    }

    /// Feeds one line of output; returns a snapshot at the end of each block.
    pub fn feed(&mut self, line: &str) -> Option<Progress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            // Both keys carry microseconds in ffmpeg's output.
            "out_time_us" | "out_time_ms" => {
                if let Ok(micros) = value.parse::<i64>() {
                    self.set_out_time(micros.max(0) as f64 / 1_000_000.0);
                }
            }
            "out_time" if self.current.out_time_secs.is_none() => {
                if let Some(secs) = parse_timestamp(value) {
                    self.set_out_time(secs);
                }
            }
            "frame" => self.current.frame = value.parse().ok(),
            "fps" => self.current.fps = value.parse().ok(),
            "speed" if value != "N/A" => self.current.speed = Some(value.to_string()),
            "progress" => {
                if value == "end" && self.duration.is_some() {
                    self.current.percent = Some(100.0);
                }
                return Some(std::mem::take(&mut self.current));
            }
            _ => {}
        }

        None
    }

    fn set_out_time(&mut self, secs: f64) {
        self.current.out_time_secs = Some(secs);
        self.current.percent = self
            .duration
            .map(|duration| (secs / duration * 100.0).min(100.0));
    }
}

/// Parses an `HH:MM:SS.micro` timestamp into seconds.
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ProgressParser, block: &str) -> Vec<Progress> {
        block.lines().filter_map(|l| parser.feed(l)).collect()
    }

    #[test]
    fn computes_percent_from_duration() {
        let mut parser = ProgressParser::new(Some(20.0));
        let updates = feed_all(
            &mut parser,
            "frame=120\nfps=48.0\nout_time_us=5000000\nspeed=2.01x\nprogress=continue\n\
             frame=480\nout_time_us=20000000\nprogress=end\n",
        );

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].rounded_percent(), Some(25));
        assert_eq!(updates[0].frame, Some(120));
        assert_eq!(updates[0].speed.as_deref(), Some("2.01x"));
        assert_eq!(updates[1].rounded_percent(), Some(100));
        // Fields reset between blocks
        assert_eq!(updates[1].speed, None);
    }

    #[test]
    fn unknown_duration_has_no_percent() {
        let mut parser = ProgressParser::new(None);
        let updates = feed_all(&mut parser, "out_time_us=1000000\nprogress=end\n");
        assert_eq!(updates[0].percent, None);
        assert_eq!(updates[0].out_time_secs, Some(1.0));
    }

    #[test]
    fn percent_is_capped() {
        let mut parser = ProgressParser::new(Some(1.0));
        let updates = feed_all(&mut parser, "out_time_us=3000000\nprogress=continue\n");
        assert_eq!(updates[0].percent, Some(100.0));
    }

    #[test]
    fn falls_back_to_timestamp() {
        let mut parser = ProgressParser::new(Some(120.0));
        let updates = feed_all(&mut parser, "out_time=00:01:00.000000\nprogress=continue\n");
        assert_eq!(updates[0].rounded_percent(), Some(50));
    }

    #[test]
    fn ignores_noise() {
        let mut parser = ProgressParser::new(Some(10.0));
        assert!(parser.feed("Press [q] to stop").is_none());
        assert!(parser.feed("out_time_us=N/A").is_none());
        assert!(parser.feed("speed=N/A").is_none());
        let update = parser.feed("progress=continue").unwrap();
        assert_eq!(update, Progress::default());
    }
}
