use serde::Serialize;
use std::fmt;

/// Playback position bounded by the track length.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct Progress {
    pub position_secs: u32,
    pub length_secs: u32,
}

impl Progress {
    pub fn new(position_secs: f64, length_secs: u32) -> Self {
        let position = position_secs.max(0.0).floor() as u32;
        Self {
            position_secs: position.min(length_secs),
            length_secs,
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.length_secs == 0 {
            0.0
        } else {
            f64::from(self.position_secs) / f64::from(self.length_secs)
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NowPlayingView {
    pub connected: bool,
    pub playing: bool,
    pub is_ad: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_ref: Option<String>,
    pub time: String,
    pub progress: Progress,
    pub volume_percent: u8,
    pub repeat: bool,
    pub shuffle: bool,
    pub client_version: Option<String>,
    pub recording_intent: bool,
    pub recording: bool,
}

impl fmt::Display for NowPlayingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.connected {
            return writeln!(f, "not connected");
        }
        if self.is_ad {
            writeln!(f, "ADVERT")?;
        } else if let Some(title) = &self.title {
            writeln!(f, "title:  {title}")?;
            writeln!(f, "artist: {}", self.artist.as_deref().unwrap_or("-"))?;
            writeln!(f, "album:  {}", self.album.as_deref().unwrap_or("-"))?;
            if let Some(id) = &self.track_ref {
                writeln!(f, "track:  {id}")?;
            }
        } else {
            writeln!(f, "track:  <none>")?;
        }
        writeln!(
            f,
            "time:   {} ({:.0}%)",
            self.time,
            self.progress.fraction() * 100.0
        )?;
        writeln!(f, "state:  {}", if self.playing { "playing" } else { "paused" })?;
        writeln!(f, "volume: {}", self.volume_percent)?;
        writeln!(f, "repeat: {} shuffle: {}", self.repeat, self.shuffle)?;
        if let Some(version) = &self.client_version {
            writeln!(f, "client: {version}")?;
        }
        write!(
            f,
            "record: {}{}",
            if self.recording_intent { "on" } else { "off" },
            if self.recording { " (capturing)" } else { "" }
        )
    }
}

/// `m:ss`, minutes unbounded.
pub fn format_time(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::{format_time, Progress};

    #[test]
    fn formats_minutes_and_padded_seconds() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(3_725.0), "62:05");
        assert_eq!(format_time(-3.0), "0:00");
    }

    #[test]
    fn progress_never_overruns_length() {
        let p = Progress::new(500.0, 180);
        assert_eq!(p.position_secs, 180);
        assert_eq!(p.fraction(), 1.0);

        assert_eq!(Progress::new(12.0, 0).fraction(), 0.0);
        assert_eq!(Progress::new(-1.0, 10).position_secs, 0);
    }
}
