use anyhow::{anyhow, Result};
use async_trait::async_trait;
use nowplaying_recorder_core::{PlayerConfig, PlayerStatus, Track};

mod session;

pub use session::{spawn_session, PlayerCommand, SessionHandle};

/// Volume deltas below this are treated as noise.
const VOLUME_EPSILON: f64 = 0.001;

/// Notification pushed by the session task whenever a poll differs from the
/// previous snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PlayStateChanged(bool),
    TrackChanged(Track),
    TrackTimeChanged(f64),
    VolumeChanged(f64),
}

/// Low-level access to one player through one platform mechanism.
#[async_trait]
pub trait PlayerBackend: Send {
    fn name(&self) -> &'static str;
    /// Is the player process itself up?
    async fn is_host_running(&mut self) -> bool;
    /// Is the local control channel (session bus, media session manager) up?
    async fn is_helper_running(&mut self) -> bool;
    async fn connect(&mut self) -> Result<bool>;
    async fn status(&mut self) -> Result<Option<PlayerStatus>>;
    async fn play(&mut self) -> Result<()>;
    async fn pause(&mut self) -> Result<()>;
    async fn skip(&mut self) -> Result<()>;
    async fn previous(&mut self) -> Result<()>;
    async fn play_reference(&mut self, uri: &str, context_uri: Option<&str>) -> Result<()>;
}

/// The Session Client contract consumed by the coordinator.
#[async_trait]
pub trait SessionClient: Send {
    async fn is_host_running(&mut self) -> bool;
    async fn is_helper_running(&mut self) -> bool;
    async fn connect(&mut self) -> Result<bool>;
    async fn status(&mut self) -> Result<Option<PlayerStatus>>;
    /// Start or stop pushing [`SessionEvent`]s.
    async fn listen(&mut self, enabled: bool) -> Result<()>;
    async fn play(&mut self) -> Result<()>;
    async fn pause(&mut self) -> Result<()>;
    async fn skip(&mut self) -> Result<()>;
    async fn previous(&mut self) -> Result<()>;
    async fn play_reference(&mut self, uri: &str, context_uri: Option<&str>) -> Result<()>;
}

/// Turns two consecutive snapshots into the notifications a push-based
/// client would have fired. Track changes always come first.
pub fn diff_status(prev: Option<&PlayerStatus>, next: Option<&PlayerStatus>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let was_playing = prev.map(|p| p.playing).unwrap_or(false);

    let Some(next) = next else {
        if was_playing {
            events.push(SessionEvent::PlayStateChanged(false));
        }
        return events;
    };

    let prev_track_id = prev.and_then(|p| p.track.as_ref()).map(|t| t.id.as_str());
    if let Some(track) = &next.track {
        if prev_track_id != Some(track.id.as_str()) {
            events.push(SessionEvent::TrackChanged(track.clone()));
        }
    }

    if was_playing != next.playing {
        events.push(SessionEvent::PlayStateChanged(next.playing));
    }

    let time_changed = prev
        .map(|p| (p.position_secs - next.position_secs).abs() > f64::EPSILON)
        .unwrap_or(true);
    if time_changed {
        events.push(SessionEvent::TrackTimeChanged(next.position_secs));
    }

    let volume_changed = prev
        .map(|p| (p.volume - next.volume).abs() >= VOLUME_EPSILON)
        .unwrap_or(true);
    if volume_changed {
        events.push(SessionEvent::VolumeChanged(next.volume));
    }

    events
}

pub fn build_backend(cfg: &PlayerConfig) -> Box<dyn PlayerBackend> {
    let backend = match cfg.backend.as_str() {
        "mpris" => platform::mpris_backend(&cfg.name),
        "windows" => platform::windows_backend(&cfg.name),
        "auto" => platform::mpris_backend(&cfg.name)
            .or_else(|| platform::windows_backend(&cfg.name)),
        _ => None,
    };

    backend.unwrap_or_else(|| Box::new(NullBackend))
}

struct NullBackend;

#[async_trait]
impl PlayerBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn is_host_running(&mut self) -> bool {
        false
    }

    async fn is_helper_running(&mut self) -> bool {
        false
    }

    async fn connect(&mut self) -> Result<bool> {
        Ok(false)
    }

    async fn status(&mut self) -> Result<Option<PlayerStatus>> {
        Ok(None)
    }

    async fn play(&mut self) -> Result<()> {
        Err(anyhow!("no player backend available"))
    }

    async fn pause(&mut self) -> Result<()> {
        Err(anyhow!("no player backend available"))
    }

    async fn skip(&mut self) -> Result<()> {
        Err(anyhow!("no player backend available"))
    }

    async fn previous(&mut self) -> Result<()> {
        Err(anyhow!("no player backend available"))
    }

    async fn play_reference(&mut self, _uri: &str, _context_uri: Option<&str>) -> Result<()> {
        Err(anyhow!("no player backend available"))
    }
}

mod platform {
    use super::PlayerBackend;

    #[cfg(target_os = "linux")]
    pub fn mpris_backend(name: &str) -> Option<Box<dyn PlayerBackend>> {
        Some(Box::new(crate::mpris::MprisBackend::new(name)))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn mpris_backend(_name: &str) -> Option<Box<dyn PlayerBackend>> {
        None
    }

    #[cfg(target_os = "windows")]
    pub fn windows_backend(name: &str) -> Option<Box<dyn PlayerBackend>> {
        Some(Box::new(crate::windows::WindowsSessionBackend::new(name)))
    }

    #[cfg(not(target_os = "windows"))]
    pub fn windows_backend(_name: &str) -> Option<Box<dyn PlayerBackend>> {
        None
    }
}

#[cfg(target_os = "linux")]
mod mpris;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(test)]
mod tests {
    use super::{build_backend, diff_status, SessionEvent};
    use nowplaying_recorder_core::{PlayerConfig, PlayerStatus, Resource, Track};

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: Resource::named("Title"),
            artist: Resource::named("Artist"),
            album: Resource::named("Album"),
            length_secs: 180,
            is_ad: false,
        }
    }

    fn status(id: &str, playing: bool, position: f64) -> PlayerStatus {
        PlayerStatus {
            playing,
            position_secs: position,
            volume: 0.5,
            track: Some(track(id)),
            ..PlayerStatus::default()
        }
    }

    #[test]
    fn track_change_is_reported_before_time_change() {
        let prev = status("a", true, 170.0);
        let next = status("b", true, 1.0);

        let events = diff_status(Some(&prev), Some(&next));
        assert_eq!(
            events,
            vec![
                SessionEvent::TrackChanged(track("b")),
                SessionEvent::TrackTimeChanged(1.0),
            ]
        );
    }

    #[test]
    fn identical_snapshots_produce_nothing() {
        let s = status("a", false, 12.0);
        assert!(diff_status(Some(&s), Some(&s)).is_empty());
    }

    #[test]
    fn play_state_and_volume_changes() {
        let prev = status("a", true, 12.0);
        let mut next = status("a", false, 12.0);
        next.volume = 0.8;

        let events = diff_status(Some(&prev), Some(&next));
        assert_eq!(
            events,
            vec![
                SessionEvent::PlayStateChanged(false),
                SessionEvent::VolumeChanged(0.8),
            ]
        );
    }

    #[test]
    fn vanished_player_reports_stop_once() {
        let prev = status("a", true, 12.0);
        assert_eq!(
            diff_status(Some(&prev), None),
            vec![SessionEvent::PlayStateChanged(false)]
        );
        assert!(diff_status(None, None).is_empty());
    }

    #[test]
    fn unknown_backend_falls_back_to_null() {
        let cfg = PlayerConfig {
            backend: "carrier-pigeon".to_string(),
            ..PlayerConfig::default()
        };
        assert_eq!(build_backend(&cfg).name(), "null");
    }
}
