use nowplaying_recorder_core::{
    PlaybackState, PlayerStatus, PlayerUri, RecorderCommand, RecordingRequest, Track,
};
use nowplaying_recorder_session::{SessionClient, SessionEvent};
use tracing::{debug, info, warn};

mod error;
mod view;

pub use error::{CoordinatorError, Unavailable};
pub use view::{format_time, NowPlayingView, Progress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLink {
    pub label: &'static str,
    pub name: String,
    pub url: String,
}

/// Tracks what is playing and decides when the external recorder starts
/// and stops. Handlers never touch the recorder themselves; they return the
/// commands the caller must dispatch, in order.
///
/// Invariant: at most one recording session is active, and a start is only
/// ever emitted after the stop for the previous session.
#[derive(Debug, Default)]
pub struct Coordinator {
    current_track: Option<Track>,
    playback: PlaybackState,
    recording_intent: bool,
    active: Option<u64>,
    connected: bool,
    next_session_id: u64,
    repeat: bool,
    shuffle: bool,
    client_version: Option<String>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    pub fn recording_intent(&self) -> bool {
        self.recording_intent
    }

    pub fn active_session(&self) -> Option<u64> {
        self.active
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Checks host and helper, connects, then refreshes from a snapshot.
    /// Nothing is mutated when the player is unavailable.
    pub async fn connect<S>(&mut self, client: &mut S) -> Result<Vec<RecorderCommand>, CoordinatorError>
    where
        S: SessionClient + ?Sized,
    {
        if !client.is_host_running().await {
            return Err(CoordinatorError::unavailable(Unavailable::HostNotRunning));
        }
        if !client.is_helper_running().await {
            return Err(CoordinatorError::unavailable(Unavailable::HelperNotRunning));
        }
        match client.connect().await {
            Ok(true) => {}
            Ok(false) => return Err(CoordinatorError::unavailable(Unavailable::ConnectRefused)),
            Err(err) => {
                return Err(CoordinatorError::unavailable(Unavailable::ConnectFailed(
                    format!("{err:#}"),
                )))
            }
        }

        self.connected = true;
        info!("connected to player");

        match client.status().await {
            Ok(Some(status)) => Ok(self.apply_status(status)),
            Ok(None) => {
                debug!("player reported no status after connect");
                Ok(Vec::new())
            }
            Err(err) => {
                warn!(error = %err, "status refresh after connect failed");
                Ok(Vec::new())
            }
        }
    }

    /// Applies a full snapshot. A different track goes through the normal
    /// track change path.
    pub fn apply_status(&mut self, status: PlayerStatus) -> Vec<RecorderCommand> {
        self.repeat = status.repeat;
        self.shuffle = status.shuffle;
        self.client_version = status.client_version;
        self.on_play_state_changed(status.playing);
        self.on_volume_changed(status.volume);

        if let Some(track) = status.track {
            let same = self
                .current_track
                .as_ref()
                .map(|t| t.id == track.id)
                .unwrap_or(false);
            if !same {
                return self.change_track(track, status.position_secs);
            }
        }
        self.on_track_time_changed(status.position_secs);
        Vec::new()
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> Vec<RecorderCommand> {
        match event {
            SessionEvent::TrackChanged(track) => self.on_track_changed(track),
            SessionEvent::PlayStateChanged(playing) => {
                self.on_play_state_changed(playing);
                Vec::new()
            }
            SessionEvent::TrackTimeChanged(position) => {
                self.on_track_time_changed(position);
                Vec::new()
            }
            SessionEvent::VolumeChanged(volume) => {
                self.on_volume_changed(volume);
                Vec::new()
            }
        }
    }

    pub fn on_track_changed(&mut self, track: Track) -> Vec<RecorderCommand> {
        self.change_track(track, 0.0)
    }

    /// Switches to `track` already `position_secs` in, so a start covers only
    /// what is left of it.
    fn change_track(&mut self, track: Track, position_secs: f64) -> Vec<RecorderCommand> {
        let mut commands = Vec::new();
        if let Some(session_id) = self.active.take() {
            commands.push(RecorderCommand::Stop { session_id });
        }

        if track.is_ad {
            info!(id = %track.id, "now playing: advertisement");
        } else {
            info!(
                title = %track.title.name,
                artist = %track.artist.name,
                album = %track.album.name,
                length = %format_time(f64::from(track.length_secs)),
                "now playing"
            );
        }

        self.current_track = Some(track);
        self.on_track_time_changed(position_secs);

        if self.recording_intent {
            commands.extend(self.start_for_current());
        }
        commands
    }

    pub fn on_play_state_changed(&mut self, playing: bool) {
        if self.playback.playing != playing {
            info!(playing, "play state changed");
        }
        self.playback.playing = playing;
    }

    pub fn on_track_time_changed(&mut self, position_secs: f64) -> Progress {
        let length = self.current_track.as_ref().map(|t| t.length_secs);
        let position = position_secs.max(0.0);
        let progress = match length {
            Some(length) => Progress::new(position, length),
            None => Progress::new(position, position.floor() as u32),
        };
        self.playback.position_secs = match length {
            Some(length) => position.min(f64::from(length)),
            None => position,
        };
        progress
    }

    pub fn on_volume_changed(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        if (self.playback.volume - volume).abs() >= 0.01 {
            debug!(volume_percent = (volume * 100.0).round(), "volume changed");
        }
        self.playback.volume = volume;
    }

    pub fn toggle_recording_intent(&mut self) -> Vec<RecorderCommand> {
        self.recording_intent = !self.recording_intent;
        info!(enabled = self.recording_intent, "recording intent toggled");

        let mut commands = Vec::new();
        if self.recording_intent {
            if self.active.is_none() {
                if self.current_track.is_none() {
                    debug!("{}; recording starts with the next track", CoordinatorError::NoActiveTrack);
                }
                commands.extend(self.start_for_current());
            }
        } else if let Some(session_id) = self.active.take() {
            commands.push(RecorderCommand::Stop { session_id });
        }
        commands
    }

    /// The recorder could not start `session_id`. Intent stays on so the next
    /// track is attempted again.
    pub fn on_recorder_launch_failed(&mut self, session_id: u64, reason: &str) -> CoordinatorError {
        if self.active == Some(session_id) {
            self.active = None;
        }
        CoordinatorError::RecorderLaunchFailed {
            session_id,
            reason: reason.to_string(),
        }
    }

    /// Stop command for whatever is still capturing.
    pub fn shutdown(&mut self) -> Option<RecorderCommand> {
        self.active
            .take()
            .map(|session_id| RecorderCommand::Stop { session_id })
    }

    /// Browser links for the current track's title, artist and album.
    pub fn track_links(&self) -> Result<Vec<TrackLink>, CoordinatorError> {
        let track = self
            .current_track
            .as_ref()
            .filter(|t| !t.is_ad)
            .ok_or(CoordinatorError::NoActiveTrack)?;

        let links = [
            ("title", &track.title),
            ("artist", &track.artist),
            ("album", &track.album),
        ]
        .into_iter()
        .filter_map(|(label, resource)| {
            let raw = resource.uri.as_deref()?;
            let url = if raw.starts_with("http") {
                raw.to_string()
            } else {
                PlayerUri::parse(raw)?.web_url()?
            };
            Some(TrackLink {
                label,
                name: resource.name.clone(),
                url,
            })
        })
        .collect();
        Ok(links)
    }

    pub fn view(&self) -> NowPlayingView {
        let track = self.current_track.as_ref();
        let length = track.map(|t| t.length_secs).unwrap_or(0);
        let is_ad = track.map(|t| t.is_ad).unwrap_or(false);
        let named = |pick: fn(&Track) -> &str| {
            track
                .filter(|t| !t.is_ad)
                .map(pick)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        NowPlayingView {
            connected: self.connected,
            playing: self.playback.playing,
            is_ad,
            title: named(|t| t.title.name.as_str()),
            artist: named(|t| t.artist.name.as_str()),
            album: named(|t| t.album.name.as_str()),
            track_ref: track
                .filter(|t| !t.is_ad)
                .and_then(|t| t.title.uri.as_deref())
                .and_then(PlayerUri::parse)
                .map(|uri| uri.id().to_string()),
            time: format!(
                "{}/{}",
                format_time(self.playback.position_secs),
                format_time(f64::from(length))
            ),
            progress: Progress::new(self.playback.position_secs, length),
            volume_percent: (self.playback.volume * 100.0).round() as u8,
            repeat: self.repeat,
            shuffle: self.shuffle,
            client_version: self.client_version.clone(),
            recording_intent: self.recording_intent,
            recording: self.active.is_some(),
        }
    }

    fn start_for_current(&mut self) -> Option<RecorderCommand> {
        let track = self.current_track.as_ref()?;
        if track.is_ad {
            debug!("advertisement playing; not recording");
            return None;
        }

        let played = self.playback.position_secs.max(0.0).floor() as u32;
        let remaining_secs = track.length_secs.saturating_sub(played);
        if remaining_secs == 0 {
            warn!(title = %track.title.name, "nothing left of the track to record");
            return None;
        }

        let request = RecordingRequest {
            session_id: self.next_session_id + 1,
            artist: track.artist.name.clone(),
            album: track.album.name.clone(),
            title: track.title.name.clone(),
            remaining_secs,
        };
        self.next_session_id += 1;
        self.active = Some(request.session_id);
        info!(
            session_id = request.session_id,
            title = %request.title,
            remaining = %format_time(f64::from(remaining_secs)),
            "recording requested"
        );
        Some(RecorderCommand::Start(request))
    }
}
