use crate::PlayerBackend;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use nowplaying_recorder_core::{uri, PlayerStatus, Resource, Track};
use windows::Media::Control::{
    GlobalSystemMediaTransportControlsSession, GlobalSystemMediaTransportControlsSessionManager,
    GlobalSystemMediaTransportControlsSessionPlaybackStatus,
};

/// Player reached through the Windows global media session manager, which
/// stands in for the local control helper.
pub struct WindowsSessionBackend {
    player: String,
}

impl WindowsSessionBackend {
    pub fn new(player: &str) -> Self {
        Self {
            player: player.to_lowercase(),
        }
    }

    fn manager() -> Result<GlobalSystemMediaTransportControlsSessionManager> {
        Ok(GlobalSystemMediaTransportControlsSessionManager::RequestAsync()?.get()?)
    }

    fn find_session(&self) -> Result<Option<GlobalSystemMediaTransportControlsSession>> {
        let sessions = Self::manager()?.GetSessions()?;
        for i in 0..sessions.Size()? {
            let session = sessions.GetAt(i)?;
            let app_id = session.SourceAppUserModelId()?.to_string_lossy();
            if app_id.to_lowercase().contains(&self.player) {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    fn session(&self) -> Result<GlobalSystemMediaTransportControlsSession> {
        self.find_session()?
            .ok_or_else(|| anyhow!("{} is not running", self.player))
    }

    fn read_track(session: &GlobalSystemMediaTransportControlsSession) -> Result<Option<Track>> {
        let props = session.TryGetMediaPropertiesAsync()?.get()?;
        let timeline = session.GetTimelineProperties()?;

        let title = props.Title()?.to_string_lossy();
        let artist = props.Artist()?.to_string_lossy();
        let album = props.AlbumTitle()?.to_string_lossy();
        if title.is_empty() && artist.is_empty() {
            return Ok(None);
        }

        let duration_100ns = timeline.EndTime()?.Duration - timeline.StartTime()?.Duration;
        let length_secs = if duration_100ns > 0 {
            (duration_100ns / 10_000_000) as u32
        } else {
            0
        };

        // The media session exposes no references; advertisements show up
        // without an artist.
        let is_ad = artist.is_empty() || title.eq_ignore_ascii_case("advertisement");
        let title_link = if is_ad {
            None
        } else {
            Some(uri::spotify_search_url(&artist, &title))
        };

        Ok(Some(Track {
            id: format!("{}:{}:{}", artist, title, album),
            title: Resource::new(title, title_link),
            artist: Resource::named(artist),
            album: Resource::named(album),
            length_secs,
            is_ad,
        }))
    }
}

#[async_trait]
impl PlayerBackend for WindowsSessionBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn is_host_running(&mut self) -> bool {
        matches!(self.find_session(), Ok(Some(_)))
    }

    async fn is_helper_running(&mut self) -> bool {
        Self::manager().is_ok()
    }

    async fn connect(&mut self) -> Result<bool> {
        Ok(self.find_session()?.is_some())
    }

    async fn status(&mut self) -> Result<Option<PlayerStatus>> {
        let Some(session) = self.find_session()? else {
            return Ok(None);
        };

        let playback = session.GetPlaybackInfo()?;
        let timeline = session.GetTimelineProperties()?;
        let playing = playback.PlaybackStatus()?
            == GlobalSystemMediaTransportControlsSessionPlaybackStatus::Playing;
        let position_100ns = timeline.Position()?.Duration.max(0);

        Ok(Some(PlayerStatus {
            playing,
            position_secs: position_100ns as f64 / 10_000_000.0,
            track: Self::read_track(&session)?,
            ..PlayerStatus::default()
        }))
    }

    async fn play(&mut self) -> Result<()> {
        self.session()?.TryPlayAsync()?.get()?;
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.session()?.TryPauseAsync()?.get()?;
        Ok(())
    }

    async fn skip(&mut self) -> Result<()> {
        self.session()?.TrySkipNextAsync()?.get()?;
        Ok(())
    }

    async fn previous(&mut self) -> Result<()> {
        self.session()?.TrySkipPreviousAsync()?.get()?;
        Ok(())
    }

    async fn play_reference(&mut self, uri: &str, _context_uri: Option<&str>) -> Result<()> {
        bail!("the Windows media session cannot open references ({uri})")
    }
}
