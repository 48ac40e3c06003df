use crate::PlayerBackend;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use nowplaying_recorder_core::uri::{is_ad_reference, PlayerUri};
use nowplaying_recorder_core::{PlayerStatus, Resource, Track};
use std::collections::HashMap;
use tracing::debug;
use zbus::zvariant::{OwnedValue, Value};
use zbus::{Connection, Proxy};

const BUS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const PLAYER_PATH: &str = "/org/mpris/MediaPlayer2";
const PLAYER_IFACE: &str = "org.mpris.MediaPlayer2.Player";

/// Player reached over the MPRIS D-Bus interface. The session bus plays the
/// role of the local control helper.
pub struct MprisBackend {
    player: String,
    conn: Option<Connection>,
}

impl MprisBackend {
    pub fn new(player: &str) -> Self {
        Self {
            player: player.to_lowercase(),
            conn: None,
        }
    }

    async fn connection(&mut self) -> Result<Connection> {
        if let Some(conn) = &self.conn {
            return Ok(conn.clone());
        }
        let conn = Connection::session()
            .await
            .context("failed to connect DBus session")?;
        self.conn = Some(conn.clone());
        Ok(conn)
    }

    async fn find_player(&self, conn: &Connection) -> Result<Option<String>> {
        let proxy = Proxy::new(
            conn,
            "org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
        )
        .await?;

        let names: Vec<String> = proxy.call("ListNames", &()).await?;
        let mut players: Vec<String> = names
            .into_iter()
            .filter(|n| {
                n.strip_prefix(BUS_PREFIX)
                    .map(|rest| rest.to_lowercase().starts_with(&self.player))
                    .unwrap_or(false)
            })
            .collect();
        players.sort();
        Ok(players.into_iter().next())
    }

    async fn player_proxy(&mut self) -> Result<Option<Proxy<'static>>> {
        let conn = self.connection().await?;
        let Some(bus_name) = self.find_player(&conn).await? else {
            return Ok(None);
        };
        let proxy = Proxy::new_owned(conn, bus_name, PLAYER_PATH, PLAYER_IFACE).await?;
        Ok(Some(proxy))
    }

    async fn call(&mut self, method: &str) -> Result<()> {
        let proxy = self
            .player_proxy()
            .await?
            .ok_or_else(|| anyhow!("{} is not running", self.player))?;
        proxy
            .call_method(method, &())
            .await
            .with_context(|| format!("MPRIS {method} failed"))?;
        Ok(())
    }

    fn ov_to_string(v: &OwnedValue) -> Option<String> {
        match &**v {
            Value::Str(s) => Some(s.to_string()),
            Value::ObjectPath(p) => Some(p.to_string()),
            _ => None,
        }
    }

    fn ov_to_i64(v: &OwnedValue) -> Option<i64> {
        if let Ok(i) = <i64>::try_from(v) {
            return Some(i);
        }
        if let Ok(u) = <u64>::try_from(v) {
            return Some(u as i64);
        }
        None
    }

    fn artist_from_value(v: &OwnedValue) -> Option<String> {
        if let Ok(arr) = Vec::<String>::try_from(v.try_clone().ok()?) {
            return arr.into_iter().next();
        }
        None
    }

    fn track_from_metadata(metadata: &HashMap<String, OwnedValue>) -> Option<Track> {
        let track_id = metadata.get("mpris:trackid").and_then(Self::ov_to_string);
        let url = metadata.get("xesam:url").and_then(Self::ov_to_string);
        let title = metadata.get("xesam:title").and_then(Self::ov_to_string);
        if track_id.is_none() && title.is_none() {
            return None;
        }

        let parsed = url.as_deref().and_then(PlayerUri::parse);
        let is_ad = track_id.as_deref().map(is_ad_reference).unwrap_or(false)
            || parsed.as_ref().map(PlayerUri::is_ad).unwrap_or(false);
        let length_secs = metadata
            .get("mpris:length")
            .and_then(Self::ov_to_i64)
            .map(|us| (us.max(0) / 1_000_000) as u32)
            .unwrap_or(0);

        let reference = parsed.map(|uri| match uri {
            PlayerUri::Remote { kind, id } => format!("spotify:{kind}:{id}"),
            PlayerUri::Local { .. } => url.clone().unwrap_or_default(),
        });

        let title = title.unwrap_or_default();
        let artist = metadata
            .get("xesam:artist")
            .and_then(Self::artist_from_value)
            .unwrap_or_default();
        let album = metadata
            .get("xesam:album")
            .and_then(Self::ov_to_string)
            .unwrap_or_default();

        let id = track_id
            .or_else(|| reference.clone())
            .unwrap_or_else(|| format!("{}:{}", artist, title));

        Some(Track {
            id,
            title: Resource::new(title, reference),
            artist: Resource::named(artist),
            album: Resource::named(album),
            length_secs,
            is_ad,
        })
    }
}

#[async_trait]
impl PlayerBackend for MprisBackend {
    fn name(&self) -> &'static str {
        "mpris"
    }

    async fn is_host_running(&mut self) -> bool {
        match self.connection().await {
            Ok(conn) => matches!(self.find_player(&conn).await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    async fn is_helper_running(&mut self) -> bool {
        self.connection().await.is_ok()
    }

    async fn connect(&mut self) -> Result<bool> {
        Ok(self.player_proxy().await?.is_some())
    }

    async fn status(&mut self) -> Result<Option<PlayerStatus>> {
        let Some(proxy) = self.player_proxy().await? else {
            return Ok(None);
        };

        let playback: String = proxy.get_property("PlaybackStatus").await?;
        let metadata: HashMap<String, OwnedValue> = proxy.get_property("Metadata").await?;
        let position_us: i64 = proxy.get_property("Position").await.unwrap_or(0);
        let volume: f64 = proxy.get_property("Volume").await.unwrap_or(1.0);
        let loop_status: String = proxy
            .get_property("LoopStatus")
            .await
            .unwrap_or_else(|_| "None".to_string());
        let shuffle: bool = proxy.get_property("Shuffle").await.unwrap_or(false);

        Ok(Some(PlayerStatus {
            playing: playback == "Playing",
            position_secs: position_us.max(0) as f64 / 1_000_000.0,
            volume: volume.clamp(0.0, 1.0),
            track: Self::track_from_metadata(&metadata),
            repeat: loop_status != "None",
            shuffle,
            client_version: None,
        }))
    }

    async fn play(&mut self) -> Result<()> {
        self.call("Play").await
    }

    async fn pause(&mut self) -> Result<()> {
        self.call("Pause").await
    }

    async fn skip(&mut self) -> Result<()> {
        self.call("Next").await
    }

    async fn previous(&mut self) -> Result<()> {
        self.call("Previous").await
    }

    async fn play_reference(&mut self, uri: &str, context_uri: Option<&str>) -> Result<()> {
        let proxy = self
            .player_proxy()
            .await?
            .ok_or_else(|| anyhow!("{} is not running", self.player))?;
        if let Some(context) = context_uri {
            debug!(context, "MPRIS has no playback context; opening the reference alone");
        }
        proxy
            .call_method("OpenUri", &(uri,))
            .await
            .context("MPRIS OpenUri failed")?;
        Ok(())
    }
}
