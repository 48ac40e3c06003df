use serde::{Deserialize, Serialize};

/// A named player entity (track, artist or album) with its player reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Resource {
    pub name: String,
    pub uri: Option<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, uri: Option<String>) -> Self {
        Self {
            name: name.into(),
            uri,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }
}

/// Track metadata as reported by the player. Advertisements may carry
/// empty resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: Resource,
    pub artist: Resource,
    pub album: Resource,
    pub length_secs: u32,
    pub is_ad: bool,
}

impl Track {
    pub fn advertisement(id: impl Into<String>, length_secs: u32) -> Self {
        Self {
            id: id.into(),
            title: Resource::default(),
            artist: Resource::default(),
            album: Resource::default(),
            length_secs,
            is_ad: true,
        }
    }
}

/// Snapshot of the player pulled on connect and on every poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    pub playing: bool,
    pub position_secs: f64,
    pub volume: f64,
    pub track: Option<Track>,
    pub repeat: bool,
    pub shuffle: bool,
    pub client_version: Option<String>,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            playing: false,
            position_secs: 0.0,
            volume: 1.0,
            track: None,
            repeat: false,
            shuffle: false,
            client_version: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlaybackState {
    pub playing: bool,
    pub position_secs: f64,
    pub volume: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            position_secs: 0.0,
            volume: 1.0,
        }
    }
}

/// Everything the recorder needs to capture one track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingRequest {
    pub session_id: u64,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub remaining_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderCommand {
    Start(RecordingRequest),
    Stop { session_id: u64 },
}

impl RecorderCommand {
    pub fn session_id(&self) -> u64 {
        match self {
            RecorderCommand::Start(req) => req.session_id,
            RecorderCommand::Stop { session_id } => *session_id,
        }
    }
}
