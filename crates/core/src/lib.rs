pub mod config;
pub mod model;
pub mod uri;

pub use config::{AppConfig, PlayerConfig, RecorderConfig};
pub use model::{
    PlaybackState, PlayerStatus, RecorderCommand, RecordingRequest, Resource, Track,
};
pub use uri::PlayerUri;
