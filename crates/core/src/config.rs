use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Backend used to reach the player: `mpris`, `windows` or `auto`.
    pub backend: String,
    /// Player the backend binds to, matched against MPRIS bus names or
    /// Windows media session app ids.
    pub name: String,
    pub poll_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            name: "spotify".to_string(),
            poll_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecorderConfig {
    pub executable: PathBuf,
    pub output_dir: PathBuf,
    pub loopback_device: u32,
    pub mpeg_quality: u32,
    pub stop_timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("fmedia"),
            output_dir: PathBuf::from("recordings"),
            loopback_device: 4,
            mpeg_quality: 320,
            stop_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub player: PlayerConfig,
    pub recorder: RecorderConfig,
    /// Start with recording intent already switched on.
    pub record_on_start: bool,
    pub log_level: String,
    pub file_watch_poll_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            player: PlayerConfig::default(),
            recorder: RecorderConfig::default(),
            record_on_start: false,
            log_level: "info".to_string(),
            file_watch_poll_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            log_level = "debug"

            [recorder]
            output_dir = "/tmp/captures"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.schema_version, 1);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.player.name, "spotify");
        assert_eq!(cfg.recorder.output_dir.to_str(), Some("/tmp/captures"));
        assert_eq!(cfg.recorder.loopback_device, 4);
        assert_eq!(cfg.recorder.mpeg_quality, 320);
    }

    #[test]
    fn defaults_serialize_to_toml() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(text.contains("[recorder]"));
        assert!(text.contains("mpeg_quality = 320"));
    }
}
