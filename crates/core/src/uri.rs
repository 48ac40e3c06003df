use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

const WEB_BASE: &str = "https://open.spotify.com/";

/// A parsed player reference, either `spotify:<kind>:<id>`, the matching
/// `open.spotify.com` link, or a `spotify:local:` file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerUri {
    Remote {
        kind: String,
        id: String,
    },
    Local {
        artist: String,
        album: String,
        title: String,
        length_secs: Option<u32>,
    },
}

impl PlayerUri {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Self::parse_web(raw);
        }

        let rest = raw.strip_prefix("spotify:")?;
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.first() == Some(&"local") {
            return Some(PlayerUri::Local {
                artist: decode_local(parts.get(1).copied().unwrap_or_default()),
                album: decode_local(parts.get(2).copied().unwrap_or_default()),
                title: decode_local(parts.get(3).copied().unwrap_or_default()),
                length_secs: parts.get(4).and_then(|v| v.parse().ok()),
            });
        }

        // Legacy playlist references look like `user:<name>:playlist:<id>`.
        if parts.len() < 2 {
            return None;
        }
        let kind = parts[parts.len() - 2];
        let id = parts[parts.len() - 1];
        if kind.is_empty() || id.is_empty() {
            return None;
        }
        Some(PlayerUri::Remote {
            kind: kind.to_string(),
            id: id.to_string(),
        })
    }

    fn parse_web(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return None;
        }
        Some(PlayerUri::Remote {
            kind: segments[segments.len() - 2].to_string(),
            id: segments[segments.len() - 1].to_string(),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            PlayerUri::Remote { id, .. } => id,
            PlayerUri::Local { title, .. } => title,
        }
    }

    pub fn is_ad(&self) -> bool {
        matches!(self, PlayerUri::Remote { kind, .. } if kind == "ad")
    }

    /// Browser link for the reference. Local files have none.
    pub fn web_url(&self) -> Option<String> {
        match self {
            PlayerUri::Remote { kind, id } => {
                let base = Url::parse(WEB_BASE).ok()?;
                base.join(&format!("{kind}/{id}")).ok().map(String::from)
            }
            PlayerUri::Local { .. } => None,
        }
    }
}

pub fn is_ad_reference(raw: &str) -> bool {
    raw.contains(":ad:") || raw.contains("/ad/")
}

pub fn spotify_search_url(artist: &str, title: &str) -> String {
    let q = format!("{} {}", artist, title);
    let encoded = utf8_percent_encode(&q, NON_ALPHANUMERIC).to_string();
    format!("{WEB_BASE}search/{encoded}")
}

fn decode_local(part: &str) -> String {
    let spaced = part.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::{is_ad_reference, spotify_search_url, PlayerUri};

    #[test]
    fn url_builder_encodes_queries() {
        let spotify = spotify_search_url("AC/DC", "Back In Black");
        assert!(spotify.contains("AC%2FDC%20Back%20In%20Black"));
    }

    #[test]
    fn parses_track_reference_and_builds_link() {
        let uri = PlayerUri::parse("spotify:track:4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(uri.id(), "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(
            uri.web_url().as_deref(),
            Some("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC")
        );
    }

    #[test]
    fn parses_legacy_playlist_and_web_links() {
        let legacy = PlayerUri::parse("spotify:user:someone:playlist:37i9dQ").unwrap();
        assert_eq!(
            legacy,
            PlayerUri::Remote {
                kind: "playlist".to_string(),
                id: "37i9dQ".to_string()
            }
        );

        let web = PlayerUri::parse("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3").unwrap();
        assert_eq!(web.id(), "1DFixLWuPkv3KT3TnV35m3");
    }

    #[test]
    fn decodes_local_references() {
        let uri = PlayerUri::parse("spotify:local:Daft+Punk:Discovery:One+More+Time%21:320").unwrap();
        match uri {
            PlayerUri::Local {
                artist,
                album,
                title,
                length_secs,
            } => {
                assert_eq!(artist, "Daft Punk");
                assert_eq!(album, "Discovery");
                assert_eq!(title, "One More Time!");
                assert_eq!(length_secs, Some(320));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn recognises_advertisements() {
        assert!(PlayerUri::parse("spotify:ad:000000012c6e2d5b").unwrap().is_ad());
        assert!(is_ad_reference("/com/spotify/ad/000000012c6e2d5b"));
        assert!(!is_ad_reference("spotify:track:4uLU6hMCjMI75M1A2tKUQC"));
        assert!(PlayerUri::parse("not a reference").is_none());
    }
}
