use anyhow::{bail, Result};

pub const HELP: &str = "\
commands:
  play | pause | skip | prev       control the player
  open <uri> [context-uri]         play a reference, optionally within a context
  record                           toggle recording of this and all following tracks
  status                           show what is playing
  links                            show web links for the current track
  help                             this text
  quit                             stop recording and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Play,
    Pause,
    Skip,
    Previous,
    Open {
        uri: String,
        context_uri: Option<String>,
    },
    Record,
    Status,
    Links,
    Help,
    Quit,
}

impl UserCommand {
    /// `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "play" => UserCommand::Play,
            "pause" => UserCommand::Pause,
            "skip" | "next" => UserCommand::Skip,
            "prev" | "previous" => UserCommand::Previous,
            "open" => {
                let Some(uri) = words.next() else {
                    bail!("usage: open <uri> [context-uri]");
                };
                UserCommand::Open {
                    uri: uri.to_string(),
                    context_uri: words.next().map(str::to_string),
                }
            }
            "record" | "rec" => UserCommand::Record,
            "status" => UserCommand::Status,
            "links" => UserCommand::Links,
            "help" | "?" => UserCommand::Help,
            "quit" | "exit" => UserCommand::Quit,
            other => bail!("unknown command `{other}`; type `help`"),
        };

        if words.next().is_some() {
            bail!("too many arguments for `{verb}`");
        }
        Ok(Some(cmd))
    }
}

#[cfg(test)]
mod tests {
    use super::UserCommand;

    #[test]
    fn parses_player_commands_and_aliases() {
        assert_eq!(UserCommand::parse("  play ").unwrap(), Some(UserCommand::Play));
        assert_eq!(UserCommand::parse("NEXT").unwrap(), Some(UserCommand::Skip));
        assert_eq!(UserCommand::parse("prev").unwrap(), Some(UserCommand::Previous));
        assert_eq!(UserCommand::parse("rec").unwrap(), Some(UserCommand::Record));
        assert_eq!(UserCommand::parse("").unwrap(), None);
    }

    #[test]
    fn open_takes_reference_and_optional_context() {
        assert_eq!(
            UserCommand::parse("open spotify:track:abc spotify:album:def").unwrap(),
            Some(UserCommand::Open {
                uri: "spotify:track:abc".to_string(),
                context_uri: Some("spotify:album:def".to_string()),
            })
        );
        assert!(UserCommand::parse("open").is_err());
        assert!(UserCommand::parse("open a b c").is_err());
    }

    #[test]
    fn rejects_unknown_words() {
        let err = UserCommand::parse("rewind").unwrap_err();
        assert!(err.to_string().contains("rewind"));
        assert!(UserCommand::parse("pause now").is_err());
    }
}
