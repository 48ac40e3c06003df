//! Drives the external loopback capture tool. The tool is an opaque
//! subprocess: one invocation records until a time bound, a second
//! invocation with a global quit command ends it early.

use async_trait::async_trait;
use nowplaying_recorder_core::{RecorderConfig, RecordingRequest};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod fmedia;
mod worker;

pub use fmedia::FmediaRecorder;
pub use worker::{spawn_recorder_worker, RecorderHandle, RecorderOp, RecorderOutcome};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to launch {}: {source}", program.display())]
    LaunchFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("recorder quit command exited with {status}")]
    QuitFailed { status: std::process::ExitStatus },

    #[error("cannot prepare output file {}: {source}", path.display())]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("recorder worker is gone")]
    WorkerGone,
}

/// A capture process that was accepted by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub output: PathBuf,
    pub pid: Option<u32>,
}

#[async_trait]
pub trait Recorder: Send {
    async fn start(&mut self, request: &RecordingRequest) -> Result<Launch, RecorderError>;
    /// Safe to call when nothing is recording.
    async fn stop(&mut self, session_id: u64) -> Result<(), RecorderError>;
    fn reconfigure(&mut self, config: RecorderConfig);
}

const QUIT_ARG: &str = "--globcmd=quit";

/// `MM:SS` bound passed to `--until`.
pub fn format_until(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn output_file_name(request: &RecordingRequest) -> String {
    format!(
        "{} - {} - {}.mp3",
        sanitize_component(&request.artist),
        sanitize_component(&request.album),
        sanitize_component(&request.title)
    )
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim().trim_end_matches('.').to_string()
}

// `;` separates meta pairs.
fn meta_value(raw: &str) -> String {
    raw.replace(';', ",")
}

pub fn record_args(
    config: &RecorderConfig,
    request: &RecordingRequest,
    output: &Path,
) -> Vec<OsString> {
    let meta = format!(
        "--meta=artist={};title={};album={};",
        meta_value(&request.artist),
        meta_value(&request.title),
        meta_value(&request.album)
    );
    vec![
        OsString::from("--record"),
        OsString::from("--out"),
        output.as_os_str().to_owned(),
        OsString::from(format!("--dev-loopback={}", config.loopback_device)),
        OsString::from(format!("--until={}", format_until(request.remaining_secs))),
        OsString::from(meta),
        OsString::from(format!("--mpeg-quality={}", config.mpeg_quality)),
    ]
}

pub fn stop_args() -> [&'static str; 1] {
    [QUIT_ARG]
}

/// Relative executables are looked up in `lib/` next to the running binary
/// first, then left to the `PATH` search.
pub fn resolve_executable(configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        return configured.to_path_buf();
    }

    let bundled = std::env::current_exe().ok().and_then(|exe| {
        let mut candidate = exe.parent()?.join("lib").join(configured);
        if candidate.extension().is_none() && !std::env::consts::EXE_EXTENSION.is_empty() {
            candidate.set_extension(std::env::consts::EXE_EXTENSION);
        }
        candidate.is_file().then_some(candidate)
    });

    bundled.unwrap_or_else(|| configured.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::{format_until, output_file_name, record_args, resolve_executable, stop_args};
    use nowplaying_recorder_core::{RecorderConfig, RecordingRequest};
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    fn request() -> RecordingRequest {
        RecordingRequest {
            session_id: 7,
            artist: "AC/DC".to_string(),
            album: "Back In Black".to_string(),
            title: "Hells Bells; Live?".to_string(),
            remaining_secs: 150,
        }
    }

    #[test]
    fn until_is_zero_padded() {
        assert_eq!(format_until(150), "02:30");
        assert_eq!(format_until(5), "00:05");
        assert_eq!(format_until(3_600), "60:00");
    }

    #[test]
    fn file_name_strips_path_separators() {
        assert_eq!(
            output_file_name(&request()),
            "AC_DC - Back In Black - Hells Bells; Live_.mp3"
        );
    }

    #[test]
    fn record_invocation_matches_capture_tool_contract() {
        let cfg = RecorderConfig {
            loopback_device: 2,
            mpeg_quality: 256,
            ..RecorderConfig::default()
        };
        let args = record_args(&cfg, &request(), Path::new("out/file.mp3"));

        let expected: Vec<OsString> = [
            "--record",
            "--out",
            "out/file.mp3",
            "--dev-loopback=2",
            "--until=02:30",
            "--meta=artist=AC/DC;title=Hells Bells, Live?;album=Back In Black;",
            "--mpeg-quality=256",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args, expected);
        assert_eq!(stop_args(), ["--globcmd=quit"]);
    }

    #[test]
    fn absolute_or_unbundled_executables_are_kept() {
        let abs = std::env::temp_dir().join("fmedia");
        assert_eq!(resolve_executable(&abs), abs);
        assert_eq!(
            resolve_executable(Path::new("surely-not-bundled-capture-tool")),
            PathBuf::from("surely-not-bundled-capture-tool")
        );
    }
}
