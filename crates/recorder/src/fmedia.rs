use crate::{record_args, resolve_executable, stop_args, output_file_name, Launch, Recorder, RecorderError};
use async_trait::async_trait;
use nowplaying_recorder_core::{RecorderConfig, RecordingRequest};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

struct Capture {
    session_id: u64,
    output: PathBuf,
    child: Child,
}

/// Launches an fmedia-compatible capture tool.
pub struct FmediaRecorder {
    config: RecorderConfig,
    executable: PathBuf,
    active: Option<Capture>,
}

impl FmediaRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        let executable = resolve_executable(&config.executable);
        Self {
            config,
            executable,
            active: None,
        }
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    }

    fn launch_failed(&self, source: std::io::Error) -> RecorderError {
        RecorderError::LaunchFailed {
            program: self.executable.clone(),
            source,
        }
    }

    async fn reap_leftover(&mut self) {
        let Some(mut capture) = self.active.take() else {
            return;
        };
        if let Ok(None) = capture.child.try_wait() {
            warn!(
                session_id = capture.session_id,
                output = %capture.output.display(),
                "previous capture still running; killing it"
            );
            let _ = capture.child.kill().await;
        }
    }
}

#[async_trait]
impl Recorder for FmediaRecorder {
    async fn start(&mut self, request: &RecordingRequest) -> Result<Launch, RecorderError> {
        self.reap_leftover().await;

        let dir = &self.config.output_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| RecorderError::OutputFile {
                path: dir.clone(),
                source,
            })?;

        let output = dir.join(output_file_name(request));
        match tokio::fs::remove_file(&output).await {
            Ok(()) => debug!(output = %output.display(), "removed stale recording"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(RecorderError::OutputFile { path: output, source }),
        }

        let args = record_args(&self.config, request, &output);
        debug!(program = %self.executable.display(), ?args, "launching capture");
        let child = self
            .command()
            .args(&args)
            .spawn()
            .map_err(|source| self.launch_failed(source))?;

        let pid = child.id();
        info!(
            session_id = request.session_id,
            pid,
            output = %output.display(),
            "capture started"
        );
        self.active = Some(Capture {
            session_id: request.session_id,
            output: output.clone(),
            child,
        });
        Ok(Launch { output, pid })
    }

    async fn stop(&mut self, session_id: u64) -> Result<(), RecorderError> {
        // The capture is reaped even when the quit command cannot be launched.
        let quit = self.command().args(stop_args()).status().await;

        if let Some(mut capture) = self.active.take() {
            if capture.session_id != session_id {
                debug!(
                    requested = session_id,
                    running = capture.session_id,
                    "stopping a different session than requested"
                );
            }
            let wait = Duration::from_millis(self.config.stop_timeout_ms);
            match tokio::time::timeout(wait, capture.child.wait()).await {
                Ok(Ok(exit)) => info!(
                    session_id = capture.session_id,
                    ?exit,
                    output = %capture.output.display(),
                    "capture finished"
                ),
                Ok(Err(err)) => warn!(error = %err, "failed waiting for capture process"),
                Err(_) => {
                    warn!(
                        session_id = capture.session_id,
                        "capture ignored quit command; killing it"
                    );
                    let _ = capture.child.kill().await;
                }
            }
        }

        let status = quit.map_err(|source| self.launch_failed(source))?;
        if !status.success() {
            return Err(RecorderError::QuitFailed { status });
        }
        Ok(())
    }

    fn reconfigure(&mut self, config: RecorderConfig) {
        self.executable = resolve_executable(&config.executable);
        self.config = config;
    }
}
