use crate::{Recorder, RecorderError};
use nowplaying_recorder_core::{RecorderCommand, RecorderConfig};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderOp {
    Start,
    Stop,
}

/// Result of one recorder command, reported after it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderOutcome {
    Started {
        session_id: u64,
        output: PathBuf,
        pid: Option<u32>,
    },
    Stopped {
        session_id: u64,
    },
    LaunchFailed {
        session_id: u64,
        op: RecorderOp,
        reason: String,
    },
}

enum WorkerMessage {
    Command(RecorderCommand),
    Reconfigure(RecorderConfig),
    Shutdown(oneshot::Sender<()>),
}

/// Submission side of the recorder worker. Submitting never waits for the
/// subprocess; results arrive on the outcome channel.
pub struct RecorderHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl RecorderHandle {
    pub fn submit(&self, command: RecorderCommand) -> Result<(), RecorderError> {
        self.tx
            .send(WorkerMessage::Command(command))
            .map_err(|_| RecorderError::WorkerGone)
    }

    pub fn reconfigure(&self, config: RecorderConfig) -> Result<(), RecorderError> {
        self.tx
            .send(WorkerMessage::Reconfigure(config))
            .map_err(|_| RecorderError::WorkerGone)
    }

    /// Waits until every command submitted so far has run.
    pub async fn shutdown(self) -> Result<(), RecorderError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Shutdown(ack_tx))
            .map_err(|_| RecorderError::WorkerGone)?;
        ack_rx.await.map_err(|_| RecorderError::WorkerGone)
    }
}

/// Runs recorder commands one at a time in submission order, so a stop has
/// always finished before the following start launches.
pub fn spawn_recorder_worker<R>(recorder: R) -> (RecorderHandle, mpsc::UnboundedReceiver<RecorderOutcome>)
where
    R: Recorder + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_worker(recorder, rx, outcome_tx));
    (RecorderHandle { tx }, outcome_rx)
}

async fn run_worker<R: Recorder>(
    mut recorder: R,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    outcomes: mpsc::UnboundedSender<RecorderOutcome>,
) {
    while let Some(msg) = rx.recv().await {
        let outcome = match msg {
            WorkerMessage::Command(RecorderCommand::Start(request)) => {
                match recorder.start(&request).await {
                    Ok(launch) => RecorderOutcome::Started {
                        session_id: request.session_id,
                        output: launch.output,
                        pid: launch.pid,
                    },
                    Err(err) => RecorderOutcome::LaunchFailed {
                        session_id: request.session_id,
                        op: RecorderOp::Start,
                        reason: err.to_string(),
                    },
                }
            }
            WorkerMessage::Command(RecorderCommand::Stop { session_id }) => {
                match recorder.stop(session_id).await {
                    Ok(()) => RecorderOutcome::Stopped { session_id },
                    Err(err) => RecorderOutcome::LaunchFailed {
                        session_id,
                        op: RecorderOp::Stop,
                        reason: err.to_string(),
                    },
                }
            }
            WorkerMessage::Reconfigure(config) => {
                debug!(executable = %config.executable.display(), "recorder reconfigured");
                recorder.reconfigure(config);
                continue;
            }
            WorkerMessage::Shutdown(ack) => {
                let _ = ack.send(());
                break;
            }
        };

        if outcomes.send(outcome).is_err() {
            warn!("recorder outcome receiver dropped");
        }
    }

    debug!("recorder worker stopped");
}

#[cfg(test)]
mod tests {
    use super::{spawn_recorder_worker, RecorderOp, RecorderOutcome};
    use crate::{Launch, Recorder, RecorderError};
    use async_trait::async_trait;
    use nowplaying_recorder_core::{RecorderCommand, RecorderConfig, RecordingRequest};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FakeRecorder {
        calls: Arc<Mutex<Vec<String>>>,
        fail_start: bool,
    }

    #[async_trait]
    impl Recorder for FakeRecorder {
        async fn start(&mut self, request: &RecordingRequest) -> Result<Launch, RecorderError> {
            // A slow launch must still finish before anything queued behind it.
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.calls
                .lock()
                .unwrap()
                .push(format!("start {}", request.session_id));
            if self.fail_start {
                return Err(RecorderError::LaunchFailed {
                    program: PathBuf::from("fmedia"),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                });
            }
            Ok(Launch {
                output: PathBuf::from(format!("{}.mp3", request.title)),
                pid: Some(42),
            })
        }

        async fn stop(&mut self, session_id: u64) -> Result<(), RecorderError> {
            self.calls.lock().unwrap().push(format!("stop {session_id}"));
            Ok(())
        }

        fn reconfigure(&mut self, config: RecorderConfig) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("reconfigure {}", config.mpeg_quality));
        }
    }

    fn start(session_id: u64) -> RecorderCommand {
        RecorderCommand::Start(RecordingRequest {
            session_id,
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            title: format!("t{session_id}"),
            remaining_secs: 60,
        })
    }

    #[tokio::test]
    async fn commands_run_in_submission_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (handle, mut outcomes) = spawn_recorder_worker(FakeRecorder {
            calls: calls.clone(),
            fail_start: false,
        });

        handle.submit(start(1)).unwrap();
        handle.submit(RecorderCommand::Stop { session_id: 1 }).unwrap();
        handle
            .reconfigure(RecorderConfig {
                mpeg_quality: 128,
                ..RecorderConfig::default()
            })
            .unwrap();
        handle.submit(start(2)).unwrap();
        handle.shutdown().await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["start 1", "stop 1", "reconfigure 128", "start 2"]
        );

        assert_eq!(
            outcomes.recv().await,
            Some(RecorderOutcome::Started {
                session_id: 1,
                output: PathBuf::from("t1.mp3"),
                pid: Some(42),
            })
        );
        assert_eq!(
            outcomes.recv().await,
            Some(RecorderOutcome::Stopped { session_id: 1 })
        );
    }

    #[tokio::test]
    async fn failed_launch_is_reported_not_swallowed() {
        let (handle, mut outcomes) = spawn_recorder_worker(FakeRecorder {
            calls: Arc::default(),
            fail_start: true,
        });

        handle.submit(start(3)).unwrap();
        match outcomes.recv().await {
            Some(RecorderOutcome::LaunchFailed {
                session_id, op, reason,
            }) => {
                assert_eq!(session_id, 3);
                assert_eq!(op, RecorderOp::Start);
                assert!(reason.contains("fmedia"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn outcome_channel_closes_once_the_worker_drains() {
        let (handle, mut outcomes) = spawn_recorder_worker(FakeRecorder {
            calls: Arc::default(),
            fail_start: false,
        });

        handle.submit(RecorderCommand::Stop { session_id: 7 }).unwrap();
        handle.shutdown().await.unwrap();

        assert_eq!(
            outcomes.recv().await,
            Some(RecorderOutcome::Stopped { session_id: 7 })
        );
        assert_eq!(outcomes.recv().await, None);
    }
}
