use crate::{diff_status, PlayerBackend, SessionClient, SessionEvent};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use nowplaying_recorder_core::PlayerStatus;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Skip,
    Previous,
    PlayReference {
        uri: String,
        context_uri: Option<String>,
    },
}

enum Request {
    HostRunning(oneshot::Sender<bool>),
    HelperRunning(oneshot::Sender<bool>),
    Connect(oneshot::Sender<Result<bool>>),
    Status(oneshot::Sender<Result<Option<PlayerStatus>>>),
    Listen(bool),
    Command(PlayerCommand, oneshot::Sender<Result<()>>),
}

/// Cloneable front for the session task. Every call is forwarded to the
/// single task that owns the backend.
#[derive(Clone)]
pub struct SessionHandle {
    backend_name: &'static str,
    tx: mpsc::Sender<Request>,
}

/// Starts the task that owns `backend`. Notifications are delivered on the
/// returned receiver once listening is switched on.
pub fn spawn_session(
    backend: Box<dyn PlayerBackend>,
    poll_interval: Duration,
) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let handle = SessionHandle {
        backend_name: backend.name(),
        tx,
    };
    tokio::spawn(run_session(backend, poll_interval, rx, event_tx));
    (handle, event_rx)
}

async fn run_session(
    mut backend: Box<dyn PlayerBackend>,
    poll_interval: Duration,
    mut requests: mpsc::Receiver<Request>,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut listening = false;
    let mut last: Option<PlayerStatus> = None;
    let mut poll_failing = false;

    loop {
        tokio::select! {
            req = requests.recv() => {
                let Some(req) = req else { break };
                match req {
                    Request::HostRunning(reply) => {
                        let _ = reply.send(backend.is_host_running().await);
                    }
                    Request::HelperRunning(reply) => {
                        let _ = reply.send(backend.is_helper_running().await);
                    }
                    Request::Connect(reply) => {
                        let _ = reply.send(backend.connect().await);
                    }
                    Request::Status(reply) => {
                        let res = backend.status().await;
                        if let Ok(status) = &res {
                            last = carry_forward(last.take(), status.clone());
                        }
                        let _ = reply.send(res);
                    }
                    Request::Listen(enabled) => {
                        if enabled != listening {
                            info!(backend = backend.name(), enabled, "event listening toggled");
                        }
                        listening = enabled;
                    }
                    Request::Command(cmd, reply) => {
                        debug!(backend = backend.name(), ?cmd, "player command");
                        let _ = reply.send(execute(backend.as_mut(), cmd).await);
                    }
                }
            }
            _ = ticker.tick(), if listening => {
                match backend.status().await {
                    Ok(next) => {
                        if poll_failing {
                            info!(backend = backend.name(), "player polling recovered");
                            poll_failing = false;
                        }
                        for event in diff_status(last.as_ref(), next.as_ref()) {
                            if events.send(event).await.is_err() {
                                debug!("event receiver dropped; session task exiting");
                                return;
                            }
                        }
                        last = carry_forward(last.take(), next);
                    }
                    Err(err) => {
                        if !poll_failing {
                            warn!(backend = backend.name(), error = %err, "player poll failed");
                            poll_failing = true;
                        } else {
                            debug!(backend = backend.name(), error = %err, "player poll still failing");
                        }
                    }
                }
            }
        }
    }

    debug!("session task stopped");
}

/// While the player reports nothing, the last snapshot is kept as paused so
/// the same track coming back is not reported as a new one.
fn carry_forward(last: Option<PlayerStatus>, next: Option<PlayerStatus>) -> Option<PlayerStatus> {
    match next {
        Some(next) => Some(next),
        None => last.map(|mut status| {
            status.playing = false;
            status
        }),
    }
}

async fn execute(backend: &mut dyn PlayerBackend, cmd: PlayerCommand) -> Result<()> {
    match cmd {
        PlayerCommand::Play => backend.play().await,
        PlayerCommand::Pause => backend.pause().await,
        PlayerCommand::Skip => backend.skip().await,
        PlayerCommand::Previous => backend.previous().await,
        PlayerCommand::PlayReference { uri, context_uri } => {
            backend.play_reference(&uri, context_uri.as_deref()).await
        }
    }
}

impl SessionHandle {
    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| anyhow!("player session task is gone"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("player session task dropped the request"))
    }

    pub async fn command(&self, cmd: PlayerCommand) -> Result<()> {
        self.request(|reply| Request::Command(cmd, reply)).await?
    }
}

#[async_trait]
impl SessionClient for SessionHandle {
    async fn is_host_running(&mut self) -> bool {
        self.request(Request::HostRunning).await.unwrap_or(false)
    }

    async fn is_helper_running(&mut self) -> bool {
        self.request(Request::HelperRunning).await.unwrap_or(false)
    }

    async fn connect(&mut self) -> Result<bool> {
        self.request(Request::Connect).await?
    }

    async fn status(&mut self) -> Result<Option<PlayerStatus>> {
        self.request(Request::Status).await?
    }

    async fn listen(&mut self, enabled: bool) -> Result<()> {
        self.tx
            .send(Request::Listen(enabled))
            .await
            .map_err(|_| anyhow!("player session task is gone"))
    }

    async fn play(&mut self) -> Result<()> {
        self.command(PlayerCommand::Play).await
    }

    async fn pause(&mut self) -> Result<()> {
        self.command(PlayerCommand::Pause).await
    }

    async fn skip(&mut self) -> Result<()> {
        self.command(PlayerCommand::Skip).await
    }

    async fn previous(&mut self) -> Result<()> {
        self.command(PlayerCommand::Previous).await
    }

    async fn play_reference(&mut self, uri: &str, context_uri: Option<&str>) -> Result<()> {
        self.command(PlayerCommand::PlayReference {
            uri: uri.to_string(),
            context_uri: context_uri.map(str::to_string),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{carry_forward, spawn_session, PlayerCommand};
    use crate::{diff_status, PlayerBackend, SessionClient, SessionEvent};
    use anyhow::Result;
    use async_trait::async_trait;
    use nowplaying_recorder_core::{PlayerStatus, Resource, Track};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays queued snapshots; repeats the last one once the queue is empty.
    struct ScriptedBackend {
        statuses: VecDeque<PlayerStatus>,
        current: Option<PlayerStatus>,
        commands: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PlayerBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn is_host_running(&mut self) -> bool {
            true
        }

        async fn is_helper_running(&mut self) -> bool {
            true
        }

        async fn connect(&mut self) -> Result<bool> {
            Ok(true)
        }

        async fn status(&mut self) -> Result<Option<PlayerStatus>> {
            if let Some(next) = self.statuses.pop_front() {
                self.current = Some(next);
            }
            Ok(self.current.clone())
        }

        async fn play(&mut self) -> Result<()> {
            self.commands.lock().unwrap().push("play".to_string());
            Ok(())
        }

        async fn pause(&mut self) -> Result<()> {
            self.commands.lock().unwrap().push("pause".to_string());
            Ok(())
        }

        async fn skip(&mut self) -> Result<()> {
            self.commands.lock().unwrap().push("skip".to_string());
            Ok(())
        }

        async fn previous(&mut self) -> Result<()> {
            self.commands.lock().unwrap().push("previous".to_string());
            Ok(())
        }

        async fn play_reference(&mut self, uri: &str, context_uri: Option<&str>) -> Result<()> {
            self.commands
                .lock()
                .unwrap()
                .push(format!("open {uri} {}", context_uri.unwrap_or("-")));
            Ok(())
        }
    }

    fn status(id: &str, position: f64) -> PlayerStatus {
        PlayerStatus {
            playing: true,
            position_secs: position,
            volume: 1.0,
            track: Some(Track {
                id: id.to_string(),
                title: Resource::named(id),
                artist: Resource::named("Artist"),
                album: Resource::named("Album"),
                length_secs: 200,
                is_ad: false,
            }),
            ..PlayerStatus::default()
        }
    }

    #[tokio::test]
    async fn status_primes_differ_so_listening_only_reports_changes() {
        let backend = ScriptedBackend {
            statuses: VecDeque::from(vec![status("a", 5.0), status("a", 6.0), status("b", 0.0)]),
            current: None,
            commands: Arc::default(),
        };
        let (mut handle, mut events) = spawn_session(Box::new(backend), Duration::from_millis(10));

        assert!(handle.connect().await.unwrap());
        let snapshot = handle.status().await.unwrap().unwrap();
        assert_eq!(snapshot.track.unwrap().id, "a");

        handle.listen(true).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, SessionEvent::TrackTimeChanged(6.0));

        let second = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, SessionEvent::TrackChanged(ref t) if t.id == "b"));
    }

    #[tokio::test]
    async fn commands_reach_the_backend_in_order() {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let backend = ScriptedBackend {
            statuses: VecDeque::new(),
            current: None,
            commands: commands.clone(),
        };
        let (mut handle, _events) = spawn_session(Box::new(backend), Duration::from_secs(1));

        handle.play().await.unwrap();
        handle.skip().await.unwrap();
        handle
            .command(PlayerCommand::PlayReference {
                uri: "spotify:track:x".to_string(),
                context_uri: None,
            })
            .await
            .unwrap();
        handle.previous().await.unwrap();
        handle.pause().await.unwrap();

        assert_eq!(
            *commands.lock().unwrap(),
            vec!["play", "skip", "open spotify:track:x -", "previous", "pause"]
        );
    }

    #[test]
    fn player_gap_does_not_repeat_the_track_change() {
        let playing = status("a", 50.0);

        let gap = carry_forward(Some(playing.clone()), None);
        assert_eq!(
            diff_status(Some(&playing), None),
            vec![SessionEvent::PlayStateChanged(false)]
        );
        assert!(diff_status(gap.as_ref(), None).is_empty());

        let gap = carry_forward(gap, None);
        let back = status("a", 53.0);
        let events = diff_status(gap.as_ref(), Some(&back));
        assert_eq!(
            events,
            vec![
                SessionEvent::PlayStateChanged(true),
                SessionEvent::TrackTimeChanged(53.0),
            ]
        );
    }
}
