use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nowplaying_recorder_coordinator::{Coordinator, CoordinatorError};
use nowplaying_recorder_core::{AppConfig, RecorderCommand};
use nowplaying_recorder_recorder::{
    resolve_executable, spawn_recorder_worker, FmediaRecorder, RecorderHandle, RecorderOp,
    RecorderOutcome,
};
use nowplaying_recorder_session::{build_backend, spawn_session, SessionClient, SessionHandle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

mod commands;

use commands::{UserCommand, HELP};

#[derive(Parser, Debug)]
#[command(
    name = "nowplaying-recorder",
    about = "Player notifications -> Coordinator -> loopback recorder"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run {
        /// Switch recording on as soon as the player is connected.
        #[arg(long)]
        record: bool,
        /// Give up instead of asking to retry when the player is unavailable.
        #[arg(long)]
        no_prompt: bool,
    },
    Doctor,
    Status {
        #[arg(long)]
        json: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run {
        record: false,
        no_prompt: false,
    });
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg).await
        }
        Commands::Status { json } => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg, json).await
        }
        Commands::Run { record, no_prompt } => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg, cfg_path, record, no_prompt).await
        }
    }
}

async fn run(mut cfg: AppConfig, cfg_path: PathBuf, record: bool, no_prompt: bool) -> Result<()> {
    let (mut session, mut events) = spawn_session(
        build_backend(&cfg.player),
        Duration::from_millis(cfg.player.poll_ms),
    );
    let recorder = FmediaRecorder::new(cfg.recorder.clone());
    info!(
        backend = session.backend_name(),
        player = %cfg.player.name,
        recorder = %recorder.executable().display(),
        output_dir = %cfg.recorder.output_dir.display(),
        "nowplaying-recorder started"
    );
    let (recorder, mut outcomes) = spawn_recorder_worker(recorder);
    let mut coordinator = Coordinator::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let initial = connect_with_retry(&mut coordinator, &mut session, &mut stdin, no_prompt).await?;
    dispatch(&recorder, initial);
    if record || cfg.record_on_start {
        dispatch(&recorder, coordinator.toggle_recording_intent());
    }
    session.listen(true).await?;

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(4);
    spawn_reload_watchers(cfg_path.clone(), cfg.file_watch_poll_ms, reload_tx).await?;

    println!("{HELP}");
    let mut stdin_open = true;
    let mut recorder_alive = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => dispatch(&recorder, coordinator.handle_event(event)),
                    None => {
                        error!("player session ended");
                        break;
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match UserCommand::parse(&line) {
                        Ok(Some(cmd)) => {
                            let flow = handle_user_command(cmd, &mut coordinator, &mut session, &recorder).await;
                            if flow == Flow::Quit {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => println!("{err}"),
                    },
                    Ok(None) => {
                        debug!("stdin closed; continuing without interactive commands");
                        stdin_open = false;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed reading stdin; interactive commands disabled");
                        stdin_open = false;
                    }
                }
            }
            outcome = outcomes.recv(), if recorder_alive => {
                recorder_alive = take_outcome(&mut coordinator, outcome);
            }
            msg = reload_rx.recv() => {
                if msg.is_some() {
                    match load_or_default(&cfg_path) {
                        Ok(new_cfg) => {
                            if new_cfg.player != cfg.player {
                                warn!("player settings changed; they take effect after a restart");
                            }
                            if let Err(err) = recorder.reconfigure(new_cfg.recorder.clone()) {
                                error!(error = %err, "failed to reconfigure recorder");
                            }
                            cfg = new_cfg;
                            info!("configuration reloaded");
                        }
                        Err(err) => {
                            error!(error = %err, "failed to reload config");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    if let Some(stop) = coordinator.shutdown() {
        dispatch(&recorder, vec![stop]);
    }
    let _ = session.listen(false).await;
    match tokio::time::timeout(Duration::from_secs(15), recorder.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "recorder worker shutdown failed"),
        Err(_) => warn!("recorder worker did not drain in time"),
    }
    while let Ok(outcome) = outcomes.try_recv() {
        on_recorder_outcome(&mut coordinator, outcome);
    }

    Ok(())
}

/// Connects through the coordinator, asking on stdin whether to retry while
/// the player is unavailable.
async fn connect_with_retry<R>(
    coordinator: &mut Coordinator,
    session: &mut SessionHandle,
    stdin: &mut Lines<R>,
    no_prompt: bool,
) -> Result<Vec<RecorderCommand>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match coordinator.connect(&mut *session).await {
            Ok(commands) => return Ok(commands),
            Err(err @ CoordinatorError::PlayerUnavailable { .. }) => {
                warn!(error = %err, "player unavailable");
                if no_prompt {
                    return Err(err.into());
                }
                print!("{err}. Retry? [y/N] ");
                std::io::stdout().flush()?;
                let answer = stdin.next_line().await?.unwrap_or_default();
                if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                    return Err(err.into());
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn handle_user_command(
    cmd: UserCommand,
    coordinator: &mut Coordinator,
    session: &mut SessionHandle,
    recorder: &RecorderHandle,
) -> Flow {
    let result = match cmd {
        UserCommand::Play => session.play().await,
        UserCommand::Pause => session.pause().await,
        UserCommand::Skip => session.skip().await,
        UserCommand::Previous => session.previous().await,
        UserCommand::Open { uri, context_uri } => {
            session.play_reference(&uri, context_uri.as_deref()).await
        }
        UserCommand::Record => {
            dispatch(recorder, coordinator.toggle_recording_intent());
            println!(
                "recording {}",
                if coordinator.recording_intent() { "on" } else { "off" }
            );
            Ok(())
        }
        UserCommand::Status => {
            println!("{}", coordinator.view());
            Ok(())
        }
        UserCommand::Links => {
            match coordinator.track_links() {
                Ok(links) if links.is_empty() => println!("no links for this track"),
                Ok(links) => {
                    for link in links {
                        println!("{:<7} {} <{}>", link.label, link.name, link.url);
                    }
                }
                Err(err) => println!("{err}"),
            }
            Ok(())
        }
        UserCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        UserCommand::Quit => return Flow::Quit,
    };

    if let Err(err) = result {
        warn!(error = %err, "player command failed");
        println!("command failed: {err:#}");
    }
    Flow::Continue
}

fn dispatch(recorder: &RecorderHandle, commands: Vec<RecorderCommand>) {
    for cmd in commands {
        let session_id = cmd.session_id();
        if let Err(err) = recorder.submit(cmd) {
            error!(session_id, error = %err, "recorder command dropped");
        }
    }
}

/// Returns false once the worker's outcome channel has closed.
fn take_outcome(coordinator: &mut Coordinator, outcome: Option<RecorderOutcome>) -> bool {
    match outcome {
        Some(outcome) => {
            on_recorder_outcome(coordinator, outcome);
            true
        }
        None => {
            error!("recorder worker ended; recording is unavailable");
            false
        }
    }
}

fn on_recorder_outcome(coordinator: &mut Coordinator, outcome: RecorderOutcome) {
    match outcome {
        RecorderOutcome::Started {
            session_id,
            output,
            pid,
        } => info!(session_id, pid, output = %output.display(), "recording"),
        RecorderOutcome::Stopped { session_id } => debug!(session_id, "recording stopped"),
        RecorderOutcome::LaunchFailed {
            session_id,
            op: RecorderOp::Start,
            reason,
        } => {
            let err = coordinator.on_recorder_launch_failed(session_id, &reason);
            error!(error = %err, "recording did not start");
        }
        RecorderOutcome::LaunchFailed {
            session_id,
            op: RecorderOp::Stop,
            reason,
        } => warn!(session_id, %reason, "recorder stop command failed"),
    }
}

async fn doctor(cfg: &AppConfig) -> Result<()> {
    println!("== nowplaying-recorder doctor ==");

    let (mut session, _events) = spawn_session(
        build_backend(&cfg.player),
        Duration::from_millis(cfg.player.poll_ms),
    );
    println!("Player backend: {}", session.backend_name());
    println!(
        "Player ({}): {}",
        cfg.player.name,
        if session.is_host_running().await {
            "running"
        } else {
            "not running"
        }
    );
    println!(
        "Local control helper: {}",
        if session.is_helper_running().await {
            "reachable"
        } else {
            "not reachable"
        }
    );

    let exe = resolve_executable(&cfg.recorder.executable);
    println!(
        "Recorder executable: {} ({})",
        exe.display(),
        if executable_available(&exe) {
            "found"
        } else {
            "not found"
        }
    );
    println!(
        "Output directory: {} ({})",
        cfg.recorder.output_dir.display(),
        if cfg.recorder.output_dir.is_dir() {
            "exists"
        } else {
            "will be created"
        }
    );
    println!(
        "Capture: loopback device {}, mpeg quality {}",
        cfg.recorder.loopback_device, cfg.recorder.mpeg_quality
    );

    Ok(())
}

async fn status(cfg: &AppConfig, json: bool) -> Result<()> {
    let (mut session, _events) = spawn_session(
        build_backend(&cfg.player),
        Duration::from_millis(cfg.player.poll_ms),
    );
    let mut coordinator = Coordinator::new();

    if let Err(err) = coordinator.connect(&mut session).await {
        println!("error: {err}");
        return Ok(());
    }

    let view = coordinator.view();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{view}");
    }
    Ok(())
}

fn executable_available(exe: &Path) -> bool {
    if exe.components().count() > 1 {
        return exe.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(exe);
                candidate.is_file()
                    || (!std::env::consts::EXE_EXTENSION.is_empty()
                        && candidate
                            .with_extension(std::env::consts::EXE_EXTENSION)
                            .is_file())
            })
        })
        .unwrap_or(false)
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("nowplaying-recorder").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let mut cfg = AppConfig::default();
    if let Some(music) = dirs::audio_dir() {
        cfg.recorder.output_dir = music.join("nowplaying-recorder");
    }
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn spawn_reload_watchers(path: PathBuf, poll_ms: u64, tx: mpsc::Sender<()>) -> Result<()> {
    let tx_poll = tx.clone();
    tokio::spawn(async move {
        let mut known_mtime = file_mtime(&path);
        let sleep = Duration::from_millis(poll_ms.max(2_000));
        loop {
            tokio::time::sleep(sleep).await;
            let current = file_mtime(&path);
            if current.is_some() && current != known_mtime {
                known_mtime = current;
                if tx_poll.send(()).await.is_err() {
                    break;
                }
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let tx_hup = tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx_hup.send(()).await;
                }
            }
        });
    }

    Ok(())
}

fn file_mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("NOWPLAYING_RECORDER_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Ok(v) = std::env::var("NOWPLAYING_RECORDER_PLAYER") {
        if !v.trim().is_empty() {
            cfg.player.name = v;
        }
    }
    if let Ok(v) = std::env::var("NOWPLAYING_RECORDER_OUTPUT_DIR") {
        if !v.trim().is_empty() {
            cfg.recorder.output_dir = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("NOWPLAYING_RECORDER_RECORDER") {
        if !v.trim().is_empty() {
            cfg.recorder.executable = PathBuf::from(v);
        }
    }
}
