use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use clipcap_core::{
    error::AppError,
    history::{HistoryEntry, HistoryView},
    hotkey::{Hotkey, Modifiers},
    init,
    session::SessionPhase,
    settings::VideoQuality,
    ui::overlay_pump,
    CaptureMode, CaptureSession, Clipcap, PointerTracker, SessionHandle, StartOutcome,
};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one capture session and exit
    Capture {
        /// draw, ocr or video
        mode: CaptureMode,
    },
    /// Listen for global hotkeys and record clipboard text into history
    Daemon,
    /// List available monitors
    Monitors,
    /// Inspect or edit clipboard history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Entries shown in the history view
    List,
    Favorites,
    /// Remove everything except favorites
    Clear,
    Add { text: String },
    /// Put an entry back on the clipboard
    Copy { id: String },
    /// Toggle the favorite flag
    Favorite { id: String },
    Note { id: String, text: String },
    /// Order favorites: the listed ones first, in the given order
    Reorder {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Delete {
        id: String,
        /// Delete from the favorites view (removes favorites for good)
        #[arg(long)]
        favorites: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// low, medium, high or ultra
    Quality { quality: VideoQuality },
    MaxItems { count: usize },
    Shortcut { mode: CaptureMode, combo: String },
}

/// What the input hook asks the session to do.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Start(CaptureMode),
    Cancel,
}

fn main() -> Result<()> {
    init();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    install_panic_hook();

    let args = Args::parse();
    let result = run(args);
    if let Err(e) = &result {
        // user-level problems such as an unknown history id get no dialog
        let recoverable = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<AppError>())
            .is_some_and(AppError::is_recoverable);
        if recoverable {
            log::warn!("{:#}", e);
        } else {
            log::error!("{:#}", e);
            report_fatal(&format!("{:#}", e));
        }
    }
    result
}

fn run(args: Args) -> Result<()> {
    let mut app = Clipcap::new().context("Failed to load configuration")?;

    match args.command {
        Command::Monitors => {
            println!("Available monitors:");
            for display in app.list_monitors().context("Failed to list monitors")? {
                println!("{}", display);
            }
            Ok(())
        }
        Command::History { action } => history_command(&app, action),
        Command::Settings { action } => settings_command(&mut app, action.unwrap_or(SettingsAction::Show)),
        Command::Capture { mode } => run_with_overlays(app, Some(mode)),
        Command::Daemon => run_with_overlays(app, None),
    }
}

/// Runs the session on a runtime thread while overlays run here, on the main thread.
fn run_with_overlays(app: Clipcap, one_shot: Option<CaptureMode>) -> Result<()> {
    let pointer = PointerTracker::new();
    let (host, pump) = overlay_pump(pointer.clone());
    let services = app
        .services(Arc::new(host), pointer.clone())
        .context("Failed to initialize screen capture")?;

    let (triggers_tx, triggers_rx) = mpsc::unbounded_channel();
    let hotkeys = match one_shot {
        Some(_) => Vec::new(),
        None => hotkeys(&app)?,
    };
    spawn_input_hook(hotkeys, pointer, triggers_tx);

    let worker = thread::spawn(move || -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to create async runtime")?;
        runtime.block_on(async move {
            let session = CaptureSession::spawn(services);
            match one_shot {
                Some(mode) => capture_once(&session, mode, triggers_rx).await,
                None => {
                    let _watcher = app.watch_clipboard();
                    daemon(&session, triggers_rx).await;
                    Ok(())
                }
            }
        })
        // dropping the runtime drops the session and its host, which stops the pump
    });

    pump.run();
    worker.join().map_err(|_| anyhow!("capture thread panicked"))?
}

async fn capture_once(
    session: &SessionHandle,
    mode: CaptureMode,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
) -> Result<()> {
    let outcome = session.start_capture(mode).await;
    log::info!("{} capture: {:?}", mode, outcome);
    match outcome {
        StartOutcome::Started => {}
        StartOutcome::Busy => bail!("a capture is already in progress"),
        StartOutcome::PermissionDenied => bail!("screen capture permission denied"),
        StartOutcome::SourceUnavailable => bail!("no display could be captured"),
        StartOutcome::Failed(reason) => bail!("capture failed: {}", reason),
    }

    loop {
        tokio::select! {
            _ = session.wait_idle() => break,
            Some(Trigger::Cancel) = triggers.recv() => session.cancel().await,
        }
    }
    session.shutdown().await;
    Ok(())
}

async fn daemon(session: &SessionHandle, mut triggers: mpsc::UnboundedReceiver<Trigger>) {
    log::info!("clipcap daemon running");
    while let Some(trigger) = triggers.recv().await {
        match trigger {
            Trigger::Start(mode) => {
                let session = session.clone();
                tokio::spawn(async move {
                    let outcome = session.start_capture(mode).await;
                    log::info!("{} capture: {:?}", mode, outcome);
                });
            }
            Trigger::Cancel if session.phase() != SessionPhase::Idle => session.cancel().await,
            Trigger::Cancel => {}
        }
    }
}

fn hotkeys(app: &Clipcap) -> Result<Vec<(Hotkey, CaptureMode)>> {
    CaptureMode::ALL
        .into_iter()
        .map(|mode| {
            let combo = app.settings().shortcuts.for_mode(mode);
            let hotkey = combo
                .parse::<Hotkey>()
                .with_context(|| format!("Invalid {} shortcut '{}'", mode, combo))?;
            log::info!("{} -> {}", hotkey, mode);
            Ok((hotkey, mode))
        })
        .collect()
}

/// Global keyboard/mouse hook: hotkeys, Escape and pointer position.
fn spawn_input_hook(hotkeys: Vec<(Hotkey, CaptureMode)>, pointer: PointerTracker, triggers: mpsc::UnboundedSender<Trigger>) {
    thread::spawn(move || {
        let mut held = Modifiers::default();
        let result = rdev::listen(move |event| match event.event_type {
            rdev::EventType::MouseMove { x, y } => pointer.update(x as f32, y as f32),
            rdev::EventType::KeyPress(key) => {
                if set_modifier(&mut held, key, true) {
                    return;
                }
                if key == rdev::Key::Escape {
                    let _ = triggers.send(Trigger::Cancel);
                    return;
                }
                let Some(name) = key_name(key) else { return };
                if let Some((_, mode)) = hotkeys.iter().find(|(h, _)| h.matches(held, &name)) {
                    let _ = triggers.send(Trigger::Start(*mode));
                }
            }
            rdev::EventType::KeyRelease(key) => {
                set_modifier(&mut held, key, false);
            }
            _ => {}
        });
        if let Err(e) = result {
            log::error!("Global input hook failed: {:?}", e);
        }
    });
}

fn set_modifier(held: &mut Modifiers, key: rdev::Key, down: bool) -> bool {
    use rdev::Key::*;
    let slot = match key {
        ControlLeft | ControlRight => &mut held.ctrl,
        Alt | AltGr => &mut held.alt,
        ShiftLeft | ShiftRight => &mut held.shift,
        MetaLeft | MetaRight => &mut held.meta,
        _ => return false,
    };
    *slot = down;
    true
}

/// `KeyA` -> `A`, `Num9` -> `9`, `F5` -> `F5`.
fn key_name(key: rdev::Key) -> Option<String> {
    let debug = format!("{:?}", key);
    let name = debug
        .strip_prefix("Key")
        .or_else(|| debug.strip_prefix("Num"))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(debug.as_str());
    match key {
        rdev::Key::Unknown(_) => None,
        _ => Some(name.to_ascii_uppercase()),
    }
}

fn history_command(app: &Clipcap, action: HistoryAction) -> Result<()> {
    let history = app.history();
    match action {
        HistoryAction::List => print_entries(history.snapshot().visible()),
        HistoryAction::Favorites => print_entries(history.snapshot().favorites()),
        HistoryAction::Clear => {
            history.update(|h| h.clear());
            println!("History cleared (favorites kept)");
        }
        HistoryAction::Add { text } => {
            let added = history.update(|h| h.add(&text).map(|e| e.id.clone()));
            match added {
                Some(id) => println!("Added {}", id),
                None => println!("Nothing added"),
            }
        }
        HistoryAction::Copy { id } => {
            let id = resolve_id(app, &id)?;
            let content = app.copy_entry(&id)?;
            println!("Copied {} ({} chars)", id, content.chars().count());
        }
        HistoryAction::Favorite { id } => {
            let id = resolve_id(app, &id)?;
            history.update(|h| h.toggle_favorite(&id));
            println!("Toggled favorite on {}", id);
        }
        HistoryAction::Note { id, text } => {
            let id = resolve_id(app, &id)?;
            history.update(|h| h.set_note(&id, &text));
            println!("Note saved on {}", id);
        }
        HistoryAction::Reorder { ids } => {
            let ids = ids
                .iter()
                .map(|prefix| resolve_id(app, prefix))
                .collect::<Result<Vec<_>>>()?;
            history.update(|h| h.reorder_favorites(&ids));
            print_entries(history.snapshot().favorites());
        }
        HistoryAction::Delete { id, favorites } => {
            let id = resolve_id(app, &id)?;
            let view = if favorites {
                HistoryView::Favorites
            } else {
                HistoryView::History
            };
            history.update(|h| h.delete(&id, view));
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

/// Accepts a full id or any unique prefix of one.
fn resolve_id(app: &Clipcap, prefix: &str) -> Result<String> {
    let snapshot = app.history().snapshot();
    let mut matches = snapshot.entries().iter().filter(|e| e.id.starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(entry), None) => Ok(entry.id.clone()),
        (Some(_), Some(_)) => bail!("'{}' matches more than one entry", prefix),
        (None, _) => Err(AppError::UnknownEntry(prefix.to_string()).into()),
    }
}

fn print_entries<'a>(entries: impl Iterator<Item = &'a HistoryEntry>) {
    for entry in entries {
        let first_line = entry.content.lines().next().unwrap_or_default();
        let star = if entry.is_favorite { "*" } else { " " };
        println!("{} {} {}  {}", star, &entry.id[..8.min(entry.id.len())], entry.timestamp, first_line);
        if let Some(note) = &entry.note {
            println!("    note: {}", note);
        }
    }
}

fn settings_command(app: &mut Clipcap, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let s = app.settings();
            println!("max history items: {}", s.max_history_items);
            println!("video quality:     {} ({} fps, {} bit/s)", s.video_quality, s.video_quality.fps(), s.video_quality.bitrate());
            for mode in CaptureMode::ALL {
                println!("{:<18} {}", format!("{} shortcut:", mode), s.shortcuts.for_mode(mode));
            }
            return Ok(());
        }
        SettingsAction::Quality { quality } => app.settings_mut().video_quality = quality,
        SettingsAction::MaxItems { count } => {
            app.settings_mut().set_max_history_items(count)?;
            app.history().update(|h| h.set_max_items(count));
        }
        SettingsAction::Shortcut { mode, combo } => app.settings_mut().shortcuts.set(mode, &combo)?,
    }
    app.settings().save().context("Failed to save settings")?;
    println!("Settings saved");
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        log::error!("{}", info);
        report_fatal(&info.to_string());
    }));
}

/// Last-resort error surface for failures nobody else handled.
fn report_fatal(message: &str) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title("clipcap")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}
