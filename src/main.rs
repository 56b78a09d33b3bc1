//! Twin Pong headless entry point
//!
//! Runs a court and two controllers against one in-process record store and
//! plays a scripted match: both players join, wiggle their paddles, and goals
//! are fed in until someone wins.
//!
//! Usage: `twin-pong [settings.json] [query]`

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use twin_pong::controller::Device;
use twin_pong::court::{Launch, LogPrompt};
use twin_pong::input::{ButtonTarget, Capabilities, Edge, MotionSample, RawInput, Viewport, keys};
use twin_pong::reconciler::{Background, FeedbackSink};
use twin_pong::scheduler::{HeadlessSurface, SystemClock};
use twin_pong::sim::{POINTS_TO_WIN, Rally};
use twin_pong::{Controller, Court, MemoryStore, RecordStore, Settings, Slot};

/// Upper bound on demo length
const MAX_TICKS: u64 = 60 * 30;
/// A goal is scored every this many ticks
const GOAL_EVERY: u64 = 45;

struct LogSink(Slot);

impl FeedbackSink for LogSink {
    fn vibrate(&mut self, pattern: &[u32]) {
        log::info!("[player {}] vibrate {:?}", self.0, pattern);
    }

    fn set_background(&mut self, background: Background) {
        log::info!("[player {}] background {}", self.0, background.css());
    }
}

fn device(slot: Slot, capabilities: Capabilities) -> Device {
    Device {
        capabilities,
        viewport: Viewport {
            width: 360.0,
            height: 640.0,
        },
        indicator_height: 48.0,
        feedback: Box::new(LogSink(slot)),
    }
}

fn load_settings(path: Option<&str>) -> twin_pong::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let json = std::fs::read_to_string(path).map_err(|e| twin_pong::Error::InvalidSetting {
        key: "settings".to_string(),
        value: format!("{path}: {e}"),
    })?;
    Settings::from_json(&json)
}

fn run() -> twin_pong::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut settings = load_settings(args.first().map(String::as_str))?;
    let mut query = args.get(1).cloned().unwrap_or_default();
    settings.apply_query(&query)?;

    let memory = Rc::new(MemoryStore::new(settings.store_host.clone()));
    let store: Rc<dyn RecordStore> = memory.clone();
    let rally = Rc::new(RefCell::new(Rally::new(POINTS_TO_WIN)));

    // First launch without a session id redirects, like a fresh page load
    let (mut court, join_links) = loop {
        let launch = Court::launch(
            store.clone(),
            &query,
            &settings,
            Some(Box::new(HeadlessSurface::new(800, 600))),
            Box::new(rally.clone()),
            Box::new(LogPrompt),
            SystemClock::new(),
        )?;
        match launch {
            Launch::Redirect { query: next } => {
                settings.apply_query(&next)?;
                query = next;
            }
            Launch::Ready { court, join_links } => break (court, join_links),
        }
    };
    log::info!("Join links: {} | {}", join_links[0], join_links[1]);

    let mut p1 = Controller::connect(
        store.clone(),
        &settings,
        "#1",
        device(Slot::One, Capabilities::default()),
        &mut LogPrompt,
    )?;
    let tilt = Capabilities {
        touch: true,
        motion: true,
        vibrate: true,
    };
    let mut p2 = Controller::connect(
        store.clone(),
        &settings,
        "#2",
        device(Slot::Two, tilt),
        &mut LogPrompt,
    )?;
    memory.pump();

    p1.toggle_online();
    p2.toggle_online();
    memory.pump();
    log::info!(
        "Player 1: {} ({:?}), player 2: {} ({:?}), court {:?}",
        p1.label().as_str(),
        p1.input_mode(),
        p2.label().as_str(),
        p2.input_mode(),
        court.mode()
    );

    let mut phase = 0.0f32;
    while court.is_running() && court.ticks() < MAX_TICKS {
        if let Some(wait) = court.until_next() {
            std::thread::sleep(Duration::from_secs_f64(wait / 1000.0));
        }
        if !court.poll() {
            continue;
        }
        let tick = court.ticks();

        // Player 1 alternates up/down every half second
        let button = match tick % 60 {
            0 => Some((ButtonTarget::UP, Edge::Press)),
            30 => Some((ButtonTarget::DOWN, Edge::Press)),
            15 | 45 => Some((ButtonTarget::UP, Edge::Release)),
            _ => None,
        };
        if let Some((target, edge)) = button {
            p1.handle(RawInput::Button { target, edge });
        }
        if tick % 90 == 89 {
            p1.handle(RawInput::Key {
                code: keys::Q,
                edge: Edge::Press,
            });
        }

        // Player 2 tilts back and forth
        phase += 0.05;
        p2.handle(RawInput::Motion(MotionSample {
            x: 0.0,
            y: Some(phase.sin() * 8.0),
        }));

        if tick % GOAL_EVERY == 0 {
            let scorer = if (tick / GOAL_EVERY) % 3 == 0 {
                Slot::Two
            } else {
                Slot::One
            };
            rally.borrow_mut().score(scorer);
        }

        memory.pump();
    }

    let board = *rally.borrow().scoreboard();
    log::info!(
        "Final score {}:{} after {} ticks, court {:?}, stats {:?}",
        board.score(Slot::One),
        board.score(Slot::Two),
        court.ticks(),
        court.mode(),
        court.stats()
    );
    log::info!("Player 1 button now reads '{}'", p1.label().as_str());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Twin Pong (headless) starting...");

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}
