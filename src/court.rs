//! The shared-screen client
//!
//! Owns the frame scheduler and the game, mirrors both player records into
//! the game, and lets the two presence flags decide whether the scheduler
//! runs. Store pushes arrive through callbacks registered here; the host must
//! deliver them (e.g. `MemoryStore::pump`) between calls to [`Court::poll`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::reconciler::{GoalEvent, GoalReporter};
use crate::records::{PlayerRecord, RecordLink, Slot};
use crate::scheduler::{Clock, Frame, FrameScheduler, Stats, Surface, SystemClock};
use crate::session::{PresenceIndicators, SessionMachine, SessionMode, Transition};
use crate::settings::{SessionBootstrap, Settings};
use crate::store::{RecordStore, SubscriptionId};

/// Message shown when the record store refuses the login
pub const CONNECT_FAILED: &str = "Could not connect to record store";

/// The simulation/rendering collaborator
pub trait Game {
    /// Advance by wall-clock seconds; callers clamp large values themselves
    fn update(&mut self, dt: f64);
    fn draw(&mut self, surface: &mut dyn Surface);
    /// A player record push (may repeat the previous value)
    fn update_player(&mut self, slot: Slot, record: &PlayerRecord);
    fn start_double_player(&mut self);
    fn start_single_player(&mut self) {}
    fn stop(&mut self);
    /// Goals detected since the last call
    fn take_goals(&mut self) -> Vec<GoalEvent>;
    fn on_key_down(&mut self, _code: u32) {}
    fn on_key_up(&mut self, _code: u32) {}
}

impl<G: Game> Game for Rc<RefCell<G>> {
    fn update(&mut self, dt: f64) {
        self.borrow_mut().update(dt);
    }

    fn draw(&mut self, surface: &mut dyn Surface) {
        self.borrow_mut().draw(surface);
    }

    fn update_player(&mut self, slot: Slot, record: &PlayerRecord) {
        self.borrow_mut().update_player(slot, record);
    }

    fn start_double_player(&mut self) {
        self.borrow_mut().start_double_player();
    }

    fn start_single_player(&mut self) {
        self.borrow_mut().start_single_player();
    }

    fn stop(&mut self) {
        self.borrow_mut().stop();
    }

    fn take_goals(&mut self) -> Vec<GoalEvent> {
        self.borrow_mut().take_goals()
    }

    fn on_key_down(&mut self, code: u32) {
        self.borrow_mut().on_key_down(code);
    }

    fn on_key_up(&mut self, code: u32) {
        self.borrow_mut().on_key_up(code);
    }
}

/// Thread-blocking user prompts
pub trait Prompt {
    fn alert(&mut self, message: &str);
    fn confirm(&mut self, message: &str) -> bool;
}

/// Prompt that only logs (headless runs)
#[derive(Debug, Default)]
pub struct LogPrompt;

impl Prompt for LogPrompt {
    fn alert(&mut self, message: &str) {
        log::warn!("[alert] {message}");
    }

    fn confirm(&mut self, message: &str) -> bool {
        log::warn!("[confirm] {message} -> yes");
        true
    }
}

struct CourtState<C: Clock> {
    scheduler: FrameScheduler<C>,
    game: Box<dyn Game>,
    session: SessionMachine,
    indicators: PresenceIndicators,
    reporter: GoalReporter,
    prompt: Box<dyn Prompt>,
}

impl<C: Clock> CourtState<C> {
    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Stop => {
                self.game.stop();
                self.scheduler.stop();
            }
            Transition::StartDouble => {
                self.game.stop();
                self.reporter.reset();
                self.game.start_double_player();
                self.scheduler.start();
            }
            Transition::StartSingle => {
                self.game.stop();
                self.reporter.reset();
                self.game.start_single_player();
                self.scheduler.start();
            }
            Transition::Keep => {}
        }
    }

    fn on_presence(&mut self, slot: Slot, online: bool) {
        self.indicators.set(slot, online);
        let transition = self.session.on_presence(slot, online);
        self.apply(transition);
    }

    fn blocking<T>(&mut self, f: impl FnOnce(&mut dyn Prompt) -> T) -> T {
        let playing = self.session.mode().is_playing();
        if playing {
            self.session.pause();
        }
        let prompt = self.prompt.as_mut();
        let result = self.scheduler.blocking(|| f(prompt));
        if playing {
            self.session.resume();
        }
        result
    }
}

/// Tick body handed to the scheduler
struct CourtFrame<'a> {
    game: &'a mut dyn Game,
    reporter: &'a mut GoalReporter,
}

impl Frame for CourtFrame<'_> {
    fn update(&mut self, dt: f64) {
        self.game.update(dt);
        for goal in self.game.take_goals() {
            self.reporter.report(goal);
        }
    }

    fn draw(&mut self, surface: &mut dyn Surface) {
        self.game.draw(surface);
    }
}

/// Result of [`Court::launch`]
pub enum Launch<C: Clock + 'static = SystemClock> {
    /// No session id yet; reload with this query string
    Redirect { query: String },
    Ready {
        court: Court<C>,
        join_links: [String; 2],
    },
}

pub struct Court<C: Clock + 'static = SystemClock> {
    state: Rc<RefCell<CourtState<C>>>,
    link: RecordLink,
    subscriptions: Vec<SubscriptionId>,
}

impl<C: Clock + 'static> Court<C> {
    /// Log in, settle the session id and build the court.
    ///
    /// A missing surface fails before anything touches the store. A refused
    /// login is shown through `prompt.alert` and returned as an error.
    pub fn launch(
        store: Rc<dyn RecordStore>,
        query: &str,
        settings: &Settings,
        surface: Option<Box<dyn Surface>>,
        game: Box<dyn Game>,
        mut prompt: Box<dyn Prompt>,
        clock: C,
    ) -> Result<Launch<C>> {
        let scheduler = FrameScheduler::new(surface, settings, clock)?;

        let uid = match store.login("server") {
            Ok(uid) => uid,
            Err(e) => {
                log::error!("{e}");
                prompt.alert(CONNECT_FAILED);
                return Err(e);
            }
        };

        match SessionBootstrap::resolve(query, &uid) {
            SessionBootstrap::Redirect { query } => Ok(Launch::Redirect { query }),
            SessionBootstrap::Ready {
                game_id,
                join_links,
            } => {
                log::info!("Court ready for session {game_id}");
                let link = RecordLink::new(store, game_id);
                let court = Self::with_scheduler(link, scheduler, game, prompt);
                Ok(Launch::Ready { court, join_links })
            }
        }
    }

    /// Build a court for a known session
    pub fn new(
        link: RecordLink,
        settings: &Settings,
        surface: Option<Box<dyn Surface>>,
        game: Box<dyn Game>,
        prompt: Box<dyn Prompt>,
        clock: C,
    ) -> Result<Self> {
        let scheduler = FrameScheduler::new(surface, settings, clock)?;
        Ok(Self::with_scheduler(link, scheduler, game, prompt))
    }

    fn with_scheduler(
        link: RecordLink,
        scheduler: FrameScheduler<C>,
        game: Box<dyn Game>,
        prompt: Box<dyn Prompt>,
    ) -> Self {
        let state = Rc::new(RefCell::new(CourtState {
            scheduler,
            game,
            session: SessionMachine::new(),
            indicators: PresenceIndicators::default(),
            reporter: GoalReporter::new(link.clone()),
            prompt,
        }));

        let mut subscriptions = Vec::with_capacity(4);
        for slot in Slot::BOTH {
            let weak = Rc::downgrade(&state);
            subscriptions.push(link.on_player(slot, move |record| {
                with_state(&weak, |s| s.game.update_player(slot, &record));
            }));

            let weak = Rc::downgrade(&state);
            subscriptions.push(link.on_online(slot, move |online| {
                with_state(&weak, |s| s.on_presence(slot, online));
            }));
        }

        Self {
            state,
            link,
            subscriptions,
        }
    }

    /// Run one tick if due. Returns whether a tick ran.
    pub fn poll(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        let CourtState {
            scheduler,
            game,
            reporter,
            ..
        } = &mut *state;
        scheduler.poll(&mut CourtFrame {
            game: game.as_mut(),
            reporter,
        })
    }

    /// Start local single-player play without waiting for presence
    pub fn start_single_player(&mut self) {
        let mut state = self.state.borrow_mut();
        let transition = state.session.start_single();
        state.apply(transition);
    }

    /// Blocking alert with the scheduler stopped around it
    pub fn alert(&mut self, message: &str) {
        self.state.borrow_mut().blocking(|p| p.alert(message));
    }

    /// Blocking confirm with the scheduler stopped around it
    pub fn confirm(&mut self, message: &str) -> bool {
        self.state.borrow_mut().blocking(|p| p.confirm(message))
    }

    pub fn key_down(&mut self, code: u32) {
        self.state.borrow_mut().game.on_key_down(code);
    }

    pub fn key_up(&mut self, code: u32) {
        self.state.borrow_mut().game.on_key_up(code);
    }

    pub fn mode(&self) -> SessionMode {
        self.state.borrow().session.mode()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().scheduler.is_running()
    }

    /// Presence indicator for `slot` (checked = online)
    pub fn presence_checked(&self, slot: Slot) -> bool {
        self.state.borrow().indicators.is_checked(slot)
    }

    pub fn stats(&self) -> Stats {
        self.state.borrow().scheduler.stats()
    }

    pub fn ticks(&self) -> u64 {
        self.state.borrow().scheduler.ticks()
    }

    /// Milliseconds until the next tick (`None` while stopped)
    pub fn until_next(&self) -> Option<f64> {
        self.state.borrow().scheduler.until_next()
    }

    pub fn link(&self) -> &RecordLink {
        &self.link
    }
}

impl<C: Clock + 'static> Drop for Court<C> {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.link.unsubscribe(id);
        }
    }
}

fn with_state<C: Clock>(weak: &Weak<RefCell<CourtState<C>>>, f: impl FnOnce(&mut CourtState<C>)) {
    if let Some(state) = weak.upgrade() {
        f(&mut state.borrow_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Direction, GameId};
    use crate::scheduler::{HeadlessSurface, ManualClock};
    use crate::store::MemoryStore;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Log {
        players: Vec<(Slot, PlayerRecord)>,
        starts: u32,
        stops: u32,
        dts: Vec<f64>,
        goals: Vec<GoalEvent>,
    }

    #[derive(Clone, Default)]
    struct FakeGame(Rc<RefCell<Log>>);

    impl Game for FakeGame {
        fn update(&mut self, dt: f64) {
            self.0.borrow_mut().dts.push(dt);
        }

        fn draw(&mut self, surface: &mut dyn Surface) {
            surface.fill_text("court", 0.0, 0.0);
        }

        fn update_player(&mut self, slot: Slot, record: &PlayerRecord) {
            self.0.borrow_mut().players.push((slot, record.clone()));
        }

        fn start_double_player(&mut self) {
            self.0.borrow_mut().starts += 1;
        }

        fn stop(&mut self) {
            self.0.borrow_mut().stops += 1;
        }

        fn take_goals(&mut self) -> Vec<GoalEvent> {
            std::mem::take(&mut self.0.borrow_mut().goals)
        }
    }

    struct SlowPrompt(ManualClock);

    impl Prompt for SlowPrompt {
        fn alert(&mut self, _message: &str) {
            self.0.advance(10_000.0);
        }

        fn confirm(&mut self, _message: &str) -> bool {
            self.0.advance(10_000.0);
            false
        }
    }

    fn court() -> (Rc<MemoryStore>, ManualClock, FakeGame, Court<ManualClock>) {
        let store = Rc::new(MemoryStore::new("test"));
        let clock = ManualClock::new();
        let game = FakeGame::default();
        let link = RecordLink::new(store.clone(), GameId::new("g"));
        let court = Court::new(
            link,
            &Settings::default(),
            Some(Box::new(HeadlessSurface::new(640, 480))),
            Box::new(game.clone()),
            Box::new(SlowPrompt(clock.clone())),
            clock.clone(),
        )
        .unwrap();
        store.pump();
        (store, clock, game, court)
    }

    #[test]
    fn test_initial_pushes_leave_court_idle() {
        let (_store, _clock, game, court) = court();
        assert_eq!(court.mode(), SessionMode::Idle);
        assert!(!court.is_running());
        // Initial record pushes reach the game too
        assert_eq!(game.0.borrow().players.len(), 2);
    }

    #[test]
    fn test_both_online_runs_scheduler() {
        let (store, clock, game, mut court) = court();
        store.set("g-status", "player1-online", json!(true));
        store.pump();
        assert_eq!(court.mode(), SessionMode::WaitingForPeer);
        assert!(court.presence_checked(Slot::One));
        assert!(!court.is_running());

        store.set("g-status", "player2-online", json!(true));
        store.pump();
        assert_eq!(court.mode(), SessionMode::ActiveDouble);
        assert!(court.is_running());
        assert_eq!(game.0.borrow().starts, 1);

        clock.advance(20.0);
        assert!(court.poll());
        assert_eq!(court.ticks(), 1);
    }

    #[test]
    fn test_player_pushes_reach_game() {
        let (store, _clock, game, _court) = court();
        store.set("g-player/2", "direction", json!("up"));
        store.pump();
        let log = game.0.borrow();
        let (slot, record) = log.players.last().unwrap();
        assert_eq!(*slot, Slot::Two);
        assert_eq!(record.direction, Some(Direction::Up));
    }

    #[test]
    fn test_goal_from_tick_is_written() {
        let (store, clock, game, mut court) = court();
        store.set("g-status", "player1-online", json!(true));
        store.set("g-status", "player2-online", json!(true));
        store.pump();

        game.0.borrow_mut().goals.push(GoalEvent {
            slot: Slot::Two,
            amount_after: 3,
            is_match_point: true,
        });
        clock.advance(20.0);
        court.poll();
        store.pump();

        assert_eq!(
            store.get("g-status", "player2-goals"),
            Some(json!({"amount": 3, "lastGoal": true}))
        );
        assert_eq!(court.mode(), SessionMode::Idle);
        assert!(!court.is_running());
    }

    #[test]
    fn test_alert_stops_scheduler_around_prompt() {
        let (store, clock, game, mut court) = court();
        store.set("g-status", "player1-online", json!(true));
        store.set("g-status", "player2-online", json!(true));
        store.pump();

        court.alert("hello");
        assert!(court.is_running());
        assert_eq!(court.mode(), SessionMode::ActiveDouble);

        clock.advance(1000.0 / 60.0);
        assert!(court.poll());
        let dt = *game.0.borrow().dts.last().unwrap();
        assert!(dt <= 1.0 / 60.0 + 1e-9, "dt was {dt}");
    }

    #[test]
    fn test_confirm_while_idle_keeps_scheduler_stopped() {
        let (_store, _clock, _game, mut court) = court();
        assert!(!court.confirm("really?"));
        assert!(!court.is_running());
        assert_eq!(court.mode(), SessionMode::Idle);
    }

    #[test]
    fn test_single_player_start() {
        let (_store, clock, _game, mut court) = court();
        court.start_single_player();
        assert_eq!(court.mode(), SessionMode::ActiveSingle);
        clock.advance(20.0);
        assert!(court.poll());
    }

    #[test]
    fn test_launch_redirects_without_game_id() {
        let store: Rc<dyn RecordStore> = Rc::new(MemoryStore::new("test"));
        let launch = Court::launch(
            store,
            "",
            &Settings::default(),
            Some(Box::new(HeadlessSurface::new(640, 480))),
            Box::new(FakeGame::default()),
            Box::new(LogPrompt),
            ManualClock::new(),
        )
        .unwrap();
        let Launch::Redirect { query } = launch else {
            panic!("expected redirect");
        };
        assert!(query.starts_with("gameId="));
    }

    #[test]
    fn test_launch_without_surface_fails_first() {
        let memory = Rc::new(MemoryStore::new("test"));
        memory.reject_logins();
        let result = Court::launch(
            memory,
            "gameId=g",
            &Settings::default(),
            None,
            Box::new(FakeGame::default()),
            Box::new(LogPrompt),
            ManualClock::new(),
        );
        assert!(matches!(result, Err(crate::Error::MissingSurface)));
    }

    #[test]
    fn test_refused_login_alerts() {
        struct Counting(Rc<RefCell<Vec<String>>>);
        impl Prompt for Counting {
            fn alert(&mut self, message: &str) {
                self.0.borrow_mut().push(message.to_string());
            }
            fn confirm(&mut self, _message: &str) -> bool {
                true
            }
        }

        let memory = Rc::new(MemoryStore::new("test"));
        memory.reject_logins();
        let alerts = Rc::new(RefCell::new(Vec::new()));
        let result = Court::launch(
            memory,
            "gameId=g",
            &Settings::default(),
            Some(Box::new(HeadlessSurface::new(640, 480))),
            Box::new(FakeGame::default()),
            Box::new(Counting(alerts.clone())),
            ManualClock::new(),
        );
        assert!(matches!(result, Err(crate::Error::Connectivity { .. })));
        assert_eq!(*alerts.borrow(), vec![CONNECT_FAILED.to_string()]);
    }
}
