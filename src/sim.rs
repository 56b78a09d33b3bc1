//! Local paddle state driven by remote player records
//!
//! The court never integrates a pushed command more than once: a push only
//! replaces the paddle's current command, and movement comes from `advance`
//! alone. Redundant pushes of the same record are therefore harmless.

use serde::{Deserialize, Serialize};

use crate::consts::MAX_UPDATE_DT;
use crate::court::Game;
use crate::records::{Direction, PlayerRecord, Slot};
use crate::reconciler::GoalEvent;
use crate::scheduler::Surface;

/// Paddle travel per second, as a fraction of the court height
pub const PADDLE_SPEED: f32 = 1.2;
/// Goals needed to win a match
pub const POINTS_TO_WIN: u32 = 3;

/// What a paddle is currently told to do
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum PaddleCommand {
    #[default]
    Hold,
    Move(Direction),
    /// Follow an absolute position (tilt controllers)
    Seek(f32),
}

impl PaddleCommand {
    /// A direction wins over a position; neither means hold still
    pub fn from_record(record: &PlayerRecord) -> Self {
        match (record.direction, record.position) {
            (Some(direction), _) => PaddleCommand::Move(direction),
            (None, Some(position)) => PaddleCommand::Seek(position.clamp(0.0, 1.0)),
            (None, None) => PaddleCommand::Hold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    /// 0 = top, 1 = bottom
    pub position: f32,
    pub command: PaddleCommand,
}

impl Default for Paddle {
    fn default() -> Self {
        Self {
            position: 0.5,
            command: PaddleCommand::Hold,
        }
    }
}

impl Paddle {
    fn advance(&mut self, dt: f32) {
        match self.command {
            PaddleCommand::Hold => {}
            PaddleCommand::Move(Direction::Up) => self.position -= PADDLE_SPEED * dt,
            PaddleCommand::Move(Direction::Down) => self.position += PADDLE_SPEED * dt,
            PaddleCommand::Seek(target) => self.position = target,
        }
        self.position = self.position.clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paddles {
    paddles: [Paddle; 2],
}

impl Paddles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a paddle's command from a pushed player record
    pub fn apply(&mut self, slot: Slot, record: &PlayerRecord) -> PaddleCommand {
        let command = PaddleCommand::from_record(record);
        self.paddles[slot.index()].command = command;
        command
    }

    /// Move both paddles. `dt` is clamped so a stalled tick cannot fling them.
    pub fn advance(&mut self, dt: f64) {
        let dt = dt.clamp(0.0, MAX_UPDATE_DT) as f32;
        for paddle in &mut self.paddles {
            paddle.advance(dt);
        }
    }

    pub fn get(&self, slot: Slot) -> &Paddle {
        &self.paddles[slot.index()]
    }

    /// Center both paddles. Commands stay: they mirror the last push.
    pub fn center(&mut self) {
        for paddle in &mut self.paddles {
            paddle.position = 0.5;
        }
    }
}

/// Match score bookkeeping; turns a scored point into a [`GoalEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreboard {
    scores: [u32; 2],
    points_to_win: u32,
}

impl Default for Scoreboard {
    fn default() -> Self {
        Self::new(POINTS_TO_WIN)
    }
}

impl Scoreboard {
    pub fn new(points_to_win: u32) -> Self {
        Self {
            scores: [0; 2],
            points_to_win: points_to_win.max(1),
        }
    }

    pub fn score(&self, slot: Slot) -> u32 {
        self.scores[slot.index()]
    }

    /// Count a goal for `slot`
    pub fn goal(&mut self, slot: Slot) -> GoalEvent {
        let score = &mut self.scores[slot.index()];
        *score += 1;
        GoalEvent {
            slot,
            amount_after: *score,
            is_match_point: *score >= self.points_to_win,
        }
    }

    pub fn reset(&mut self) {
        self.scores = [0; 2];
    }
}

/// Who is currently playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Players {
    Single,
    Double,
}

/// Paddles plus score: the part of a match the session layer can see.
/// Ball physics live elsewhere and report goals through [`Rally::score`].
#[derive(Debug, Clone, Default)]
pub struct Rally {
    paddles: Paddles,
    scoreboard: Scoreboard,
    players: Option<Players>,
    goals: Vec<GoalEvent>,
    /// Seconds of play since the last start
    pub elapsed: f64,
}

impl Rally {
    pub fn new(points_to_win: u32) -> Self {
        Self {
            scoreboard: Scoreboard::new(points_to_win),
            ..Default::default()
        }
    }

    /// Count a goal for `slot`. Ignored while no match is running.
    pub fn score(&mut self, slot: Slot) -> Option<GoalEvent> {
        self.players?;
        let event = self.scoreboard.goal(slot);
        self.goals.push(event);
        if event.is_match_point {
            self.players = None;
        }
        Some(event)
    }

    pub fn players(&self) -> Option<Players> {
        self.players
    }

    pub fn paddles(&self) -> &Paddles {
        &self.paddles
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    fn start(&mut self, players: Players) {
        log::info!("Rally started ({players:?})");
        self.scoreboard.reset();
        self.paddles.center();
        self.elapsed = 0.0;
        self.players = Some(players);
    }
}

impl Game for Rally {
    fn update(&mut self, dt: f64) {
        if self.players.is_none() {
            return;
        }
        self.paddles.advance(dt);
        self.elapsed += dt.clamp(0.0, MAX_UPDATE_DT);
    }

    fn draw(&mut self, surface: &mut dyn Surface) {
        let x = surface.width() as f32 / 2.0;
        for slot in Slot::BOTH {
            let paddle = self.paddles.get(slot);
            surface.fill_text(
                &format!(
                    "P{} {} @ {:.2}",
                    slot,
                    self.scoreboard.score(slot),
                    paddle.position
                ),
                x,
                20.0 * slot.number() as f32,
            );
        }
    }

    fn update_player(&mut self, slot: Slot, record: &PlayerRecord) {
        self.paddles.apply(slot, record);
    }

    fn start_double_player(&mut self) {
        self.start(Players::Double);
    }

    fn start_single_player(&mut self) {
        self.start(Players::Single);
    }

    fn stop(&mut self) {
        self.players = None;
    }

    fn take_goals(&mut self) -> Vec<GoalEvent> {
        std::mem::take(&mut self.goals)
    }
}
