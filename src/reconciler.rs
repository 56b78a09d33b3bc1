//! Goal writes and goal feedback
//!
//! The court that detects a goal is the single writer of that slot's
//! `player<n>-goals` field. A match-ending goal also forces both presence
//! flags off, which sends every client back to `Idle` through the normal
//! presence path. Controllers only observe goal pushes and turn them into
//! local vibration/background feedback; they never write back.

use serde::{Deserialize, Serialize};

use crate::consts::{ALERT_PATTERN, GOAL_BUZZ};
use crate::records::{GoalsField, RecordLink, Slot};

/// A goal detected by the local simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalEvent {
    /// Slot that scored
    pub slot: Slot,
    /// Slot's goal count including this one
    pub amount_after: u32,
    /// This goal ends the match
    pub is_match_point: bool,
}

impl From<GoalEvent> for GoalsField {
    fn from(event: GoalEvent) -> Self {
        GoalsField {
            amount: event.amount_after,
            last_goal: event.is_match_point,
        }
    }
}

/// Writes goal events to the status record
pub struct GoalReporter {
    link: RecordLink,
    last_amount: [u32; 2],
}

impl GoalReporter {
    pub fn new(link: RecordLink) -> Self {
        Self {
            link,
            last_amount: [0; 2],
        }
    }

    /// Write a goal. Returns `false` if it was rejected for lowering a
    /// slot's goal count within a match.
    pub fn report(&mut self, event: GoalEvent) -> bool {
        let last = self.last_amount[event.slot.index()];
        if event.amount_after < last {
            log::warn!(
                "Rejected goal for player {}: amount {} below {}",
                event.slot,
                event.amount_after,
                last
            );
            return false;
        }

        if event.is_match_point {
            log::info!(
                "Player {} wins with {} goals, ending session",
                event.slot,
                event.amount_after
            );
            for slot in Slot::BOTH {
                self.link.write_online(slot, false);
            }
            self.last_amount = [0; 2];
        } else {
            log::info!("Goal for player {} ({})", event.slot, event.amount_after);
            self.last_amount[event.slot.index()] = event.amount_after;
        }

        self.link.write_goals(event.slot, event.into());
        true
    }

    /// Forget goal counts (new match)
    pub fn reset(&mut self) {
        self.last_amount = [0; 2];
    }
}

/// Controller background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Background {
    Neutral,
    Won,
    Lost,
}

impl Background {
    pub fn css(self) -> &'static str {
        match self {
            Background::Neutral => "#000",
            Background::Won => "green",
            Background::Lost => "red",
        }
    }
}

/// Local side effects of one goal push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feedback {
    pub vibration: &'static [u32],
    pub background: Option<Background>,
}

/// Feedback for a controller owning `own` when `scorer` scored
pub fn feedback_for(own: Slot, scorer: Slot, goals: GoalsField) -> Feedback {
    let own_goal = own == scorer;
    Feedback {
        vibration: if own_goal { GOAL_BUZZ } else { ALERT_PATTERN },
        background: goals.last_goal.then_some(if own_goal {
            Background::Won
        } else {
            Background::Lost
        }),
    }
}

/// Device side of feedback
pub trait FeedbackSink {
    fn vibrate(&mut self, pattern: &[u32]);
    fn set_background(&mut self, background: Background);
}

/// Turns goal pushes into feedback on one controller
pub struct GoalFeedback {
    own: Slot,
    sink: Box<dyn FeedbackSink>,
    can_vibrate: bool,
    warned: bool,
}

impl GoalFeedback {
    pub fn new(own: Slot, sink: Box<dyn FeedbackSink>, can_vibrate: bool) -> Self {
        Self {
            own,
            sink,
            can_vibrate,
            warned: false,
        }
    }

    pub fn on_goals(&mut self, scorer: Slot, goals: GoalsField) {
        let feedback = feedback_for(self.own, scorer, goals);
        if self.can_vibrate {
            self.sink.vibrate(feedback.vibration);
        } else if !self.warned {
            log::warn!("Vibration unavailable, skipping haptic goal feedback");
            self.warned = true;
        }
        if let Some(background) = feedback.background {
            self.sink.set_background(background);
        }
    }

    /// Rejoining clears the last match result. Going offline leaves it, so
    /// a won/lost background holds whichever push arrives first.
    pub fn on_own_online(&mut self, online: bool) {
        if online {
            self.sink.set_background(Background::Neutral);
        }
    }
}
