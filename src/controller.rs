//! The per-player controller client
//!
//! Writes only its own slot's fields: the player record (direction or
//! position) and its own online flag. Goal pushes for either slot become
//! local feedback.

use std::cell::RefCell;
use std::rc::Rc;

use crate::court::{CONNECT_FAILED, Prompt};
use crate::error::{Error, Result};
use crate::input::{Capabilities, InputCommand, InputMode, InputNormalizer, RawInput, Viewport};
use crate::reconciler::{FeedbackSink, GoalFeedback};
use crate::records::{RecordLink, Slot};
use crate::settings::Settings;
use crate::store::{RecordStore, SubscriptionId};

/// Label of the join/leave button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinLabel {
    Join,
    Leave,
}

impl JoinLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinLabel::Join => "join",
            JoinLabel::Leave => "leave",
        }
    }
}

/// Everything a controller shows that comes from pushes
struct View {
    online: bool,
    feedback: GoalFeedback,
}

/// Device side of a controller
pub struct Device {
    pub capabilities: Capabilities,
    pub viewport: Viewport,
    /// Height of the tilt indicator (px)
    pub indicator_height: f32,
    pub feedback: Box<dyn FeedbackSink>,
}

pub struct Controller {
    slot: Slot,
    link: RecordLink,
    input: InputNormalizer,
    view: Rc<RefCell<View>>,
    subscriptions: Vec<SubscriptionId>,
}

impl Controller {
    /// Log in as `fragment`'s slot (`#1`/`#2`) and join the session named in
    /// `settings`. A refused login is shown through `prompt.alert` and
    /// returned as an error.
    pub fn connect(
        store: Rc<dyn RecordStore>,
        settings: &Settings,
        fragment: &str,
        device: Device,
        prompt: &mut dyn Prompt,
    ) -> Result<Self> {
        let slot = Slot::from_fragment(fragment)?;
        let game_id = settings.game_id().ok_or_else(|| Error::InvalidSetting {
            key: "gameId".to_string(),
            value: String::new(),
        })?;
        if let Err(e) = store.login(&slot.to_string()) {
            log::error!("{e}");
            prompt.alert(CONNECT_FAILED);
            return Err(e);
        }
        Ok(Self::new(RecordLink::new(store, game_id), slot, settings, device))
    }

    pub fn new(link: RecordLink, slot: Slot, settings: &Settings, device: Device) -> Self {
        let input = InputNormalizer::new(
            device.capabilities,
            settings,
            device.viewport,
            device.indicator_height,
        );
        let view = Rc::new(RefCell::new(View {
            online: false,
            feedback: GoalFeedback::new(slot, device.feedback, device.capabilities.vibrate),
        }));

        link.init_player(slot);

        let mut subscriptions = Vec::with_capacity(3);
        let own = view.clone();
        subscriptions.push(link.on_online(slot, move |online| {
            let mut view = own.borrow_mut();
            view.online = online;
            view.feedback.on_own_online(online);
        }));
        for scorer in Slot::BOTH {
            let own = view.clone();
            subscriptions.push(link.on_goals(scorer, move |goals| {
                own.borrow_mut().feedback.on_goals(scorer, goals);
            }));
        }

        log::info!("Controller for player {slot} joined session {}", link.game_id());
        Self {
            slot,
            link,
            input,
            view,
            subscriptions,
        }
    }

    /// Normalize one raw event and write the resulting command
    pub fn handle(&mut self, raw: RawInput) -> Option<InputCommand> {
        let command = self.input.handle(raw)?;
        match command {
            InputCommand::Discrete(direction) => self.link.write_direction(self.slot, direction),
            InputCommand::Continuous(position) => self.link.write_position(self.slot, position),
        }
        Some(command)
    }

    /// Flip this player's online flag; returns the value written
    pub fn toggle_online(&self) -> bool {
        let online = self.link.toggle_online(self.slot);
        log::info!("Player {} {}", self.slot, if online { "joined" } else { "left" });
        online
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.input.set_viewport(viewport);
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn input_mode(&self) -> InputMode {
        self.input.mode()
    }

    /// Last pushed value of this player's online flag
    pub fn online(&self) -> bool {
        self.view.borrow().online
    }

    pub fn label(&self) -> JoinLabel {
        if self.online() {
            JoinLabel::Leave
        } else {
            JoinLabel::Join
        }
    }

    /// Tilt indicator offset (px), if a tilt reading has been accepted
    pub fn indicator_margin(&self) -> Option<f32> {
        self.input.last_reading().map(|r| r.margin)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.link.unsubscribe(id);
        }
    }
}
