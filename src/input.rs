//! Raw controller input to paddle commands
//!
//! Two mutually exclusive paths, picked once from the device capabilities:
//! - discrete: on-screen up/down buttons and the Q/A keys, looked up in a
//!   registration table keyed by (control, edge)
//! - tilt: device acceleration, orientation-corrected, deadbanded and mapped
//!   onto a normalized `[0, 1]` paddle position

use std::collections::HashMap;

use glam::Vec2;

use crate::consts::ACCELERATION_SPAN;
use crate::records::Direction;
use crate::settings::Settings;

/// Browser key codes used by the controller
pub mod keys {
    pub const A: u32 = 65;
    pub const Q: u32 = 81;
}

/// Canonical per-player command. Each one overwrites the previous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputCommand {
    /// Move up/down, or stop (`None`)
    Discrete(Option<Direction>),
    /// Absolute paddle position in `[0, 1]`
    Continuous(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Press,
    Release,
}

/// Classes carried by the pressed on-screen element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonTarget {
    pub up: bool,
    pub down: bool,
}

impl ButtonTarget {
    pub const UP: ButtonTarget = ButtonTarget {
        up: true,
        down: false,
    };
    pub const DOWN: ButtonTarget = ButtonTarget {
        up: false,
        down: true,
    };
}

/// Physical control identity used as a registration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    UpButton,
    DownButton,
    /// Element carrying both or neither of the up/down classes
    AmbiguousButton,
    Key(u32),
    /// Fallback for keys without their own binding
    AnyKey,
}

impl From<ButtonTarget> for Control {
    fn from(target: ButtonTarget) -> Self {
        match (target.up, target.down) {
            (true, false) => Control::UpButton,
            (false, true) => Control::DownButton,
            _ => Control::AmbiguousButton,
        }
    }
}

/// Device acceleration including gravity (m/s²). `y` is `None` when the
/// device reports no reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub x: f32,
    pub y: Option<f32>,
}

/// One raw input event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInput {
    Button { target: ButtonTarget, edge: Edge },
    Key { code: u32, edge: Edge },
    Motion(MotionSample),
}

/// Registration table: (control, edge) → command
#[derive(Debug, Clone)]
pub struct ControlBindings {
    table: HashMap<(Control, Edge), InputCommand>,
}

impl ControlBindings {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn bind(&mut self, control: Control, edge: Edge, command: InputCommand) -> &mut Self {
        self.table.insert((control, edge), command);
        self
    }

    /// Look up a control, falling back to `AnyKey` for unbound keys
    pub fn resolve(&self, control: Control, edge: Edge) -> Option<InputCommand> {
        self.table.get(&(control, edge)).copied().or_else(|| match control {
            Control::Key(_) => self.table.get(&(Control::AnyKey, edge)).copied(),
            _ => None,
        })
    }
}

impl Default for ControlBindings {
    /// Up/down buttons, Q/A keys; any release stops the paddle
    fn default() -> Self {
        let up = InputCommand::Discrete(Some(Direction::Up));
        let down = InputCommand::Discrete(Some(Direction::Down));
        let stop = InputCommand::Discrete(None);

        let mut bindings = Self::empty();
        bindings
            .bind(Control::UpButton, Edge::Press, up)
            .bind(Control::DownButton, Edge::Press, down)
            .bind(Control::AmbiguousButton, Edge::Press, stop)
            .bind(Control::UpButton, Edge::Release, stop)
            .bind(Control::DownButton, Edge::Release, stop)
            .bind(Control::AmbiguousButton, Edge::Release, stop)
            .bind(Control::Key(keys::Q), Edge::Press, up)
            .bind(Control::Key(keys::A), Edge::Press, down)
            .bind(Control::AnyKey, Edge::Release, stop);
        bindings
    }
}

/// Screen size used for orientation and the indicator travel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn is_landscape(&self) -> bool {
        self.width / self.height > 1.0
    }
}

/// Accepted tilt reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltReading {
    /// Normalized paddle position, clamped to `[0, 1]`
    pub position: f32,
    /// Indicator offset from the top (px), local display only
    pub margin: f32,
}

/// Deadbanded tilt-to-position mapping
#[derive(Debug, Clone)]
pub struct TiltFilter {
    threshold: f32,
    factor: f32,
    indicator_height: f32,
    last_value: f32,
}

impl TiltFilter {
    pub fn new(threshold: f32, factor: f32, indicator_height: f32) -> Self {
        Self {
            threshold,
            factor,
            indicator_height,
            last_value: 0.0,
        }
    }

    /// Feed one acceleration sample. Returns a reading only when the
    /// orientation-corrected axis moved by more than the threshold.
    pub fn sample(&mut self, accel: Vec2, viewport: Viewport) -> Option<TiltReading> {
        let value = if viewport.is_landscape() {
            accel.x
        } else {
            accel.y
        };
        if !value.is_finite() {
            log::debug!("Dropped non-finite tilt sample {value}");
            return None;
        }
        if (self.last_value - value).abs() <= self.threshold {
            return None;
        }
        self.last_value = value;

        let raw = 0.5 - value / ACCELERATION_SPAN;
        let position = ((raw - 0.5) * (1.0 + self.factor) + 0.5).clamp(0.0, 1.0);

        let travel = (viewport.height - self.indicator_height).max(0.0);
        let margin = (position * viewport.height - self.indicator_height)
            .round()
            .clamp(0.0, travel);

        Some(TiltReading { position, margin })
    }
}

/// Device capabilities probed once at controller construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub touch: bool,
    pub motion: bool,
    pub vibrate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Discrete,
    Tilt,
}

impl InputMode {
    /// Tilt needs both touch and motion support; everything else uses buttons
    pub fn select(caps: Capabilities) -> Self {
        if caps.touch && caps.motion {
            InputMode::Tilt
        } else {
            InputMode::Discrete
        }
    }
}

pub struct InputNormalizer {
    mode: InputMode,
    bindings: ControlBindings,
    tilt: TiltFilter,
    viewport: Viewport,
    last_reading: Option<TiltReading>,
}

impl InputNormalizer {
    pub fn new(caps: Capabilities, settings: &Settings, viewport: Viewport, indicator_height: f32) -> Self {
        let mode = InputMode::select(caps);
        if mode == InputMode::Discrete && caps.touch {
            log::warn!("Motion sensor unavailable, using on-screen buttons");
        }
        log::info!("Input mode: {mode:?}");
        Self {
            mode,
            bindings: ControlBindings::default(),
            tilt: TiltFilter::new(
                settings.acceleration_threshold,
                settings.tilt_factor,
                indicator_height,
            ),
            viewport,
            last_reading: None,
        }
    }

    pub fn with_bindings(mut self, bindings: ControlBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Last accepted tilt reading (drives the on-screen indicator)
    pub fn last_reading(&self) -> Option<TiltReading> {
        self.last_reading
    }

    /// Translate one raw event. Events from the inactive path are ignored.
    pub fn handle(&mut self, input: RawInput) -> Option<InputCommand> {
        match (self.mode, input) {
            (InputMode::Discrete, RawInput::Button { target, edge }) => {
                self.bindings.resolve(Control::from(target), edge)
            }
            (InputMode::Discrete, RawInput::Key { code, edge }) => {
                self.bindings.resolve(Control::Key(code), edge)
            }
            (InputMode::Tilt, RawInput::Motion(sample)) => {
                let y = sample.y?;
                let reading = self.tilt.sample(Vec2::new(sample.x, y), self.viewport)?;
                self.last_reading = Some(reading);
                Some(InputCommand::Continuous(reading.position))
            }
            _ => None,
        }
    }
}
