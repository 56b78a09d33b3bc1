//! Fixed-interval frame scheduler
//!
//! Calls `update(dt)` then `draw()` once per interval while running. This is
//! timer-driven, not a fixed-timestep integrator: `dt` is the wall-clock time
//! since the previous tick, so the simulation must clamp it.
//!
//! Anything that blocks the thread (alert/confirm style prompts) must go
//! through [`FrameScheduler::blocking`], which stops the timer first and
//! re-arms it afterwards so the prompt's duration never reaches `update`.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Millisecond time source
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Monotonic wall clock
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-advanced clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<f64>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: f64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.0.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.0.get()
    }
}

/// Display surface the scheduler draws into
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Start a new back buffer
    fn clear(&mut self);
    fn fill_text(&mut self, text: &str, x: f32, y: f32);
    /// Flip the back buffer to the screen
    fn present(&mut self);
}

/// Surface that keeps the last presented frame's text (native demo, tests)
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    width: u32,
    height: u32,
    back: Vec<String>,
    pub presented: Vec<String>,
    pub frames: u64,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }
}

impl Surface for HeadlessSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.back.clear();
    }

    fn fill_text(&mut self, text: &str, _x: f32, _y: f32) {
        self.back.push(text.to_string());
    }

    fn present(&mut self) {
        self.presented = std::mem::take(&mut self.back);
        self.frames += 1;
    }
}

/// Whatever the scheduler drives
pub trait Frame {
    /// Advance by `dt` seconds of wall-clock time
    fn update(&mut self, dt: f64);
    fn draw(&mut self, surface: &mut dyn Surface);
}

/// Rolling frame statistics (diagnostic only)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// Frame counter, wraps at the target fps
    pub count: u32,
    pub fps: f64,
    /// Update cost (ms, at least 1)
    pub update: f64,
    /// Draw cost (ms, at least 1)
    pub draw: f64,
    /// update + draw
    pub frame: f64,
}

pub struct FrameScheduler<C: Clock = SystemClock> {
    clock: C,
    surface: Box<dyn Surface>,
    fps: u32,
    interval: f64,
    width: u32,
    height: u32,
    stats_enabled: bool,
    stats: Stats,
    running: bool,
    last_frame: f64,
    next_due: f64,
    ticks: u64,
}

impl<C: Clock> FrameScheduler<C> {
    /// Build a scheduler. A missing surface is fatal here and never checked again.
    pub fn new(surface: Option<Box<dyn Surface>>, settings: &Settings, clock: C) -> Result<Self> {
        let surface = surface.ok_or(Error::MissingSurface)?;
        let width = settings.width.unwrap_or_else(|| surface.width());
        let height = settings.height.unwrap_or_else(|| surface.height());
        Ok(Self {
            clock,
            surface,
            fps: settings.fps,
            interval: settings.interval_ms(),
            width,
            height,
            stats_enabled: settings.stats,
            stats: Stats::default(),
            running: false,
            last_frame: 0.0,
            next_due: 0.0,
            ticks: 0,
        })
    }

    /// Arm the timer. Calling this while running re-arms it.
    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        self.last_frame = now;
        self.next_due = now + self.interval;
        if !self.running {
            log::debug!("Scheduler started ({} fps)", self.fps);
        }
        self.running = true;
    }

    /// Disarm the timer. Session state is untouched; `start` resumes.
    pub fn stop(&mut self) {
        if self.running {
            log::debug!("Scheduler stopped after {} ticks", self.ticks);
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run one tick if the timer is due. Returns whether a tick ran.
    pub fn poll(&mut self, frame: &mut dyn Frame) -> bool {
        if !self.running {
            return false;
        }
        let now = self.clock.now_ms();
        if now < self.next_due {
            return false;
        }
        self.run_loop(frame);
        // Missed intervals collapse into one tick
        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
        true
    }

    /// Milliseconds until the next tick is due (`None` when stopped)
    pub fn until_next(&self) -> Option<f64> {
        self.running
            .then(|| (self.next_due - self.clock.now_ms()).max(0.0))
    }

    /// Tick body: update with elapsed seconds, then draw
    pub fn run_loop(&mut self, frame: &mut dyn Frame) {
        let start = self.clock.now_ms();
        frame.update((start - self.last_frame) / 1000.0);
        let middle = self.clock.now_ms();
        self.draw(frame);
        let end = self.clock.now_ms();
        self.update_stats(middle - start, end - middle);
        self.last_frame = start;
        self.ticks += 1;
    }

    fn draw(&mut self, frame: &mut dyn Frame) {
        self.surface.clear();
        frame.draw(self.surface.as_mut());
        self.draw_stats();
        self.surface.present();
    }

    fn update_stats(&mut self, update: f64, draw: f64) {
        if !self.stats_enabled {
            return;
        }
        let stats = &mut self.stats;
        stats.update = update.max(1.0);
        stats.draw = draw.max(1.0);
        stats.frame = stats.update + stats.draw;
        stats.count = if stats.count == self.fps {
            0
        } else {
            stats.count + 1
        };
        stats.fps = (self.fps as f64).min(1000.0 / stats.frame);
    }

    fn draw_stats(&mut self) {
        if !self.stats_enabled {
            return;
        }
        let x = self.width as f32 - 100.0;
        let y = self.height as f32;
        let lines = [
            format!("frame: {}", self.stats.count),
            format!("fps: {}", self.stats.fps),
            format!("update: {}ms", self.stats.update),
            format!("draw: {}ms", self.stats.draw),
        ];
        for (i, line) in lines.iter().enumerate() {
            self.surface.fill_text(line, x, y - 60.0 + 10.0 * i as f32);
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }

    /// Run a thread-blocking call with the timer stopped. The timer is
    /// re-armed afterwards only if it was running before.
    pub fn blocking<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let was_running = self.running;
        self.stop();
        let result = f();
        if was_running {
            self.start();
        }
        result
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        dts: Vec<f64>,
        draws: u32,
        /// Simulated update cost (ms)
        cost: Option<(ManualClock, f64)>,
    }

    impl Frame for Recorder {
        fn update(&mut self, dt: f64) {
            self.dts.push(dt);
            if let Some((clock, ms)) = &self.cost {
                clock.advance(*ms);
            }
        }

        fn draw(&mut self, surface: &mut dyn Surface) {
            self.draws += 1;
            surface.fill_text("court", 0.0, 0.0);
        }
    }

    fn scheduler(settings: &Settings) -> (ManualClock, FrameScheduler<ManualClock>) {
        let clock = ManualClock::new();
        let surface: Box<dyn Surface> = Box::new(HeadlessSurface::new(640, 480));
        let scheduler = FrameScheduler::new(Some(surface), settings, clock.clone()).unwrap();
        (clock, scheduler)
    }

    #[test]
    fn test_missing_surface_is_fatal() {
        let result = FrameScheduler::new(None, &Settings::default(), ManualClock::new());
        assert!(matches!(result, Err(Error::MissingSurface)));
    }

    #[test]
    fn test_ticks_only_when_due() {
        let (clock, mut scheduler) = scheduler(&Settings::default());
        let mut frame = Recorder::default();

        assert!(!scheduler.poll(&mut frame), "stopped scheduler must not tick");
        scheduler.start();
        clock.advance(5.0);
        assert!(!scheduler.poll(&mut frame));
        clock.advance(scheduler.interval_ms());
        assert!(scheduler.poll(&mut frame));
        assert_eq!(frame.dts.len(), 1);
        assert_eq!(frame.draws, 1);
        assert!((frame.dts[0] - (5.0 + 1000.0 / 60.0) / 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_keeps_tick_count() {
        let (clock, mut scheduler) = scheduler(&Settings::default());
        let mut frame = Recorder::default();
        scheduler.start();
        for _ in 0..3 {
            clock.advance(scheduler.interval_ms());
            scheduler.poll(&mut frame);
        }
        scheduler.stop();
        clock.advance(1000.0);
        assert!(!scheduler.poll(&mut frame));
        assert_eq!(scheduler.ticks(), 3);
        assert!(scheduler.until_next().is_none());
    }

    #[test]
    fn test_missed_intervals_collapse() {
        let (clock, mut scheduler) = scheduler(&Settings::default());
        let mut frame = Recorder::default();
        scheduler.start();
        clock.advance(scheduler.interval_ms() * 5.0);
        assert!(scheduler.poll(&mut frame));
        assert!(!scheduler.poll(&mut frame));
    }

    #[test]
    fn test_blocking_prompt_bounds_next_dt() {
        let (clock, mut scheduler) = scheduler(&Settings::default());
        let mut frame = Recorder::default();
        scheduler.start();
        clock.advance(scheduler.interval_ms());
        scheduler.poll(&mut frame);

        let answer = scheduler.blocking(|| {
            clock.advance(5000.0);
            true
        });
        assert!(answer);
        assert!(scheduler.is_running());

        clock.advance(scheduler.interval_ms());
        assert!(scheduler.poll(&mut frame));
        let dt = *frame.dts.last().unwrap();
        assert!(dt <= scheduler.interval_ms() / 1000.0 + 1e-9, "dt was {dt}");
    }

    #[test]
    fn test_blocking_does_not_start_stopped_scheduler() {
        let (_clock, mut scheduler) = scheduler(&Settings::default());
        scheduler.blocking(|| ());
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_stats_are_diagnostic_only() {
        let settings = Settings {
            stats: true,
            ..Default::default()
        };
        let (clock, mut with_stats) = scheduler(&settings);
        let (plain_clock, mut plain) = scheduler(&Settings::default());
        let mut a = Recorder {
            cost: Some((clock.clone(), 4.0)),
            ..Default::default()
        };
        let mut b = Recorder {
            cost: Some((plain_clock.clone(), 4.0)),
            ..Default::default()
        };

        with_stats.start();
        plain.start();
        for _ in 0..4 {
            clock.advance(with_stats.interval_ms());
            plain_clock.advance(plain.interval_ms());
            with_stats.poll(&mut a);
            plain.poll(&mut b);
        }
        assert_eq!(a.dts, b.dts);

        let stats = with_stats.stats();
        assert_eq!(stats.update, 4.0);
        assert_eq!(stats.draw, 1.0);
        assert_eq!(stats.frame, 5.0);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.fps, 60.0);
        assert_eq!(plain.stats(), Stats::default());
    }

    #[test]
    fn test_size_override() {
        let settings = Settings {
            width: Some(800),
            ..Default::default()
        };
        let (_clock, scheduler) = scheduler(&settings);
        assert_eq!(scheduler.size(), (800, 480));
    }
}
