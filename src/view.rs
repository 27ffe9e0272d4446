//! Animation state: where the camera is, how fast it zooms, and frame timing.

use std::{collections::VecDeque, time::Duration};

use log::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    pub center: (f64, f64),
    pub scale: f64,
    /// Multiplier applied to `scale` once per running frame; below 1 zooms in.
    pub decay_factor: f64,
    pub paused: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            center: (-0.746, -0.11),
            scale: 2.0,
            decay_factor: 0.99,
            paused: true,
        }
    }
}

/// Discrete UI input, queued and applied at the start of the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewEvent {
    TogglePause,
    ResetScale,
    /// Restore every parameter, including the pause flag, to its startup value.
    ResetAll,
}

/**
Advance a running view by one frame.

If the previous frame already went below `scale_floor` the scale snaps back to
`initial_scale`, otherwise it decays. The frame that crosses the floor is still
rendered, so the cycle is "zoom in, show the deepest frame, snap back out".
*/
pub fn advance(state: &mut ViewState, initial_scale: f64, scale_floor: f64) {
    if state.scale < scale_floor {
        debug!("scale {:e} below floor, resetting to {}", state.scale, initial_scale);
        state.scale = initial_scale;
    } else {
        state.scale *= state.decay_factor;
    }
}

pub struct ViewController {
    initial: ViewState,
    state: ViewState,
    scale_floor: f64,
    events: VecDeque<ViewEvent>,
    timer: FrameTimer,
}

impl ViewController {
    pub fn new(initial: ViewState, scale_floor: f64, report_interval: u32) -> Self {
        Self {
            initial,
            state: initial,
            scale_floor,
            events: VecDeque::new(),
            timer: FrameTimer::new(report_interval),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn push(&mut self, event: ViewEvent) {
        self.events.push_back(event);
    }

    /**
    Drain queued events, then advance the zoom if running.

    Returns whether the view needs a new frame computed: always while running,
    and once after an event changes the parameters while paused.
    */
    pub fn tick(&mut self) -> bool {
        let before = self.state;
        while let Some(event) = self.events.pop_front() {
            debug!("view event {:?}", event);
            match event {
                ViewEvent::TogglePause => self.state.paused = !self.state.paused,
                ViewEvent::ResetScale => self.state.scale = self.initial.scale,
                ViewEvent::ResetAll => self.state = self.initial,
            }
        }
        let changed = before != self.state;

        if self.state.paused {
            return changed;
        }

        advance(&mut self.state, self.initial.scale, self.scale_floor);
        true
    }

    /// Feed one frame's compute time into the rolling average, reporting to
    /// `observer` once per window.
    pub fn record_frame(&mut self, elapsed: Duration, observer: &mut impl FrameObserver) {
        if let Some(average) = self.timer.record(elapsed) {
            observer.report(&FrameStats {
                average,
                scale: self.state.scale,
            });
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    pub average: Duration,
    pub scale: f64,
}

impl FrameStats {
    pub fn fps(&self) -> f64 {
        let seconds = self.average.as_secs_f64();
        if seconds > 0.0 {
            1.0 / seconds
        } else {
            f64::INFINITY
        }
    }
}

pub trait FrameObserver {
    fn report(&mut self, stats: &FrameStats);
}

/// Reports through `log`.
pub struct LogObserver {
    pub passes: u32,
}

impl FrameObserver for LogObserver {
    fn report(&mut self, stats: &FrameStats) {
        info!(
            "scale={:e} {:.3}ms {:.1} fps passes={}",
            stats.scale,
            stats.average.as_secs_f64() * 1000.0,
            stats.fps(),
            self.passes
        );
    }
}

/// Averages frame times over a fixed window of frames.
pub struct FrameTimer {
    interval: u32,
    total: Duration,
    count: u32,
}

impl FrameTimer {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            total: Duration::ZERO,
            count: 0,
        }
    }

    /// Returns the window's average once `interval` samples have accumulated.
    pub fn record(&mut self, elapsed: Duration) -> Option<Duration> {
        self.total += elapsed;
        self.count += 1;
        if self.count < self.interval {
            return None;
        }

        let average = self.total / self.count;
        self.total = Duration::ZERO;
        self.count = 0;
        Some(average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: f64 = 1e-7;

    fn running() -> ViewController {
        let mut controller = ViewController::new(ViewState::default(), FLOOR, 60);
        controller.push(ViewEvent::TogglePause);
        controller
    }

    #[derive(Default)]
    struct Collect(Vec<FrameStats>);

    impl FrameObserver for Collect {
        fn report(&mut self, stats: &FrameStats) {
            self.0.push(*stats);
        }
    }

    #[test]
    fn paused_controller_does_not_advance() {
        let mut controller = ViewController::new(ViewState::default(), FLOOR, 60);

        assert!(!controller.tick());
        assert!(!controller.tick());
        assert_eq!(*controller.state(), ViewState::default());
    }

    #[test]
    fn running_controller_decays_scale() {
        let mut controller = running();

        assert!(controller.tick());
        assert!(!controller.state().paused);
        assert_eq!(controller.state().scale, 2.0 * 0.99);
        controller.tick();
        assert_eq!(controller.state().scale, 2.0 * 0.99 * 0.99);
    }

    #[test]
    fn zoom_snaps_back_after_crossing_the_floor() {
        let mut state = ViewState::default();
        let steps = ((FLOOR / 2.0).ln() / 0.99_f64.ln()).ceil() as u32;
        assert_eq!(steps, 1673);

        for step in 0..steps {
            assert!(state.scale >= FLOOR, "crossed early at step {}", step);
            advance(&mut state, 2.0, FLOOR);
        }
        assert!(state.scale < FLOOR);

        advance(&mut state, 2.0, FLOOR);
        assert_eq!(state.scale, 2.0);
    }

    #[test]
    fn reset_scale_keeps_running() {
        let mut controller = running();
        for _ in 0..10 {
            controller.tick();
        }

        controller.push(ViewEvent::ResetScale);
        controller.tick();

        assert!(!controller.state().paused);
        assert_eq!(controller.state().scale, 2.0 * 0.99);
    }

    #[test]
    fn reset_all_restores_startup_state() {
        let mut controller = running();
        for _ in 0..10 {
            controller.tick();
        }

        controller.push(ViewEvent::ResetAll);
        assert!(controller.tick());
        assert_eq!(*controller.state(), ViewState::default());
    }

    #[test]
    fn reset_while_paused_requests_one_frame() {
        let mut controller = running();
        controller.tick();
        controller.push(ViewEvent::TogglePause);
        controller.tick();

        controller.push(ViewEvent::ResetScale);
        assert!(controller.tick());
        assert_eq!(controller.state().scale, 2.0);
        assert!(!controller.tick());
    }

    #[test]
    fn events_drain_in_order() {
        let mut controller = ViewController::new(ViewState::default(), FLOOR, 60);
        controller.push(ViewEvent::TogglePause);
        controller.push(ViewEvent::TogglePause);

        assert!(!controller.tick());
        assert!(controller.state().paused);
    }

    #[test]
    fn stats_are_reported_once_per_window() {
        let mut controller = ViewController::new(ViewState::default(), FLOOR, 6);
        let mut observer = Collect::default();

        for frame in 1..=12u64 {
            controller.record_frame(Duration::from_millis(frame), &mut observer);
        }

        assert_eq!(observer.0.len(), 2);
        assert_eq!(observer.0[0].average, Duration::from_micros(3500));
        assert_eq!(observer.0[1].average, Duration::from_micros(9500));
        assert_eq!(observer.0[0].scale, 2.0);
    }

    #[test]
    fn fps_is_the_inverse_of_the_average() {
        let stats = FrameStats {
            average: Duration::from_millis(20),
            scale: 1.0,
        };
        assert!((stats.fps() - 50.0).abs() < 1e-9);
    }
}
