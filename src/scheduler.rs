use std::time::{Duration, Instant};

use crate::time::{self, Time};

/// What observers see of a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameInfo {
    pub index: u64,
    pub time: Time,
    pub fixed_frame: Option<String>,
    pub render_frame: Option<String>,
    /// Number of draw items submitted. Zero in `start_frame`.
    pub draw_count: usize,
}

/// Notified synchronously around every tick, in registration order.
pub trait FrameObserver {
    fn start_frame(&mut self, _frame: &FrameInfo) {}

    fn end_frame(&mut self, _frame: &FrameInfo) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The renderer was disposed, no further ticks will run.
    Stopped,
}

/// Playback time advanced from wall-clock time.
#[derive(Debug)]
pub struct PlaybackClock {
    time: Time,
    rate: f64,
    paused: bool,
    last_wall: Option<Instant>,
}

impl PlaybackClock {
    pub fn new(start: Time) -> Self {
        Self {
            time: start,
            rate: 1.0,
            paused: false,
            last_wall: None,
        }
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Negative or non-finite rates are treated as zero.
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = if rate.is_finite() {
            rate.max(0.0)
        } else {
            0.0
        };
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.last_wall = None;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn seek(&mut self, time: Time) {
        self.time = time;
        self.last_wall = None;
    }

    pub fn advance_by(&mut self, elapsed: Duration) -> Time {
        if !self.paused {
            let step = time::from_secs_f64(elapsed.as_secs_f64() * self.rate);
            self.time = self.time.saturating_add(step);
        }
        self.time
    }

    /// Advances by the wall time since the previous call. The first call after a
    /// pause or seek does not move.
    pub fn advance(&mut self) -> Time {
        let now = Instant::now();
        let elapsed = self.last_wall.map(|last| now.duration_since(last)).unwrap_or_default();
        self.last_wall = Some(now);
        self.advance_by(elapsed)
    }
}

/// Frame counter plus the ordered observer list.
#[derive(Default)]
pub struct FrameScheduler {
    observers: Vec<Box<dyn FrameObserver>>,
    next_index: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn FrameObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn frames_started(&self) -> u64 {
        self.next_index
    }

    /// Starts frame `index` and notifies every observer.
    pub fn begin(
        &mut self,
        time: Time,
        fixed_frame: Option<&str>,
        render_frame: Option<&str>,
    ) -> FrameInfo {
        let frame = FrameInfo {
            index: self.next_index,
            time,
            fixed_frame: fixed_frame.map(str::to_string),
            render_frame: render_frame.map(str::to_string),
            draw_count: 0,
        };
        self.next_index += 1;
        for observer in &mut self.observers {
            observer.start_frame(&frame);
        }
        frame
    }

    pub fn end(&mut self, frame: &FrameInfo) {
        for observer in &mut self.observers {
            observer.end_frame(frame);
        }
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::NANOS_PER_SEC;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl FrameObserver for Recorder {
        fn start_frame(&mut self, frame: &FrameInfo) {
            self.log.borrow_mut().push(format!("{} start {}", self.name, frame.index));
        }

        fn end_frame(&mut self, frame: &FrameInfo) {
            self.log.borrow_mut().push(format!("{} end {}", self.name, frame.index));
        }
    }

    #[test]
    fn test_observers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = FrameScheduler::new();
        for name in ["a", "b"] {
            scheduler.add_observer(Box::new(Recorder {
                name,
                log: log.clone(),
            }));
        }

        let frame = scheduler.begin(0, Some("map"), Some("map"));
        scheduler.end(&frame);
        let frame = scheduler.begin(1, None, None);
        assert_eq!(frame.index, 1);

        assert_eq!(
            *log.borrow(),
            vec!["a start 0", "b start 0", "a end 0", "b end 0", "a start 1", "b start 1"]
        );
    }

    #[test]
    fn test_clock_rate_and_pause() {
        let mut clock = PlaybackClock::new(NANOS_PER_SEC);
        assert_eq!(clock.advance_by(Duration::from_millis(500)), NANOS_PER_SEC * 3 / 2);

        clock.set_rate(2.0);
        assert_eq!(clock.advance_by(Duration::from_secs(1)), NANOS_PER_SEC * 7 / 2);

        clock.pause();
        assert_eq!(clock.advance_by(Duration::from_secs(1)), NANOS_PER_SEC * 7 / 2);
        clock.resume();

        clock.seek(0);
        assert_eq!(clock.advance(), 0);

        clock.set_rate(f64::NAN);
        assert_eq!(clock.rate(), 0.0);
    }
}
