use std::thread;
use std::time::{Duration, Instant};

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Enforces a minimum spacing between sequential calls to a rate-limited
/// collaborator. The first turn never waits.
pub struct IntervalScheduler<C = SystemClock, S = ThreadSleeper> {
    interval: Duration,
    last_turn: Option<Instant>,
    clock: C,
    sleeper: S,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self::with_parts(interval, SystemClock, ThreadSleeper)
    }
}

impl<C: Clock, S: Sleeper> IntervalScheduler<C, S> {
    pub fn with_parts(interval: Duration, clock: C, sleeper: S) -> Self {
        Self {
            interval,
            last_turn: None,
            clock,
            sleeper,
        }
    }

    /// Block until at least `interval` has passed since the previous turn.
    /// Returns how long it waited.
    pub fn wait_turn(&mut self) -> Duration {
        let now = self.clock.now();
        let waited = match self.last_turn {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                self.interval.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        };
        if !waited.is_zero() {
            self.sleeper.sleep(waited);
        }
        self.last_turn = Some(now + waited);
        waited
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Manual clock that only advances when a `RecordingSleeper` sharing
    /// it sleeps, or when `advance` is called.
    #[derive(Clone)]
    pub struct ManualClock {
        start: Instant,
        offset: Rc<Cell<Duration>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Rc::new(Cell::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, by: Duration) {
            self.offset.set(self.offset.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + self.offset.get()
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingSleeper {
        pub sleeps: Rc<RefCell<Vec<Duration>>>,
        clock: Option<ManualClock>,
    }

    impl RecordingSleeper {
        pub fn driving(clock: ManualClock) -> Self {
            Self {
                sleeps: Rc::default(),
                clock: Some(clock),
            }
        }

        pub fn recorded(&self) -> Vec<Duration> {
            self.sleeps.borrow().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            if let Some(clock) = &self.clock {
                clock.advance(duration);
            }
        }
    }
}
