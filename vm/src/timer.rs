use std::time::{Duration, Instant};

use crate::constants::{MAX_TIMER_DELTA, TIMER_PERIOD};
use crate::state::State;

/// # Timer Driver
/// Steps the delay and sound timers at 60Hz of wall-clock time, no matter how
/// often the CPU is cycled.
///
/// Each sample adds the time since the previous sample to the state's
/// accumulator; every whole `TIMER_PERIOD` in the accumulator is one tick.
/// The remainder carries over so the long run rate follows the wall clock.
pub struct TimerDriver {
    last_sample: Option<Instant>,
}

impl TimerDriver {
    pub fn new() -> Self {
        TimerDriver { last_sample: None }
    }

    /// Time elapsed since the previous sample, capped at `MAX_TIMER_DELTA`.
    /// The first sample only starts the clock.
    pub fn sample(&mut self, now: Instant) -> Duration {
        let elapsed = match self.last_sample {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last_sample = Some(now);

        if elapsed > MAX_TIMER_DELTA {
            log::debug!("clamping {:?} of elapsed time to {:?}", elapsed, MAX_TIMER_DELTA);
            MAX_TIMER_DELTA
        } else {
            elapsed
        }
    }

    /// Forgets the previous sample so a pause isn't counted as elapsed time
    pub fn reset(&mut self) {
        self.last_sample = None;
    }
}

impl Default for TimerDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Spends `elapsed` on timer ticks
/// - decrements both timers once per whole `TIMER_PERIOD`, never below 0
/// - keeps the leftover time in the accumulator
/// - refreshes the sound flag from the sound timer
pub fn advance(state: &State, elapsed: Duration) -> State {
    let mut accumulator = state.timer_accumulator + elapsed;
    let mut delay_timer = state.delay_timer;
    let mut sound_timer = state.sound_timer;

    while accumulator >= TIMER_PERIOD {
        accumulator -= TIMER_PERIOD;
        delay_timer = delay_timer.saturating_sub(1);
        sound_timer = sound_timer.saturating_sub(1);
    }

    State {
        delay_timer,
        sound_timer,
        sound_flag: sound_timer > 0,
        timer_accumulator: accumulator,
        ..*state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_starts_the_clock() {
        let mut timers = TimerDriver::new();
        assert_eq!(timers.sample(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_sample_measures_between_calls() {
        let mut timers = TimerDriver::new();
        let start = Instant::now();
        timers.sample(start);
        assert_eq!(
            timers.sample(start + Duration::from_millis(5)),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_sample_clamps_stalls() {
        let mut timers = TimerDriver::new();
        let start = Instant::now();
        timers.sample(start);
        assert_eq!(
            timers.sample(start + Duration::from_secs(3)),
            MAX_TIMER_DELTA
        );
    }

    #[test]
    fn test_reset_forgets_last_sample() {
        let mut timers = TimerDriver::new();
        let start = Instant::now();
        timers.sample(start);
        timers.reset();
        assert_eq!(
            timers.sample(start + Duration::from_millis(50)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_advance_ticks_once_per_period() {
        let mut state = State::new();
        state.delay_timer = 10;
        state.sound_timer = 10;
        let state = advance(&state, TIMER_PERIOD * 3);
        assert_eq!(state.delay_timer, 7);
        assert_eq!(state.sound_timer, 7);
        assert!(state.sound_flag);
    }

    #[test]
    fn test_advance_carries_remainder() {
        let mut state = State::new();
        state.delay_timer = 10;
        let state = advance(&state, TIMER_PERIOD / 2);
        assert_eq!(state.delay_timer, 10);
        let state = advance(&state, TIMER_PERIOD / 2 + Duration::from_nanos(1));
        assert_eq!(state.delay_timer, 9);
        assert!(state.timer_accumulator < TIMER_PERIOD);
    }

    #[test]
    fn test_advance_stops_at_zero() {
        let mut state = State::new();
        state.delay_timer = 1;
        state.sound_timer = 2;
        let state = advance(&state, TIMER_PERIOD * 5);
        assert_eq!(state.delay_timer, 0);
        assert_eq!(state.sound_timer, 0);
        assert!(!state.sound_flag);
    }
}
