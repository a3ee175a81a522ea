/*!
 * Cyclic Barrier
 *
 * Each cohort of `parties` waiters shares one outcome slot. The last arrival
 * marks it passed and opens a new cohort; a timeout, `abort` or `reset` marks
 * it broken instead, so a late-waking waiter always reports its own cohort's
 * result and never a later one.
 */

use super::traits::Wait;
use crate::core::backoff::deadline_after;
use crate::core::errors::{BridgeResult, DelegateError};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Callback run by the last party to arrive, before the others are released
pub type BarrierAction = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Passed,
    Broken,
}

struct State {
    waiting: usize,
    cohort: Arc<Mutex<Outcome>>,
    broken: bool,
}

pub struct Barrier {
    parties: usize,
    default_timeout: Option<Duration>,
    action: Option<BarrierAction>,
    state: Mutex<State>,
    changed: Condvar,
}

impl Barrier {
    pub fn new(parties: usize) -> BridgeResult<Self> {
        Self::build(parties, None, None)
    }

    /// Barrier whose waits time out after `timeout` unless given their own
    pub fn with_timeout(parties: usize, timeout: Duration) -> BridgeResult<Self> {
        Self::build(parties, None, Some(timeout))
    }

    pub fn with_action(parties: usize, action: BarrierAction) -> BridgeResult<Self> {
        Self::build(parties, Some(action), None)
    }

    fn build(
        parties: usize,
        action: Option<BarrierAction>,
        default_timeout: Option<Duration>,
    ) -> BridgeResult<Self> {
        if parties == 0 {
            return Err(DelegateError::InvalidArgument("parties must be at least 1".into()).into());
        }
        Ok(Self {
            parties,
            default_timeout,
            action,
            state: Mutex::new(State {
                waiting: 0,
                cohort: Arc::new(Mutex::new(Outcome::Pending)),
                broken: false,
            }),
            changed: Condvar::new(),
        })
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Parties currently blocked in `wait`
    pub fn n_waiting(&self) -> usize {
        self.state.lock().waiting
    }

    pub fn broken(&self) -> bool {
        self.state.lock().broken
    }

    /// Put the barrier in the broken state, failing current and future waits
    pub fn abort(&self) {
        let mut state = self.state.lock();
        self.break_cohort(&mut state);
    }

    /// Return to the initial state; current waiters fail with a broken barrier
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.waiting > 0 {
            *state.cohort.lock() = Outcome::Broken;
            self.changed.notify_all();
        }
        state.waiting = 0;
        state.cohort = Arc::new(Mutex::new(Outcome::Pending));
        state.broken = false;
    }

    fn break_cohort(&self, state: &mut State) {
        state.broken = true;
        state.waiting = 0;
        *state.cohort.lock() = Outcome::Broken;
        self.changed.notify_all();
    }

    fn run_action(&self) -> bool {
        match &self.action {
            Some(action) => panic::catch_unwind(AssertUnwindSafe(|| action())).is_ok(),
            None => true,
        }
    }
}

impl Wait for Barrier {
    /// Arrival index in `0..parties`; the last party to arrive gets `parties - 1`
    type Output = usize;

    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<usize> {
        let timeout = timeout.or(self.default_timeout);
        let deadline = deadline_after(timeout);

        let mut state = self.state.lock();
        if state.broken {
            return Err(DelegateError::BrokenBarrier.into());
        }

        let index = state.waiting;
        state.waiting += 1;

        if state.waiting == self.parties {
            if !self.run_action() {
                warn!(parties = self.parties, "Barrier action panicked, breaking barrier");
                self.break_cohort(&mut state);
                return Err(DelegateError::BrokenBarrier.into());
            }
            *state.cohort.lock() = Outcome::Passed;
            state.cohort = Arc::new(Mutex::new(Outcome::Pending));
            state.waiting = 0;
            self.changed.notify_all();
            return Ok(index);
        }

        let cohort = Arc::clone(&state.cohort);
        loop {
            match *cohort.lock() {
                Outcome::Passed => return Ok(index),
                Outcome::Broken => return Err(DelegateError::BrokenBarrier.into()),
                Outcome::Pending => {}
            }

            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out()
                        && *cohort.lock() == Outcome::Pending
                    {
                        self.break_cohort(&mut state);
                        return Err(DelegateError::BrokenBarrier.into());
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
    }
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Barrier")
            .field("parties", &self.parties)
            .field("waiting", &state.waiting)
            .field("broken", &state.broken)
            .finish()
    }
}
