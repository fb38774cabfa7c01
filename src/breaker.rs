// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A circuit breaker for guarding calls to an unreliable collaborator.
//!
//! A breaker is closed while the collaborator is healthy. Enough consecutive
//! failures open it, short-circuiting further calls. After a recovery
//! timeout the breaker becomes half-open and admits trial calls; enough
//! consecutive successes close it again, while a single failure re-opens it.

use crate::prelude::*;

use crate::sync::Mutex;

/// The state of a [`CircuitBreaker`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum BreakerState {
  /// Calls pass through; failures are counted.
  #[display(fmt = "closed")]
  Closed,
  /// Calls are short-circuited without running.
  #[display(fmt = "open")]
  Open,
  /// Trial calls are admitted to probe recovery.
  #[display(fmt = "half-open")]
  HalfOpen,
}

/// A named circuit breaker.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct CircuitBreaker {
  inner: Arc<Inner>,
}

type StateChangeFn = Box<dyn Fn(BreakerState, BreakerState) + Send + Sync>;

struct Inner {
  failure_threshold: u32,
  name: String,
  on_state_change: Mutex<Option<StateChangeFn>>,
  open_timeout: Duration,
  state: Mutex<State>,
  success_threshold: u32,
}

struct State {
  current: BreakerState,
  failures: u32,
  opened_at: Option<Instant>,
  successes: u32,
}

impl CircuitBreaker {
  /// Creates a new, closed breaker.
  ///
  /// The breaker opens after `failure_threshold` consecutive failures,
  /// becomes half-open `open_timeout` after opening, and closes again after
  /// `success_threshold` consecutive half-open successes. Panics if either
  /// threshold is zero.
  pub fn new(
    name: impl Into<String>,
    failure_threshold: u32,
    success_threshold: u32,
    open_timeout: Duration,
  ) -> Self {
    assert!(failure_threshold > 0, "The failure threshold must be positive.");
    assert!(success_threshold > 0, "The success threshold must be positive.");

    Self {
      inner: Arc::new(Inner {
        failure_threshold,
        name: name.into(),
        on_state_change: Mutex::new(None),
        open_timeout,
        state: Mutex::new(State {
          current: BreakerState::Closed,
          failures: 0,
          opened_at: None,
          successes: 0,
        }),
        success_threshold,
      }),
    }
  }

  /// Guards a call with the breaker.
  ///
  /// While the breaker is open, the function is not run and an error is
  /// returned instead. Otherwise the function runs and its result is
  /// recorded as a success or failure.
  pub fn call<T>(&self, func: impl FnOnce() -> Result<T>) -> Result<T> {
    if self.state() == BreakerState::Open {
      fail!("Circuit breaker '{}' is open.", self.inner.name);
    }

    let result = func();

    let transition = {
      let mut state = self.inner.state.lock();

      match &result {
        Ok(_) => state.record_success(self.inner.success_threshold),
        Err(_) => state.record_failure(self.inner.failure_threshold),
      }
    };

    self.notify(transition);

    result
  }

  /// Returns the number of consecutive failures recorded while closed.
  pub fn failure_count(&self) -> u32 {
    self.inner.state.lock().failures
  }

  /// Returns the name of the breaker.
  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// Registers a function invoked with the previous and next state on every
  /// transition, replacing any previous one.
  pub fn on_state_change(&self, func: impl Fn(BreakerState, BreakerState) + Send + Sync + 'static) {
    *self.inner.on_state_change.lock() = Some(Box::new(func));
  }

  /// Returns the breaker to its initial closed state.
  pub fn reset(&self) {
    let transition = {
      let mut state = self.inner.state.lock();
      let previous = state.current;

      state.current = BreakerState::Closed;
      state.failures = 0;
      state.successes = 0;
      state.opened_at = None;

      match previous {
        BreakerState::Closed => None,
        previous => Some((previous, BreakerState::Closed)),
      }
    };

    self.notify(transition);
  }

  /// Returns the current state, first applying the recovery timeout if the
  /// breaker is open.
  pub fn state(&self) -> BreakerState {
    let (current, transition) = {
      let mut state = self.inner.state.lock();
      let transition = state.apply_recovery(self.inner.open_timeout);

      (state.current, transition)
    };

    self.notify(transition);

    current
  }

  /// Invokes the state-change function, outside of any lock, for an actual
  /// transition.
  fn notify(&self, transition: Option<(BreakerState, BreakerState)>) {
    if let Some((previous, next)) = transition {
      if let Some(func) = &*self.inner.on_state_change.lock() {
        func(previous, next);
      }
    }
  }
}

impl State {
  /// Moves an expired open breaker to half-open.
  fn apply_recovery(&mut self, open_timeout: Duration) -> Option<(BreakerState, BreakerState)> {
    if self.current != BreakerState::Open {
      return None;
    }

    let expired = match self.opened_at {
      Some(opened_at) => opened_at.elapsed() >= open_timeout,
      None => true,
    };

    if !expired {
      return None;
    }

    self.current = BreakerState::HalfOpen;
    self.successes = 0;

    Some((BreakerState::Open, BreakerState::HalfOpen))
  }

  fn record_failure(&mut self, failure_threshold: u32) -> Option<(BreakerState, BreakerState)> {
    match self.current {
      BreakerState::Closed => {
        self.failures += 1;

        if self.failures < failure_threshold {
          return None;
        }

        self.trip(BreakerState::Closed)
      }

      BreakerState::HalfOpen => self.trip(BreakerState::HalfOpen),

      // A late result from a call admitted before the breaker re-opened.
      BreakerState::Open => None,
    }
  }

  fn record_success(&mut self, success_threshold: u32) -> Option<(BreakerState, BreakerState)> {
    match self.current {
      BreakerState::Closed => {
        self.failures = 0;
        None
      }

      BreakerState::HalfOpen => {
        self.successes += 1;

        if self.successes < success_threshold {
          return None;
        }

        self.current = BreakerState::Closed;
        self.failures = 0;
        self.successes = 0;

        Some((BreakerState::HalfOpen, BreakerState::Closed))
      }

      BreakerState::Open => None,
    }
  }

  /// Opens the breaker from the given state.
  fn trip(&mut self, from: BreakerState) -> Option<(BreakerState, BreakerState)> {
    self.current = BreakerState::Open;
    self.failures = 0;
    self.successes = 0;
    self.opened_at = Some(Instant::now());

    Some((from, BreakerState::Open))
  }
}

// Unit tests.
