// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Time utilities.

use once_cell::sync::Lazy;

#[doc(inline)]
pub use std::time::{Duration, Instant};

/// The monotonic epoch of the process, captured on first use of this module.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A stopwatch for measuring elapsed time, possibly across multiple runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stopwatch {
  accumulated: Duration,
  started_at: Option<Instant>,
}

/// Returns the current monotonic time.
pub fn now() -> Instant {
  Instant::now()
}

/// Returns the number of microseconds elapsed since the monotonic epoch.
pub fn now_micros() -> u64 {
  EPOCH.elapsed().as_micros() as u64
}

impl Stopwatch {
  /// Creates a new, stopped stopwatch with no elapsed time.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a new, running stopwatch.
  pub fn started() -> Self {
    Self { accumulated: Duration::from_secs(0), started_at: Some(Instant::now()) }
  }

  /// Returns the total time the stopwatch has been running.
  pub fn elapsed(&self) -> Duration {
    match self.started_at {
      Some(started_at) => self.accumulated + started_at.elapsed(),
      None => self.accumulated,
    }
  }

  /// Returns `true` if the stopwatch is running.
  pub fn is_running(&self) -> bool {
    self.started_at.is_some()
  }

  /// Clears the elapsed time and stops the stopwatch.
  pub fn reset(&mut self) {
    *self = Self::new();
  }

  /// Clears the elapsed time and restarts the stopwatch.
  pub fn restart(&mut self) {
    *self = Self::started();
  }

  /// Starts the stopwatch if it is not already running.
  pub fn start(&mut self) {
    if self.started_at.is_none() {
      self.started_at = Some(Instant::now());
    }
  }

  /// Stops the stopwatch, retaining the elapsed time.
  pub fn stop(&mut self) {
    if let Some(started_at) = self.started_at.take() {
      self.accumulated += started_at.elapsed();
    }
  }
}

// Unit tests.
