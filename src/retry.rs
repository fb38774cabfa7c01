// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Retry policies with configurable backoff.

use crate::prelude::*;

/// The strategy for computing the delay before each retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
  /// The same delay before every retry.
  Fixed,
  /// A delay that doubles after each attempt, up to a maximum.
  Exponential,
}

/// A policy that retries a fallible operation with a delay between attempts.
pub struct Retry {
  backoff: Backoff,
  initial_delay: Duration,
  jitter: bool,
  max_attempts: u32,
  max_delay: Duration,
  on_retry: Option<Box<dyn Fn(u32, &Error, Duration) + Send + Sync>>,
  retry_on: Option<Box<dyn Fn(&Error) -> bool + Send + Sync>>,
}

impl Retry {
  /// Creates a new policy with the given number of attempts, a fixed delay
  /// of 100 milliseconds, and no jitter.
  ///
  /// Panics if `max_attempts` is zero.
  pub fn new(max_attempts: u32) -> Self {
    assert!(max_attempts >= 1, "A retry policy must allow at least one attempt.");

    Self {
      backoff: Backoff::Fixed,
      initial_delay: Duration::from_millis(100),
      jitter: false,
      max_attempts,
      max_delay: Duration::from_secs(30),
      on_retry: None,
      retry_on: None,
    }
  }

  /// Uses an exponential backoff starting from the given delay.
  pub fn exponential(mut self, initial_delay: Duration) -> Self {
    self.backoff = Backoff::Exponential;
    self.initial_delay = initial_delay;
    self
  }

  /// Uses the same given delay before every retry.
  pub fn fixed(mut self, delay: Duration) -> Self {
    self.backoff = Backoff::Fixed;
    self.initial_delay = delay;
    self
  }

  /// Enables or disables jitter.
  ///
  /// With jitter, each delay is replaced by a uniformly random duration
  /// between zero and the computed delay.
  pub fn jitter(mut self, jitter: bool) -> Self {
    self.jitter = jitter;
    self
  }

  /// Caps the delay computed by an exponential backoff.
  pub fn max_delay(mut self, max_delay: Duration) -> Self {
    self.max_delay = max_delay;
    self
  }

  /// Registers an observer invoked before each retry with the attempt
  /// number, the error, and the upcoming delay.
  pub fn on_retry(mut self, observer: impl Fn(u32, &Error, Duration) + Send + Sync + 'static) -> Self {
    self.on_retry = Some(Box::new(observer));
    self
  }

  /// Registers a predicate that decides whether an error is worth retrying.
  ///
  /// Without a predicate, every error is retried.
  pub fn retry_on(mut self, predicate: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
    self.retry_on = Some(Box::new(predicate));
    self
  }

  /// Runs a fallible operation until it succeeds, the attempts are
  /// exhausted, or an error fails the retry predicate.
  pub fn run<T>(&self, mut func: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;

    loop {
      let err = match func() {
        Ok(value) => return Ok(value),
        Err(err) => err,
      };

      if attempt == self.max_attempts || !self.should_retry(&err) {
        return Err(err);
      }

      let delay = self.delay_for(attempt);

      if let Some(observer) = &self.on_retry {
        observer(attempt, &err, delay);
      }

      thread::sleep(delay);
      attempt += 1;
    }
  }

  /// Runs an operation that reports failure by returning `false`.
  pub fn run_bool(&self, mut func: impl FnMut() -> bool) -> bool {
    self.run(|| match func() {
      true => Ok(()),
      false => Err(err!("attempt failed")),
    })
    .is_ok()
  }

  /// Runs an operation that reports failure by returning `None`.
  pub fn run_option<T>(&self, mut func: impl FnMut() -> Option<T>) -> Option<T> {
    self.run(|| func().ok_or_else(|| err!("no result"))).ok()
  }

  /// Computes the delay before the retry following the given attempt.
  fn delay_for(&self, attempt: u32) -> Duration {
    let delay = match self.backoff {
      Backoff::Fixed => self.initial_delay,

      Backoff::Exponential => {
        let millis = self.initial_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);

        Duration::from_millis(millis.saturating_mul(factor)).min(self.max_delay)
      }
    };

    match self.jitter {
      true => Duration::from_millis(random::range(0, delay.as_millis() as u64 + 1)),
      false => delay,
    }
  }

  fn should_retry(&self, err: &Error) -> bool {
    match &self.retry_on {
      Some(predicate) => predicate(err),
      None => true,
    }
  }
}

/// Returns a retry predicate that matches errors mentioning one of the given
/// HTTP status codes.
///
/// The predicate scans the error message for its first standalone three-digit
/// number between 100 and 599 and retries when that status is in `codes`.
pub fn http_status_retry(codes: impl IntoIterator<Item = u16>) -> impl Fn(&Error) -> bool + Send + Sync {
  let codes: HashSet<u16> = codes.into_iter().collect();

  move |err| match find_status(err.message()) {
    Some(status) => codes.contains(&status),
    None => false,
  }
}

/// Finds the first standalone three-digit number between 100 and 599.
fn find_status(message: &str) -> Option<u16> {
  let bytes = message.as_bytes();
  let mut index = 0;

  while index < bytes.len() {
    if !bytes[index].is_ascii_digit() {
      index += 1;
      continue;
    }

    let start = index;

    while index < bytes.len() && bytes[index].is_ascii_digit() {
      index += 1;
    }

    if index - start == 3 {
      let status: u16 = message[start..index].parse().ok()?;

      if (100..=599).contains(&status) {
        return Some(status);
      }
    }
  }

  None
}

// Unit tests.
