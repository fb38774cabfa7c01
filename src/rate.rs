// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A token-bucket rate limiter.

use crate::prelude::*;

use crate::sync::Mutex;

/// A token-bucket rate limiter.
///
/// The bucket holds at most `burst` tokens and refills continuously at
/// `permits_per_second`. Acquiring `n` permits consumes `n` tokens.
///
/// Clones share the same bucket.
#[derive(Clone)]
pub struct RateLimiter {
  inner: Arc<Mutex<Bucket>>,
}

struct Bucket {
  rate: f64,
  burst: f64,
  tokens: f64,
  refilled_at: Instant,
}

impl RateLimiter {
  /// Creates a new limiter with a burst equal to its rate.
  ///
  /// Panics if `permits_per_second` is not positive.
  pub fn new(permits_per_second: f64) -> Self {
    Self::with_burst(permits_per_second, permits_per_second)
  }

  /// Creates a new limiter with the given rate and burst.
  ///
  /// The bucket starts full. Panics if either argument is not positive.
  pub fn with_burst(permits_per_second: f64, burst: f64) -> Self {
    assert!(permits_per_second > 0.0, "The rate must be positive.");
    assert!(burst > 0.0, "The burst must be positive.");

    Self {
      inner: Arc::new(Mutex::new(Bucket {
        rate: permits_per_second,
        burst,
        tokens: burst,
        refilled_at: Instant::now(),
      })),
    }
  }

  /// Takes one permit if available, without blocking.
  pub fn allow(&self) -> bool {
    self.allow_n(1)
  }

  /// Takes `permits` permits if all of them are available, without blocking.
  pub fn allow_n(&self, permits: u32) -> bool {
    let mut bucket = self.inner.lock();

    bucket.refill();

    if bucket.tokens < f64::from(permits) {
      return false;
    }

    bucket.tokens -= f64::from(permits);
    true
  }

  /// Returns the number of whole tokens currently available.
  pub fn available_tokens(&self) -> u64 {
    let mut bucket = self.inner.lock();

    bucket.refill();
    bucket.tokens.floor() as u64
  }

  /// Returns the estimated time until one permit becomes available, without
  /// consuming anything.
  pub fn reserve(&self) -> Duration {
    let mut bucket = self.inner.lock();

    bucket.refill();

    match bucket.tokens >= 1.0 {
      true => Duration::from_millis(0),
      false => millis_until(1.0 - bucket.tokens, bucket.rate),
    }
  }

  /// Refills the bucket completely.
  pub fn reset(&self) {
    let mut bucket = self.inner.lock();

    bucket.tokens = bucket.burst;
    bucket.refilled_at = Instant::now();
  }

  /// Changes the rate, with the burst becoming equal to the new rate.
  ///
  /// Accumulated tokens are preserved up to the new burst. Panics if
  /// `permits_per_second` is not positive.
  pub fn set_rate(&self, permits_per_second: f64) {
    assert!(permits_per_second > 0.0, "The rate must be positive.");

    let mut bucket = self.inner.lock();

    bucket.refill();
    bucket.rate = permits_per_second;
    bucket.burst = permits_per_second;
    bucket.tokens = bucket.tokens.min(bucket.burst);
  }

  /// Blocks until one permit is available and takes it.
  pub fn wait(&self) {
    self.wait_n(1)
  }

  /// Blocks until `permits` permits are available and takes all of them.
  ///
  /// Panics if `permits` exceeds the burst, which could never be satisfied.
  pub fn wait_n(&self, permits: u32) {
    loop {
      let delay = {
        let mut bucket = self.inner.lock();

        assert!(
          f64::from(permits) <= bucket.burst,
          "Cannot wait for more permits than the burst size.",
        );

        bucket.refill();

        if bucket.tokens >= f64::from(permits) {
          bucket.tokens -= f64::from(permits);
          return;
        }

        millis_until(f64::from(permits) - bucket.tokens, bucket.rate)
      };

      thread::sleep(delay);
    }
  }
}

impl Bucket {
  /// Adds the tokens accrued since the last refill, up to the burst.
  fn refill(&mut self) {
    let now = Instant::now();
    let elapsed = now.duration_since(self.refilled_at).as_secs_f64();

    self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
    self.refilled_at = now;
  }
}

/// Returns the time to accrue `missing` tokens at `rate`, with a minimum of
/// one millisecond.
fn millis_until(missing: f64, rate: f64) -> Duration {
  Duration::from_millis(((missing * 1000.0 / rate).ceil() as u64).max(1))
}

// Unit tests.
