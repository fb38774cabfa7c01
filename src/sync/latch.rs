// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A one-shot countdown latch.

use super::{Condvar, Mutex};

use crate::time::{Duration, Instant};
use std::sync::Arc;

/// A latch that releases waiting threads when its count reaches zero.
///
/// The count only moves toward zero; once released, the latch stays released.
#[derive(Clone)]
pub struct CountDownLatch {
  inner: Arc<Inner>,
}

struct Inner {
  count: Mutex<usize>,
  zero: Condvar,
}

impl CountDownLatch {
  /// Creates a new latch with the given count.
  pub fn new(count: usize) -> Self {
    Self { inner: Arc::new(Inner { count: Mutex::new(count), zero: Condvar::new() }) }
  }

  /// Returns the current count.
  pub fn count(&self) -> usize {
    *self.inner.count.lock()
  }

  /// Decrements the count, releasing all waiting threads when it reaches
  /// zero.
  ///
  /// Calls beyond zero have no effect.
  pub fn count_down(&self) {
    let mut count = self.inner.count.lock();

    if *count == 0 {
      return;
    }

    *count -= 1;

    if *count == 0 {
      self.inner.zero.notify_all();
    }
  }

  /// Blocks until the count reaches zero.
  pub fn wait(&self) {
    let mut count = self.inner.count.lock();

    while *count > 0 {
      self.inner.zero.wait(&mut count);
    }
  }

  /// Blocks until the count reaches zero or the timeout elapses, returning
  /// `true` if the count reached zero.
  pub fn wait_timeout(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut count = self.inner.count.lock();

    while *count > 0 {
      if self.inner.zero.wait_until(&mut count, deadline).timed_out() {
        return *count == 0;
      }
    }

    true
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;
  use crate::thread::Thread;

  /// Tests that exactly `count` decrements release waiters immediately.
  #[test]
  pub fn test_release_after_count() {
    let latch = CountDownLatch::new(3);

    latch.count_down();
    latch.count_down();

    assert!(!latch.wait_timeout(Duration::from_millis(10)));
    assert_eq!(latch.count(), 1);

    latch.count_down();
    latch.wait();

    assert_eq!(latch.count(), 0);
  }

  /// Tests that decrements beyond zero have no effect.
  #[test]
  pub fn test_count_floor() {
    let latch = CountDownLatch::new(1);

    latch.count_down();
    latch.count_down();

    assert_eq!(latch.count(), 0);
  }

  /// Tests that waiters across threads are released together.
  #[test]
  pub fn test_releases_all_waiters() {
    let latch = CountDownLatch::new(1);

    let waiters: Vec<_> = (0..4)
      .map(|i| {
        let latch = latch.clone();

        Thread::spawn(format!("waiter-{}", i), move || latch.wait_timeout(Duration::from_secs(5)))
      })
      .collect();

    latch.count_down();

    for waiter in waiters {
      assert!(waiter.join().unwrap());
    }
  }
}
