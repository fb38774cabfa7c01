// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A counter for waiting on a set of tasks to finish.

use super::{Condvar, Mutex};

use std::sync::Arc;

/// A counter that lets threads wait for a dynamic set of tasks to finish.
///
/// Call [`add()`] before starting each task, [`done()`] as each task
/// finishes, and [`wait()`] to block until all tasks have finished.
#[derive(Clone, Default)]
pub struct WaitGroup {
  inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
  count: Mutex<i64>,
  idle: Condvar,
}

impl WaitGroup {
  /// Creates a new wait group with a count of zero.
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a delta, which may be negative, to the count.
  ///
  /// Panics if the count becomes negative.
  pub fn add(&self, delta: i64) {
    let mut count = self.inner.count.lock();

    *count += delta;

    assert!(*count >= 0, "The wait group counter must not become negative.");

    if *count == 0 {
      self.inner.idle.notify_all();
    }
  }

  /// Returns the current count.
  pub fn count(&self) -> i64 {
    *self.inner.count.lock()
  }

  /// Decrements the count by one.
  pub fn done(&self) {
    self.add(-1);
  }

  /// Blocks until the count reaches zero.
  pub fn wait(&self) {
    let mut count = self.inner.count.lock();

    while *count > 0 {
      self.inner.idle.wait(&mut count);
    }
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;
  use crate::thread::{self, Thread};
  use crate::time::Duration;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Tests that `wait` blocks until every task is done.
  #[test]
  pub fn test_waits_for_tasks() {
    let group = WaitGroup::new();
    let finished = Arc::new(AtomicUsize::new(0));

    for i in 0..5 {
      group.add(1);

      let group = group.clone();
      let finished = finished.clone();

      Thread::spawn(format!("task-{}", i), move || {
        thread::sleep(Duration::from_millis(10));
        finished.fetch_add(1, Ordering::SeqCst);
        group.done();
      })
      .detach();
    }

    group.wait();

    assert_eq!(finished.load(Ordering::SeqCst), 5);
    assert_eq!(group.count(), 0);
  }

  /// Tests that a negative count panics.
  #[test]
  #[should_panic]
  pub fn test_negative_count_panics() {
    WaitGroup::new().done();
  }
}
