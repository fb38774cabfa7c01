// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Thread utilities.

use crate::prelude::*;

use std::thread::{Builder, JoinHandle};

/// A handle to a spawned thread.
///
/// When this handle is dropped, the thread is joined. Use [`detach()`] to
/// prevent this.
#[must_use = "Threads get joined when dropped. Use `.detach()` to run them in the background."]
pub struct Thread<T> {
  detached: bool,
  handle: Option<JoinHandle<T>>,
}

/// Sleeps the current thread for a given duration.
pub fn sleep(duration: Duration) {
  std::thread::sleep(duration);
}

/// Sleeps the current thread for a given number of milliseconds.
pub fn sleep_ms(millis: u64) {
  sleep(Duration::from_millis(millis));
}

impl<T: Send + 'static> Thread<T> {
  /// Spawns a new thread with the given name.
  pub fn spawn(name: impl Into<String>, func: impl FnOnce() -> T + Send + 'static) -> Self {
    let name = name.into();
    let handle = Builder::new().name(name).spawn(func).expect("Failed to spawn thread");

    Self { detached: false, handle: Some(handle) }
  }
}

impl<T> Thread<T> {
  /// Blocks the current thread until this thread completes and returns its
  /// output.
  ///
  /// If the thread panicked, this function returns an error instead.
  pub fn join(mut self) -> Result<T> {
    let handle = match self.handle.take() {
      Some(handle) => handle,
      None => fail!("Thread already joined."),
    };

    let name = handle.thread().name().unwrap_or("unnamed").to_string();

    handle.join().map_err(|_| err!("Thread '{}' panicked.", name))
  }

  /// Detaches this handle so that the thread will continue running when it is
  /// dropped.
  pub fn detach(&mut self) {
    self.detached = true;
  }
}

// Implement `Drop` to join threads that are not detached.

impl<T> Drop for Thread<T> {
  fn drop(&mut self) {
    if self.detached {
      return;
    }

    if let Some(handle) = self.handle.take() {
      if handle.join().is_err() {
        warn!("A joined thread panicked.");
      }
    }
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;

  /// Tests that threads can be spawned and joined for their output.
  #[test]
  pub fn test_spawn_join() {
    let thread = Thread::spawn("adder", || 2 + 2);

    assert_eq!(thread.join().unwrap(), 4);
  }

  /// Tests that joining a panicked thread returns an error.
  #[test]
  pub fn test_join_panicked() {
    let thread = Thread::spawn("doomed", || panic!("boom"));

    let err = thread.join().unwrap_err();

    assert!(err.message().contains("doomed"));
  }
}
