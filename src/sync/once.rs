// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One-time execution.

/// A primitive that runs a function at most once across all callers.
///
/// The first caller runs the function; every other caller returns without
/// running it, waiting first if the function is still in progress.
#[derive(Default)]
pub struct Once {
  inner: parking_lot::Once,
}

impl Once {
  /// Creates a new `Once`.
  pub fn new() -> Self {
    Self { inner: parking_lot::Once::new() }
  }

  /// Returns `true` if a function has already run to completion.
  pub fn is_done(&self) -> bool {
    self.inner.state().done()
  }

  /// Runs the given function if no function has run before.
  pub fn run(&self, func: impl FnOnce()) {
    self.inner.call_once(func);
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  /// Tests that the function runs exactly once across many threads.
  #[test]
  pub fn test_runs_once() {
    let once = Arc::new(Once::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..8)
      .map(|i| {
        let once = once.clone();
        let runs = runs.clone();

        crate::thread::Thread::spawn(format!("once-{}", i), move || {
          once.run(|| {
            runs.fetch_add(1, Ordering::SeqCst);
          });
        })
      })
      .collect();

    drop(threads);

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(once.is_done());
  }
}
