// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A counting semaphore.

use super::{Condvar, Mutex};

use std::sync::Arc;

/// A counting semaphore holding a number of permits.
///
/// Clones share the same permits, so a semaphore can be handed to any number
/// of threads.
#[derive(Clone)]
pub struct Semaphore {
  inner: Arc<Inner>,
}

struct Inner {
  permits: Mutex<usize>,
  available: Condvar,
}

impl Semaphore {
  /// Creates a new semaphore with the given number of permits.
  pub fn new(permits: usize) -> Self {
    Self { inner: Arc::new(Inner { permits: Mutex::new(permits), available: Condvar::new() }) }
  }

  /// Blocks until a permit is available, then takes it.
  pub fn acquire(&self) {
    let mut permits = self.inner.permits.lock();

    while *permits == 0 {
      self.inner.available.wait(&mut permits);
    }

    *permits -= 1;
  }

  /// Returns the number of permits currently available.
  pub fn available_permits(&self) -> usize {
    *self.inner.permits.lock()
  }

  /// Returns a permit to the semaphore.
  pub fn release(&self) {
    *self.inner.permits.lock() += 1;
    self.inner.available.notify_one();
  }

  /// Takes a permit if one is immediately available.
  pub fn try_acquire(&self) -> bool {
    let mut permits = self.inner.permits.lock();

    if *permits == 0 {
      return false;
    }

    *permits -= 1;
    true
  }
}

// Unit tests.
