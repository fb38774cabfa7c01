// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mutual exclusion locks with scoped helpers.

pub use parking_lot::MutexGuard;
pub use parking_lot::RwLockReadGuard as RwReadGuard;
pub use parking_lot::RwLockWriteGuard as RwWriteGuard;

/// A mutual exclusion lock around a value of type `T`.
///
/// The lock is released when the returned guard is dropped, so a guard covers
/// every exit path of its scope, including panics. Use [`with_lock()`] to make
/// the scope explicit.
#[derive(Default)]
pub struct Mutex<T> {
  inner: parking_lot::Mutex<T>,
}

/// A reader-writer lock around a value of type `T`.
///
/// Any number of readers may hold the lock concurrently; a writer is
/// exclusive.
#[derive(Default)]
pub struct RwMutex<T> {
  inner: parking_lot::RwLock<T>,
}

impl<T> Mutex<T> {
  /// Creates a new lock around the given value.
  pub fn new(value: T) -> Self {
    Self { inner: parking_lot::Mutex::new(value) }
  }

  /// Returns a mutable reference to the value without locking.
  pub fn get_mut(&mut self) -> &mut T {
    self.inner.get_mut()
  }

  /// Consumes the lock and returns the value.
  pub fn into_inner(self) -> T {
    self.inner.into_inner()
  }

  /// Blocks until the lock is acquired, then returns a guard that releases it
  /// when dropped.
  pub fn lock(&self) -> MutexGuard<T> {
    self.inner.lock()
  }

  /// Attempts to acquire the lock without blocking.
  pub fn try_lock(&self) -> Option<MutexGuard<T>> {
    self.inner.try_lock()
  }

  /// Runs a function with mutable access to the value, holding the lock for
  /// the duration of the call.
  pub fn with_lock<R>(&self, func: impl FnOnce(&mut T) -> R) -> R {
    func(&mut self.inner.lock())
  }
}

impl<T> RwMutex<T> {
  /// Creates a new lock around the given value.
  pub fn new(value: T) -> Self {
    Self { inner: parking_lot::RwLock::new(value) }
  }

  /// Returns a mutable reference to the value without locking.
  pub fn get_mut(&mut self) -> &mut T {
    self.inner.get_mut()
  }

  /// Consumes the lock and returns the value.
  pub fn into_inner(self) -> T {
    self.inner.into_inner()
  }

  /// Blocks until shared read access is acquired.
  pub fn read(&self) -> RwReadGuard<T> {
    self.inner.read()
  }

  /// Attempts to acquire shared read access without blocking.
  pub fn try_read(&self) -> Option<RwReadGuard<T>> {
    self.inner.try_read()
  }

  /// Attempts to acquire exclusive write access without blocking.
  pub fn try_write(&self) -> Option<RwWriteGuard<T>> {
    self.inner.try_write()
  }

  /// Runs a function with shared access to the value.
  pub fn with_read<R>(&self, func: impl FnOnce(&T) -> R) -> R {
    func(&self.inner.read())
  }

  /// Runs a function with exclusive access to the value.
  pub fn with_write<R>(&self, func: impl FnOnce(&mut T) -> R) -> R {
    func(&mut self.inner.write())
  }

  /// Blocks until exclusive write access is acquired.
  pub fn write(&self) -> RwWriteGuard<T> {
    self.inner.write()
  }
}

// Implement conversion from the locked type.

impl<T> From<T> for Mutex<T> {
  fn from(value: T) -> Self {
    Self::new(value)
  }
}

impl<T> From<T> for RwMutex<T> {
  fn from(value: T) -> Self {
    Self::new(value)
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;

  /// Tests that `with_lock` releases the lock when the function returns.
  #[test]
  pub fn test_with_lock() {
    let lock = Mutex::new(1);

    let doubled = lock.with_lock(|value| {
      *value *= 2;
      *value
    });

    assert_eq!(doubled, 2);
    assert!(lock.try_lock().is_some());
  }

  /// Tests that multiple readers may hold an `RwMutex` concurrently.
  #[test]
  pub fn test_concurrent_readers() {
    let lock = RwMutex::new(3);

    let a = lock.read();
    let b = lock.read();

    assert_eq!(*a + *b, 6);
    assert!(lock.try_write().is_none());

    drop((a, b));

    assert!(lock.try_write().is_some());
  }
}
