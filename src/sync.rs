// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synchronization primitives and concurrency utilities.
//!
//! Operations in this module may block the current thread.

pub mod channel;
mod latch;
mod lock;
mod once;
mod semaphore;
mod wait_group;

#[doc(inline)]
pub use {
  self::channel::Channel,
  self::latch::CountDownLatch,
  self::lock::{Mutex, MutexGuard, RwMutex, RwReadGuard, RwWriteGuard},
  self::once::Once,
  self::semaphore::Semaphore,
  self::wait_group::WaitGroup,
  parking_lot::Condvar,
};
