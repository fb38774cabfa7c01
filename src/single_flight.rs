// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Deduplication of concurrent calls by key.

use crate::prelude::*;

use crate::future::run_task;
use crate::sync::Mutex;
use std::any::{type_name, Any, TypeId};

/// A group of calls in which at most one call per key runs at a time.
///
/// The first caller for a key runs the work; callers that arrive while it is
/// in flight wait for it and share its result. Keys may produce values of
/// different types, but every caller for a live key must expect the type its
/// in-flight call produces.
///
/// Clones share the same group.
#[derive(Clone, Default)]
pub struct SingleFlight {
  inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
  flights: Mutex<HashMap<String, Flight>>,
  next_id: AtomicU64,
}

struct Flight {
  id: u64,
  type_id: TypeId,
  type_name: &'static str,
  future: Box<dyn Any + Send + Sync>,
}

impl SingleFlight {
  /// Creates a new group.
  pub fn new() -> Self {
    Self::default()
  }

  /// Runs the given function, or waits for the in-flight call with the same
  /// key and shares its result.
  ///
  /// The leading caller runs the function on its own thread; a panic in the
  /// function is delivered to every caller as a failure.
  pub fn call<T>(&self, key: &str, func: impl FnOnce() -> Result<T>) -> Result<T>
  where
    T: Clone + Send + 'static,
  {
    let (future, lead) = self.join_or_lead::<T>(key);

    match lead {
      None => future.wait(),

      Some(id) => {
        let outcome = run_task(func);

        future.complete(outcome.clone());
        self.finish(key, id);

        outcome.into_result()
      }
    }
  }

  /// Like [`call()`][Self::call], but runs the function on the shared thread
  /// pool and returns a future instead of blocking.
  pub fn call_future<T>(&self, key: &str, func: impl FnOnce() -> Result<T> + Send + 'static) -> Future<T>
  where
    T: Clone + Send + 'static,
  {
    let (future, lead) = self.join_or_lead::<T>(key);

    if let Some(id) = lead {
      let group = self.clone();
      let key = key.to_string();
      let cell = future.clone();

      ThreadPool::global().execute(move || {
        cell.complete(run_task(func));
        group.finish(&key, id);
      });
    }

    future
  }

  /// Removes every in-flight record.
  ///
  /// Running calls are unaffected and still deliver results to the callers
  /// already waiting on them.
  pub fn clear(&self) {
    self.inner.flights.lock().clear();
  }

  /// Discards the in-flight record for a key, so the next call for that key
  /// runs fresh work.
  ///
  /// The running call is not interrupted and still delivers its result to
  /// the callers already waiting on it. Returns `true` if a record was
  /// discarded.
  pub fn forget(&self, key: &str) -> bool {
    self.inner.flights.lock().remove(key).is_some()
  }

  /// Returns `true` if a call is in flight for the given key.
  pub fn has_in_flight(&self, key: &str) -> bool {
    self.inner.flights.lock().contains_key(key)
  }

  /// Returns the number of keys with calls in flight.
  pub fn in_flight_count(&self) -> usize {
    self.inner.flights.lock().len()
  }

  /// Joins the in-flight call for a key, or records a new one led by this
  /// caller.
  ///
  /// Panics if the in-flight call for the key produces a different type.
  fn join_or_lead<T>(&self, key: &str) -> (Future<T>, Option<u64>)
  where
    T: Clone + Send + 'static,
  {
    let mut flights = self.inner.flights.lock();

    if let Some(flight) = flights.get(key) {
      assert!(
        flight.type_id == TypeId::of::<T>(),
        "The in-flight call for key {:?} produces `{}`, but this caller expects `{}`.",
        key,
        flight.type_name,
        type_name::<T>(),
      );

      let future = flight
        .future
        .downcast_ref::<Future<T>>()
        .expect("Flight type was checked against its TypeId")
        .clone();

      return (future, None);
    }

    let future = Future::pending();
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

    flights.insert(
      key.to_string(),
      Flight {
        id,
        type_id: TypeId::of::<T>(),
        type_name: type_name::<T>(),
        future: Box::new(future.clone()),
      },
    );

    (future, Some(id))
  }

  /// Removes the record of a finished call, unless it was already forgotten
  /// or replaced.
  fn finish(&self, key: &str, id: u64) {
    let mut flights = self.inner.flights.lock();

    if flights.get(key).map(|flight| flight.id) == Some(id) {
      flights.remove(key);
    }
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::sync::Barrier;

  /// Tests that concurrent callers share one execution and its result.
  #[test]
  pub fn test_dedup() {
    let group = SingleFlight::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(100));

    let callers: Vec<_> = (0..100)
      .map(|i| {
        let group = group.clone();
        let runs = runs.clone();
        let barrier = barrier.clone();

        Thread::spawn(format!("caller-{}", i), move || {
          barrier.wait();

          group.call("key", || {
            runs.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(200));
            Ok(7)
          })
        })
      })
      .collect();

    for caller in callers {
      assert_eq!(caller.join().unwrap().unwrap(), 7);
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(group.in_flight_count(), 0);
  }

  /// Tests that distinct keys run independently.
  #[test]
  pub fn test_distinct_keys() {
    let group = SingleFlight::new();

    assert_eq!(group.call("a", || Ok(1)).unwrap(), 1);
    assert_eq!(group.call("b", || Ok(2)).unwrap(), 2);
    assert!(!group.has_in_flight("a"));
  }

  /// Tests that a forgotten key runs fresh work while the old call still
  /// delivers to its waiters.
  #[test]
  pub fn test_forget() {
    let group = SingleFlight::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let slow = {
      let group = group.clone();
      let runs = runs.clone();

      Thread::spawn("slow-caller", move || {
        group.call("key", || {
          runs.fetch_add(1, Ordering::SeqCst);
          thread::sleep(Duration::from_millis(50));
          Ok("old")
        })
      })
    };

    // Wait for the slow call to be in flight, then forget it.

    while !group.has_in_flight("key") {
      thread::sleep(Duration::from_millis(1));
    }

    assert!(group.forget("key"));

    let fresh = group.call("key", || {
      runs.fetch_add(1, Ordering::SeqCst);
      Ok("new")
    });

    assert_eq!(fresh.unwrap(), "new");
    assert_eq!(slow.join().unwrap().unwrap(), "old");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
  }

  /// Tests that failures are shared with every caller.
  #[test]
  pub fn test_shared_failure() {
    let group = SingleFlight::new();

    let result = group.call("key", || -> Result<usize> { fail!("backend down") });

    assert_eq!(result.unwrap_err().message(), "backend down");
    assert_eq!(group.in_flight_count(), 0);
  }

  /// Tests that the asynchronous variant coalesces with blocking callers.
  #[test]
  pub fn test_call_future() {
    let group = SingleFlight::new();

    let future = group.call_future("key", || {
      thread::sleep(Duration::from_millis(20));
      Ok(11)
    });

    assert_eq!(future.wait().unwrap(), 11);

    // The record is removed just after the future completes.

    for _ in 0..100 {
      if group.in_flight_count() == 0 {
        break;
      }

      thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(group.in_flight_count(), 0);
  }

  /// Tests that a caller expecting the wrong type panics.
  #[test]
  #[should_panic]
  pub fn test_type_mismatch_panics() {
    let group = SingleFlight::new();

    let _slow = {
      let group = group.clone();

      Thread::spawn("string-caller", move || {
        group.call("key", || {
          thread::sleep(Duration::from_millis(50));
          Ok("text".to_string())
        })
      })
    };

    while !group.has_in_flight("key") {
      thread::sleep(Duration::from_millis(1));
    }

    let _: Result<usize> = group.call("key", || Ok(1));
  }
}
