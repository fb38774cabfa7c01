// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Eventual values computed on background threads.
//!
//! A [`Future`] is a one-shot cell that is completed exactly once with a
//! success value, a failure, or a cancellation. Any number of threads may
//! wait on the same future; composers such as [`map()`][Future::map] build
//! new futures that resolve on the shared thread pool without blocking the
//! caller.

use crate::prelude::*;

use crate::sync::{Condvar, Mutex};
use std::panic::AssertUnwindSafe;

/// An eventual value of type `T`.
///
/// Clones share the same underlying cell.
pub struct Future<T> {
  inner: Arc<Inner<T>>,
}

/// The terminal result of a [`Future`].
#[derive(Clone, Debug)]
pub enum Outcome<T> {
  Success(T),
  Failure(Error),
  Cancelled,
}

struct Inner<T> {
  state: Mutex<State<T>>,
  done: Condvar,
}

enum State<T> {
  Pending(Vec<Observer<T>>),
  Done(Outcome<T>),
}

type Observer<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

impl<T> Future<T> {
  /// Creates a future that is already completed with the given value.
  pub fn completed(value: T) -> Self {
    Self::with_state(State::Done(Outcome::Success(value)))
  }

  /// Creates a future that has already failed with the given error.
  pub fn failed(error: impl Into<Error>) -> Self {
    Self::with_state(State::Done(Outcome::Failure(error.into())))
  }

  /// Creates a new pending future.
  pub(crate) fn pending() -> Self {
    Self::with_state(State::Pending(Vec::new()))
  }

  /// Returns the failure or cancellation error, if any.
  pub fn error(&self) -> Option<Error> {
    match &*self.inner.state.lock() {
      State::Done(outcome) => outcome.error(),
      State::Pending(_) => None,
    }
  }

  /// Returns `true` if the future was cancelled.
  pub fn is_cancelled(&self) -> bool {
    match &*self.inner.state.lock() {
      State::Done(Outcome::Cancelled) => true,
      _ => false,
    }
  }

  /// Returns `true` if the future has completed.
  pub fn is_done(&self) -> bool {
    match &*self.inner.state.lock() {
      State::Done(_) => true,
      State::Pending(_) => false,
    }
  }

  /// Returns `true` if the future failed.
  pub fn is_failed(&self) -> bool {
    match &*self.inner.state.lock() {
      State::Done(Outcome::Failure(_)) => true,
      _ => false,
    }
  }

  /// Returns `true` if the future completed successfully.
  pub fn is_success(&self) -> bool {
    match &*self.inner.state.lock() {
      State::Done(Outcome::Success(_)) => true,
      _ => false,
    }
  }

  fn with_state(state: State<T>) -> Self {
    Self { inner: Arc::new(Inner { state: Mutex::new(state), done: Condvar::new() }) }
  }
}

impl<T: Clone> Future<T> {
  /// Attempts to cancel the future.
  ///
  /// Returns `true` if the future was pending and is now cancelled.
  /// Cancellation is cooperative: a task that is already running is not
  /// interrupted, but its eventual result is discarded.
  pub fn cancel(&self) -> bool {
    self.complete(Outcome::Cancelled)
  }

  /// Returns the outcome of the future if it has completed.
  pub fn outcome(&self) -> Option<Outcome<T>> {
    match &*self.inner.state.lock() {
      State::Done(outcome) => Some(outcome.clone()),
      State::Pending(_) => None,
    }
  }

  /// Blocks until the future completes and returns its success value, or an
  /// error describing the failure or cancellation.
  pub fn wait(&self) -> Result<T> {
    let mut state = self.inner.state.lock();

    loop {
      if let State::Done(outcome) = &*state {
        return outcome.clone().into_result();
      }

      self.inner.done.wait(&mut state);
    }
  }

  /// Blocks up to the given duration for the future to complete.
  ///
  /// Returns a `"timeout"` error if the future is still pending when the
  /// duration elapses. The underlying task is unaffected.
  pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
    let deadline = Instant::now() + timeout;
    let mut state = self.inner.state.lock();

    loop {
      if let State::Done(outcome) = &*state {
        return outcome.clone().into_result();
      }

      if self.inner.done.wait_until(&mut state, deadline).timed_out() {
        if let State::Done(outcome) = &*state {
          return outcome.clone().into_result();
        }

        fail!("timeout");
      }
    }
  }

  /// Blocks until the future completes and returns its success value, or the
  /// given fallback if it did not succeed.
  pub fn or_else(&self, fallback: T) -> T {
    self.wait().unwrap_or(fallback)
  }

  /// Completes the future with the given outcome.
  ///
  /// Returns `false` if the future already completed. Observers run after
  /// the new state is visible, outside the cell's lock.
  pub(crate) fn complete(&self, outcome: Outcome<T>) -> bool {
    let observers = {
      let mut state = self.inner.state.lock();

      match &mut *state {
        State::Done(_) => return false,

        State::Pending(observers) => {
          let observers = mem::take(observers);

          *state = State::Done(outcome.clone());
          self.inner.done.notify_all();

          observers
        }
      }
    };

    for observer in observers {
      observer(outcome.clone());
    }

    true
  }

  /// Registers a function to run with the outcome when the future completes,
  /// or immediately if it already has.
  fn subscribe(&self, observer: Observer<T>) {
    let ready = {
      let mut state = self.inner.state.lock();

      match &mut *state {
        State::Pending(observers) => {
          observers.push(observer);
          None
        }

        State::Done(outcome) => Some((observer, outcome.clone())),
      }
    };

    if let Some((observer, outcome)) = ready {
      observer(outcome);
    }
  }
}

impl<T: Clone + Send + 'static> Future<T> {
  /// Starts a task on the shared thread pool and returns a future for its
  /// result.
  pub fn run(task: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
    ThreadPool::global().submit(task)
  }

  /// Starts a task on the shared thread pool after a delay.
  ///
  /// Cancelling the returned future before the delay elapses prevents the
  /// task from starting.
  pub fn delayed(delay: Duration, task: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
    let future = Self::pending();

    {
      let cell = future.clone();

      Thread::spawn("future-delay", move || {
        thread::sleep(delay);

        if cell.is_cancelled() {
          return;
        }

        ThreadPool::global().execute(move || {
          if !cell.is_cancelled() {
            cell.complete(run_task(task));
          }
        });
      })
      .detach();
    }

    future
  }

  /// Completes successfully with the values of every given future, in input
  /// order, or with the first failure or cancellation among them.
  pub fn all(futures: Vec<Future<T>>) -> Future<Vec<T>> {
    if futures.is_empty() {
      return Future::completed(Vec::new());
    }

    let combined = Future::pending();
    let gathered = Arc::new(Mutex::new((vec![None; futures.len()], futures.len())));

    for (index, source) in futures.iter().enumerate() {
      let cell = combined.clone();
      let gathered = gathered.clone();

      source.subscribe(Box::new(move |outcome| match outcome {
        Outcome::Success(value) => {
          let values = {
            let mut gathered = gathered.lock();

            gathered.0[index] = Some(value);
            gathered.1 -= 1;

            match gathered.1 {
              0 => Some(mem::take(&mut gathered.0)),
              _ => None,
            }
          };

          if let Some(values) = values {
            cell.complete(Outcome::Success(values.into_iter().flatten().collect()));
          }
        }

        Outcome::Failure(err) => {
          cell.complete(Outcome::Failure(err));
        }

        Outcome::Cancelled => {
          cell.complete(Outcome::Cancelled);
        }
      }));
    }

    combined
  }

  /// Completes with the outcome of the first of the given futures to
  /// complete, whether it succeeded, failed, or was cancelled.
  pub fn any(futures: Vec<Future<T>>) -> Future<T> {
    if futures.is_empty() {
      return Future::failed("futures must not be empty");
    }

    let winner = Future::pending();

    for source in &futures {
      let cell = winner.clone();

      source.subscribe(Box::new(move |outcome| {
        cell.complete(outcome);
      }));
    }

    winner
  }

  /// Waits for every given future to complete, then completes successfully
  /// with the same futures for inspection.
  pub fn all_settled(futures: Vec<Future<T>>) -> Future<Vec<Future<T>>> {
    if futures.is_empty() {
      return Future::completed(Vec::new());
    }

    let settled = Future::pending();
    let shared = Arc::new((Mutex::new(futures.len()), futures));

    for index in 0..shared.1.len() {
      let cell = settled.clone();
      let shared = shared.clone();
      let future = shared.1[index].clone();

      future.subscribe(Box::new(move |_| {
        let finished = {
          let mut remaining = shared.0.lock();

          *remaining -= 1;
          *remaining == 0
        };

        if finished {
          cell.complete(Outcome::Success(shared.1.clone()));
        }
      }));
    }

    settled
  }

  /// Completes with the outcome of the first of the given futures to
  /// complete.
  ///
  /// This function is an alias of [`any()`][Self::any].
  pub fn race(futures: Vec<Future<T>>) -> Future<T> {
    Self::any(futures)
  }

  /// Returns a future that completes by applying a function to this future's
  /// success value.
  ///
  /// Failure and cancellation propagate unchanged. The function runs on the
  /// shared thread pool.
  pub fn map<U>(&self, func: impl FnOnce(T) -> U + Send + 'static) -> Future<U>
  where
    U: Clone + Send + 'static,
  {
    let mapped = Future::pending();

    {
      let cell = mapped.clone();

      self.subscribe(Box::new(move |outcome| match outcome {
        Outcome::Success(value) => ThreadPool::global().execute(move || {
          cell.complete(run_task(move || Ok(func(value))));
        }),

        Outcome::Failure(err) => {
          cell.complete(Outcome::Failure(err));
        }

        Outcome::Cancelled => {
          cell.complete(Outcome::Cancelled);
        }
      }));
    }

    mapped
  }

  /// Returns a future that completes with the outcome of the future returned
  /// by applying a function to this future's success value.
  ///
  /// Failure and cancellation propagate unchanged.
  pub fn flat_map<U>(&self, func: impl FnOnce(T) -> Future<U> + Send + 'static) -> Future<U>
  where
    U: Clone + Send + 'static,
  {
    let mapped = Future::pending();

    {
      let cell = mapped.clone();

      self.subscribe(Box::new(move |outcome| match outcome {
        Outcome::Success(value) => ThreadPool::global().execute(move || {
          match panic::catch_unwind(AssertUnwindSafe(move || func(value))) {
            Ok(inner) => inner.subscribe(Box::new(move |outcome| {
              cell.complete(outcome);
            })),

            Err(payload) => {
              cell.complete(Outcome::Failure(Error::from_panic(payload)));
            }
          }
        }),

        Outcome::Failure(err) => {
          cell.complete(Outcome::Failure(err));
        }

        Outcome::Cancelled => {
          cell.complete(Outcome::Cancelled);
        }
      }));
    }

    mapped
  }

  /// Registers a function to run with the outcome once this future
  /// completes.
  ///
  /// The function runs on the shared thread pool.
  pub fn on_complete(&self, func: impl FnOnce(Outcome<T>) + Send + 'static) {
    self.subscribe(Box::new(move |outcome| {
      ThreadPool::global().execute(move || func(outcome));
    }));
  }

  /// Returns a future that turns a failure of this future into a success by
  /// applying a function to the error.
  ///
  /// Success and cancellation propagate unchanged.
  pub fn recover(&self, func: impl FnOnce(Error) -> T + Send + 'static) -> Self {
    let recovered = Self::pending();

    {
      let cell = recovered.clone();

      self.subscribe(Box::new(move |outcome| match outcome {
        Outcome::Success(value) => {
          cell.complete(Outcome::Success(value));
        }

        Outcome::Failure(err) => ThreadPool::global().execute(move || {
          cell.complete(run_task(move || Ok(func(err))));
        }),

        Outcome::Cancelled => {
          cell.complete(Outcome::Cancelled);
        }
      }));
    }

    recovered
  }

  /// Returns a future that mirrors this one, but fails with a `"timeout"`
  /// error if this future has not completed within the given duration.
  ///
  /// The underlying task is unaffected by the timeout.
  pub fn timeout(&self, timeout: Duration) -> Self {
    let wrapper = Self::pending();

    {
      let cell = wrapper.clone();

      self.subscribe(Box::new(move |outcome| {
        cell.complete(outcome);
      }));
    }

    {
      let cell = wrapper.clone();

      Thread::spawn("future-timeout", move || {
        thread::sleep(timeout);
        cell.complete(Outcome::Failure(err!("timeout")));
      })
      .detach();
    }

    wrapper
  }
}

impl<T> Outcome<T> {
  /// Returns the failure or cancellation error, if any.
  pub fn error(&self) -> Option<Error> {
    match self {
      Self::Success(_) => None,
      Self::Failure(err) => Some(err.clone()),
      Self::Cancelled => Some(err!("cancelled")),
    }
  }

  /// Converts the outcome into a result.
  ///
  /// A cancelled outcome becomes a `"cancelled"` error.
  pub fn into_result(self) -> Result<T> {
    match self {
      Self::Success(value) => Ok(value),
      Self::Failure(err) => Err(err),
      Self::Cancelled => Err(err!("cancelled")),
    }
  }

  /// Returns `true` if the outcome is a cancellation.
  pub fn is_cancelled(&self) -> bool {
    match self {
      Self::Cancelled => true,
      _ => false,
    }
  }

  /// Returns `true` if the outcome is a failure.
  pub fn is_failure(&self) -> bool {
    match self {
      Self::Failure(_) => true,
      _ => false,
    }
  }

  /// Returns `true` if the outcome is a success.
  pub fn is_success(&self) -> bool {
    match self {
      Self::Success(_) => true,
      _ => false,
    }
  }

  /// Returns the success value, if any.
  pub fn success(self) -> Option<T> {
    match self {
      Self::Success(value) => Some(value),
      _ => None,
    }
  }
}

/// Runs a task, capturing a panic as a failure.
pub(crate) fn run_task<T>(task: impl FnOnce() -> Result<T>) -> Outcome<T> {
  match panic::catch_unwind(AssertUnwindSafe(task)) {
    Ok(Ok(value)) => Outcome::Success(value),
    Ok(Err(err)) => Outcome::Failure(err),
    Err(payload) => Outcome::Failure(Error::from_panic(payload)),
  }
}

// Manually implement `Clone` for all `T`.

impl<T> Clone for Future<T> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

// Unit tests.
