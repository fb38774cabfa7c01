// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A fixed-size pool of worker threads.

use crate::prelude::*;

use crate::future::run_task;
use crate::sync::{Condvar, Mutex};
use once_cell::sync::Lazy;
use std::thread::ThreadId;

/// The process-wide shared pool.
static GLOBAL: Lazy<Mutex<Option<ThreadPool>>> = Lazy::new(default);

/// A fixed-size pool of worker threads executing tasks in FIFO order.
///
/// Clones share the same workers and queue.
#[derive(Clone)]
pub struct ThreadPool {
  inner: Arc<Inner>,
}

/// A boxed task for [`ThreadPool::invoke_all`].
pub type Task<T> = Box<dyn FnOnce() -> Result<T> + Send>;

struct Inner {
  size: usize,
  state: Mutex<State>,
  work: Condvar,
  terminated: Condvar,
}

struct State {
  queue: VecDeque<Job>,
  shutdown: bool,
  active: usize,
  alive: usize,
  workers: HashSet<ThreadId>,
}

/// A unit of work for a single worker: either a task, or a signal for one
/// worker to exit.
enum Job {
  Run(Box<dyn FnOnce(bool) + Send>),
  Poison,
}

impl ThreadPool {
  /// Creates a new pool with the given number of workers.
  ///
  /// Panics if `size` is zero.
  pub fn new(size: usize) -> Self {
    assert!(size > 0, "A thread pool must have at least one worker.");

    let inner = Arc::new(Inner {
      size,
      state: Mutex::new(State {
        queue: VecDeque::new(),
        shutdown: false,
        active: 0,
        alive: size,
        workers: HashSet::new(),
      }),
      work: Condvar::new(),
      terminated: Condvar::new(),
    });

    for i in 0..size {
      let inner = inner.clone();

      Thread::spawn(format!("pool-worker-{}", i), move || worker(inner)).detach();
    }

    Self { inner }
  }

  /// Creates a new pool with one worker per logical CPU core.
  pub fn with_default() -> Self {
    Self::new(num_cpus::get().max(1))
  }

  /// Returns the process-wide shared pool, creating it on first use.
  ///
  /// If the shared pool has been shut down, the next call creates a fresh
  /// one.
  pub fn global() -> Self {
    global_in(&GLOBAL)
  }

  /// Returns the number of tasks currently running.
  pub fn active_count(&self) -> usize {
    self.inner.state.lock().active
  }

  /// Blocks up to the given duration for every worker to exit, returning
  /// `true` if they did.
  pub fn await_termination(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut state = self.inner.state.lock();

    while state.alive > 0 {
      if self.inner.terminated.wait_until(&mut state, deadline).timed_out() {
        return state.alive == 0;
      }
    }

    true
  }

  /// Runs a task on the pool, discarding its output.
  ///
  /// Submitting to a pool that has been shut down logs a warning and
  /// discards the task.
  pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
    let mut state = self.inner.state.lock();

    if state.shutdown {
      drop(state);
      warn!("Discarding a task submitted to a shut-down thread pool.");

      return;
    }

    state.queue.push_back(Job::Run(Box::new(move |run| {
      if run && panic::catch_unwind(panic::AssertUnwindSafe(task)).is_err() {
        warn!("A pooled task panicked.");
      }
    })));

    self.inner.work.notify_one();
  }

  /// Submits every task in order and returns their futures.
  pub fn invoke_all<T: Clone + Send + 'static>(&self, tasks: Vec<Task<T>>) -> Vec<Future<T>> {
    tasks.into_iter().map(|task| self.submit(task)).collect()
  }

  /// Returns `true` if the pool has been shut down.
  pub fn is_shutdown(&self) -> bool {
    self.inner.state.lock().shutdown
  }

  /// Returns the number of tasks waiting to run.
  pub fn queue_size(&self) -> usize {
    let state = self.inner.state.lock();

    state
      .queue
      .iter()
      .filter(|job| match job {
        Job::Run(_) => true,
        Job::Poison => false,
      })
      .count()
  }

  /// Marks the pool as shut down and waits for the workers to finish every
  /// queued task and exit.
  ///
  /// When called from one of the pool's own workers, this function returns
  /// without waiting.
  pub fn shutdown(&self) {
    self.begin_shutdown(false);
    self.join_workers();
  }

  /// Marks the pool as shut down, discards every queued task, and waits for
  /// the workers to finish their current tasks and exit.
  ///
  /// The futures of discarded tasks are cancelled. When called from one of
  /// the pool's own workers, this function returns without waiting.
  pub fn shutdown_now(&self) {
    self.begin_shutdown(true);
    self.join_workers();
  }

  /// Returns the number of workers in the pool.
  pub fn size(&self) -> usize {
    self.inner.size
  }

  /// Enqueues a task and returns a future for its result.
  ///
  /// Submitting to a pool that has been shut down returns an already-failed
  /// future. If the future is cancelled before the task is dispatched, the
  /// task is skipped.
  pub fn submit<T: Clone + Send + 'static>(
    &self,
    task: impl FnOnce() -> Result<T> + Send + 'static,
  ) -> Future<T> {
    let mut state = self.inner.state.lock();

    if state.shutdown {
      return Future::failed("thread pool is shut down");
    }

    let future = Future::pending();
    let cell = future.clone();

    state.queue.push_back(Job::Run(Box::new(move |run| {
      if !run {
        cell.cancel();
        return;
      }

      if cell.is_cancelled() {
        return;
      }

      cell.complete(run_task(task));
    })));

    self.inner.work.notify_one();
    drop(state);

    future
  }

  /// Marks the pool as shut down and poisons the queue, optionally
  /// discarding queued tasks first.
  fn begin_shutdown(&self, discard_queued: bool) {
    let discarded = {
      let mut state = self.inner.state.lock();
      let first = !state.shutdown;

      state.shutdown = true;

      let mut discarded = Vec::new();

      if discard_queued {
        let mut poisons = 0;

        for job in state.queue.drain(..) {
          match job {
            Job::Poison => poisons += 1,
            job => discarded.push(job),
          }
        }

        for _ in 0..poisons {
          state.queue.push_back(Job::Poison);
        }
      }

      if first {
        for _ in 0..self.inner.size {
          state.queue.push_back(Job::Poison);
        }
      }

      self.inner.work.notify_all();

      discarded
    };

    for job in discarded {
      if let Job::Run(task) = job {
        task(false);
      }
    }
  }

  /// Waits for every worker to exit, unless called from a worker.
  fn join_workers(&self) {
    let mut state = self.inner.state.lock();

    if state.workers.contains(&std::thread::current().id()) {
      return;
    }

    while state.alive > 0 {
      self.inner.terminated.wait(&mut state);
    }
  }
}

/// Returns the shared pool in the given slot, creating a fresh pool on first
/// use or after a shutdown.
fn global_in(slot: &Mutex<Option<ThreadPool>>) -> ThreadPool {
  let mut slot = slot.lock();

  match &*slot {
    Some(pool) if !pool.is_shutdown() => pool.clone(),

    _ => {
      let pool = ThreadPool::with_default();

      *slot = Some(pool.clone());
      pool
    }
  }
}

/// The worker loop: pull jobs in FIFO order until poisoned.
fn worker(inner: Arc<Inner>) {
  let id = std::thread::current().id();

  inner.state.lock().workers.insert(id);

  loop {
    let job = {
      let mut state = inner.state.lock();

      loop {
        match state.queue.pop_front() {
          Some(job) => break job,
          None => inner.work.wait(&mut state),
        }
      }
    };

    match job {
      Job::Poison => break,

      Job::Run(task) => {
        inner.state.lock().active += 1;
        task(true);
        inner.state.lock().active -= 1;
      }
    }
  }

  let mut state = inner.state.lock();

  state.workers.remove(&id);
  state.alive -= 1;

  if state.alive == 0 {
    inner.terminated.notify_all();
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Tests that a large batch of tasks each runs exactly once.
  #[test]
  pub fn test_fan_out() {
    let pool = ThreadPool::new(4);

    let futures: Vec<_> = (0..1000).map(|i| pool.submit(move || Ok(i))).collect();

    let mut seen: Vec<usize> = futures.iter().map(|future| future.wait().unwrap()).collect();

    seen.sort_unstable();

    assert_eq!(seen, (0..1000).collect::<Vec<_>>());

    // Give the last worker a moment to finish its bookkeeping.

    thread::sleep(Duration::from_millis(50));

    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.queue_size(), 0);

    pool.shutdown();
  }

  /// Tests that tasks submitted after shutdown fail immediately.
  #[test]
  pub fn test_submit_after_shutdown() {
    let pool = ThreadPool::new(1);

    pool.shutdown();

    let future = pool.submit(|| Ok(1));

    assert_eq!(future.wait().unwrap_err().message(), "thread pool is shut down");
    assert!(pool.is_shutdown());
  }

  /// Tests that `shutdown` waits for every worker to exit.
  #[test]
  pub fn test_shutdown_joins() {
    let pool = ThreadPool::new(2);

    let futures: Vec<_> = (0..8)
      .map(|i| {
        pool.submit(move || {
          thread::sleep(Duration::from_millis(5));
          Ok(i)
        })
      })
      .collect();

    pool.shutdown();

    // Every queued task ran before the workers exited.

    for (i, future) in futures.iter().enumerate() {
      assert_eq!(future.wait().unwrap(), i);
    }

    assert!(pool.await_termination(Duration::from_secs(1)));
  }

  /// Tests that `shutdown_now` cancels queued tasks but not running ones.
  #[test]
  pub fn test_shutdown_now_discards() {
    let pool = ThreadPool::new(1);

    let running = pool.submit(|| {
      thread::sleep(Duration::from_millis(50));
      Ok("ran")
    });

    // Give the worker time to start the first task.

    thread::sleep(Duration::from_millis(10));

    let queued: Vec<_> = (0..4).map(|i| pool.submit(move || Ok(i))).collect();

    pool.shutdown_now();

    assert_eq!(running.wait().unwrap(), "ran");

    for future in queued {
      assert!(future.is_cancelled());
    }
  }

  /// Tests that `shutdown_now` on an idle pool terminates promptly.
  #[test]
  pub fn test_shutdown_now_idle() {
    let pool = ThreadPool::new(4);

    pool.shutdown_now();

    assert!(pool.await_termination(Duration::from_secs(1)));
  }

  /// Tests that a panicking task does not kill its worker.
  #[test]
  pub fn test_worker_survives_panic() {
    let pool = ThreadPool::new(1);

    let panicked = pool.submit(|| -> Result<usize> { panic!("oops") });
    let healthy = pool.submit(|| Ok(2));

    assert!(panicked.wait().is_err());
    assert_eq!(healthy.wait().unwrap(), 2);

    pool.shutdown();
  }

  /// Tests that `invoke_all` preserves task order.
  #[test]
  pub fn test_invoke_all() {
    let pool = ThreadPool::new(2);

    let tasks: Vec<Task<usize>> =
      (0..4usize).map(|i| Box::new(move || Ok(i * i)) as Task<usize>).collect();

    let futures = pool.invoke_all(tasks);
    let values: Vec<_> = futures.iter().map(|future| future.wait().unwrap()).collect();

    assert_eq!(values, vec![0, 1, 4, 9]);

    pool.shutdown();
  }

  /// Tests that cancelled tasks are skipped at dispatch.
  #[test]
  pub fn test_skips_cancelled() {
    let pool = ThreadPool::new(1);
    let runs = Arc::new(AtomicUsize::new(0));

    // Block the worker so the next submission stays queued.

    let blocker = pool.submit(|| {
      thread::sleep(Duration::from_millis(50));
      Ok(())
    });

    let skipped = {
      let runs = runs.clone();

      pool.submit(move || {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
      })
    };

    assert!(skipped.cancel());

    blocker.wait().unwrap();
    pool.shutdown();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(skipped.is_cancelled());
  }

  /// Tests that a shared slot hands out a fresh pool after a shutdown.
  #[test]
  pub fn test_shared_slot_recreates() {
    let slot = Mutex::new(None);

    let first = global_in(&slot);

    assert!(!first.is_shutdown());

    first.shutdown();

    let second = global_in(&slot);

    assert!(!second.is_shutdown());

    second.shutdown();
  }

  /// Tests that pool construction rejects a zero size.
  #[test]
  #[should_panic]
  pub fn test_zero_size_panics() {
    ThreadPool::new(0);
  }
}
