// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A blocking multi-producer, multi-consumer channel.

use crate::prelude::*;

use super::{Condvar, Mutex, WaitGroup};

/// A typed channel for sending messages between threads.
///
/// A channel with a capacity of zero is a rendezvous channel: every send
/// blocks until a receiver has taken the message. A channel with a nonzero
/// capacity buffers up to `capacity` unreceived messages.
///
/// Clones share the same underlying channel.
pub struct Channel<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  capacity: usize,
  state: Mutex<State<T>>,
  recv_ready: Condvar,
  send_ready: Condvar,
  delivered: Condvar,
}

struct State<T> {
  queue: VecDeque<T>,
  closed: bool,
  taken: u64,
  recv_waiting: usize,
}

/// An error indicating that the channel is closed.
#[derive(Clone, Copy, Debug, Default, Display)]
#[display(fmt = "Channel is closed.")]
pub struct ClosedError;

/// One of the possible errors returned from [`Channel::try_recv`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum RecvError {
  #[display(fmt = "Channel is closed.")]
  Closed,
  #[display(fmt = "Channel is empty.")]
  Empty,
}

/// One of the possible errors returned from [`Channel::try_send`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SendError {
  #[display(fmt = "Channel is closed.")]
  Closed,
  #[display(fmt = "Channel is full.")]
  Full,
}

impl<T> Channel<T> {
  /// Creates a new channel with the given capacity.
  ///
  /// A capacity of zero creates a rendezvous channel.
  pub fn new(capacity: usize) -> Self {
    Self {
      inner: Arc::new(Inner {
        capacity,
        state: Mutex::new(State {
          queue: VecDeque::new(),
          closed: false,
          taken: 0,
          recv_waiting: 0,
        }),
        recv_ready: Condvar::new(),
        send_ready: Condvar::new(),
        delivered: Condvar::new(),
      }),
    }
  }

  /// Returns the capacity the channel was created with.
  pub fn capacity(&self) -> usize {
    self.inner.capacity
  }

  /// Closes the channel, waking all blocked senders and receivers.
  ///
  /// Messages already in the channel remain receivable. This function returns
  /// `true` if the channel was open and this call closed it; closing an
  /// already-closed channel has no effect.
  pub fn close(&self) -> bool {
    let inner = &self.inner;
    let mut state = inner.state.lock();

    if state.closed {
      return false;
    }

    state.closed = true;
    inner.recv_ready.notify_all();
    inner.send_ready.notify_all();
    inner.delivered.notify_all();

    true
  }

  /// Returns `true` if the channel is closed.
  pub fn is_closed(&self) -> bool {
    self.inner.state.lock().closed
  }

  /// Returns `true` if the channel contains no messages.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the number of messages in the channel.
  pub fn len(&self) -> usize {
    self.inner.state.lock().queue.len()
  }

  /// Waits for an available message and receives it.
  ///
  /// Returns `None` once the channel is closed and every message has been
  /// received.
  pub fn recv(&self) -> Option<T> {
    let inner = &self.inner;
    let mut state = inner.state.lock();

    loop {
      if let Some(message) = state.queue.pop_front() {
        state.taken += 1;
        inner.delivered.notify_all();
        inner.send_ready.notify_one();

        return Some(message);
      }

      if state.closed {
        return None;
      }

      state.recv_waiting += 1;
      inner.recv_ready.wait(&mut state);
      state.recv_waiting -= 1;
    }
  }

  /// Waits for space in the channel and sends a message to it.
  ///
  /// On a rendezvous channel, this function does not return until a receiver
  /// has taken the message, unless the channel is closed while the message is
  /// still in flight; the message then remains receivable.
  ///
  /// Sending on a closed channel logs a warning, discards the message, and
  /// returns [`ClosedError`].
  pub fn send(&self, message: T) -> Result<(), ClosedError> {
    let inner = &self.inner;
    let mut state = inner.state.lock();

    while !state.closed && state.queue.len() >= self.slots() {
      inner.send_ready.wait(&mut state);
    }

    if state.closed {
      drop(state);
      warn!("Discarding a message sent on a closed channel.");

      return Err(ClosedError);
    }

    state.queue.push_back(message);
    inner.recv_ready.notify_one();

    if inner.capacity == 0 {
      let target = state.taken + 1;

      while state.taken < target && !state.closed {
        inner.delivered.wait(&mut state);
      }
    }

    Ok(())
  }

  /// Attempts to immediately receive an available message.
  pub fn try_recv(&self) -> Result<T, RecvError> {
    let inner = &self.inner;
    let mut state = inner.state.lock();

    match state.queue.pop_front() {
      Some(message) => {
        state.taken += 1;
        inner.delivered.notify_all();
        inner.send_ready.notify_one();

        Ok(message)
      }

      None if state.closed => Err(RecvError::Closed),
      None => Err(RecvError::Empty),
    }
  }

  /// Attempts to send a message without blocking.
  ///
  /// On a rendezvous channel, this succeeds only if a receiver is already
  /// waiting to take the message.
  pub fn try_send(&self, message: T) -> Result<(), SendError> {
    let inner = &self.inner;
    let mut state = inner.state.lock();

    if state.closed {
      return Err(SendError::Closed);
    }

    let ready = match inner.capacity {
      0 => state.queue.is_empty() && state.recv_waiting > 0,
      capacity => state.queue.len() < capacity,
    };

    if !ready {
      return Err(SendError::Full);
    }

    state.queue.push_back(message);
    inner.recv_ready.notify_one();

    Ok(())
  }

  /// The number of messages the channel can hold at once.
  fn slots(&self) -> usize {
    self.inner.capacity.max(1)
  }
}

/// Receives from the first of the given channels with an available message.
///
/// The channels are polled in order. Returns `None` when every channel is
/// closed and empty, or when `channels` is empty.
pub fn select<T>(channels: &[Channel<T>]) -> Option<(usize, T)> {
  loop {
    let mut any_open = false;

    for (index, channel) in channels.iter().enumerate() {
      match channel.try_recv() {
        Ok(message) => return Some((index, message)),
        Err(RecvError::Empty) => any_open = true,
        Err(RecvError::Closed) => {}
      }
    }

    if !any_open {
      return None;
    }

    thread::sleep(Duration::from_millis(1));
  }
}

/// Merges messages from many channels into one, preserving the arrival order
/// of each source.
///
/// The output channel is closed once every source is closed and drained.
pub fn fan_in<T: Send + 'static>(sources: Vec<Channel<T>>) -> Channel<T> {
  let capacity = sources.iter().map(Channel::capacity).max().unwrap_or(0);
  let output = Channel::new(capacity);
  let group = WaitGroup::new();

  for source in sources {
    group.add(1);

    let output = output.clone();
    let group = group.clone();

    Thread::spawn("fan-in", move || {
      while let Some(message) = source.recv() {
        if output.send(message).is_err() {
          break;
        }
      }

      group.done();
    })
    .detach();
  }

  {
    let output = output.clone();

    Thread::spawn("fan-in-close", move || {
      group.wait();
      output.close();
    })
    .detach();
  }

  output
}

/// Distributes messages from a channel round-robin across `outputs` new
/// channels, in index order starting from zero.
///
/// Every output channel is closed once the source is closed and drained. A
/// message routed to a closed output is discarded.
pub fn fan_out<T: Send + 'static>(source: &Channel<T>, outputs: usize) -> Vec<Channel<T>> {
  assert!(outputs > 0, "Fan-out requires at least one output channel.");

  let feeds: Vec<_> = (0..outputs).map(|_| Channel::new(source.capacity())).collect();

  {
    let source = source.clone();
    let feeds = feeds.clone();

    Thread::spawn("fan-out", move || {
      let mut next = 0;

      while let Some(message) = source.recv() {
        let _ = feeds[next].send(message);
        next = (next + 1) % feeds.len();
      }

      for feed in &feeds {
        feed.close();
      }
    })
    .detach();
  }

  feeds
}

/// Returns a channel fed by applying a function to each message of a source
/// channel.
///
/// The output channel is closed once the source is closed and drained.
pub fn pipeline<T, U>(source: &Channel<T>, func: impl Fn(T) -> U + Send + 'static) -> Channel<U>
where
  T: Send + 'static,
  U: Send + 'static,
{
  let output = Channel::new(source.capacity());

  {
    let source = source.clone();
    let output = output.clone();

    Thread::spawn("pipeline", move || {
      while let Some(message) = source.recv() {
        if output.send(func(message)).is_err() {
          break;
        }
      }

      output.close();
    })
    .detach();
  }

  output
}

// Manually implement `Clone` for all `T`.

impl<T> Clone for Channel<T> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

// Implement `Error` for the error types.

impl std::error::Error for ClosedError {}
impl std::error::Error for RecvError {}
impl std::error::Error for SendError {}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};

  /// Tests that buffered channels deliver messages in order, then report
  /// closure.
  #[test]
  pub fn test_fifo_until_closed() {
    let channel = Channel::new(8);

    for i in 0..5 {
      channel.send(i).unwrap();
    }

    channel.close();

    for i in 0..5 {
      assert_eq!(channel.recv(), Some(i));
    }

    assert_eq!(channel.recv(), None);
    assert_eq!(channel.recv(), None);
  }

  /// Tests that a rendezvous send returns only after its message was
  /// received.
  #[test]
  pub fn test_rendezvous() {
    let channel = Channel::new(0);
    let returned = Arc::new(AtomicBool::new(false));

    let sender = {
      let channel = channel.clone();
      let returned = returned.clone();

      Thread::spawn("sender", move || {
        channel.send(42).unwrap();
        returned.store(true, Ordering::SeqCst);
      })
    };

    thread::sleep(Duration::from_millis(50));

    assert!(!returned.load(Ordering::SeqCst));
    assert_eq!(channel.recv(), Some(42));

    sender.join().unwrap();

    assert!(returned.load(Ordering::SeqCst));
    assert!(channel.is_empty());
  }

  /// Tests that the channel never holds more than its capacity.
  #[test]
  pub fn test_capacity_bound() {
    let channel = Channel::new(2);

    channel.send("a").unwrap();
    channel.send("b").unwrap();

    assert_eq!(channel.try_send("c"), Err(SendError::Full));
    assert_eq!(channel.len(), 2);

    assert_eq!(channel.recv(), Some("a"));

    channel.send("c").unwrap();

    assert_eq!(channel.len(), 2);
  }

  /// Tests that sending on a closed channel fails.
  #[test]
  pub fn test_send_on_closed() {
    let channel = Channel::new(1);

    assert!(channel.close());
    assert!(channel.send(1).is_err());
    assert_eq!(channel.try_send(1), Err(SendError::Closed));
  }

  /// Tests that closing is idempotent.
  #[test]
  pub fn test_close_idempotent() {
    let channel = Channel::<usize>::new(1);

    assert!(channel.close());
    assert!(!channel.close());
    assert!(channel.is_closed());
  }

  /// Tests that `try_send` on a rendezvous channel requires a waiting
  /// receiver.
  #[test]
  pub fn test_rendezvous_try_send() {
    let channel = Channel::new(0);

    assert_eq!(channel.try_send(1), Err(SendError::Full));

    let receiver = {
      let channel = channel.clone();

      Thread::spawn("receiver", move || channel.recv())
    };

    // Wait for the receiver to block.

    let mut sent = false;

    for _ in 0..100 {
      if channel.try_send(1).is_ok() {
        sent = true;
        break;
      }

      thread::sleep(Duration::from_millis(5));
    }

    assert!(sent);
    assert_eq!(receiver.join().unwrap(), Some(1));
  }

  /// Tests that `select` receives from the first ready channel.
  #[test]
  pub fn test_select() {
    let channels = vec![Channel::new(1), Channel::new(1)];

    channels[1].send("b").unwrap();

    assert_eq!(select(&channels), Some((1, "b")));

    for channel in &channels {
      channel.close();
    }

    assert_eq!(select(&channels), None);
  }

  /// Tests that `fan_out` distributes messages round-robin.
  #[test]
  pub fn test_fan_out() {
    let source = Channel::new(8);
    let outputs = fan_out(&source, 3);

    for i in 0..6 {
      source.send(i).unwrap();
    }

    source.close();

    let collected: Vec<Vec<i32>> = outputs
      .iter()
      .map(|output| {
        let mut messages = Vec::new();

        while let Some(message) = output.recv() {
          messages.push(message);
        }

        messages
      })
      .collect();

    assert_eq!(collected, vec![vec![0, 3], vec![1, 4], vec![2, 5]]);
  }

  /// Tests that `fan_in` delivers every message and closes the output.
  #[test]
  pub fn test_fan_in() {
    let first = Channel::new(4);
    let second = Channel::new(4);
    let merged = fan_in(vec![first.clone(), second.clone()]);

    for i in 0..4 {
      first.send(i).unwrap();
      second.send(i + 4).unwrap();
    }

    first.close();
    second.close();

    let mut messages = Vec::new();

    while let Some(message) = merged.recv() {
      messages.push(message);
    }

    messages.sort_unstable();

    assert_eq!(messages, vec![0, 1, 2, 3, 4, 5, 6, 7]);
  }

  /// Tests that `pipeline` applies a function to each message in order.
  #[test]
  pub fn test_pipeline() {
    let source = Channel::new(4);
    let doubled = pipeline(&source, |i: i32| i * 2);

    for i in 0..4 {
      source.send(i).unwrap();
    }

    source.close();

    let mut messages = Vec::new();

    while let Some(message) = doubled.recv() {
      messages.push(message);
    }

    assert_eq!(messages, vec![0, 2, 4, 6]);
  }
}
