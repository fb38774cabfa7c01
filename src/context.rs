// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cancellation, deadlines, and scoped values propagated across tasks.
//!
//! A [`Context`] is a node in a tree. Cancelling a context cancels all of its
//! descendants; each node may also carry a deadline and a key-value pair
//! visible to its descendants. Work that should stop when its context is
//! cancelled either polls [`is_cancelled()`][Context::is_cancelled] or blocks
//! on the [`done()`][Context::done] channel.

use crate::prelude::*;

use crate::sync::Mutex;
use once_cell::sync::Lazy;

/// The root of the context tree.
static BACKGROUND: Lazy<Context> = Lazy::new(|| Context {
  node: Arc::new(Node {
    parent: None,
    root: true,
    deadline: None,
    entry: None,
    done: channel::Channel::new(0),
    state: Mutex::new(NodeState { cancelled: None, children: Vec::new() }),
  }),
});

/// A node in a cancellation tree, carrying an optional deadline and scoped
/// values.
///
/// Clones share the same node.
#[derive(Clone)]
pub struct Context {
  node: Arc<Node>,
}

/// The reason a context was cancelled.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Reason {
  #[display(fmt = "cancelled")]
  Cancelled,
  #[display(fmt = "timeout")]
  TimedOut,
}

struct Node {
  parent: Option<Arc<Node>>,
  root: bool,
  deadline: Option<Instant>,
  entry: Option<(String, String)>,
  done: channel::Channel<()>,
  state: Mutex<NodeState>,
}

struct NodeState {
  cancelled: Option<Reason>,
  children: Vec<ArcWeak<Node>>,
}

impl Context {
  /// Returns the root context, which is never cancelled and has no deadline
  /// or values.
  pub fn background() -> Self {
    BACKGROUND.clone()
  }

  /// Cancels this context and all of its descendants.
  ///
  /// Cancelling an already-cancelled context, or the root context, has no
  /// effect.
  pub fn cancel(&self) {
    if !self.node.root {
      cancel_node(&self.node, Reason::Cancelled);
    }
  }

  /// Returns the deadline of this context, if any.
  pub fn deadline(&self) -> Option<Instant> {
    self.node.deadline
  }

  /// Returns a channel that is closed when this context is cancelled.
  ///
  /// Receiving on the channel blocks until cancellation, so a worker can
  /// wait on it to stop cooperatively.
  pub fn done(&self) -> channel::Channel<()> {
    self.refresh();
    self.node.done.clone()
  }

  /// Returns the reason this context was cancelled, if it was.
  pub fn error(&self) -> Option<Reason> {
    self.refresh();
    self.node.state.lock().cancelled
  }

  /// Returns `true` if this context has been cancelled.
  pub fn is_cancelled(&self) -> bool {
    self.error().is_some()
  }

  /// Returns the time remaining until the deadline, or `None` if this
  /// context has no deadline.
  pub fn remaining(&self) -> Option<Duration> {
    self.node.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
  }

  /// Returns the value for a key, looking first at this context and then at
  /// each ancestor in turn.
  pub fn value(&self, key: &str) -> Option<String> {
    let mut node = Some(&self.node);

    while let Some(current) = node {
      if let Some((entry_key, entry_value)) = &current.entry {
        if entry_key == key {
          return Some(entry_value.clone());
        }
      }

      node = current.parent.as_ref();
    }

    None
  }

  /// Returns a cancellable child of this context.
  pub fn with_cancel(&self) -> Self {
    self.child(None, None)
  }

  /// Returns a child of this context that is cancelled at the given instant.
  pub fn with_deadline(&self, deadline: Instant) -> Self {
    self.child(Some(deadline), None)
  }

  /// Returns a child of this context that is cancelled after the given
  /// duration.
  pub fn with_timeout(&self, timeout: Duration) -> Self {
    self.with_deadline(Instant::now() + timeout)
  }

  /// Returns a child of this context that maps the given key to the given
  /// value.
  ///
  /// Panics if `key` is empty.
  pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
    let key = key.into();

    assert!(!key.is_empty(), "A context key must not be empty.");

    self.child(None, Some((key, value.into())))
  }

  /// Creates a child node registered with this node.
  fn child(&self, deadline: Option<Instant>, entry: Option<(String, String)>) -> Self {
    let node = Arc::new(Node {
      parent: Some(self.node.clone()),
      root: false,
      deadline,
      entry,
      done: channel::Channel::new(0),
      state: Mutex::new(NodeState { cancelled: None, children: Vec::new() }),
    });

    // Register with the parent, or inherit its cancellation.

    let inherited = {
      let mut state = self.node.state.lock();

      match state.cancelled {
        Some(reason) => Some(reason),

        None => {
          state.children.push(Arc::downgrade(&node));
          None
        }
      }
    };

    if let Some(reason) = inherited {
      cancel_node(&node, reason);
    } else if let Some(deadline) = deadline {
      start_deadline_timer(&node, deadline);
    }

    Self { node }
  }

  /// Applies a deadline that has already passed.
  fn refresh(&self) {
    if let Some(deadline) = self.node.deadline {
      if Instant::now() >= deadline {
        cancel_node(&self.node, Reason::TimedOut);
      }
    }
  }
}

/// Cancels a node and its descendants with the given reason.
///
/// The first reason to arrive wins; later cancellations have no effect.
fn cancel_node(node: &Arc<Node>, reason: Reason) {
  let children = {
    let mut state = node.state.lock();

    if state.cancelled.is_some() {
      return;
    }

    state.cancelled = Some(reason);
    mem::take(&mut state.children)
  };

  node.done.close();

  for child in children {
    if let Some(child) = child.upgrade() {
      cancel_node(&child, reason);
    }
  }
}

/// Spawns a detached timer that cancels a node when its deadline passes.
///
/// The timer holds only a weak reference, so a dropped context does not keep
/// its timer alive longer than the sleep.
fn start_deadline_timer(node: &Arc<Node>, deadline: Instant) {
  let remaining = deadline.saturating_duration_since(Instant::now());

  if remaining == Duration::from_secs(0) {
    cancel_node(node, Reason::TimedOut);
    return;
  }

  let weak = Arc::downgrade(node);

  Thread::spawn("context-deadline", move || {
    thread::sleep(remaining);

    if let Some(node) = weak.upgrade() {
      cancel_node(&node, Reason::TimedOut);
    }
  })
  .detach();
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;

  /// Tests that cancellation propagates to descendants.
  #[test]
  pub fn test_cancel_propagation() {
    let root = Context::background();
    let parent = root.with_cancel();
    let child = parent.with_cancel();

    assert!(!child.is_cancelled());

    parent.cancel();

    assert!(child.is_cancelled());
    assert_eq!(child.error(), Some(Reason::Cancelled));
    assert_eq!(child.done().recv(), None);
    assert!(!root.is_cancelled());
  }

  /// Tests that values shadow ancestors and missing keys return nothing.
  #[test]
  pub fn test_value_lookup() {
    let root = Context::background();
    let outer = root.with_value("user", "amy").with_value("request", "r-1");
    let inner = outer.with_value("user", "beth");

    assert_eq!(outer.value("user"), Some("amy".into()));
    assert_eq!(inner.value("user"), Some("beth".into()));
    assert_eq!(inner.value("request"), Some("r-1".into()));
    assert_eq!(inner.value("missing"), None);
    assert_eq!(root.value("user"), None);
  }

  /// Tests that a zero timeout cancels the context immediately.
  #[test]
  pub fn test_zero_timeout() {
    let context = Context::background().with_timeout(Duration::from_secs(0));

    assert!(context.is_cancelled());
    assert_eq!(context.error(), Some(Reason::TimedOut));
  }

  /// Tests that a deadline cancels the context and closes its channel.
  #[test]
  pub fn test_deadline_cancels() {
    let context = Context::background().with_timeout(Duration::from_millis(30));

    assert!(!context.is_cancelled());
    assert!(context.remaining().unwrap() <= Duration::from_millis(30));

    // Blocks until the deadline timer closes the channel.

    assert_eq!(context.done().recv(), None);
    assert_eq!(context.error(), Some(Reason::TimedOut));
  }

  /// Tests that the first cancellation reason wins.
  #[test]
  pub fn test_first_reason_wins() {
    let context = Context::background().with_timeout(Duration::from_millis(200));

    context.cancel();
    thread::sleep(Duration::from_millis(250));

    assert_eq!(context.error(), Some(Reason::Cancelled));
  }

  /// Tests that the root context cannot be cancelled.
  #[test]
  pub fn test_background_never_cancelled() {
    let root = Context::background();

    root.cancel();

    assert!(!root.is_cancelled());
    assert_eq!(root.error(), None);
    assert_eq!(root.remaining(), None);
  }

  /// Tests that children of a cancelled parent are born cancelled.
  #[test]
  pub fn test_child_of_cancelled_parent() {
    let parent = Context::background().with_cancel();

    parent.cancel();

    let child = parent.with_cancel();

    assert!(child.is_cancelled());
    assert_eq!(child.error(), Some(Reason::Cancelled));
  }
}
