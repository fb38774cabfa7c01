// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error handling utilities.

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

/// A `std::result::Result` defaulting to the [`Error`] type.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// A cloneable error described by a message.
///
/// Errors of this type are cheap to clone, so a single error can be delivered
/// to any number of waiting threads.
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
  message: Arc<str>,
}

/// Creates a new [`struct@Error`] from a format string and arguments.
#[macro_export]
macro_rules! err {
  ($($args:tt)*) => {
    $crate::fail::Error::new(format!($($args)*))
  };
}

/// Returns an `Err` containing a new [`struct@Error`] from a format string and
/// arguments.
#[macro_export]
macro_rules! fail {
  ($($args:tt)*) => {
    return Err($crate::err!($($args)*).into())
  };
}

impl Error {
  /// Constructs a new error with the given message.
  pub fn new(message: impl Into<String>) -> Self {
    Self { message: message.into().into() }
  }

  /// Constructs a new error from the payload of a panic.
  pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
    if let Some(message) = panic.downcast_ref::<&str>() {
      return err!("Task panicked: {}", message);
    }

    if let Some(message) = panic.downcast_ref::<String>() {
      return err!("Task panicked: {}", message);
    }

    err!("Task panicked.")
  }

  /// Returns the message of the error.
  pub fn message(&self) -> &str {
    &self.message
  }
}

// Implement conversion from string types.

impl From<&str> for Error {
  fn from(message: &str) -> Self {
    Self::new(message)
  }
}

impl From<String> for Error {
  fn from(message: String) -> Self {
    Self::new(message)
  }
}

// Implement `Debug` and `Display` to show the message.

impl Debug for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "Error({:?})", self.message)
  }
}

impl Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(&self.message)
  }
}

impl std::error::Error for Error {}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;

  /// Tests that the macros construct errors with formatted messages.
  #[test]
  pub fn test_macros() {
    let err = err!("expected {}, found {}", 1, 2);

    assert_eq!(err.message(), "expected 1, found 2");

    fn fails() -> Result<usize> {
      fail!("nope");
    }

    assert_eq!(fails().unwrap_err().message(), "nope");
  }

  /// Tests that errors are cheap to clone and compare by message.
  #[test]
  pub fn test_clone_eq() {
    let a = Error::new("same");
    let b = a.clone();

    assert_eq!(a, b);
    assert_eq!(a.to_string(), "same");
  }
}
