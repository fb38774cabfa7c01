// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Logging utilities based on the `log` crate.
//!
//! Call [`init()`] once at startup to install a console logger, then use the
//! usual `trace!`, `debug!`, `info!`, `warn!`, and `error!` macros. The level
//! of each module can be adjusted independently with [`set_level_of()`].

use crate::collections::HashMap;
use crate::sync::Mutex;

use console::style;
use once_cell::sync::Lazy;

#[doc(inline)]
pub use log_crate::{debug, error, info, log, trace, warn, Level, LevelFilter};

#[doc(inline)]
pub use log_crate::Level::*;

/// The logger installed by `init`.
static LOGGER: ConsoleLogger = ConsoleLogger;

/// Per-target level overrides, keyed by module path prefix.
static LEVELS: Lazy<Mutex<Levels>> = Lazy::new(|| {
  Mutex::new(Levels { default: LevelFilter::Warn, by_target: HashMap::new() })
});

struct Levels {
  default: LevelFilter,
  by_target: HashMap<String, LevelFilter>,
}

/// A logger that writes colored output to stderr.
struct ConsoleLogger;

/// Installs the console logger.
///
/// This function has no effect if a logger is already installed.
pub fn init() {
  if log_crate::set_logger(&LOGGER).is_ok() {
    log_crate::set_max_level(LevelFilter::Trace);
  }
}

/// Sets the default level for targets with no specific level.
pub fn set_default_level(level: Level) {
  LEVELS.lock().default = level.to_level_filter();
}

/// Sets the level of a target and its children.
///
/// The target is usually a module path such as `my_crate::net`.
pub fn set_level_of(target: impl Into<String>, level: Level) {
  LEVELS.lock().by_target.insert(target.into(), level.to_level_filter());
}

/// Returns the level filter that applies to the given target.
fn level_of(target: &str) -> LevelFilter {
  let levels = LEVELS.lock();
  let mut prefix = target;

  loop {
    if let Some(filter) = levels.by_target.get(prefix) {
      return *filter;
    }

    match prefix.rfind("::") {
      Some(index) => prefix = &prefix[..index],
      None => return levels.default,
    }
  }
}

// Implement `Log` to filter records and write them to stderr.

impl log_crate::Log for ConsoleLogger {
  fn enabled(&self, metadata: &log_crate::Metadata) -> bool {
    metadata.level() <= level_of(metadata.target())
  }

  fn log(&self, record: &log_crate::Record) {
    if !self.enabled(record.metadata()) {
      return;
    }

    let level = match record.level() {
      Level::Error => style("ERROR").red().bold(),
      Level::Warn => style(" WARN").yellow(),
      Level::Info => style(" INFO").green(),
      Level::Debug => style("DEBUG").cyan(),
      Level::Trace => style("TRACE").dim(),
    };

    eprintln!("{} {} > {}", level, style(record.target()).dim(), record.args());
  }

  fn flush(&self) {}
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;

  /// Tests that level overrides apply to a target and its children.
  #[test]
  pub fn test_level_of() {
    set_level_of("some_crate::net", Debug);

    assert_eq!(level_of("some_crate::net"), LevelFilter::Debug);
    assert_eq!(level_of("some_crate::net::http"), LevelFilter::Debug);
    assert_eq!(level_of("some_crate"), LevelFilter::Warn);
    assert_eq!(level_of("other_crate"), LevelFilter::Warn);
  }
}
