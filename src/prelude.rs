// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A “prelude” module containing common imports.

#[doc(no_inline)]
pub use {
  crate::breaker::{BreakerState, CircuitBreaker},
  crate::collections::{btree_map, BTreeMap},
  crate::collections::{btree_set, BTreeSet},
  crate::collections::{hash_map, HashMap},
  crate::collections::{hash_set, HashSet},
  crate::collections::{vec_deque, VecDeque},
  crate::collections::{ConcurrentHashMap, ConcurrentHashSet},
  crate::context::Context,
  crate::derive::*,
  crate::fail::{Error, Result},
  crate::fmt::{self, Debug, Display, Write as _},
  crate::future::{self, Future, Outcome},
  crate::iter::{self, Itertools},
  crate::log::{self, debug, error, info, trace, warn},
  crate::pool::ThreadPool,
  crate::random::{self, random, Random, Rng},
  crate::rate::RateLimiter,
  crate::retry::{Backoff, Retry},
  crate::single_flight::SingleFlight,
  crate::sync::channel::{self, Channel},
  crate::sync::{CountDownLatch, Mutex, Once, RwMutex, Semaphore, WaitGroup},
  crate::thread::{self, Thread},
  crate::time::{self, Duration, Instant, Stopwatch},
  crate::{err, fail},
  std::any::Any,
  std::borrow::*,
  std::cmp::{self, Eq, Ord, PartialEq, PartialOrd},
  std::convert::{TryFrom, TryInto},
  std::hash::{self, Hash, Hasher},
  std::marker::PhantomData,
  std::mem::{self, ManuallyDrop},
  std::ops::*,
  std::str::{self, FromStr},
  std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  std::sync::{Arc, Weak as ArcWeak},
  std::{panic, slice},
};

/// Returns the “default value” for a type.
pub fn default<T: Default>() -> T {
  T::default()
}
