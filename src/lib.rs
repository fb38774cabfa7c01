// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A utility library for building concurrent applications.
//!
//! The heart of the crate is its concurrency toolkit: blocking channels with
//! rendezvous and buffered modes, promise-style futures with composition and
//! combinators, a fixed-size thread pool, cancellation contexts, call
//! deduplication, and the retry, rate-limiting, and circuit-breaking policies
//! that tie them together.

pub mod breaker;
pub mod collections;
pub mod context;
pub mod derive;
pub mod fail;
pub mod fmt;
pub mod future;
pub mod iter;
pub mod log;
pub mod pool;
pub mod prelude;
pub mod random;
pub mod rate;
pub mod retry;
pub mod single_flight;
pub mod sync;
pub mod thread;
pub mod time;

#[doc(inline)]
pub use {
  self::breaker::CircuitBreaker,
  self::context::Context,
  self::fail::{Error, Result},
  self::future::Future,
  self::pool::ThreadPool,
  self::random::random,
  self::rate::RateLimiter,
  self::retry::Retry,
  self::single_flight::SingleFlight,
  self::sync::Channel,
  uuid::{self, Uuid},
};
