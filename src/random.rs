// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Random value generation.

use rand::distributions::uniform::SampleUniform;
use rand::distributions::{Distribution, Standard};
use rand::{Rng as _, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::cell::RefCell;

/// A fast, non-cryptographic random number generator.
pub struct Rng {
  inner: Xoshiro256PlusPlus,
}

/// A type with random values that can be generated by an [`Rng`].
pub trait Random {
  /// Generates a random value with the given [`Rng`].
  fn random_with(rng: &mut Rng) -> Self;

  /// Generates a random value with the thread-local [`Rng`].
  fn random() -> Self
  where
    Self: Sized,
  {
    with(Self::random_with)
  }
}

thread_local! {
  /// A lazily-seeded generator for the current thread.
  static THREAD_RNG: RefCell<Rng> = RefCell::new(Rng::new());
}

/// Generates a random value with the thread-local [`Rng`].
pub fn random<T: Random>() -> T {
  T::random()
}

/// Generates a uniformly distributed value in the range `[low, high)` with the
/// thread-local [`Rng`].
pub fn range<T: SampleUniform + PartialOrd>(low: T, high: T) -> T {
  with(|rng| rng.range(low, high))
}

/// Runs a function with mutable access to the thread-local [`Rng`].
pub fn with<T>(func: impl FnOnce(&mut Rng) -> T) -> T {
  THREAD_RNG.with(|rng| func(&mut rng.borrow_mut()))
}

impl Rng {
  /// Creates a new generator seeded from the operating system.
  pub fn new() -> Self {
    Self { inner: Xoshiro256PlusPlus::from_entropy() }
  }

  /// Creates a new generator with a fixed seed, for reproducible sequences.
  pub fn with_seed(seed: u64) -> Self {
    Self { inner: Xoshiro256PlusPlus::seed_from_u64(seed) }
  }

  /// Generates a random value.
  pub fn random<T: Random>(&mut self) -> T {
    T::random_with(self)
  }

  /// Generates a uniformly distributed value in the range `[low, high)`.
  pub fn range<T: SampleUniform + PartialOrd>(&mut self, low: T, high: T) -> T {
    self.inner.gen_range(low, high)
  }
}

// Implement `Random` for every type the `rand` crate can generate from its
// standard distribution.

impl<T> Random for T
where
  Standard: Distribution<T>,
{
  fn random_with(rng: &mut Rng) -> Self {
    rng.inner.gen()
  }
}

impl Default for Rng {
  fn default() -> Self {
    Self::new()
  }
}

// Unit tests.

#[cfg(test)]
mod tests {
  use super::*;

  /// Tests that ranges stay within their bounds.
  #[test]
  pub fn test_range() {
    for _ in 0..1000 {
      let value: u64 = range(10, 20);

      assert!(value >= 10 && value < 20);
    }
  }

  /// Tests that seeded generators produce reproducible sequences.
  #[test]
  pub fn test_seeded() {
    let mut a = Rng::with_seed(17);
    let mut b = Rng::with_seed(17);

    for _ in 0..100 {
      assert_eq!(a.random::<u64>(), b.random::<u64>());
    }
  }
}
