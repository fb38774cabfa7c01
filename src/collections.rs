// Copyright © 2021 Alexandra Frydl
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Collection types.

#[doc(inline)]
pub use {
  std::collections::{binary_heap, BinaryHeap},
  std::collections::{btree_map, BTreeMap},
  std::collections::{btree_set, BTreeSet},
  std::collections::{hash_map, HashMap},
  std::collections::{hash_set, HashSet},
  std::collections::{vec_deque, VecDeque},
};

/// A concurrent hash map provided by the `dashmap` crate.
///
#[doc(inline)]
pub use dashmap::DashMap as ConcurrentHashMap;

/// A concurrent hash set provided by the `dashmap` crate.
///
#[doc(inline)]
pub use dashmap::DashSet as ConcurrentHashSet;
