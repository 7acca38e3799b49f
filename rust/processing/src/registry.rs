// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Id registry shared by every node kind of an assembly

use rustc_hash::FxHashMap;

use crate::error::{LoadError, Result};

/// Outcome of [`Registry::make_child`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim<V> {
    /// The id was already registered; the existing value is returned
    Existing(V),
    /// The id was new and the fallback value is now registered under it
    Registered(V),
}

impl<V: Copy> Claim<V> {
    pub fn value(&self) -> V {
        match self {
            Claim::Existing(v) | Claim::Registered(v) => *v,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Claim::Registered(_))
    }
}

/// Maps external ids to graph nodes
///
/// This is the only record of which ids have been seen, so it decides
/// whether a reference creates a node or reuses one.
#[derive(Debug, Clone)]
pub struct Registry<V> {
    objects: FxHashMap<String, V>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self {
            objects: FxHashMap::default(),
        }
    }
}

impl<V: Copy> Registry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_child(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    #[inline]
    pub fn get_child(&self, id: &str) -> Option<V> {
        self.objects.get(id).copied()
    }

    /// Return the value registered for `id`, or register the one produced
    /// by `fallback`. The fallback only runs for unseen ids.
    pub fn make_child(&mut self, id: &str, fallback: impl FnOnce() -> V) -> Result<Claim<V>> {
        if id.is_empty() {
            return Err(LoadError::EmptyId);
        }
        if let Some(existing) = self.objects.get(id) {
            return Ok(Claim::Existing(*existing));
        }
        let value = fallback();
        self.objects.insert(id.to_string(), value);
        Ok(Claim::Registered(value))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}
