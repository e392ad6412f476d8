//! Generic subscriber registry with optional filters.
//!
//! A subscriber is registered either unfiltered (receives everything) or
//! under a filter key (receives events whose probe matches the key).
//! Subscribers are compared by `Arc` identity. The matching relation is
//! supplied at construction, so the registry itself knows nothing about
//! what the keys mean.
//!
//! The registry is not synchronized; owners wrap it in a lock.

use std::fmt;
use std::sync::Arc;

/// Matching relation between a stored filter key and a probe.
pub type KeyMatcher<K> = fn(&K, &K) -> bool;

/// Subscribe/unsubscribe registry with unfiltered and filtered entries.
pub struct FilteredRegistry<S: ?Sized, K> {
    matcher: KeyMatcher<K>,
    unfiltered: Vec<Arc<S>>,
    filtered: Vec<(K, Arc<S>)>,
}

impl<S: ?Sized, K: PartialEq + Clone> FilteredRegistry<S, K> {
    /// Create an empty registry using `matcher` for filtered lookups.
    #[must_use]
    pub fn new(matcher: KeyMatcher<K>) -> Self {
        Self {
            matcher,
            unfiltered: Vec::new(),
            filtered: Vec::new(),
        }
    }

    /// Register an unfiltered subscriber.
    ///
    /// Returns `false` if it was already registered unfiltered.
    pub fn subscribe(&mut self, subscriber: Arc<S>) -> bool {
        if self.unfiltered.iter().any(|s| Arc::ptr_eq(s, &subscriber)) {
            return false;
        }
        self.unfiltered.push(subscriber);
        true
    }

    /// Register a subscriber under a filter key.
    ///
    /// Returns `false` if it was already registered under an equal key.
    pub fn subscribe_filtered(&mut self, key: K, subscriber: Arc<S>) -> bool {
        let exists = self
            .filtered
            .iter()
            .any(|(k, s)| *k == key && Arc::ptr_eq(s, &subscriber));
        if exists {
            return false;
        }
        self.filtered.push((key, subscriber));
        true
    }

    /// Remove every entry, filtered and unfiltered, of a subscriber.
    ///
    /// Returns the number of entries removed.
    pub fn unsubscribe(&mut self, subscriber: &Arc<S>) -> usize {
        let before = self.len();
        self.unfiltered.retain(|s| !Arc::ptr_eq(s, subscriber));
        self.filtered.retain(|(_, s)| !Arc::ptr_eq(s, subscriber));
        before.saturating_sub(self.len())
    }

    /// Remove only the unfiltered entry of a subscriber.
    pub fn unsubscribe_unfiltered(&mut self, subscriber: &Arc<S>) -> bool {
        let before = self.unfiltered.len();
        self.unfiltered.retain(|s| !Arc::ptr_eq(s, subscriber));
        self.unfiltered.len() != before
    }

    /// Remove the entry of a subscriber registered under an equal key.
    pub fn unsubscribe_filtered(&mut self, key: &K, subscriber: &Arc<S>) -> bool {
        let before = self.filtered.len();
        self.filtered
            .retain(|(k, s)| !(k == key && Arc::ptr_eq(s, subscriber)));
        self.filtered.len() != before
    }

    /// Remove the filtered entries of a subscriber whose key matches `probe`.
    ///
    /// Returns the removed keys. Entries under other keys are kept.
    pub fn unsubscribe_matching(&mut self, probe: &K, subscriber: &Arc<S>) -> Vec<K> {
        let matcher = self.matcher;
        let mut removed = Vec::new();
        self.filtered.retain(|(key, s)| {
            let hit = Arc::ptr_eq(s, subscriber) && matcher(key, probe);
            if hit {
                removed.push(key.clone());
            }
            !hit
        });
        removed
    }

    /// Subscribers interested in `probe`.
    ///
    /// Filtered subscribers whose key matches `probe`, plus every unfiltered
    /// subscriber when `include_unfiltered` is set. Each subscriber appears
    /// once even if several of its entries match.
    #[must_use]
    pub fn matching_subscribers(&self, probe: &K, include_unfiltered: bool) -> Vec<Arc<S>> {
        let mut out: Vec<Arc<S>> = Vec::new();
        if include_unfiltered {
            out.extend(self.unfiltered.iter().cloned());
        }
        for (key, subscriber) in &self.filtered {
            if (self.matcher)(key, probe) && !out.iter().any(|s| Arc::ptr_eq(s, subscriber)) {
                out.push(Arc::clone(subscriber));
            }
        }
        out
    }

    /// Filter keys a subscriber is registered under.
    #[must_use]
    pub fn filter_keys_for(&self, subscriber: &Arc<S>) -> Vec<K> {
        self.filtered
            .iter()
            .filter(|(_, s)| Arc::ptr_eq(s, subscriber))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Whether the subscriber holds any entry.
    #[must_use]
    pub fn contains(&self, subscriber: &Arc<S>) -> bool {
        self.unfiltered.iter().any(|s| Arc::ptr_eq(s, subscriber))
            || self.filtered.iter().any(|(_, s)| Arc::ptr_eq(s, subscriber))
    }

    /// Distinct subscribers holding at least one entry.
    #[must_use]
    pub fn subscribers(&self) -> Vec<Arc<S>> {
        let mut out: Vec<Arc<S>> = self.unfiltered.clone();
        for (_, subscriber) in &self.filtered {
            if !out.iter().any(|s| Arc::ptr_eq(s, subscriber)) {
                out.push(Arc::clone(subscriber));
            }
        }
        out
    }

    /// Remove every entry and return the distinct subscribers that held one.
    pub fn clear(&mut self) -> Vec<Arc<S>> {
        let subscribers = self.subscribers();
        self.unfiltered.clear();
        self.filtered.clear();
        subscribers
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.unfiltered.len().saturating_add(self.filtered.len())
    }

    /// Whether the registry holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unfiltered.is_empty() && self.filtered.is_empty()
    }
}

impl<S: ?Sized, K: fmt::Debug> fmt::Debug for FilteredRegistry<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredRegistry")
            .field("unfiltered", &self.unfiltered.len())
            .field(
                "filtered",
                &self.filtered.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .finish()
    }
}
