//! Short-lived memo of the last tag-store read
//!
//! Coalesces tag reads within one logical operation (a commit touching
//! many items asks the store once) while bounding staleness to a small
//! wall-clock window. The read path clears the memo up front so hits are
//! always validated against fresh versions.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Memo of tag versions from the most recent store read
pub(crate) struct KnownTagVersions {
    versions: BTreeMap<String, Vec<u8>>,
    refreshed_at: Option<Instant>,
    ttl: Duration,
}

impl KnownTagVersions {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            versions: BTreeMap::new(),
            refreshed_at: None,
            ttl,
        }
    }

    fn fresh(&self) -> bool {
        match self.refreshed_at {
            // A zero TTL keeps the set until its one-shot handout
            Some(at) => self.ttl.is_zero() || at.elapsed() <= self.ttl,
            None => false,
        }
    }

    /// Return the memoised versions among `tags`
    ///
    /// A zero TTL makes the memo one-shot: the set is handed out once and
    /// discarded.
    pub(crate) fn lookup(&mut self, tags: &BTreeSet<String>) -> BTreeMap<String, Vec<u8>> {
        if !self.fresh() {
            self.clear();
            return BTreeMap::new();
        }
        let found = tags
            .iter()
            .filter_map(|tag| {
                self.versions
                    .get(tag)
                    .map(|version| (tag.clone(), version.clone()))
            })
            .collect();
        if self.ttl.is_zero() {
            self.clear();
        }
        found
    }

    /// Remember versions from a store read
    ///
    /// The validity window starts at the first read it extends; a stale
    /// memo is dropped rather than merged into.
    pub(crate) fn record(&mut self, versions: &BTreeMap<String, Vec<u8>>) {
        if !self.fresh() {
            self.clear();
        }
        for (tag, version) in versions {
            self.versions.insert(tag.clone(), version.clone());
        }
        if self.refreshed_at.is_none() {
            self.refreshed_at = Some(Instant::now());
        }
    }

    pub(crate) fn clear(&mut self) {
        self.versions.clear();
        self.refreshed_at = None;
    }
}
