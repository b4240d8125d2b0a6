//! # Watch Bookmark
//!
//! Tracks the highest resource version observed by a watch stream.
//!
//! Kubernetes resource versions are decimal strings whose order must be
//! decided by length first and lexicographically second, so `"10"` is
//! newer than `"9"`.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

/// Order two resource versions.
#[must_use]
pub fn compare_resource_versions(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Shared cell holding the highest resource version observed so far.
///
/// Clones share the same cell; [`WatchBookmark::deep_copy`] produces an
/// independent one for a new watch session.
#[derive(Debug, Clone, Default)]
pub struct WatchBookmark {
    resource_version: Arc<Mutex<String>>,
}

impl WatchBookmark {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `new_rv` if it is strictly newer than the current value and
    /// report whether it was stored.
    pub fn swap_resource_version(&self, new_rv: &str) -> bool {
        let mut current = self
            .resource_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if compare_resource_versions(&current, new_rv) != Ordering::Less {
            return false;
        }
        new_rv.clone_into(&mut current);
        true
    }

    #[must_use]
    pub fn resource_version(&self) -> String {
        self.resource_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Independent bookmark starting at the current value.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            resource_version: Arc::new(Mutex::new(self.resource_version())),
        }
    }
}

/// Sort objects by resource version, oldest first.
pub fn sort_by_resource_version<K: kube::Resource>(items: &mut [K]) {
    items.sort_by(|a, b| {
        compare_resource_versions(
            a.meta().resource_version.as_deref().unwrap_or_default(),
            b.meta().resource_version.as_deref().unwrap_or_default(),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_orders_by_length_first() {
        let bm = WatchBookmark::new();
        assert!(bm.swap_resource_version("9"));
        assert!(bm.swap_resource_version("10"));
        assert_eq!(bm.resource_version(), "10");
    }

    #[test]
    fn test_swap_rejects_older() {
        let bm = WatchBookmark::new();
        assert!(bm.swap_resource_version("10"));
        assert!(!bm.swap_resource_version("9"));
        assert_eq!(bm.resource_version(), "10");
    }

    #[test]
    fn test_swap_rejects_equal() {
        let bm = WatchBookmark::new();
        assert!(bm.swap_resource_version("42"));
        assert!(!bm.swap_resource_version("42"));
    }

    #[test]
    fn test_swap_same_length_lexicographic() {
        let bm = WatchBookmark::new();
        assert!(bm.swap_resource_version("15"));
        assert!(!bm.swap_resource_version("14"));
        assert!(bm.swap_resource_version("16"));
    }

    #[test]
    fn test_empty_never_swaps_in() {
        let bm = WatchBookmark::new();
        assert!(!bm.swap_resource_version(""));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let bm = WatchBookmark::new();
        bm.swap_resource_version("5");
        let copy = bm.deep_copy();
        assert!(copy.swap_resource_version("6"));
        assert_eq!(bm.resource_version(), "5");
        assert_eq!(copy.resource_version(), "6");

        let shared = bm.clone();
        shared.swap_resource_version("7");
        assert_eq!(bm.resource_version(), "7");
    }

    #[test]
    fn test_concurrent_swaps_keep_maximum() {
        let bm = WatchBookmark::new();
        let handles: Vec<_> = (1..=64)
            .map(|i| {
                let bm = bm.clone();
                std::thread::spawn(move || {
                    bm.swap_resource_version(&i.to_string());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(bm.resource_version(), "64");
    }
}
