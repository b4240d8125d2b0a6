//! Resource version ordering of watch bookmarks.

use walrus::extensionapi::{compare_resource_versions, WatchBookmark};

#[test]
fn bookmark_only_moves_forward() {
    let bookmark = WatchBookmark::new();
    assert_eq!(bookmark.resource_version(), "");

    assert!(bookmark.swap_resource_version("9"));
    assert!(bookmark.swap_resource_version("10"));
    assert_eq!(bookmark.resource_version(), "10");

    // Older and equal versions are rejected.
    assert!(!bookmark.swap_resource_version("9"));
    assert!(!bookmark.swap_resource_version("10"));
    assert_eq!(bookmark.resource_version(), "10");
}

#[test]
fn copies_are_independent() {
    let bookmark = WatchBookmark::new();
    bookmark.swap_resource_version("5");
    let copy = bookmark.deep_copy();
    assert!(bookmark.swap_resource_version("6"));
    assert_eq!(copy.resource_version(), "5");
}

#[test]
fn longer_versions_sort_later() {
    use std::cmp::Ordering;
    assert_eq!(compare_resource_versions("10", "9"), Ordering::Greater);
    assert_eq!(compare_resource_versions("123", "124"), Ordering::Less);
    assert_eq!(compare_resource_versions("7", "7"), Ordering::Equal);
}
