//! # System Metadata
//!
//! Marks physical objects (Namespaces, Secrets, ClusterRoles, ...) with the
//! virtual resource they back.
//!
//! - The type lives in the `resource.walrus.seal.io/type` label.
//! - Structured fields of the virtual resource live as string notes in
//!   `note.walrus.seal.io/<key>` annotations.
//! - The `walrus.seal.io/controlled` finalizer locks an object against
//!   deletion until Walrus releases it.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;

use crate::constants::{CONTROLLED_FINALIZER, RESOURCE_NOTE_ANNOTATION_PREFIX, RESOURCE_TYPE_LABEL};
use crate::extensionapi::{LabelRequirement, LabelSelector};

/// Notes of a resource keyed without the annotation prefix.
pub type ResourceNotes = BTreeMap<String, String>;

fn note_key(annotation: &str) -> Option<&str> {
    annotation.strip_prefix(RESOURCE_NOTE_ANNOTATION_PREFIX)
}

fn annotation_key(note: &str) -> String {
    format!("{RESOURCE_NOTE_ANNOTATION_PREFIX}{note}")
}

/// Stamp the resource type label and merge `notes` into the annotations.
pub fn note_resource<K: Resource>(obj: &mut K, resource_type: &str, notes: ResourceNotes) {
    let meta = obj.meta_mut();
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(RESOURCE_TYPE_LABEL.to_string(), resource_type.to_string());
    if notes.is_empty() {
        return;
    }
    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
    for (k, v) in notes {
        annotations.insert(annotation_key(&k), v);
    }
}

/// Resource type and every note of the object.
pub fn describe_resource<K: Resource>(obj: &K) -> (String, ResourceNotes) {
    (describe_resource_type(obj).to_string(), notes_of(obj.meta()))
}

/// Resource type of the object, empty when unmarked.
pub fn describe_resource_type<K: Resource>(obj: &K) -> &str {
    obj.meta()
        .labels
        .as_ref()
        .and_then(|ls| ls.get(RESOURCE_TYPE_LABEL))
        .map_or("", String::as_str)
}

/// Note `key` of the object, empty when absent.
pub fn describe_resource_note<'a, K: Resource>(obj: &'a K, key: &str) -> &'a str {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|as_| as_.get(&annotation_key(key)))
        .map_or("", String::as_str)
}

/// The subset of notes named by `keys`; missing keys are left out.
pub fn describe_resource_notes<K: Resource>(obj: &K, keys: &[&str]) -> ResourceNotes {
    let mut notes = notes_of(obj.meta());
    notes.retain(|k, _| keys.contains(&k.as_str()));
    notes
}

fn notes_of(meta: &ObjectMeta) -> ResourceNotes {
    meta.annotations
        .iter()
        .flatten()
        .filter_map(|(k, v)| note_key(k).map(|k| (k.to_string(), v.clone())))
        .collect()
}

/// Like [`describe_resource`], but strips the type label and every note
/// from the object.
pub fn unnote_resource<K: Resource>(obj: &mut K) -> (String, ResourceNotes) {
    let meta = obj.meta_mut();
    let resource_type = meta
        .labels
        .as_mut()
        .and_then(|ls| ls.remove(RESOURCE_TYPE_LABEL))
        .unwrap_or_default();

    let mut notes = ResourceNotes::new();
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.retain(|k, v| match note_key(k) {
            Some(key) => {
                notes.insert(key.to_string(), std::mem::take(v));
                false
            }
            None => true,
        });
    }
    (resource_type, notes)
}

/// Remove note `key`, returning its value or empty when absent.
pub fn pop_resource_note<K: Resource>(obj: &mut K, key: &str) -> String {
    obj.meta_mut()
        .annotations
        .as_mut()
        .and_then(|as_| as_.remove(&annotation_key(key)))
        .unwrap_or_default()
}

/// Remove the notes named by `keys`, returning the removed ones.
pub fn pop_resource_notes<K: Resource>(obj: &mut K, keys: &[&str]) -> ResourceNotes {
    keys.iter()
        .filter_map(|key| {
            obj.meta_mut()
                .annotations
                .as_mut()
                .and_then(|as_| as_.remove(&annotation_key(key)))
                .map(|v| (key.to_string(), v))
        })
        .collect()
}

/// Label selector matching physical objects backing `resource_type`.
#[must_use]
pub fn resources_label_selector_of(resource_type: &str) -> LabelSelector {
    LabelSelector::everything().add(LabelRequirement::equals(RESOURCE_TYPE_LABEL, resource_type))
}

/// Whether every `(key, value)` note matches; an absent note matches the
/// empty value.
pub fn match_resource_by_notes<K: Resource>(obj: &K, notes: &[(&str, &str)]) -> bool {
    notes
        .iter()
        .all(|(k, v)| describe_resource_note(obj, k) == *v)
}

/// Whether the object backs `resource_type` and matches `notes`.
pub fn match_resource<K: Resource>(obj: &K, resource_type: &str, notes: &[(&str, &str)]) -> bool {
    describe_resource_type(obj) == resource_type && match_resource_by_notes(obj, notes)
}

/// Keep only the objects matching `notes`.
pub fn filter_resource_list_by_notes<K: Resource>(items: Vec<K>, notes: &[(&str, &str)]) -> Vec<K> {
    items
        .into_iter()
        .filter(|obj| match_resource_by_notes(obj, notes))
        .collect()
}

/// Add the controlled finalizer; returns whether it was missing.
pub fn lock<K: Resource>(obj: &mut K) -> bool {
    let finalizers = obj.meta_mut().finalizers.get_or_insert_with(Vec::new);
    if finalizers.iter().any(|f| f == CONTROLLED_FINALIZER) {
        return false;
    }
    finalizers.push(CONTROLLED_FINALIZER.to_string());
    true
}

/// Remove the controlled finalizer; returns whether it was present.
pub fn unlock<K: Resource>(obj: &mut K) -> bool {
    let Some(finalizers) = obj.meta_mut().finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != CONTROLLED_FINALIZER);
    before != finalizers.len()
}

#[must_use]
pub fn is_locked<K: Resource>(obj: &K) -> bool {
    obj.meta()
        .finalizers
        .iter()
        .flatten()
        .any(|f| f == CONTROLLED_FINALIZER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Namespace;

    fn notes(pairs: &[(&str, &str)]) -> ResourceNotes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_note_and_describe() {
        let mut ns = Namespace::default();
        note_resource(&mut ns, "environments", notes(&[("type", "development"), ("displayName", "Dev")]));

        assert_eq!(describe_resource_type(&ns), "environments");
        assert_eq!(describe_resource_note(&ns, "type"), "development");
        assert_eq!(describe_resource_note(&ns, "missing"), "");
        assert_eq!(
            ns.metadata.annotations.as_ref().unwrap()["note.walrus.seal.io/displayName"],
            "Dev"
        );

        let (resource_type, all) = describe_resource(&ns);
        assert_eq!(resource_type, "environments");
        assert_eq!(all.len(), 2);
        assert_eq!(describe_resource_notes(&ns, &["type", "missing"]), notes(&[("type", "development")]));
    }

    #[test]
    fn test_unnote_keeps_foreign_metadata() {
        let mut ns = Namespace::default();
        ns.metadata.labels = Some(notes(&[("team", "a")]));
        ns.metadata.annotations = Some(notes(&[("owner", "b")]));
        note_resource(&mut ns, "projects", notes(&[("description", "d")]));

        let (resource_type, removed) = unnote_resource(&mut ns);
        assert_eq!(resource_type, "projects");
        assert_eq!(removed, notes(&[("description", "d")]));
        assert_eq!(ns.metadata.labels, Some(notes(&[("team", "a")])));
        assert_eq!(ns.metadata.annotations, Some(notes(&[("owner", "b")])));
    }

    #[test]
    fn test_pop_notes() {
        let mut ns = Namespace::default();
        note_resource(&mut ns, "variables", notes(&[("a-uid", "1"), ("a-sensitive", "true"), ("b-uid", "2")]));

        assert_eq!(pop_resource_note(&mut ns, "a-uid"), "1");
        assert_eq!(pop_resource_note(&mut ns, "a-uid"), "");
        assert_eq!(
            pop_resource_notes(&mut ns, &["a-sensitive", "a-create-at"]),
            notes(&[("a-sensitive", "true")])
        );
        assert_eq!(describe_resource_note(&ns, "b-uid"), "2");
    }

    #[test]
    fn test_match_resource() {
        let mut ns = Namespace::default();
        note_resource(&mut ns, "rolebindings", notes(&[("project", "acme")]));

        assert!(match_resource(&ns, "rolebindings", &[("project", "acme")]));
        assert!(!match_resource(&ns, "roles", &[("project", "acme")]));
        assert!(match_resource_by_notes(&ns, &[("environment", "")]));
        assert!(!match_resource_by_notes(&ns, &[("project", "other")]));

        let kept = filter_resource_list_by_notes(vec![ns.clone(), Namespace::default()], &[("project", "acme")]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_lock_unlock() {
        let mut ns = Namespace::default();
        assert!(!is_locked(&ns));
        assert!(lock(&mut ns));
        assert!(!lock(&mut ns));
        assert!(is_locked(&ns));
        assert!(unlock(&mut ns));
        assert!(!unlock(&mut ns));
        assert!(!is_locked(&ns));
    }

    #[test]
    fn test_resources_label_selector() {
        let selector = resources_label_selector_of("settings");
        assert_eq!(selector.to_string(), "resource.walrus.seal.io/type=settings");
        assert!(selector.matches(&notes(&[("resource.walrus.seal.io/type", "settings")])));
    }
}
