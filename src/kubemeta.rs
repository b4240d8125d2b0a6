//! # Object Metadata Helpers
//!
//! Owner references, timestamps and identity helpers over `ObjectMeta`,
//! plus text access to Secret data.
//!
//! `k8s-openapi` carries timestamps in its own `Time` type; everything in
//! this crate works with `chrono`, bridged here through the RFC 3339 wire
//! form both sides agree on.

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use k8s_openapi::ByteString;
use kube::Resource;

/// Current time as a Kubernetes timestamp.
#[must_use]
pub fn now() -> Option<Time> {
    time_from(Utc::now())
}

/// Kubernetes timestamp of the given instant, truncated to seconds.
#[must_use]
pub fn time_from(at: DateTime<Utc>) -> Option<Time> {
    let wire = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(wire)).ok()
}

/// Parse an RFC 3339 string into a Kubernetes timestamp.
#[must_use]
pub fn time_parse(rfc3339: &str) -> Option<Time> {
    DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .and_then(|at| time_from(at.with_timezone(&Utc)))
}

/// RFC 3339 rendering of a Kubernetes timestamp.
#[must_use]
pub fn time_format(time: &Time) -> Option<String> {
    match serde_json::to_value(time).ok()? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

/// `chrono` view of a Kubernetes timestamp.
#[must_use]
pub fn time_to_chrono(time: &Time) -> Option<DateTime<Utc>> {
    let s = time_format(time)?;
    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Fill the fields the server owns on creation.
pub fn fill_system_fields(meta: &mut ObjectMeta) {
    meta.creation_timestamp = now();
    meta.uid = Some(uuid::Uuid::new_v4().to_string());
}

const NAME_SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const NAME_SUFFIX_LENGTH: usize = 5;
const MAX_GENERATED_NAME_LENGTH: usize = 63 - NAME_SUFFIX_LENGTH;

/// `base` followed by a short random suffix.
#[must_use]
pub fn generate_name(base: &str) -> String {
    let base: String = base.chars().take(MAX_GENERATED_NAME_LENGTH).collect();
    let entropy = uuid::Uuid::new_v4();
    let suffix: String = entropy
        .as_bytes()
        .iter()
        .take(NAME_SUFFIX_LENGTH)
        .map(|b| char::from(NAME_SUFFIX_ALPHABET[usize::from(*b) % NAME_SUFFIX_ALPHABET.len()]))
        .collect();
    format!("{base}{suffix}")
}

/// UID stable across restarts, derived from a name.
#[must_use]
pub fn stable_uid(name: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Mark `obj` as controlled by `owner`.
///
/// Any existing controller reference is replaced; other owner references
/// are kept.
pub fn control_on<K: Resource, O: Resource<DynamicType = ()>>(obj: &mut K, owner: &O) {
    control_on_with(
        obj,
        &O::api_version(&()),
        &O::kind(&()),
        owner.meta().name.as_deref().unwrap_or_default(),
        owner.meta().uid.as_deref().unwrap_or_default(),
    );
}

/// [`control_on`] for an owner known only by its identity.
pub fn control_on_with<K: Resource>(obj: &mut K, api_version: &str, kind: &str, name: &str, uid: &str) {
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.controller != Some(true));
    refs.push(OwnerReference {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    });
}

/// Controller reference of `obj`, if any.
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

/// Controller reference of `obj` matching the given API version and kind.
pub fn controller_of_kind<'a, K: Resource>(
    obj: &'a K,
    api_version: &str,
    kind: &str,
) -> Option<&'a OwnerReference> {
    controller_of(obj).filter(|r| r.api_version == api_version && r.kind == kind)
}

/// Value of Secret data `key` as text.
#[must_use]
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()?
        .get(key)
        .map(|v| String::from_utf8_lossy(&v.0).into_owned())
}

/// Keys of the Secret data, sorted.
#[must_use]
pub fn secret_keys(secret: &Secret) -> Vec<&str> {
    secret.data.iter().flatten().map(|(k, _)| k.as_str()).collect()
}

pub fn set_secret_value(secret: &mut Secret, key: &str, value: &str) {
    secret
        .data
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), ByteString(value.as_bytes().to_vec()));
}

/// Remove Secret data `key`; returns whether it was present.
pub fn remove_secret_value(secret: &mut Secret, key: &str) -> bool {
    secret.data.as_mut().is_some_and(|data| data.remove(key).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Namespace;

    #[test]
    fn test_time_round_trip() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);
        let time = time_from(at).unwrap();
        assert_eq!(time_format(&time).as_deref(), Some("2024-03-01T10:20:30Z"));
        assert_eq!(time_to_chrono(&time), Some(at));
    }

    #[test]
    fn test_generate_name() {
        let name = generate_name("acme-");
        assert!(name.starts_with("acme-"));
        assert_eq!(name.len(), 10);
        assert_ne!(generate_name("acme-"), generate_name("acme-"));
    }

    #[test]
    fn test_stable_uid() {
        assert_eq!(stable_uid("a"), stable_uid("a"));
        assert_ne!(stable_uid("a"), stable_uid("b"));
    }

    #[test]
    fn test_control_on_replaces_controller() {
        let mut ns = Namespace::default();
        control_on_with(&mut ns, "walrus.seal.io/v1", "Project", "a", "1");
        control_on_with(&mut ns, "walrus.seal.io/v1", "Project", "b", "2");
        let refs = ns.metadata.owner_references.as_ref().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(controller_of(&ns).unwrap().name, "b");
        assert!(controller_of_kind(&ns, "walrus.seal.io/v1", "Project").is_some());
        assert!(controller_of_kind(&ns, "walrus.seal.io/v1", "Environment").is_none());
    }

    #[test]
    fn test_secret_values() {
        let mut secret = Secret::default();
        assert_eq!(secret_value(&secret, "a"), None);
        assert!(!remove_secret_value(&mut secret, "a"));

        set_secret_value(&mut secret, "b", "2");
        set_secret_value(&mut secret, "a", "1");
        assert_eq!(secret_value(&secret, "a").as_deref(), Some("1"));
        assert_eq!(secret_keys(&secret), vec!["a", "b"]);
        assert!(remove_secret_value(&mut secret, "a"));
        assert_eq!(secret_keys(&secret), vec!["b"]);
    }
}
