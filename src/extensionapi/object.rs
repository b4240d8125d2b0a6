//! Object and list abstractions shared by the storage operations.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use kube::Resource;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

/// Any typed Kubernetes-style object the storage layer can carry.
pub trait ApiObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> ApiObject for T where
    T: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Objects exposing a `status` subresource.
pub trait HasStatusSubresource: ApiObject {
    type Status: Clone + PartialEq + Send + Sync;

    fn status(&self) -> Option<&Self::Status>;

    fn set_status(&mut self, status: Option<Self::Status>);
}

/// Typed list of `K`, serialized as `<Kind>List`.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectList<K> {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default = "Vec::new")]
    pub items: Vec<K>,
}

impl<K> Default for ObjectList<K> {
    fn default() -> Self {
        Self {
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }
}

impl<K> ObjectList<K> {
    #[must_use]
    pub fn new(items: Vec<K>) -> Self {
        Self {
            metadata: ListMeta::default(),
            items,
        }
    }

    #[must_use]
    pub fn continue_token(&self) -> Option<&str> {
        self.metadata.continue_.as_deref().filter(|c| !c.is_empty())
    }

    pub fn map<T>(self, f: impl FnMut(K) -> T) -> ObjectList<T> {
        ObjectList {
            metadata: self.metadata,
            items: self.items.into_iter().map(f).collect(),
        }
    }

    pub fn filter_map<T>(self, f: impl FnMut(K) -> Option<T>) -> ObjectList<T> {
        ObjectList {
            metadata: self.metadata,
            items: self.items.into_iter().filter_map(f).collect(),
        }
    }
}

impl<K: ApiObject> Serialize for ObjectList<K> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut st = serializer.serialize_struct("ObjectList", 4)?;
        st.serialize_field("apiVersion", &K::api_version(&()))?;
        st.serialize_field("kind", &format!("{}List", K::kind(&())))?;
        st.serialize_field("metadata", &self.metadata)?;
        st.serialize_field("items", &self.items)?;
        st.end()
    }
}

/// Name of an object, empty when unset.
pub fn name_of<K: Resource>(obj: &K) -> &str {
    obj.meta().name.as_deref().unwrap_or_default()
}

/// Namespace of an object, empty when unset.
pub fn namespace_of<K: Resource>(obj: &K) -> &str {
    obj.meta().namespace.as_deref().unwrap_or_default()
}

/// Resource version of an object, empty when unset.
pub fn resource_version_of<K: Resource>(obj: &K) -> &str {
    obj.meta().resource_version.as_deref().unwrap_or_default()
}
