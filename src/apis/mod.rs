//! # API Types
//!
//! - [`walrus::v1`]: virtual resources served by the extension API server
//! - [`walruscore::v1`]: physical custom resources stored by Kubernetes
//!
//! Most types derive `CustomResource`. Types whose wire shape has no
//! `spec` (such as `ProjectSubjects`) implement [`kube::Resource`] through
//! [`impl_served_resource!`].

pub mod walrus;
pub mod walruscore;

/// Implement [`kube::Resource`] and a `apiVersion`/`kind` stamping
/// `Serialize` for a hand-written served type with a `metadata` field.
///
/// The serialized fields are listed after the kind metadata, in order.
macro_rules! impl_served_resource {
    (
        $ty:ty,
        group = $group:expr,
        kind = $kind:expr,
        plural = $plural:expr,
        scope = $scope:ty,
        fields = [$($field:ident => $wire:literal),* $(,)?] $(,)?
    ) => {
        impl ::kube::Resource for $ty {
            type DynamicType = ();
            type Scope = $scope;

            fn kind(_: &()) -> ::std::borrow::Cow<'_, str> {
                $kind.into()
            }

            fn group(_: &()) -> ::std::borrow::Cow<'_, str> {
                $group.into()
            }

            fn version(_: &()) -> ::std::borrow::Cow<'_, str> {
                $crate::constants::API_VERSION.into()
            }

            fn plural(_: &()) -> ::std::borrow::Cow<'_, str> {
                $plural.into()
            }

            fn meta(&self) -> &::k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ::k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &mut self.metadata
            }
        }

        impl ::serde::Serialize for $ty {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                use ::serde::ser::SerializeStruct;
                let mut st = serializer.serialize_struct($kind, 3 + [$($wire),*].len())?;
                st.serialize_field("apiVersion", &<$ty as ::kube::Resource>::api_version(&()))?;
                st.serialize_field("kind", $kind)?;
                st.serialize_field("metadata", &self.metadata)?;
                $(st.serialize_field($wire, &self.$field)?;)*
                st.end()
            }
        }
    };
}

pub(crate) use impl_served_resource;
