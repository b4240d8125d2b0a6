//! Virtual resources of the `walrus.seal.io` group.

pub mod v1;
