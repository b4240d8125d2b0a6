//! Physical resources of the `walruscore.seal.io` group.

pub mod v1;
