//! # Walrus
//!
//! Kubernetes extension API storage layer. Serves the `walrus.seal.io/v1`
//! resources by projecting them onto Namespaces, Secrets and RBAC objects,
//! and proxying the `walruscore.seal.io/v1` custom resources.
//!
//! ## Overview
//!
//! - **Projects and Environments** are Namespaces labelled with their resource type
//! - **Settings** are keys of the `walrus-settings` Secret in the system namespace
//! - **Variables** are keys of the `walrus-variables` Secret of a project, an environment
//!   or the system namespace
//! - **Project subjects** are ClusterRoleBindings onto the project roles
//! - **Catalogs, Connectors, Resources, Templates, ...** are served as-is from walruscore
//!
//! [`extensionapi`] holds the generic storage framework, [`extensionapis`]
//! the per-resource handlers, and [`server`] mounts them over HTTP.

pub mod apis;
pub mod backoff;
pub mod client;
pub mod config;
pub mod constants;
pub mod context;
pub mod controllers;
pub mod extensionapi;
pub mod extensionapis;
pub mod kubemeta;
pub mod observability;
pub mod server;
pub mod systemauthz;
pub mod systemmeta;
pub mod systemsetting;
