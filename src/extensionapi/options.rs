//! Verb options passed from the HTTP layer through the operations to
//! handlers and clients.

use serde::{Deserialize, Serialize};

use super::selector::{FieldSelector, LabelSelector};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub dry_run: bool,
    pub field_manager: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub dry_run: bool,
    pub field_manager: Option<String>,
}

impl From<&UpdateOptions> for CreateOptions {
    fn from(opts: &UpdateOptions) -> Self {
        Self {
            dry_run: opts.dry_run,
            field_manager: opts.field_manager.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationPolicy {
    Orphan,
    Background,
    Foreground,
}

impl PropagationPolicy {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Orphan" => Some(Self::Orphan),
            "Background" => Some(Self::Background),
            "Foreground" => Some(Self::Foreground),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub dry_run: bool,
    pub grace_period_seconds: Option<i64>,
    pub propagation_policy: Option<PropagationPolicy>,
}

impl DeleteOptions {
    /// Options with an immediate grace period.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            grace_period_seconds: Some(0),
            ..Self::default()
        }
    }

    /// Deletes run asynchronously unless the caller asks for orphaning or
    /// foreground propagation.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.propagation_policy.unwrap_or(PropagationPolicy::Background)
            == PropagationPolicy::Background
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub namespace: Option<String>,
    pub label_selector: LabelSelector,
    pub field_selector: FieldSelector,
    pub limit: Option<i64>,
    pub continue_token: Option<String>,
    pub resource_version: Option<String>,
    pub resource_version_match: Option<String>,
    pub allow_watch_bookmarks: bool,
}

impl ListOptions {
    /// Default options of list and watch requests.
    #[must_use]
    pub fn from_zero() -> Self {
        Self {
            resource_version: Some("0".to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty()).map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_label_selector(mut self, selector: LabelSelector) -> Self {
        self.label_selector = selector;
        self
    }

    #[must_use]
    pub fn with_field_selector(mut self, selector: FieldSelector) -> Self {
        self.field_selector = selector;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_is_async_by_default() {
        assert!(DeleteOptions::default().is_async());
        assert!(DeleteOptions::immediate().is_async());
        let foreground = DeleteOptions {
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..DeleteOptions::default()
        };
        assert!(!foreground.is_async());
    }

    #[test]
    fn test_create_options_from_update_options() {
        let opts = UpdateOptions {
            dry_run: true,
            field_manager: Some("kubectl".to_string()),
        };
        let created = CreateOptions::from(&opts);
        assert!(created.dry_run);
        assert_eq!(created.field_manager.as_deref(), Some("kubectl"));
    }
}
