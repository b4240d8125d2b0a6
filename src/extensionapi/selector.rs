//! # Selectors
//!
//! Label and field selectors in the Kubernetes query-string syntax.
//!
//! Label selectors support `k=v`, `k==v`, `k!=v`, `k in (a,b)`,
//! `k notin (a,b)`, `k` and `!k`. Field selectors support `f=v`, `f==v`
//! and `f!=v`.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector {selector:?}: {reason}")]
pub struct SelectorParseError {
    pub selector: String,
    pub reason: String,
}

impl SelectorParseError {
    fn new(selector: &str, reason: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRequirement {
    pub key: String,
    pub operator: LabelOperator,
    pub values: Vec<String>,
}

impl LabelRequirement {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: LabelOperator::Equals,
            values: vec![value.into()],
        }
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let got = labels.get(&self.key);
        match self.operator {
            LabelOperator::Equals | LabelOperator::In => {
                got.is_some_and(|v| self.values.iter().any(|w| w == v))
            }
            LabelOperator::NotEquals | LabelOperator::NotIn => {
                got.is_none_or(|v| self.values.iter().all(|w| w != v))
            }
            LabelOperator::Exists => got.is_some(),
            LabelOperator::DoesNotExist => got.is_none(),
        }
    }
}

impl fmt::Display for LabelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            LabelOperator::Equals => write!(f, "{}={}", self.key, self.values.join("")),
            LabelOperator::NotEquals => write!(f, "{}!={}", self.key, self.values.join("")),
            LabelOperator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            LabelOperator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            LabelOperator::Exists => write!(f, "{}", self.key),
            LabelOperator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Conjunction of label requirements; empty selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn parse(selector: &str) -> Result<Self, SelectorParseError> {
        let mut requirements = Vec::new();
        for term in split_terms(selector) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            requirements.push(parse_label_term(selector, term)?);
        }
        Ok(Self { requirements })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    #[must_use]
    pub fn requirements(&self) -> &[LabelRequirement] {
        &self.requirements
    }

    #[must_use]
    pub fn add(mut self, requirement: LabelRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        write!(f, "{}", terms.join(","))
    }
}

/// Commas inside `in (...)` sets do not separate terms.
fn split_terms(selector: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&selector[start..]);
    terms
}

fn parse_label_term(selector: &str, term: &str) -> Result<LabelRequirement, SelectorParseError> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(LabelRequirement {
            key: key.trim().to_string(),
            operator: LabelOperator::DoesNotExist,
            values: Vec::new(),
        });
    }
    for (token, operator) in [(" notin ", LabelOperator::NotIn), (" in ", LabelOperator::In)] {
        if let Some((key, rest)) = term.split_once(token) {
            let rest = rest.trim();
            let inner = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| SelectorParseError::new(selector, "set must be parenthesized"))?;
            let values = inner
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            return Ok(LabelRequirement {
                key: key.trim().to_string(),
                operator,
                values,
            });
        }
    }
    for (token, operator) in [
        ("!=", LabelOperator::NotEquals),
        ("==", LabelOperator::Equals),
        ("=", LabelOperator::Equals),
    ] {
        if let Some((key, value)) = term.split_once(token) {
            let key = key.trim();
            if key.is_empty() {
                return Err(SelectorParseError::new(selector, "empty key"));
            }
            return Ok(LabelRequirement {
                key: key.to_string(),
                operator,
                values: vec![value.trim().to_string()],
            });
        }
    }
    Ok(LabelRequirement {
        key: term.to_string(),
        operator: LabelOperator::Exists,
        values: Vec::new(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperator {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    pub field: String,
    pub operator: FieldOperator,
    pub value: String,
}

impl FieldRequirement {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: FieldOperator::Equals,
            value: value.into(),
        }
    }
}

impl fmt::Display for FieldRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            FieldOperator::Equals => write!(f, "{}={}", self.field, self.value),
            FieldOperator::NotEquals => write!(f, "{}!={}", self.field, self.value),
        }
    }
}

/// Field values of one object, keyed by JSON path such as `metadata.name`.
pub type FieldSet = BTreeMap<String, String>;

/// Build a [`FieldSet`] from `(path, value)` pairs.
#[must_use]
pub fn field_set(pairs: &[(&str, &str)]) -> FieldSet {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Conjunction of field requirements; empty selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn parse(selector: &str) -> Result<Self, SelectorParseError> {
        let mut requirements = Vec::new();
        for term in selector.split(',') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let (field, operator, value) = if let Some((f, v)) = term.split_once("!=") {
                (f, FieldOperator::NotEquals, v)
            } else if let Some((f, v)) = term.split_once("==") {
                (f, FieldOperator::Equals, v)
            } else if let Some((f, v)) = term.split_once('=') {
                (f, FieldOperator::Equals, v)
            } else {
                return Err(SelectorParseError::new(selector, format!("invalid term {term:?}")));
            };
            requirements.push(FieldRequirement {
                field: field.trim().to_string(),
                operator,
                value: value.trim().to_string(),
            });
        }
        Ok(Self { requirements })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    #[must_use]
    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    #[must_use]
    pub fn add(mut self, requirement: FieldRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Keep only the requirements accepted by `keep`.
    #[must_use]
    pub fn retain(mut self, keep: impl Fn(&FieldRequirement) -> bool) -> Self {
        self.requirements.retain(|r| keep(r));
        self
    }

    /// Value required by an exact `field=value` requirement, if any.
    #[must_use]
    pub fn requires_exact_match(&self, field: &str) -> Option<&str> {
        self.requirements
            .iter()
            .find(|r| r.field == field && r.operator == FieldOperator::Equals)
            .map(|r| r.value.as_str())
    }

    /// Fields absent from `fields` match only `!=` requirements.
    #[must_use]
    pub fn matches(&self, fields: &FieldSet) -> bool {
        self.requirements.iter().all(|r| {
            let got = fields.get(&r.field).map(String::as_str);
            match r.operator {
                FieldOperator::Equals => got == Some(r.value.as_str()),
                FieldOperator::NotEquals => got != Some(r.value.as_str()),
            }
        })
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        write!(f, "{}", terms.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_label_selector_parse_and_match() {
        let sel = LabelSelector::parse("resource.walrus.seal.io/type=environments,tier in (a, b),!legacy")
            .unwrap();
        assert_eq!(sel.requirements().len(), 3);
        assert!(sel.matches(&labels(&[
            ("resource.walrus.seal.io/type", "environments"),
            ("tier", "b"),
        ])));
        assert!(!sel.matches(&labels(&[
            ("resource.walrus.seal.io/type", "environments"),
            ("tier", "c"),
        ])));
        assert!(!sel.matches(&labels(&[
            ("resource.walrus.seal.io/type", "environments"),
            ("tier", "a"),
            ("legacy", ""),
        ])));
    }

    #[test]
    fn test_label_selector_not_equals_matches_absent() {
        let sel = LabelSelector::parse("a!=b").unwrap();
        assert!(sel.matches(&labels(&[])));
        assert!(!sel.matches(&labels(&[("a", "b")])));
    }

    #[test]
    fn test_label_selector_display_round_trip() {
        let sel = LabelSelector::everything().add(LabelRequirement::equals("k", "v"));
        assert_eq!(sel.to_string(), "k=v");
        assert_eq!(LabelSelector::parse(&sel.to_string()).unwrap(), sel);
    }

    #[test]
    fn test_field_selector() {
        let sel = FieldSelector::parse("metadata.namespace=acme,metadata.name!=x").unwrap();
        assert!(sel.matches(&field_set(&[("metadata.namespace", "acme"), ("metadata.name", "y")])));
        assert!(!sel.matches(&field_set(&[("metadata.namespace", "acme"), ("metadata.name", "x")])));
        assert_eq!(sel.requires_exact_match("metadata.namespace"), Some("acme"));
        assert_eq!(sel.requires_exact_match("metadata.name"), None);
    }

    #[test]
    fn test_field_selector_rejects_garbage() {
        assert!(FieldSelector::parse("metadata.name").is_err());
    }
}
