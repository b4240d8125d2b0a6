//! # Setting Admissions
//!
//! Checks a new setting value against the old one before it is written.
//!
//! Admissions compose with [`Admission::all`]: the first rejection wins,
//! and [`Admission::AllowBlank`] accepts a blank value without running the
//! checks after it.

use chrono::Utc;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The value is accepted without further checks.
    #[error("admission skipped")]
    Skipped,
    #[error("{0}")]
    Rejected(String),
}

fn reject(message: impl Into<String>) -> AdmissionError {
    AdmissionError::Rejected(message.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Any value.
    Allow,
    /// No value; the setting cannot be modified.
    Disallow,
    /// A blank value, skipping the remaining checks.
    AllowBlank,
    /// Only non-blank values.
    DisallowBlank,
    /// Any value while the old one is blank.
    AllowOnceConfigure,
    Boolean,
    Int64,
    Uint64,
    Float64,
    /// A URL of any scheme.
    Url,
    /// A URL of one of the schemes.
    UrlWithSchema(&'static [&'static str]),
    CronExpression,
    /// A cron expression whose runs are at least the duration apart.
    CronExpressionAtLeast(Duration),
    /// A registry host with an optional port and path.
    ContainerRegistry,
    /// An image reference such as `docker.io/library/nginx:1.25`.
    ContainerImageReference,
    /// Every admission in order.
    All(Vec<Admission>),
}

impl Admission {
    /// Compose admissions; an empty list allows everything.
    #[must_use]
    pub fn all(admissions: Vec<Admission>) -> Self {
        if admissions.is_empty() {
            return Self::Allow;
        }
        Self::All(admissions)
    }

    /// Admit changing `old` into `new`.
    pub fn admit(&self, old: &str, new: &str) -> Result<(), AdmissionError> {
        match self.check(old, new) {
            Err(AdmissionError::Skipped) => Ok(()),
            other => other,
        }
    }

    fn check(&self, old: &str, new: &str) -> Result<(), AdmissionError> {
        match self {
            Self::Allow => Ok(()),
            Self::Disallow => Err(reject("cannot modify")),
            Self::AllowBlank => {
                if is_blank(new) {
                    Err(AdmissionError::Skipped)
                } else {
                    Ok(())
                }
            }
            Self::DisallowBlank => {
                if is_blank(new) {
                    Err(reject("blank value"))
                } else {
                    Ok(())
                }
            }
            Self::AllowOnceConfigure => {
                if is_blank(old) {
                    Ok(())
                } else {
                    Err(reject("already configured"))
                }
            }
            Self::Boolean => parse_bool(new)
                .map(|_| ())
                .ok_or_else(|| reject(format!("parsing {new:?}: invalid syntax"))),
            Self::Int64 => parse_as::<i64>(new),
            Self::Uint64 => parse_as::<u64>(new),
            Self::Float64 => parse_as::<f64>(new),
            Self::Url => check_url(new, &[]),
            Self::UrlWithSchema(schemes) => check_url(new, schemes),
            Self::CronExpression => parse_cron(new).map(|_| ()),
            Self::CronExpressionAtLeast(at_least) => check_cron_interval(new, *at_least),
            Self::ContainerRegistry => {
                if CONTAINER_REGISTRY.is_match(new) {
                    Ok(())
                } else {
                    Err(reject(format!("invalid container registry: {new:?}")))
                }
            }
            Self::ContainerImageReference => {
                if IMAGE_REFERENCE.is_match(new) {
                    Ok(())
                } else {
                    Err(reject(format!("invalid reference format: {new:?}")))
                }
            }
            Self::All(admissions) => admissions.iter().try_for_each(|a| a.check(old, new)),
        }
    }
}

/// Blank values are empty, `{}` or `[]`, ignoring surrounding spaces.
#[must_use]
pub fn is_blank(value: &str) -> bool {
    matches!(value.trim(), "" | "{}" | "[]")
}

/// Boolean spellings accepted by setting values.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_as<T: FromStr>(value: &str) -> Result<(), AdmissionError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map(|_| ())
        .map_err(|e| reject(format!("parsing {value:?}: {e}")))
}

fn check_url(value: &str, schemes: &[&str]) -> Result<(), AdmissionError> {
    let url = url::Url::parse(value).map_err(|e| reject(format!("{value} is illegal URL format: {e}")))?;
    if schemes.is_empty() || schemes.iter().any(|s| url.scheme().eq_ignore_ascii_case(s)) {
        return Ok(());
    }
    Err(reject(format!(
        "invalid schema: {:?}, allowed: {}",
        url.scheme(),
        schemes.join(", ")
    )))
}

/// Parse a cron expression with an optional seconds field; `?` reads as
/// `*`.
fn parse_cron(value: &str) -> Result<cron::Schedule, AdmissionError> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => return Err(reject(format!("expected 5 to 7 fields, found {n}: {value:?}"))),
    };
    cron::Schedule::from_str(&normalized.replace('?', "*"))
        .map_err(|e| reject(format!("invalid cron expression {value:?}: {e}")))
}

fn check_cron_interval(value: &str, at_least: Duration) -> Result<(), AdmissionError> {
    let schedule = parse_cron(value)?;
    let mut upcoming = schedule.upcoming(Utc);
    let (Some(next), Some(after)) = (upcoming.next(), upcoming.next()) else {
        return Err(reject(format!("cron expression {value:?} never fires twice")));
    };
    let interval = (after - next).to_std().unwrap_or_default();
    if interval < at_least {
        return Err(reject(format!(
            "cron expression {value:?} is too short, at least {at_least:?}"
        )));
    }
    Ok(())
}

static CONTAINER_REGISTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]{1,5})?(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")
        .expect("container registry pattern is valid")
});

static IMAGE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?/)?",
        r"[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*",
        r"(?::[\w][\w.-]{0,127})?",
        r"(?:@[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,})?$",
    ))
    .expect("image reference pattern is valid")
});

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(admission: &Admission, new: &str) -> bool {
        admission.admit("", new).is_ok()
    }

    #[test]
    fn test_blank_admissions() {
        let proxy = Admission::all(vec![Admission::AllowBlank, Admission::UrlWithSchema(&["http", "https"])]);
        assert!(admitted(&proxy, ""));
        assert!(admitted(&proxy, " {} "));
        assert!(admitted(&proxy, "http://proxy:3128"));
        assert!(!admitted(&proxy, "ftp://proxy"));

        let required = Admission::all(vec![Admission::DisallowBlank, Admission::UrlWithSchema(&["https"])]);
        assert_eq!(required.admit("", "[]"), Err(AdmissionError::Rejected("blank value".to_string())));
    }

    #[test]
    fn test_url_schema_error_lists_allowed() {
        let err = Admission::UrlWithSchema(&["s3"]).admit("", "https://bucket").unwrap_err();
        assert_eq!(err.to_string(), "invalid schema: \"https\", allowed: s3");
        assert!(!admitted(&Admission::Url, "http://host:70000"));
        assert!(admitted(&Admission::Url, "file:///tmp/ui"));
    }

    #[test]
    fn test_disallow_and_once() {
        assert_eq!(
            Admission::Disallow.admit("a", "b").unwrap_err().to_string(),
            "cannot modify"
        );
        assert!(Admission::AllowOnceConfigure.admit("", "x").is_ok());
        assert!(Admission::AllowOnceConfigure.admit("{}", "x").is_ok());
        assert!(Admission::AllowOnceConfigure.admit("x", "y").is_err());
        assert!(Admission::all(Vec::new()).admit("x", "anything").is_ok());
    }

    #[test]
    fn test_numeric_admissions() {
        assert!(admitted(&Admission::Boolean, "True"));
        assert!(!admitted(&Admission::Boolean, "yes"));
        assert!(admitted(&Admission::Int64, "-3"));
        assert!(!admitted(&Admission::Uint64, "-3"));
        assert!(admitted(&Admission::Float64, "2.5"));
        assert!(!admitted(&Admission::Float64, "two"));
    }

    #[test]
    fn test_cron_admissions() {
        let at_least_minute = Admission::CronExpressionAtLeast(Duration::from_secs(60));
        assert!(admitted(&at_least_minute, "0 */5 * ? * *"));
        assert!(admitted(&at_least_minute, "*/5 * * * *"));
        assert!(!admitted(&at_least_minute, "*/30 * * ? * *"));
        assert!(!admitted(&Admission::CronExpression, "every minute"));
        assert!(admitted(&Admission::CronExpression, "0 0 1 * * *"));
    }

    #[test]
    fn test_container_admissions() {
        assert!(admitted(&Admission::ContainerRegistry, "docker.io"));
        assert!(admitted(&Admission::ContainerRegistry, "registry.local:5000/mirror"));
        assert!(!admitted(&Admission::ContainerRegistry, "https://docker.io"));

        assert!(admitted(&Admission::ContainerImageReference, "sealio/terraform-deployer:v1.5.7-seal.1"));
        assert!(admitted(&Admission::ContainerImageReference, "registry.local:5000/a/b@sha256:0123456789abcdef0123456789abcdef"));
        assert!(!admitted(&Admission::ContainerImageReference, "Sealio/Deployer"));
    }
}
