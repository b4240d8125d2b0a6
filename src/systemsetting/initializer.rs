//! Initial values of settings.

use crate::config::env_var_non_empty;
use crate::constants::SETTING_ENV_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    /// A fixed value.
    From(String),
    /// `WALRUS_SETTING_<NAME>` when set, else the default.
    FromEnv { default: String },
    /// The named environment variable when set, else the default.
    FromSpecifiedEnv { env: &'static str, default: String },
    /// A random hex string, generated on every call.
    RandomHex,
}

impl Initializer {
    pub fn from(value: impl Into<String>) -> Self {
        Self::From(value.into())
    }

    pub fn from_env(default: impl Into<String>) -> Self {
        Self::FromEnv {
            default: default.into(),
        }
    }

    pub fn from_specified_env(env: &'static str, default: impl Into<String>) -> Self {
        Self::FromSpecifiedEnv {
            env,
            default: default.into(),
        }
    }

    /// The initial value of the setting `name`.
    #[must_use]
    pub fn initial(&self, name: &str) -> String {
        match self {
            Self::From(value) => value.clone(),
            Self::FromEnv { default } => {
                env_var_non_empty(&setting_env_name(name)).unwrap_or_else(|| default.clone())
            }
            Self::FromSpecifiedEnv { env, default } => {
                env_var_non_empty(env).unwrap_or_else(|| default.clone())
            }
            Self::RandomHex => uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Environment variable overriding the initial value of `name`, e.g.
/// `WALRUS_SETTING_SERVE_URL` for `serve-url`.
#[must_use]
pub fn setting_env_name(name: &str) -> String {
    format!(
        "{SETTING_ENV_PREFIX}{}",
        name.replace(['-', '.'], "_").to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_env_name() {
        assert_eq!(setting_env_name("deployer-http-proxy"), "WALRUS_SETTING_DEPLOYER_HTTP_PROXY");
    }

    #[test]
    fn test_initial_values() {
        assert_eq!(Initializer::from("true").initial("enable-telemetry"), "true");
        assert_eq!(
            Initializer::from_env("fallback").initial("walrus-test-unset-setting"),
            "fallback"
        );
        assert_eq!(
            Initializer::from_specified_env("WALRUS_TEST_UNSET_PROXY_ENV", "").initial("deployer-http-proxy"),
            ""
        );

        let a = Initializer::RandomHex.initial("serve-identify");
        assert_eq!(a.len(), 32);
        assert_ne!(a, Initializer::RandomHex.initial("serve-identify"));
    }
}
