//! Settings shipped with the server.

use std::time::Duration;

use super::admission::Admission;
use super::initializer::Initializer;
use super::{Setting, SettingProps};

const PROXY_SCHEMES: &[&str] = &["http", "https"];

fn proxy(name: &'static str, env: &'static str, description: &'static str, schemes: &'static [&'static str]) -> Setting {
    Setting::new(
        name,
        description,
        SettingProps::EDITABLE,
        Initializer::from_specified_env(env, ""),
        Admission::all(vec![Admission::AllowBlank, Admission::UrlWithSchema(schemes)]),
    )
}

fn switch(name: &'static str, description: &'static str) -> Setting {
    Setting::new(
        name,
        description,
        SettingProps::EDITABLE,
        Initializer::from("true"),
        Admission::Boolean,
    )
}

fn cron(name: &'static str, description: &'static str, default: &str, at_least: Duration) -> Setting {
    Setting::new(
        name,
        description,
        SettingProps::EDITABLE,
        Initializer::from(default),
        Admission::CronExpressionAtLeast(at_least),
    )
}

/// Every built-in setting, in registration order.
pub(super) fn settings() -> Vec<Setting> {
    vec![
        proxy(
            "deployer-http-proxy",
            "HTTP_PROXY",
            "The HTTP proxy used by deployers to reach the internet.",
            PROXY_SCHEMES,
        ),
        proxy(
            "deployer-https-proxy",
            "HTTPS_PROXY",
            "The HTTPS proxy used by deployers to reach the internet.",
            PROXY_SCHEMES,
        ),
        proxy(
            "deployer-all-proxy",
            "ALL_PROXY",
            "The SOCKS proxy used by deployers for every protocol.",
            &["sock4", "sock5"],
        ),
        Setting::new(
            "deployer-no-proxy",
            "Hosts that deployers reach without going through the proxies.",
            SettingProps::EDITABLE,
            Initializer::from_specified_env("NO_PROXY", ""),
            Admission::Allow,
        ),
        Setting::new(
            "terraform-deployer-image",
            "The container image of the Terraform deployer.",
            SettingProps::EDITABLE,
            Initializer::from_env("sealio/terraform-deployer:v1.5.7-seal.1"),
            Admission::all(vec![Admission::DisallowBlank, Admission::ContainerImageReference]),
        ),
        Setting::new(
            "terraform-deployer-network-mirror-url",
            "The network mirror the Terraform deployer installs providers from.",
            SettingProps::EDITABLE,
            Initializer::from_env(""),
            Admission::all(vec![Admission::AllowBlank, Admission::UrlWithSchema(&["https"])]),
        ),
        Setting::new(
            "serve-identify",
            "The identity of this deployment.",
            SettingProps::PRIVATE,
            Initializer::RandomHex,
            Admission::Disallow,
        ),
        Setting::new(
            "serve-ui-url",
            "The address the UI is loaded from.",
            SettingProps::PRIVATE,
            Initializer::from_env("https://walrus-ui-1303613262.cos.ap-guangzhou.myqcloud.com/latest/index.html"),
            Admission::all(vec![Admission::DisallowBlank, Admission::UrlWithSchema(&["https", "file"])]),
        ),
        Setting::new(
            "serve-walrus-files-url",
            "The repository walrus files are loaded from.",
            SettingProps::EDITABLE,
            Initializer::from("https://github.com/seal-io/walrus-file-hub"),
            Admission::all(vec![
                Admission::DisallowBlank,
                Admission::UrlWithSchema(&["http", "https", "file"]),
            ]),
        ),
        Setting::new(
            "serve-url",
            "The external address of the server, used by deployers to call back.",
            SettingProps::EDITABLE,
            Initializer::from_env(""),
            Admission::all(vec![Admission::DisallowBlank, Admission::UrlWithSchema(&["https"])]),
        ),
        Setting::new(
            "serve-object-storage-url",
            "The S3 compatible object storage holding deployment state.",
            SettingProps::EDITABLE | SettingProps::SENSITIVE,
            Initializer::from_env(""),
            Admission::all(vec![Admission::DisallowBlank, Admission::UrlWithSchema(&["s3"])]),
        ),
        switch("enable-telemetry", "Send anonymous usage statistics."),
        switch("enable-sync-catalog", "Synchronize catalogs periodically."),
        switch("enable-builtin-catalog", "Install the builtin catalog."),
        switch("enable-remote-tls-verify", "Verify TLS certificates of remote services."),
        Setting::new(
            "image-registry",
            "The registry deployer images are pulled from.",
            SettingProps::EDITABLE,
            Initializer::from("docker.io"),
            Admission::all(vec![Admission::AllowBlank, Admission::ContainerRegistry]),
        ),
        Setting::new(
            "default-environment-mode",
            "The mode of environments created without one.",
            SettingProps::PRIVATE,
            Initializer::from("kubernetes"),
            Admission::Disallow,
        ),
        cron(
            "connector-status-sync-cron",
            "Cron expression of connector status synchronization.",
            "0 */5 * ? * *",
            Duration::from_secs(60),
        ),
        cron(
            "catalog-sync-cron",
            "Cron expression of catalog synchronization.",
            "0 0 1 * * *",
            Duration::from_secs(30 * 60),
        ),
        cron(
            "resource-relationship-check-cron",
            "Cron expression of resource relationship checks.",
            "*/30 * * ? * *",
            Duration::from_secs(60),
        ),
        cron(
            "resource-component-status-sync-cron",
            "Cron expression of resource component status synchronization.",
            "0 */1 * ? * *",
            Duration::from_secs(30),
        ),
        cron(
            "telemetry-report-cron",
            "Cron expression of telemetry reports.",
            "0 0 2 * * *",
            Duration::from_secs(60 * 60),
        ),
    ]
}
