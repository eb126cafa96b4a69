use std::time::Duration;

use cfmetrics_common::error::{ExporterError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInstances {
    pub instance_count: u32,
    pub app_name: String,
}

#[derive(Clone)]
pub struct CfApiConfig {
    pub api: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub skip_tls_verify: bool,
}

impl CfApiConfig {
    pub fn new(
        api: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api: normalize_base_url(api)?,
            username: username.into(),
            password: password.into(),
            timeout,
            skip_tls_verify: false,
        })
    }
}

impl std::fmt::Debug for CfApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CfApiConfig")
            .field("api", &self.api)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub metrics_url: String,
    pub timeout: Duration,
    pub skip_tls_verify: bool,
}

impl FetcherConfig {
    pub fn from_route(app_route: &str, metrics_path: &str, timeout: Duration) -> Result<Self> {
        let base = normalize_base_url(&ensure_https_scheme(app_route))?;
        let path = metrics_path.trim();
        let metrics_url = if path.is_empty() {
            base
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };

        url::Url::parse(&metrics_url).map_err(|err| {
            ExporterError::InvalidConfig(format!("invalid metrics url {metrics_url}: {err}"))
        })?;

        Ok(Self {
            metrics_url,
            timeout,
            skip_tls_verify: false,
        })
    }
}

fn ensure_https_scheme(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

pub(crate) fn normalize_base_url(endpoint: &str) -> Result<String> {
    let normalized = endpoint.trim().trim_end_matches('/').to_string();
    let parsed = url::Url::parse(&normalized)
        .map_err(|err| ExporterError::InvalidConfig(format!("invalid url {normalized:?}: {err}")))?;
    if parsed.host_str().is_none() {
        return Err(ExporterError::InvalidConfig(format!(
            "url {normalized:?} has no host"
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_hostname_becomes_https_metrics_url() {
        let config =
            FetcherConfig::from_route("myapp.apps.example.com", "/metrics", Duration::from_secs(5))
                .unwrap();
        assert_eq!(config.metrics_url, "https://myapp.apps.example.com/metrics");
    }

    #[test]
    fn full_url_route_is_kept() {
        let config =
            FetcherConfig::from_route("http://127.0.0.1:8081/", "prom", Duration::from_secs(1))
                .unwrap();
        assert_eq!(config.metrics_url, "http://127.0.0.1:8081/prom");
    }

    #[test]
    fn api_address_is_validated() {
        assert!(CfApiConfig::new("not a url", "u", "p", Duration::from_secs(1)).is_err());
        let config =
            CfApiConfig::new("https://api.sys.example.com/", "u", "p", Duration::from_secs(1))
                .unwrap();
        assert_eq!(config.api, "https://api.sys.example.com");
        assert!(!format!("{config:?}").contains("\"p\""));
    }
}
