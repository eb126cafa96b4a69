use std::time::Duration;

use cfmetrics_collector::AggregatorSettings;
use cfmetrics_common::error::{ExporterError, Result};
use cfmetrics_platform::{CfApiConfig, FetcherConfig};
use clap::Parser;

#[derive(Parser, Clone)]
#[command(
    name = "cfmetrics",
    about = "Aggregates per-instance Prometheus metrics of a Cloud Foundry application"
)]
pub struct Cli {
    #[arg(long, env = "API")]
    pub api: String,

    #[arg(long, env = "APP_GUID")]
    pub app_guid: String,

    #[arg(long, env = "APP_ROUTE")]
    pub app_route: String,

    #[arg(long, env = "METRICS_PATH", default_value = "/metrics")]
    pub metrics_path: String,

    #[arg(long, env = "CF_USER")]
    pub cf_user: String,

    #[arg(long, env = "CF_PASS", hide_env_values = true)]
    pub cf_pass: String,

    #[arg(long, env = "ORG_NAME")]
    pub org_name: String,

    #[arg(long, env = "SPACE_NAME")]
    pub space_name: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    #[arg(long, env = "COLLECT_INTERVAL_SECS", default_value = "30")]
    pub collect_interval_secs: u64,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "10")]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "RESOLVE_TIMEOUT_SECS", default_value = "10")]
    pub resolve_timeout_secs: u64,

    #[arg(long, env = "CYCLE_TIMEOUT_SECS", default_value = "25")]
    pub cycle_timeout_secs: u64,

    #[arg(long, env = "MAX_CONCURRENT_FETCHES", default_value = "8")]
    pub max_concurrent_fetches: usize,

    #[arg(long, env = "SKIP_TLS_VERIFY", default_value_t = false)]
    pub skip_tls_verify: bool,
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub listen_addr: String,
    pub collect_interval: Duration,
    pub platform: CfApiConfig,
    pub fetcher: FetcherConfig,
    pub aggregator: AggregatorSettings,
}

impl ExporterConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        require_positive("collect interval", cli.collect_interval_secs)?;
        require_positive("fetch timeout", cli.fetch_timeout_secs)?;
        require_positive("resolve timeout", cli.resolve_timeout_secs)?;
        require_positive("cycle timeout", cli.cycle_timeout_secs)?;
        if cli.max_concurrent_fetches == 0 {
            return Err(ExporterError::InvalidConfig(
                "max concurrent fetches must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("app guid", &cli.app_guid),
            ("org name", &cli.org_name),
            ("space name", &cli.space_name),
        ] {
            if value.trim().is_empty() {
                return Err(ExporterError::InvalidConfig(format!("{name} must not be empty")));
            }
        }

        let mut platform = CfApiConfig::new(
            &cli.api,
            cli.cf_user,
            cli.cf_pass,
            Duration::from_secs(cli.resolve_timeout_secs),
        )?;
        platform.skip_tls_verify = cli.skip_tls_verify;

        let mut fetcher = FetcherConfig::from_route(
            &cli.app_route,
            &cli.metrics_path,
            Duration::from_secs(cli.fetch_timeout_secs),
        )?;
        fetcher.skip_tls_verify = cli.skip_tls_verify;

        let mut aggregator = AggregatorSettings::new(
            cli.app_guid.trim(),
            cli.org_name.as_str(),
            cli.space_name.as_str(),
        );
        aggregator.max_concurrent_fetches = cli.max_concurrent_fetches;
        aggregator.cycle_timeout = Duration::from_secs(cli.cycle_timeout_secs);
        aggregator.resolve_timeout = Duration::from_secs(cli.resolve_timeout_secs);

        Ok(Self {
            listen_addr: format!("{}:{}", cli.host, cli.port),
            collect_interval: Duration::from_secs(cli.collect_interval_secs),
            platform,
            fetcher,
            aggregator,
        })
    }
}

fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(ExporterError::InvalidConfig(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(())
}
