use async_trait::async_trait;
use bytes::Bytes;
use cfmetrics_common::{
    error::{ExporterError, Result},
    identity::instance_id,
};

use crate::types::FetcherConfig;

pub const INSTANCE_HEADER: &str = "X-Cf-App-Instance";

#[async_trait]
pub trait InstanceFetcher: Send + Sync {
    async fn fetch(&self, app_guid: &str, instance: u32) -> Result<Bytes>;
}

pub struct HttpInstanceFetcher {
    config: FetcherConfig,
    client: reqwest::Client,
}

impl HttpInstanceFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()
            .map_err(|err| {
                ExporterError::InvalidConfig(format!("failed to build metrics client: {err}"))
            })?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl InstanceFetcher for HttpInstanceFetcher {
    async fn fetch(&self, app_guid: &str, instance: u32) -> Result<Bytes> {
        let fetch_error = |cause: String| ExporterError::FetchFailed { instance, cause };

        let response = self
            .client
            .get(&self.config.metrics_url)
            .header(INSTANCE_HEADER, instance_id(app_guid, instance))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    fetch_error(format!("timed out after {:?}", self.config.timeout))
                } else {
                    fetch_error(format!("request to {} failed: {err}", self.config.metrics_url))
                }
            })?;

        if !response.status().is_success() {
            return Err(fetch_error(format!(
                "{} returned status {}",
                self.config.metrics_url,
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|err| fetch_error(format!("failed to read metrics body: {err}")))
    }
}
