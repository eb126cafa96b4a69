use async_trait::async_trait;
use cfmetrics_common::error::{ExporterError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{AppInstances, CfApiConfig, normalize_base_url};

const OAUTH_CLIENT_ID: &str = "cf";
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

#[async_trait]
pub trait InstanceResolver: Send + Sync {
    async fn resolve(&self, app_guid: &str) -> Result<AppInstances>;
}

#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Deserialize)]
struct InfoResponse {
    token_endpoint: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct AppResponse {
    entity: AppEntity,
}

#[derive(Deserialize)]
struct AppEntity {
    name: String,
    instances: u32,
}

pub struct CfResolver {
    config: CfApiConfig,
    client: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
}

impl CfResolver {
    pub fn new(config: CfApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()
            .map_err(|err| {
                ExporterError::InvalidConfig(format!("failed to build platform api client: {err}"))
            })?;

        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.value.clone());
        }

        let token = self.login().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn login(&self) -> Result<AccessToken> {
        let info_url = format!("{}/v2/info", self.config.api);
        let info: InfoResponse = self
            .client
            .get(&info_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| resolve_error(format!("failed to query {info_url}: {err}")))?
            .json()
            .await
            .map_err(|err| resolve_error(format!("invalid platform info response: {err}")))?;

        let token_endpoint = normalize_base_url(&info.token_endpoint).map_err(|err| {
            resolve_error(format!("platform advertised bad token endpoint: {err}"))
        })?;
        let token_url = format!("{token_endpoint}/oauth/token");
        let response = self
            .client
            .post(&token_url)
            .basic_auth(OAUTH_CLIENT_ID, Some(""))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "password"),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|err| resolve_error(format!("failed to reach token endpoint: {err}")))?;

        if !response.status().is_success() {
            return Err(resolve_error(format!(
                "token endpoint {token_url} returned status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| resolve_error(format!("invalid token response: {err}")))?;
        let lifetime = token_lifetime_secs(token.expires_in);
        debug!(lifetime_secs = lifetime, "acquired platform api token");

        Ok(AccessToken {
            value: token.access_token,
            expires_at: token_expiry(Utc::now(), lifetime),
        })
    }

    async fn get_app(&self, app_guid: &str, token: &str) -> Result<reqwest::Response> {
        let app_url = format!("{}/v2/apps/{app_guid}", self.config.api);
        self.client
            .get(&app_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| resolve_error(format!("failed to query {app_url}: {err}")))
    }
}

#[async_trait]
impl InstanceResolver for CfResolver {
    async fn resolve(&self, app_guid: &str) -> Result<AppInstances> {
        let token = self.access_token().await?;
        let mut response = self.get_app(app_guid, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("platform api rejected cached token, logging in again");
            self.invalidate_token().await;
            let token = self.access_token().await?;
            response = self.get_app(app_guid, &token).await?;
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(resolve_error(format!("application {app_guid} not found")));
        }
        if !status.is_success() {
            return Err(resolve_error(format!(
                "platform api returned status {status} for application {app_guid}"
            )));
        }

        let app: AppResponse = response
            .json()
            .await
            .map_err(|err| resolve_error(format!("invalid application response: {err}")))?;

        Ok(AppInstances {
            instance_count: app.entity.instances,
            app_name: app.entity.name,
        })
    }
}

fn token_lifetime_secs(expires_in: Option<i64>) -> i64 {
    expires_in
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
        .clamp(0, MAX_TOKEN_LIFETIME_SECS)
        .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
        .max(0)
}

fn token_expiry(now: DateTime<Utc>, lifetime_secs: i64) -> DateTime<Utc> {
    ChronoDuration::try_seconds(lifetime_secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(now)
}

fn resolve_error(message: String) -> ExporterError {
    ExporterError::ResolveFailed(message)
}
