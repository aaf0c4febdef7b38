//! WHO ICD-11 terminology lookup.
//!
//! A lookup authenticates with the OAuth client-credentials flow, runs a free-text entity
//! search, and fetches the detail record of the first destination entity. Bearer tokens are
//! cached until shortly before they expire.
//!
//! Entity ids in search results are `http://id.who.int/...` URIs. Only their trailing code
//! segment is used; the detail request always goes to the configured API base so the bearer
//! token never leaves that host.

mod types;

pub use types::{CodeLookup, IcdCode, IcdError};

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use types::{EntityDetail, SearchResponse, TokenResponse};

const TOKEN_SCOPE: &str = "icdapi_access";
const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);
const FALLBACK_DESCRIPTION: &str = "No description available";

/// Resolves free-text condition names to ICD codes.
#[async_trait]
pub trait CodingLookup: Send + Sync {
    /// Look up `condition`, distinguishing "no match" from a failed round trip.
    async fn lookup(&self, condition: &str) -> Result<CodeLookup, IcdError>;
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// HTTP client for the WHO ICD API.
pub struct IcdClient {
    http: Client,
    api_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl IcdClient {
    /// Build a client for the given endpoints and credentials.
    pub fn new(
        api_url: &str,
        token_url: &str,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, IcdError> {
        for url in [api_url, token_url] {
            reqwest::Url::parse(url).map_err(|err| IcdError::InvalidUrl(format!("{url}: {err}")))?;
        }
        let http = Client::builder()
            .user_agent("mednotes/icd")
            .timeout(timeout)
            .build()?;
        tracing::debug!(api_url, token_url, "Initialized ICD HTTP client");
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    /// Build a client from configuration.
    pub fn from_config(config: &Config) -> Result<Self, IcdError> {
        Self::new(
            &config.icd_api_url,
            &config.icd_token_url,
            config.icd_client_id.clone(),
            config.icd_client_secret.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    /// Return a bearer token, exchanging client credentials only when the cached one has expired.
    pub async fn get_token(&self) -> Result<String, IcdError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", TOKEN_SCOPE),
        ];
        let response = self.http.post(&self.token_url).form(&form).send().await?;
        let TokenResponse {
            access_token,
            expires_in,
        } = decode(response).await?;

        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_SAFETY_MARGIN);
        *cached = Some(CachedToken {
            value: access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(expires_in, "Obtained ICD access token");
        Ok(access_token)
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header("Accept", "application/json")
            .header("Accept-Language", "en")
            .header("API-version", "v2")
    }
}

#[async_trait]
impl CodingLookup for IcdClient {
    async fn lookup(&self, condition: &str) -> Result<CodeLookup, IcdError> {
        let query = condition.trim();
        if query.is_empty() {
            return Ok(CodeLookup::NotFound);
        }

        let token = self.get_token().await?;

        let search = self.authorized(
            self.http
                .get(format!("{}/search", self.api_url))
                .query(&[
                    ("q", query),
                    ("useFlexisearch", "true"),
                    ("flatResults", "false"),
                ]),
            &token,
        );
        let SearchResponse {
            destination_entities,
        } = decode(search.send().await?).await?;

        let Some(entity) = destination_entities.and_then(|entities| entities.into_iter().next())
        else {
            tracing::debug!(condition = query, "No ICD entity matched");
            return Ok(CodeLookup::NotFound);
        };

        let code = entity
            .id
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if code.is_empty() {
            return Err(IcdError::Decode(format!(
                "entity id without code segment: {}",
                entity.id
            )));
        }

        let detail_url = format!("{}/{}", self.api_url, code);
        let detail: EntityDetail =
            decode(self.authorized(self.http.get(&detail_url), &token).send().await?).await?;
        let description = detail
            .title
            .and_then(|title| title.value)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());

        tracing::debug!(condition = query, code = %code, "Resolved ICD code");
        Ok(CodeLookup::Found(IcdCode { code, description }))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, IcdError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let error = IcdError::UnexpectedStatus { status, body };
        tracing::warn!(error = %error, "ICD request failed");
        return Err(error);
    }
    serde_json::from_str(&body).map_err(|error| IcdError::Decode(error.to_string()))
}
