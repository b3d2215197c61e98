//! REST client for the remote CRM object, search and association APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::collections::HashMap;
use std::time::Duration;

use crm_replica_core::entities::{requested_properties, EntityType, RemotePage};
use crm_replica_core::sync::CrmRemoteTrait;

use crate::error::{CrmClientError, Result};
use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
/// Upper bound on inputs accepted by one batch association read.
const MAX_ASSOCIATION_INPUTS: usize = 1000;

#[derive(Debug, Clone)]
pub struct CrmClientConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl CrmClientConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for the CRM v3 objects and v4 associations APIs.
#[derive(Debug, Clone)]
pub struct CrmApiClient {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl CrmApiClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[CrmClient] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[CrmClient] API response error ({}): {}", status, preview);
    }

    pub fn new(config: CrmClientConfig) -> Result<Self> {
        let token = config.access_token.trim();
        if token.is_empty() {
            return Err(CrmClientError::auth("Missing access token"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| CrmClientError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(CrmClientError::from_response_body(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(
                "[CrmClient] Failed to deserialize response. Body: {}, Error: {}",
                body, e
            );
            CrmClientError::Decode {
                status: status.as_u16(),
                source: e,
            }
        })
    }

    /// GET /crm/v3/objects/{objectType}
    pub async fn list_objects(
        &self,
        entity: EntityType,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ObjectPageResponse> {
        let url = format!("{}/crm/v3/objects/{}", self.base_url, entity.as_str());
        let mut query = vec![
            ("limit", limit.to_string()),
            ("properties", requested_properties(entity).join(",")),
            ("archived", "false".to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        debug!("[CrmClient] Listing {} after {:?}", entity, after);

        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .query(&query)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// POST /crm/v3/objects/{objectType}/search
    pub async fn search_objects(
        &self,
        entity: EntityType,
        request: &SearchRequest,
    ) -> Result<ObjectPageResponse> {
        let url = format!("{}/crm/v3/objects/{}/search", self.base_url, entity.as_str());
        debug!(
            "[CrmClient] Searching {} after {:?}",
            entity, request.after
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// POST /crm/v4/associations/{from}/{to}/batch/read
    ///
    /// A 207 multi-status answer is a success; inputs without links are simply absent.
    pub async fn batch_read_associations(
        &self,
        from: EntityType,
        to: EntityType,
        ids: &[String],
    ) -> Result<BatchAssociationResponse> {
        if ids.is_empty() {
            return Err(CrmClientError::invalid_request(
                "Association batch read needs at least one id",
            ));
        }
        let url = format!(
            "{}/crm/v4/associations/{}/{}/batch/read",
            self.base_url,
            from.as_str(),
            to.as_str()
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&BatchReadRequest::for_ids(ids))
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

fn into_page(response: ObjectPageResponse) -> RemotePage {
    let next_cursor = response.next_cursor();
    RemotePage {
        results: response.results.into_iter().map(Into::into).collect(),
        next_cursor,
    }
}

#[async_trait]
impl CrmRemoteTrait for CrmApiClient {
    async fn list_page(
        &self,
        entity: EntityType,
        page_size: usize,
        after: Option<String>,
    ) -> crm_replica_core::Result<RemotePage> {
        let response = self
            .list_objects(entity, page_size, after.as_deref())
            .await?;
        Ok(into_page(response))
    }

    async fn search_modified_since(
        &self,
        entity: EntityType,
        since: DateTime<Utc>,
        page_size: usize,
        after: Option<String>,
    ) -> crm_replica_core::Result<RemotePage> {
        let request = SearchRequest::modified_since(
            entity.last_modified_property(),
            since,
            requested_properties(entity),
            page_size,
            after,
        );
        let response = self.search_objects(entity, &request).await?;
        Ok(into_page(response))
    }

    async fn read_associations(
        &self,
        from: EntityType,
        to: EntityType,
        ids: &[String],
    ) -> crm_replica_core::Result<HashMap<String, Vec<String>>> {
        let mut links: HashMap<String, Vec<String>> = HashMap::new();
        for chunk in ids.chunks(MAX_ASSOCIATION_INPUTS) {
            let response = self.batch_read_associations(from, to, chunk).await?;
            for result in response.results {
                links
                    .entry(result.from.id)
                    .or_default()
                    .extend(result.to.into_iter().map(|t| t.to_object_id));
            }
        }
        Ok(links)
    }
}
