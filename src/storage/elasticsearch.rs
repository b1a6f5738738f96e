use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, instrument};
use url::Url;

use super::{DocumentStore, RefreshTokenDocument, RefreshTokenRecord, StoreError};
use crate::APP_USER_AGENT;

/// Refresh tokens are stored under this key of each document.
const PROVIDER_KEY: &str = "google";

#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: Client,
    url: Url,
    api_key: SecretString,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl ElasticsearchStore {
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid base URL or the HTTP client
    /// cannot be built.
    pub fn new(url: &str, api_key: SecretString) -> Result<Self, StoreError> {
        let url = Url::parse(url)?;
        if url.cannot_be_a_base() {
            return Err(StoreError::Response(format!("{url} is not a base URL")));
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url,
            api_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Response(format!("{} is not a base URL", self.url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorization(&self) -> String {
        format!("ApiKey {}", self.api_key.expose_secret())
    }
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Value = response.json().await.unwrap_or_default();
    let message = body["error"]["type"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error"))
        .to_string();

    Err(StoreError::Status {
        status: status.as_u16(),
        message,
    })
}

fn into_document(hit: Hit) -> Option<RefreshTokenDocument> {
    let google = hit.source.get(PROVIDER_KEY)?;
    let refresh_token = google.get("refresh_token")?.as_str()?.to_string();
    let issued_at = google
        .get("issued_at")
        .and_then(Value::as_str)
        .and_then(|issued| OffsetDateTime::parse(issued, &Rfc3339).ok());

    Some(RefreshTokenDocument {
        id: hit.id,
        refresh_token,
        issued_at,
    })
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    #[instrument(skip(self))]
    async fn search(
        &self,
        index: &str,
        size: usize,
    ) -> Result<Vec<RefreshTokenDocument>, StoreError> {
        let mut url = self.endpoint(&[index, "_search"])?;
        url.query_pairs_mut().append_pair("size", &size.to_string());

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await?;

        let search: SearchResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|err| StoreError::Response(err.to_string()))?;

        let documents: Vec<_> = search.hits.hits.into_iter().filter_map(into_document).collect();
        debug!(documents = documents.len(), "search complete");

        Ok(documents)
    }

    #[instrument(skip(self, record))]
    async fn upsert(
        &self,
        index: &str,
        id: &str,
        record: &RefreshTokenRecord,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&[index, "_update", id])?;

        let payload = json!({
            "doc_as_upsert": true,
            "doc": { PROVIDER_KEY: record },
        });

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.authorization())
            .json(&payload)
            .send()
            .await?;

        check(response).await?;

        Ok(())
    }
}
