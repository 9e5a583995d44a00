//! Reqwest-backed Airtable adapter.
//!
//! Owns transport details only: URL construction, authentication, timeouts,
//! pagination and mapping HTTP failures onto [`ExternalStoreError`].

use std::time::Duration;

use async_trait::async_trait;
use coachsync_core::error::ExternalStoreError;
use coachsync_core::external::{ExternalRecord, ExternalStore, FieldMap};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::dto::{ErrorResponse, ListRecordsResponse, WriteRecordRequest};

/// Default API root.
pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0/";

/// Largest page Airtable serves.
const PAGE_SIZE: &str = "100";

/// Connection settings for one Airtable base.
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    /// API root, normally [`DEFAULT_API_URL`].
    pub api_url: Url,
    /// Base identifier (`app…`).
    pub base_id: String,
    /// Personal access token.
    pub api_key: String,
    /// Upper bound on a single HTTP request.
    pub timeout: Duration,
}

/// Failure to construct an [`AirtableClient`].
#[derive(Debug, thiserror::Error)]
pub enum AirtableClientError {
    /// The API root cannot carry path segments.
    #[error("invalid Airtable API URL: {0}")]
    InvalidApiUrl(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`ExternalStore`] implementation over the Airtable REST API.
#[derive(Debug, Clone)]
pub struct AirtableClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl AirtableClient {
    /// Builds a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AirtableClientError` if the API URL cannot hold a path or the
    /// reqwest client cannot be constructed.
    pub fn new(config: AirtableConfig) -> Result<Self, AirtableClientError> {
        let mut base_url = config.api_url;
        base_url
            .path_segments_mut()
            .map_err(|()| AirtableClientError::InvalidApiUrl(config.base_id.clone()))?
            .pop_if_empty()
            .push(&config.base_id);
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    /// `…/v0/{base}/{table}[/{record}]`, with every segment percent-encoded.
    fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url, ExternalStoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ExternalStoreError::Transport("API URL cannot hold path segments".to_owned())
            })?;
            segments.push(table);
            if let Some(record_id) = record_id {
                segments.push(record_id);
            }
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ExternalStoreError> {
        let response = request
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        serde_json::from_slice(&body).map_err(|error| {
            ExternalStoreError::Decode(format!("invalid Airtable JSON payload: {error}"))
        })
    }
}

#[async_trait]
impl ExternalStore for AirtableClient {
    async fn create_record(
        &self,
        table: &str,
        fields: FieldMap,
    ) -> Result<ExternalRecord, ExternalStoreError> {
        let url = self.table_url(table, None)?;
        let body = WriteRecordRequest {
            fields: &fields,
            typecast: true,
        };
        let record: ExternalRecord = self.send(self.client.post(url).json(&body)).await?;
        debug!(table, record_id = %record.id, "Created Airtable record");
        Ok(record)
    }

    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: FieldMap,
    ) -> Result<ExternalRecord, ExternalStoreError> {
        let url = self.table_url(table, Some(record_id))?;
        let body = WriteRecordRequest {
            fields: &fields,
            typecast: true,
        };
        // PATCH leaves fields absent from the body untouched.
        let record: ExternalRecord = self.send(self.client.patch(url).json(&body)).await?;
        debug!(table, record_id, "Updated Airtable record");
        Ok(record)
    }

    async fn delete_record(&self, table: &str, record_id: &str) -> Result<(), ExternalStoreError> {
        let url = self.table_url(table, Some(record_id))?;
        let _: serde_json::Value = self.send(self.client.delete(url)).await?;
        debug!(table, record_id, "Deleted Airtable record");
        Ok(())
    }

    async fn get_record(
        &self,
        table: &str,
        record_id: &str,
    ) -> Result<Option<ExternalRecord>, ExternalStoreError> {
        let url = self.table_url(table, Some(record_id))?;
        match self.send(self.client.get(url)).await {
            Ok(record) => Ok(Some(record)),
            Err(ExternalStoreError::NotFound) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn list_records(
        &self,
        table: &str,
        filter_formula: Option<&str>,
    ) -> Result<Vec<ExternalRecord>, ExternalStoreError> {
        let url = self.table_url(table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut query: Vec<(&str, &str)> = vec![("pageSize", PAGE_SIZE)];
            if let Some(formula) = filter_formula {
                query.push(("filterByFormula", formula));
            }
            if let Some(offset) = offset.as_deref() {
                query.push(("offset", offset));
            }
            let page: ListRecordsResponse =
                self.send(self.client.get(url.clone()).query(&query)).await?;
            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        debug!(table, count = records.len(), "Listed Airtable records");
        Ok(records)
    }
}

fn map_transport_error(error: reqwest::Error) -> ExternalStoreError {
    if error.is_timeout() {
        ExternalStoreError::Timeout
    } else {
        ExternalStoreError::Transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> ExternalStoreError {
    match status {
        StatusCode::NOT_FOUND => ExternalStoreError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ExternalStoreError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ExternalStoreError::Timeout,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExternalStoreError::Unauthorized {
            status: status.as_u16(),
        },
        _ if status.is_client_error() => ExternalStoreError::Rejected {
            status: status.as_u16(),
            message: error_message(body),
        },
        _ => ExternalStoreError::Unavailable {
            status: status.as_u16(),
        },
    }
}

fn error_message(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    if let Ok(envelope) = serde_json::from_slice::<ErrorResponse>(body) {
        return envelope.error.describe();
    }
    String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(PREVIEW_CHAR_LIMIT)
        .collect()
}
