use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::models::{EventRecord, TripRecord, TripRecordWithEvents};

/// The trips backend as the sync engine sees it.
///
/// Server-side, events are called "items". All calls are independent and
/// none are retried.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// `GET /trips/{user}/all/`: every trip of the user with nested events.
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<TripRecordWithEvents>, RemoteError>;

    /// `GET /trips/{user}/{trip}/`: the events of one trip.
    async fn fetch_events(
        &self,
        user_id: &str,
        trip_id: i64,
    ) -> Result<Vec<EventRecord>, RemoteError>;

    /// `POST /trips/`. The returned record carries the new server id.
    async fn create_trip(&self, trip: &TripRecord) -> Result<TripRecord, RemoteError>;
    /// `PUT /trips/`
    async fn update_trip(&self, trip: &TripRecord) -> Result<(), RemoteError>;
    /// `DELETE /trips/`
    async fn delete_trip(&self, trip_id: i64) -> Result<(), RemoteError>;

    /// `POST /items/`. The returned record carries the new server id.
    async fn create_event(&self, event: &EventRecord) -> Result<EventRecord, RemoteError>;
    /// `PUT /items/`
    async fn update_event(&self, event: &EventRecord) -> Result<(), RemoteError>;
    /// `DELETE /items/`
    async fn delete_event(&self, event_id: i64) -> Result<(), RemoteError>;
}

/// Create endpoints answer with either the record or a one-element list.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    // Tried first: records have all-default fields, so a list would also decode as `One`
    Many(Vec<T>),
    One(T),
}

/// JSON-over-HTTPS client for the trips backend with bearer token auth.
#[derive(Debug, Clone)]
pub struct TripsApiClient {
    base_url: Url,
    auth_token: Option<String>,
    http_client: reqwest::Client,
}

impl TripsApiClient {
    pub fn new(config: &SyncConfig) -> anyhow::Result<Self> {
        Self::with_base_url(
            config.api_url.clone(),
            config.auth_token.clone(),
            config.timeout(),
        )
    }

    pub fn with_base_url(
        base_url: Url,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url,
            auth_token,
            http_client,
        })
    }

    /// Builds `<base>/<segments...>/`, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::MalformedRequest(format!("{} cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>, RemoteError> {
        serde_json::to_vec(body).map_err(|e| RemoteError::MalformedRequest(e.to_string()))
    }

    /// Sends a request and returns the body of a 2xx response
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<String, RemoteError> {
        let token = self
            .auth_token
            .as_deref()
            .ok_or(RemoteError::AuthenticationMissing)?;

        debug!("{} {}", method, url);
        let mut request = self.http_client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, RemoteError> {
        if body.trim().is_empty() {
            return Err(RemoteError::EmptyBody);
        }

        match serde_json::from_str::<T>(body) {
            Ok(value) => Ok(value),
            Err(e) => {
                // Surface the backend's own message when it sent an error object
                if let Ok(error_response) = serde_json::from_str::<serde_json::Value>(body) {
                    if let Some(error_msg) = error_response.get("error") {
                        return Err(RemoteError::Decode(format!("Backend error: {}", error_msg)));
                    } else if let Some(message) = error_response.get("message") {
                        return Err(RemoteError::Decode(format!("Backend message: {}", message)));
                    }
                }
                Err(RemoteError::Decode(format!("{} - Response: {}", e, body)))
            }
        }
    }

    fn decode_created<T: DeserializeOwned>(body: &str) -> Result<T, RemoteError> {
        match Self::decode::<OneOrMany<T>>(body)? {
            OneOrMany::One(record) => Ok(record),
            OneOrMany::Many(records) => records
                .into_iter()
                .next()
                .ok_or_else(|| RemoteError::Unexpected("create returned an empty list".to_string())),
        }
    }
}

#[async_trait]
impl RemoteClient for TripsApiClient {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<TripRecordWithEvents>, RemoteError> {
        let url = self.endpoint(&["trips", user_id, "all"])?;
        let body = self.send(Method::GET, url, None).await?;
        Self::decode(&body)
    }

    async fn fetch_events(
        &self,
        user_id: &str,
        trip_id: i64,
    ) -> Result<Vec<EventRecord>, RemoteError> {
        let trip_id = trip_id.to_string();
        let url = self.endpoint(&["trips", user_id, &trip_id])?;
        let body = self.send(Method::GET, url, None).await?;
        Self::decode(&body)
    }

    async fn create_trip(&self, trip: &TripRecord) -> Result<TripRecord, RemoteError> {
        let url = self.endpoint(&["trips"])?;
        let body = self.send(Method::POST, url, Some(Self::encode(trip)?)).await?;
        Self::decode_created(&body)
    }

    async fn update_trip(&self, trip: &TripRecord) -> Result<(), RemoteError> {
        let url = self.endpoint(&["trips"])?;
        self.send(Method::PUT, url, Some(Self::encode(trip)?)).await?;
        Ok(())
    }

    async fn delete_trip(&self, trip_id: i64) -> Result<(), RemoteError> {
        let url = self.endpoint(&["trips"])?;
        let body = Self::encode(&TripRecord::for_delete(trip_id))?;
        self.send(Method::DELETE, url, Some(body)).await?;
        Ok(())
    }

    async fn create_event(&self, event: &EventRecord) -> Result<EventRecord, RemoteError> {
        let url = self.endpoint(&["items"])?;
        let body = self.send(Method::POST, url, Some(Self::encode(event)?)).await?;
        Self::decode_created(&body)
    }

    async fn update_event(&self, event: &EventRecord) -> Result<(), RemoteError> {
        let url = self.endpoint(&["items"])?;
        self.send(Method::PUT, url, Some(Self::encode(event)?)).await?;
        Ok(())
    }

    async fn delete_event(&self, event_id: i64) -> Result<(), RemoteError> {
        let url = self.endpoint(&["items"])?;
        let body = Self::encode(&EventRecord::for_delete(event_id))?;
        self.send(Method::DELETE, url, Some(body)).await?;
        Ok(())
    }
}
