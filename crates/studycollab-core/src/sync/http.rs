//! PostgREST-style HTTP remote store.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::remote::{RemoteError, RemoteResult, RemoteStore};
use crate::auth::Identity;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{EffectiveConnection, NetworkStatus};
use crate::util::{compact_text, millis_to_rfc3339};

/// Remote store backed by a Supabase REST endpoint (`/rest/v1/{table}`)
#[derive(Clone)]
pub struct HttpRemoteStore {
    rest_url: String,
    anon_key: String,
    access_token: String,
    timeout_ms: u64,
    client: Client,
}

impl fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(config: &RemoteConfig, identity: &Identity, timeout: Duration) -> Result<Self> {
        let (Some(url), Some(anon_key)) = (&config.supabase_url, &config.supabase_anon_key) else {
            return Err(Error::Config(
                "remote.supabase_url and remote.supabase_anon_key are required".to_string(),
            ));
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            rest_url: rest_url(url),
            anon_key: anon_key.clone(),
            access_token: identity.access_token.clone(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(
            status.as_u16(),
            parse_api_error(status, &body),
        ))
    }

    async fn rows(&self, request: RequestBuilder) -> RemoteResult<Vec<Value>> {
        let response = self.send(request).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|error| RemoteError::Unknown(format!("invalid response body: {error}")))
    }

    fn transport_error(&self, error: &reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout(self.timeout_ms)
        } else {
            RemoteError::Network(compact_text(&error.to_string()))
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn create(&self, table: &str, data: &Value) -> RemoteResult<Value> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(data);
        let rows = self.rows(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::Unknown("insert returned no rows".to_string()))
    }

    async fn update(&self, table: &str, id: &str, data: &Value) -> RemoteResult<Value> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(data);
        let rows = self.rows(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("{table}/{id}")))
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))]);
        self.send(request).await?;
        Ok(())
    }

    async fn fetch(&self, table: &str, id: &str) -> RemoteResult<Option<Value>> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn fetch_since(
        &self,
        table: &str,
        user_id: &str,
        since: Option<i64>,
    ) -> RemoteResult<Vec<Value>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "updated_at.asc".to_string()),
        ];
        if let Some(since) = since {
            query.push(("updated_at", format!("gt.{}", millis_to_rfc3339(since))));
        }
        let request = self.client.get(self.table_url(table)).query(&query);
        self.rows(request).await
    }

    async fn probe(&self) -> RemoteResult<NetworkStatus> {
        let started = Instant::now();
        match self.authorized(self.client.head(&self.rest_url)).send().await {
            Ok(_) => {
                let rtt_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                Ok(NetworkStatus {
                    online: true,
                    effective_type: effective_type_for_rtt(rtt_ms),
                    downlink_mbps: None,
                    rtt_ms: Some(rtt_ms),
                    save_data: false,
                })
            }
            Err(error) => {
                tracing::debug!("Connectivity probe failed: {}", error);
                Ok(NetworkStatus::offline())
            }
        }
    }
}

/// Connection class from a measured round trip, using the Network
/// Information API thresholds.
pub const fn effective_type_for_rtt(rtt_ms: u64) -> EffectiveConnection {
    if rtt_ms >= 2_000 {
        EffectiveConnection::Slow2g
    } else if rtt_ms >= 1_400 {
        EffectiveConnection::TwoG
    } else if rtt_ms >= 270 {
        EffectiveConnection::ThreeG
    } else {
        EffectiveConnection::FourG
    }
}

fn rest_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with("/rest/v1") {
        base.to_string()
    } else {
        format!("{base}/rest/v1")
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    details: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return match payload.details {
                Some(details) if !details.trim().is_empty() => format!(
                    "{}: {} ({})",
                    message.trim(),
                    compact_text(&details),
                    status.as_u16()
                ),
                _ => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
