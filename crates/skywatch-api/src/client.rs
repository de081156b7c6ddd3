// Alert backend HTTP client
//
// Wraps `reqwest::Client` with URL construction for the alert endpoints
// and strict response decoding. Query responses are decoded item by item
// so a single malformed record does not poison a whole poll.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::{AlertPayload, AlertQuery, AlertStatsResponse, decode_alert_value};
use crate::transport::TransportConfig;

/// HTTP client for the alert query, resolve and stats endpoints.
#[derive(Debug, Clone)]
pub struct AlertClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AlertClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the backend root, e.g. `http://localhost:8000`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/{path}`, preserving any path prefix on the base.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/api/{path}"))?)
    }

    /// Build `{base}/api/alerts/{id}/resolve` with `id` as one encoded
    /// path segment.
    pub(crate) fn resolve_url(&self, id: &str) -> Result<Url, Error> {
        let mut url = self.api_url("alerts")?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .push(id)
            .push("resolve");
        Ok(url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// List alerts, newest first.
    ///
    /// `GET /api/alerts/?alert_type=&city=&resolved=&hours=&limit=`
    pub async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<AlertPayload>, Error> {
        let url = self.api_url("alerts/")?;
        debug!(?query, "listing alerts");

        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(Error::Transport)?;

        let items: Vec<serde_json::Value> = Self::parse_json(resp).await?;
        let total = items.len();

        let alerts: Vec<AlertPayload> = items
            .into_iter()
            .filter_map(|item| match decode_alert_value(item) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(error = %e, "dropping malformed alert from query response");
                    None
                }
            })
            .collect();

        if alerts.len() != total {
            debug!(kept = alerts.len(), total, "query response partially decoded");
        }

        Ok(alerts)
    }

    /// Mark an alert as resolved. Idempotent on the backend.
    ///
    /// `PUT /api/alerts/{id}/resolve`
    pub async fn resolve_alert(&self, id: &str) -> Result<(), Error> {
        let url = self.resolve_url(id)?;
        debug!(id, "resolving alert");

        let resp = self.http.put(url).send().await.map_err(Error::Transport)?;
        let status = resp.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound { id: id.to_owned() });
        }
        if !status.is_success() {
            return Err(Self::status_error(resp).await);
        }
        Ok(())
    }

    /// Aggregate alert counts over the trailing window.
    ///
    /// `GET /api/alerts/stats?hours={hours}`
    pub async fn alert_stats(&self, hours: u32) -> Result<AlertStatsResponse, Error> {
        let url = self.api_url("alerts/stats")?;
        debug!(hours, "fetching alert stats");

        let resp = self
            .http
            .get(url)
            .query(&[("hours", hours)])
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::parse_json(resp).await
    }

    // ── Response helpers ─────────────────────────────────────────────

    async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        if !resp.status().is_success() {
            return Err(Self::status_error(resp).await);
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }

    async fn status_error(resp: reqwest::Response) -> Error {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        // FastAPI-style `{"detail": "..."}` bodies carry the useful message.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or_else(|| body.chars().take(200).collect());

        Error::Api { status, message }
    }
}
