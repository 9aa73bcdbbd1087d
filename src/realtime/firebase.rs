//! Firebase Realtime Database over its REST API
//!
//! Every path maps to `{base}/{path}.json`, segment by segment. The database secret (or ID token)
//! rides along as the `auth` query parameter, so request errors are stripped
//! of their URL before they are logged or returned.

use reqwest::{Method, RequestBuilder, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use super::{segments, StateStore};
use crate::services::http_client;
use crate::types::{IrrigationError, Result};

pub struct FirebaseStateStore {
    base_url: String,
    auth: Option<String>,
    http_client: reqwest::Client,
}

impl FirebaseStateStore {
    pub fn new(base_url: &str, auth: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http_client: http_client(timeout),
        }
    }

    /// Each segment is percent-encoded on its own; `.json` goes on the last one
    fn url(&self, path: &str) -> Result<Url> {
        let invalid = || IrrigationError::Config(format!("Invalid Firebase URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;

        let parts: Vec<&str> = segments(path).collect();
        {
            let mut out = url.path_segments_mut().map_err(|_| invalid())?;
            out.pop_if_empty();
            match parts.split_last() {
                Some((last, parents)) => {
                    out.extend(parents);
                    out.push(&format!("{last}.json"));
                }
                None => {
                    out.push(".json");
                }
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let builder = self.http_client.request(method, self.url(path)?);
        Ok(match &self.auth {
            Some(auth) => builder.query(&[("auth", auth)]),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Value> {
        let response = builder.send().await.map_err(|e| e.without_url())?;
        let status = response.status();
        if !status.is_success() {
            return Err(IrrigationError::Upstream(format!(
                "Firebase returned {} for {}",
                status, path
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| IrrigationError::Upstream(format!("Invalid Firebase response: {}", e.without_url())))
    }
}

#[async_trait::async_trait]
impl StateStore for FirebaseStateStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        debug!(path, "Firebase GET");
        let value = self.send(self.request(Method::GET, path)?, path).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        debug!(path, "Firebase PUT");
        self.send(self.request(Method::PUT, path)?.json(&value), path)
            .await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        debug!(path, "Firebase PATCH");
        self.send(self.request(Method::PATCH, path)?.json(&fields), path)
            .await?;
        Ok(())
    }

    async fn increment(&self, path: &str, field: &str, by: i64) -> Result<()> {
        // Server-side increment, atomic across concurrent writers
        let body = json!({ field: { ".sv": { "increment": by } } });
        debug!(path, field, by, "Firebase increment");
        self.send(self.request(Method::PATCH, path)?.json(&body), path)
            .await?;
        Ok(())
    }
}
