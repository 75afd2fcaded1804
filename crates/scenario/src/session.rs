//! Cookie-scoped HTTP sessions, one per simulated visitor

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ScenarioResult;

/// What a step observed from the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// An independent browser identity: own cookie jar, redirects never followed.
pub struct Session {
    client: Client,
    base_url: String,
}

impl Session {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> ScenarioResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> ScenarioResult<HttpResponse> {
        debug!("GET {}", path);
        let resp = self.client.get(self.url(path)).send().await?;
        read_response(resp).await
    }

    /// POST `application/x-www-form-urlencoded` fields
    pub async fn post_form<K, V>(&self, path: &str, fields: &[(K, V)]) -> ScenarioResult<HttpResponse>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        debug!("POST {}", path);
        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();
        let resp = self.client.post(self.url(path)).form(&pairs).send().await?;
        read_response(resp).await
    }
}

async fn read_response(resp: Response) -> ScenarioResult<HttpResponse> {
    let status = resp.status().as_u16();
    let location = resp
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await?;
    Ok(HttpResponse {
        status,
        location,
        body,
    })
}
