//! Company search connector (Serper-compatible web search API)

use super::{with_retry, CompanySearch, ConnectorResult, SearchHit};
use crate::config::SearchConfig;
use crate::errors::ConnectorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "search";

pub struct SerperClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    num: usize,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
}

#[derive(Deserialize)]
struct SerperHit {
    title: String,
    link: Option<String>,
    snippet: Option<String>,
    #[serde(default)]
    position: usize,
}

impl SerperClient {
    pub fn new(config: &SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client with static options");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_results: config.max_results,
            max_retries: 2,
        }
    }

    async fn fetch(&self, query: &str, location: Option<&str>) -> ConnectorResult<Vec<SearchHit>> {
        // missing credentials fail fast, before any network attempt
        let api_key = self.api_key.as_deref().ok_or_else(|| ConnectorError::Config {
            message: "search api key not configured".to_string(),
        })?;

        let url = format!("{}/search", self.base_url);
        let request = SerperRequest {
            q: query,
            gl: "br",
            hl: "pt-br",
            location,
            num: self.max_results,
        };

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ConnectorError::from_reqwest(SERVICE, e))?;

        match response.status().as_u16() {
            200 => {}
            401 | 403 => {
                return Err(ConnectorError::Unauthorized {
                    service: SERVICE.to_string(),
                })
            }
            status => {
                return Err(ConnectorError::ServiceUnavailable {
                    service: SERVICE.to_string(),
                    message: format!("HTTP {status}"),
                })
            }
        }

        let body: SerperResponse =
            response
                .json()
                .await
                .map_err(|e| ConnectorError::MalformedResponse {
                    service: SERVICE.to_string(),
                    message: e.to_string(),
                })?;

        // no hits is a valid empty outcome
        Ok(body
            .organic
            .into_iter()
            .take(self.max_results)
            .enumerate()
            .map(|(i, hit)| SearchHit {
                name: hit.title,
                site: hit.link,
                snippet: hit.snippet,
                source: SERVICE.to_string(),
                position: if hit.position > 0 { hit.position } else { i + 1 },
            })
            .collect())
    }
}

#[async_trait]
impl CompanySearch for SerperClient {
    async fn search(
        &self,
        query: &str,
        location: Option<&str>,
    ) -> ConnectorResult<Vec<SearchHit>> {
        with_retry(SERVICE, self.max_retries, || self.fetch(query, location)).await
    }
}
