//! Image search service: Unsplash photo search behind the `ImageSearch` trait.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::ServiceError;

const UNSPLASH_SEARCH_URL: &str = "https://api.unsplash.com/search/photos";

/// Image search capability: one query in, ordered image URIs out.
#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<String>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    urls: ImageUrls,
}

#[derive(Debug, Deserialize)]
struct ImageUrls {
    regular: String,
}

#[derive(Clone)]
pub struct UnsplashClient {
    client: Client,
    access_key: String,
}

impl UnsplashClient {
    pub fn new(access_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            access_key,
        }
    }
}

#[async_trait]
impl ImageSearch for UnsplashClient {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<String>, ServiceError> {
        let per_page = count.max(1).to_string();
        let response = self
            .client
            .get(UNSPLASH_SEARCH_URL)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .query(&[("query", query), ("per_page", per_page.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status.as_u16(), body));
        }

        let body = response.text().await?;
        let urls = parse_search_response(&body)?;
        debug!("Image search '{}' returned {} results", query, urls.len());
        Ok(urls)
    }
}

fn parse_search_response(body: &str) -> Result<Vec<String>, ServiceError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Malformed(e.to_string()))?;
    Ok(parsed.results.into_iter().map(|r| r.urls.regular).collect())
}
