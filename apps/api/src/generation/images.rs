//! Image sourcing: keyword-driven image search with per-keyword retry.
//!
//! A keyword whose query fails (after retries, or permanently) is logged and
//! skipped. No images at all is a valid outcome.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::generation::keywords::KeywordSet;
use crate::generation::retry::RetryPolicy;
use crate::image_search::ImageSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    /// Stop at the first keyword with a result and take one image.
    FirstMatch,
    /// Query every keyword and keep up to `limit` images, in keyword order.
    Collect { limit: u32 },
}

/// A sourced image and the keyword that found it. Owned by one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub uri: String,
    pub keyword: String,
}

pub async fn source_images(
    keywords: &KeywordSet,
    mode: ImageMode,
    search: &dyn ImageSearch,
    policy: &RetryPolicy,
) -> Vec<ImageAsset> {
    let images = match mode {
        ImageMode::FirstMatch => first_match(keywords, search, policy).await,
        ImageMode::Collect { limit } => collect(keywords, limit, search, policy).await,
    };
    info!("Sourced {} images from {} keywords", images.len(), keywords.len());
    images
}

async fn first_match(
    keywords: &KeywordSet,
    search: &dyn ImageSearch,
    policy: &RetryPolicy,
) -> Vec<ImageAsset> {
    for keyword in keywords.iter() {
        if let Some(uris) = query(keyword, 1, search, policy).await {
            if let Some(uri) = uris.into_iter().next() {
                return vec![ImageAsset {
                    uri,
                    keyword: keyword.to_string(),
                }];
            }
            debug!("No images for keyword '{keyword}'");
        }
    }
    Vec::new()
}

async fn collect(
    keywords: &KeywordSet,
    limit: u32,
    search: &dyn ImageSearch,
    policy: &RetryPolicy,
) -> Vec<ImageAsset> {
    if limit == 0 {
        return Vec::new();
    }

    // join_all yields in input order, so accumulation stays in keyword order.
    let results = join_all(keywords.iter().map(|keyword| async move {
        (keyword, query(keyword, limit, search, policy).await)
    }))
    .await;

    let mut images: Vec<ImageAsset> = Vec::new();
    for (keyword, uris) in results {
        for uri in uris.into_iter().flatten() {
            if images.len() >= limit as usize {
                return images;
            }
            if images.iter().any(|img| img.uri == uri) {
                continue;
            }
            images.push(ImageAsset {
                uri,
                keyword: keyword.to_string(),
            });
        }
    }
    images
}

/// One keyword query under the retry policy; `None` when the keyword is skipped.
async fn query(
    keyword: &str,
    count: u32,
    search: &dyn ImageSearch,
    policy: &RetryPolicy,
) -> Option<Vec<String>> {
    match policy
        .run_service("image_search", |_| search.search(keyword, count))
        .await
    {
        Ok(found) => Some(found.value),
        Err(e) => {
            warn!(keyword, "Image search failed, skipping keyword: {e}");
            None
        }
    }
}
