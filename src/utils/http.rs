// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use url::Url;

use crate::error::Result;
use crate::models::FetcherConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a page body, failing on non-success status.
///
/// Returns the text together with the final URL after redirects. Parsing is
/// left to the caller since `scraper::Html` cannot be held across an await
/// in a `Send` future.
pub async fn fetch_page_async(client: &reqwest::Client, url: Url) -> Result<(String, Url)> {
    let response = client.get(url).send().await?.error_for_status()?;
    let final_url = response.url().clone();
    let text = response.text().await?;
    Ok((text, final_url))
}
