pub mod global_variables;
pub mod ibge;
pub mod imagery;
pub mod synthetic;
pub mod wms;

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Blocking HTTP client shared by the collectors
pub fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("ndvigrid/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::fetch(format!("Failed to create HTTP client: {}", e)))
}

/// GET `url` and return the body; non-2xx statuses are fetch errors.
pub fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    debug!(url, "GET");
    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::fetch(format!("Failed to send request to {}: {}", url, e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        return Err(Error::fetch(format!(
            "{} returned error {}: {}",
            url,
            status,
            body.chars().take(200).collect::<String>()
        )));
    }

    let bytes = response
        .bytes()
        .map_err(|e| Error::fetch(format!("Failed to read response body: {}", e)))?;
    Ok(bytes.to_vec())
}
