//! Cloudflare cache purge
//!
//! Optional post-upgrade side call. Callers treat it as best effort: a
//! failure is logged and never changes the upgrade's outcome.

use crate::error::AppError;
use serde::Serialize;

const CLOUDFLARE_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

#[derive(Serialize, Debug)]
struct PurgeRequest {
    purge_everything: bool,
}

/// Purge every cached file of a Cloudflare zone
///
/// # Arguments
/// * `client` - Shared HTTP client
/// * `zone_id` - Cloudflare zone identifier
/// * `api_key` - API token, sent as a bearer token
///
/// # Errors
/// * Returns `AppError::Transport` if the request fails or Cloudflare answers non-2xx
pub async fn purge_cache(
    client: &reqwest::Client,
    zone_id: &str,
    api_key: &str,
) -> Result<(), AppError> {
    purge_cache_with_base_url(client, zone_id, api_key, CLOUDFLARE_API_BASE_URL).await
}

/// Internal function that allows custom base URL (for testing)
async fn purge_cache_with_base_url(
    client: &reqwest::Client,
    zone_id: &str,
    api_key: &str,
    base_url: &str,
) -> Result<(), AppError> {
    let url = format!("{}/zones/{}/purge_cache", base_url, zone_id);
    let context = format!("POST zones/{}/purge_cache", zone_id);

    tracing::debug!(url = %url, "Purging Cloudflare cache");

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&PurgeRequest {
            purge_everything: true,
        })
        .send()
        .await
        .map_err(|e| AppError::from_reqwest(&context, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        return Err(AppError::Transport {
            context,
            status: Some(status.as_u16()),
            message: "Cloudflare rejected the cache purge".to_string(),
            body: Some(body),
        });
    }

    tracing::info!(zone_id = %zone_id, "Cloudflare cache purged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_purge_cache_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/zones/zone-123/purge_cache")
            .match_header("authorization", "Bearer cf-token")
            .match_body(Matcher::Json(json!({"purge_everything": true})))
            .with_status(200)
            .with_body(r#"{"success": true, "errors": [], "result": {"id": "zone-123"}}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result =
            purge_cache_with_base_url(&client, "zone-123", "cf-token", &server.url()).await;

        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_purge_cache_forbidden() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/zones/zone-123/purge_cache")
            .with_status(403)
            .with_body(r#"{"success": false, "errors": [{"code": 10000}]}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = purge_cache_with_base_url(&client, "zone-123", "bad", &server.url())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), Some(403));
        assert!(err.response_body().unwrap().contains("10000"));
    }
}
