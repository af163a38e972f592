//! Rancher API client
//!
//! Thin HTTP client over the Rancher v1 project API. Every call is
//! authenticated with HTTP basic credentials (access key / secret key) and
//! shares one `reqwest::Client` for connection pooling.
//!
//! Nothing here retries: a non-2xx answer becomes `AppError::Transport`
//! carrying the status and raw body.

use crate::error::AppError;
use crate::rancher::constants::{ACTION_FINISH_UPGRADE, ACTION_UPGRADE};
use crate::rancher::types::{Collection, Service, Stack, UpgradeInstruction};
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Source of service snapshots
///
/// The completion poller only needs to read a service's state, so it is
/// written against this trait rather than the HTTP client.
#[async_trait]
pub trait ServiceStateSource: Send + Sync {
    /// Fetch the current snapshot of one service
    async fn fetch_service(&self, service_id: &str) -> Result<Service, AppError>;
}

/// HTTP client for one Rancher project endpoint
#[derive(Debug, Clone)]
pub struct RancherApi {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
    secret_key: String,
}

impl RancherApi {
    /// Create a client for `base_url` (e.g. `https://rancher.example.com/v1/projects/1a5`)
    ///
    /// # Errors
    /// * Returns `AppError::Internal` if the HTTP client cannot be built
    pub fn new(base_url: &str, access_key: &str, secret_key: &str) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Internal(anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    /// Configured project endpoint
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET environments/`
    pub async fn list_stacks(&self) -> Result<Vec<Stack>, AppError> {
        let collection: Collection<Stack> = self.get_json("environments/").await?;
        Ok(collection.data)
    }

    /// `GET services/`
    pub async fn list_services(&self) -> Result<Vec<Service>, AppError> {
        let collection: Collection<Service> = self.get_json("services/").await?;
        Ok(collection.data)
    }

    /// `GET services/{id}`
    pub async fn get_service(&self, service_id: &str) -> Result<Service, AppError> {
        self.get_json(&format!("services/{}", service_id)).await
    }

    /// `POST services/{id}/?action=upgrade`
    pub async fn upgrade_service(
        &self,
        service_id: &str,
        instruction: &UpgradeInstruction,
    ) -> Result<Value, AppError> {
        self.post_action(service_id, ACTION_UPGRADE, Some(instruction))
            .await
    }

    /// `POST services/{id}/?action=finishupgrade`
    pub async fn finish_upgrade(&self, service_id: &str) -> Result<Value, AppError> {
        self.post_action::<Value>(service_id, ACTION_FINISH_UPGRADE, None)
            .await
    }

    /// Authenticated `GET` of the endpoint itself
    ///
    /// # Returns
    /// * `Ok(())` - The endpoint answered 2xx
    /// * `Err(AppError)` - Transport error carrying the status, if any
    pub async fn probe(&self) -> Result<(), AppError> {
        let context = format!("GET {}", self.base_url);
        let response = self
            .client
            .get(&self.base_url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(|e| AppError::from_reqwest(&context, e))?;

        check_status(&context, response).await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let context = format!("GET {}", path);
        tracing::debug!(url = %self.url(path), "Calling Rancher API");

        let response = self
            .client
            .get(self.url(path))
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(|e| AppError::from_reqwest(&context, e))?;

        let body = check_status(&context, response).await?;
        decode(&context, &body)
    }

    async fn post_action<B: Serialize + ?Sized>(
        &self,
        service_id: &str,
        action: &str,
        payload: Option<&B>,
    ) -> Result<Value, AppError> {
        let path = format!("services/{}/?action={}", service_id, action);
        let context = format!("POST {}", path);
        tracing::debug!(url = %self.url(&path), action = action, "Calling Rancher API");

        let mut request = self
            .client
            .post(self.url(&path))
            .basic_auth(&self.access_key, Some(&self.secret_key));
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::from_reqwest(&context, e))?;

        let body = check_status(&context, response).await?;
        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        decode(&context, &body)
    }
}

#[async_trait]
impl ServiceStateSource for RancherApi {
    async fn fetch_service(&self, service_id: &str) -> Result<Service, AppError> {
        self.get_service(service_id).await
    }
}

/// Read the body, turning a non-2xx status into `AppError::Transport`
async fn check_status(context: &str, response: reqwest::Response) -> Result<String, AppError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::from_reqwest(context, e))?;

    if !status.is_success() {
        tracing::error!(
            context = %context,
            status_code = status.as_u16(),
            error_body = %body,
            "Rancher API returned error status"
        );

        return Err(AppError::Transport {
            context: context.to_string(),
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
            body: Some(body),
        });
    }

    Ok(body)
}

fn decode<T: DeserializeOwned>(context: &str, body: &str) -> Result<T, AppError> {
    serde_json::from_str(body).map_err(|e| AppError::InvalidResponse {
        context: context.to_string(),
        message: e.to_string(),
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    // base64("access:secret")
    const AUTH_HEADER: &str = "Basic YWNjZXNzOnNlY3JldA==";

    fn api_for(server: &Server) -> RancherApi {
        RancherApi::new(&server.url(), "access", "secret").unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = RancherApi::new("http://rancher.local/v1/projects/1a5/", "a", "b").unwrap();
        assert_eq!(api.base_url(), "http://rancher.local/v1/projects/1a5");
        assert_eq!(
            api.url("services/"),
            "http://rancher.local/v1/projects/1a5/services/"
        );
    }

    #[tokio::test]
    async fn test_list_stacks_sends_basic_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/environments/")
            .match_header("authorization", AUTH_HEADER)
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(r#"{"data": [{"id": "1st5", "name": "prod"}]}"#)
            .create_async()
            .await;

        let stacks = api_for(&server).list_stacks().await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            stacks,
            vec![Stack {
                id: "1st5".to_string(),
                name: "prod".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_list_services() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/services/")
            .with_status(200)
            .with_body(
                r#"{"data": [
                    {"id": "1s10", "name": "api", "state": "active", "stackId": "1st5",
                     "launchConfig": {"imageUuid": "docker:acme/api:1.0.0"}}
                ]}"#,
            )
            .create_async()
            .await;

        let services = api_for(&server).list_services().await.unwrap();

        mock.assert_async().await;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, "1s10");
        assert_eq!(
            services[0].launch_config.as_ref().unwrap().image_uuid,
            "docker:acme/api:1.0.0"
        );
    }

    #[tokio::test]
    async fn test_get_service_error_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/services/1s99")
            .with_status(404)
            .with_body(r#"{"type": "error", "status": 404, "code": "NotFound"}"#)
            .create_async()
            .await;

        let err = api_for(&server).get_service("1s99").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), "TransportError");
        assert_eq!(err.status(), Some(404));
        assert!(err.response_body().unwrap().contains("NotFound"));
    }

    #[tokio::test]
    async fn test_get_service_invalid_json() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/services/1s10")
            .with_status(200)
            .with_body("This is not JSON")
            .create_async()
            .await;

        let err = api_for(&server).get_service("1s10").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse { .. }));
        assert_eq!(err.response_body(), Some("This is not JSON"));
    }

    #[tokio::test]
    async fn test_upgrade_service_posts_instruction() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/services/1s10/")
            .match_query(Matcher::UrlEncoded("action".into(), "upgrade".into()))
            .match_header("authorization", AUTH_HEADER)
            .match_body(Matcher::PartialJson(json!({
                "inServiceStrategy": {
                    "launchConfig": {"imageUuid": "docker:acme/api:2.0.0"},
                    "startFirst": true
                }
            })))
            .with_status(202)
            .with_body(r#"{"id": "1s10", "state": "upgrading"}"#)
            .create_async()
            .await;

        let instruction: UpgradeInstruction = serde_json::from_value(json!({
            "inServiceStrategy": {
                "launchConfig": {"imageUuid": "docker:acme/api:2.0.0"},
                "startFirst": true
            }
        }))
        .unwrap();

        let response = api_for(&server)
            .upgrade_service("1s10", &instruction)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response["state"], json!("upgrading"));
    }

    #[tokio::test]
    async fn test_finish_upgrade_tolerates_empty_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/services/1s10/")
            .match_query(Matcher::UrlEncoded("action".into(), "finishupgrade".into()))
            .with_status(202)
            .with_body("")
            .create_async()
            .await;

        let response = api_for(&server).finish_upgrade("1s10").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response, json!({}));
    }

    #[tokio::test]
    async fn test_probe_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(401)
            .with_body(r#"{"code": "Unauthorized"}"#)
            .create_async()
            .await;

        let err = api_for(&server).probe().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_connection_refused_has_no_status() {
        // Nothing listens on port 1
        let api = RancherApi::new("http://127.0.0.1:1", "access", "secret").unwrap();
        let err = api.list_services().await.unwrap_err();

        assert_eq!(err.kind(), "TransportError");
        assert_eq!(err.status(), None);
    }
}
