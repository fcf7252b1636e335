//! HTTP plumbing shared by the REST-based adapters

use serde::de::DeserializeOwned;

use crate::adapters::errors::{SourceError, SourceResult};
use crate::config::constants::http_timeout;

/// Build the HTTP client used by one adapter
pub(crate) fn build_client(user_agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(http_timeout())
        .user_agent(user_agent.to_string())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Check the status and decode a JSON body.
///
/// Non-2xx answers become `SourceError::Status` with the body attached,
/// undecodable bodies become `SourceError::InvalidResponse`.
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> SourceResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(SourceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| SourceError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: f64,
    }

    #[tokio::test]
    async fn test_read_json_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body(r#"{"value": 0.5}"#)
            .create_async()
            .await;

        let client = build_client("test-agent");
        let response = client.get(format!("{}/ok", server.url())).send().await.unwrap();
        let payload: Payload = read_json(response).await.unwrap();
        assert_eq!(payload.value, 0.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_json_status_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/limited")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = build_client("test-agent");
        let response = client
            .get(format!("{}/limited", server.url()))
            .send()
            .await
            .unwrap();
        let result: SourceResult<Payload> = read_json(response).await;
        match result {
            Err(SourceError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_json_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bad")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = build_client("test-agent");
        let response = client.get(format!("{}/bad", server.url())).send().await.unwrap();
        let result: SourceResult<Payload> = read_json(response).await;
        assert!(matches!(result, Err(SourceError::InvalidResponse(_))));
    }
}
