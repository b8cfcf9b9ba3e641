use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use super::GraphQl;
use crate::error::SyncError;

const GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Authenticated GraphQL executor with a short fixed timeout. Transport
/// failures surface as retryable [`SyncError::Transport`]; everything the
/// remote side rejects is terminal [`SyncError::RemoteRejected`].
pub struct GithubClient {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct Envelope {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    path: Option<Vec<Value>>,
}

impl GithubClient {
    pub fn new(token: &str) -> Result<Self, SyncError> {
        Self::with_endpoint(token, GRAPHQL_URL)
    }

    pub fn with_endpoint(token: &str, endpoint: &str) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SyncError::Configuration("API token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static("boardsync/0.1"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl GraphQl for GithubClient {
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, SyncError> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteRejected(format!(
                "status {status}: {detail}"
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        classify_envelope(envelope)
    }
}

/// A response may carry both `data` and `errors`. NOT_FOUND on the optional
/// `user`/`organization` root fields is expected — the owner is queried as
/// both and at most one resolves. Any other error is fatal; all messages are
/// aggregated into one rejection.
fn classify_envelope(envelope: Envelope) -> Result<Value, SyncError> {
    let fatal: Vec<&RemoteError> = envelope
        .errors
        .iter()
        .filter(|error| !is_expected_not_found(error))
        .collect();

    if !fatal.is_empty() {
        let message = fatal
            .iter()
            .map(|error| error.message.as_deref().unwrap_or("unknown error"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(SyncError::RemoteRejected(message));
    }

    envelope
        .data
        .ok_or_else(|| SyncError::RemoteRejected("response carried no data".into()))
}

fn is_expected_not_found(error: &RemoteError) -> bool {
    if error.kind.as_deref() != Some("NOT_FOUND") {
        return false;
    }
    match error.path.as_deref() {
        Some([root]) => {
            matches!(root.as_str(), Some("user") | Some("organization"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(raw: Value) -> Envelope {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn clean_response_returns_data() {
        let result = classify_envelope(envelope(json!({
            "data": {"node": {"id": "n-1"}}
        })));
        assert_eq!(result.unwrap(), json!({"node": {"id": "n-1"}}));
    }

    #[test]
    fn not_found_on_optional_roots_is_tolerated() {
        let result = classify_envelope(envelope(json!({
            "data": {"organization": {"projectV2": {"id": "p-1"}}, "user": null},
            "errors": [
                {"type": "NOT_FOUND", "path": ["user"], "message": "Could not resolve user"}
            ]
        })));
        assert!(result.is_ok());
    }

    #[test]
    fn other_errors_are_fatal_and_aggregated() {
        let result = classify_envelope(envelope(json!({
            "data": {"organization": null},
            "errors": [
                {"type": "FORBIDDEN", "path": ["organization"], "message": "no access"},
                {"message": "something else broke"}
            ]
        })));
        match result.unwrap_err() {
            SyncError::RemoteRejected(message) => {
                assert_eq!(message, "no access, something else broke");
            }
            other => panic!("expected RemoteRejected, got {other:?}"),
        }
    }

    #[test]
    fn not_found_on_a_nested_path_is_fatal() {
        let result = classify_envelope(envelope(json!({
            "data": {},
            "errors": [
                {"type": "NOT_FOUND", "path": ["node", "items"], "message": "missing"}
            ]
        })));
        assert!(matches!(result, Err(SyncError::RemoteRejected(_))));
    }

    #[test]
    fn missing_data_is_a_rejection() {
        let result = classify_envelope(envelope(json!({"errors": []})));
        assert!(matches!(result, Err(SyncError::RemoteRejected(_))));
    }
}
