//! HTTP client for the internal decision API.
//!
//! `POST {base}/v1/internal/telegram/reviews/{deposit|kyc}/decision` with
//! `{ "request_id", "action", "reviewer_telegram_id" }` and the shared token
//! in `X-Internal-Token`. Anything but 200 is a rejection carrying the
//! body's `error` text.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::DecisionError;
use crate::review::{ReviewAction, ReviewItemId, ReviewKind, ReviewerId};

use super::{DecisionApi, DecisionOutcome};

/// Header carrying the shared internal token.
pub const DECISION_TOKEN_HEADER: &str = "X-Internal-Token";

const ERROR_TEXT_LIMIT: usize = 180;
const DEFAULT_ERROR_TEXT: &str = "Review decision failed";

#[derive(Debug, Serialize)]
struct DecisionRequest<'a> {
    request_id: &'a str,
    action: ReviewAction,
    reviewer_telegram_id: i64,
}

/// [`DecisionApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDecisionApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpDecisionApi {
    /// # Errors
    ///
    /// Returns `DecisionError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, DecisionError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DecisionError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// # Errors
    ///
    /// Returns `DecisionError::Transport` if the HTTP client cannot be built.
    pub fn from_config(config: &RelayConfig) -> Result<Self, DecisionError> {
        Self::new(config.decision_api_base_url.clone(), config.decision_api_token.clone())
    }

    /// Decision endpoint URL for `kind`.
    #[must_use]
    pub fn endpoint(&self, kind: ReviewKind) -> String {
        format!("{}/v1/internal/telegram/reviews/{}/decision", self.base_url, kind.as_str())
    }
}

fn error_text(status: u16, raw: &str) -> String {
    let text = match serde_json::from_str::<Value>(raw) {
        Ok(body) => body
            .get("error")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map_or_else(|| DEFAULT_ERROR_TEXT.to_string(), str::to_string),
        Err(_) if raw.trim().is_empty() => format!("{DEFAULT_ERROR_TEXT} (status {status})"),
        Err(_) => raw.trim().to_string(),
    };
    text.chars().take(ERROR_TEXT_LIMIT).collect()
}

#[async_trait]
impl DecisionApi for HttpDecisionApi {
    async fn decide(
        &self,
        kind: ReviewKind,
        item_id: &ReviewItemId,
        action: ReviewAction,
        reviewer: ReviewerId,
    ) -> Result<DecisionOutcome, DecisionError> {
        if self.token.trim().is_empty() {
            return Err(DecisionError::MissingCredentials);
        }

        let endpoint = self.endpoint(kind);
        debug!(%kind, request = %item_id, %action, %reviewer, %endpoint, "Posting review decision");

        let response = self
            .client
            .post(&endpoint)
            .header(DECISION_TOKEN_HEADER, &self.token)
            .json(&DecisionRequest {
                request_id: item_id.as_str(),
                action,
                reviewer_telegram_id: reviewer.get(),
            })
            .send()
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))?;

        if status != 200 {
            return Err(DecisionError::Rejected {
                status,
                message: error_text(status, &raw),
            });
        }

        if raw.trim().is_empty() {
            return Ok(DecisionOutcome::from_payload(Value::Object(serde_json::Map::new())));
        }
        let body: Value = serde_json::from_str(&raw).map_err(|e| DecisionError::InvalidResponse(e.to_string()))?;
        Ok(DecisionOutcome::from_payload(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_per_kind() {
        let api = HttpDecisionApi::new("http://api:8080/", "t").unwrap();
        assert_eq!(
            api.endpoint(ReviewKind::Deposit),
            "http://api:8080/v1/internal/telegram/reviews/deposit/decision"
        );
        assert_eq!(
            api.endpoint(ReviewKind::Kyc),
            "http://api:8080/v1/internal/telegram/reviews/kyc/decision"
        );
    }

    #[test]
    fn error_text_prefers_error_field() {
        assert_eq!(error_text(409, r#"{"error":"already reviewed"}"#), "already reviewed");
        assert_eq!(error_text(500, r#"{"detail":"x"}"#), DEFAULT_ERROR_TEXT);
        assert_eq!(error_text(502, "<html>bad gateway</html>"), "<html>bad gateway</html>");
        assert!(error_text(503, "").contains("503"));
        assert_eq!(error_text(400, &"e".repeat(500)).len(), ERROR_TEXT_LIMIT);
    }

    #[tokio::test]
    async fn missing_token_fails_without_a_call() {
        let api = HttpDecisionApi::new("http://127.0.0.1:1", "  ").unwrap();
        let err = api
            .decide(
                ReviewKind::Kyc,
                &ReviewItemId::new("r1"),
                ReviewAction::Approve,
                ReviewerId::new(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::MissingCredentials));
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(DecisionRequest {
            request_id: "r1",
            action: ReviewAction::Reject,
            reviewer_telegram_id: 42,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"request_id": "r1", "action": "reject", "reviewer_telegram_id": 42}));
    }
}
