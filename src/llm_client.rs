use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::AssistantConfig;

/// Requests time out no faster than this, whatever the config asks for.
const MIN_TIMEOUT_SECS: u64 = 5;

/// One outbound message in the generation request body.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    max_tokens: u32,
}

/// Stateless-per-call client for the generation endpoint. Every failure mode
/// (missing credential, transport, bad status, unrecognized body) is logged
/// and collapses to `None`.
#[derive(Clone)]
pub struct GenerationClient {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl GenerationClient {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: request_timeout(config.timeout_seconds),
            client: reqwest::Client::new(),
        }
    }

    /// One generation round trip: returns the assistant text, or `None` if
    /// anything went wrong.
    pub async fn generate(&self, messages: &[PromptMessage]) -> Option<String> {
        if self.api_key.trim().is_empty() {
            tracing::warn!("Generation api_key is empty; set api_key in the config file");
            return None;
        }

        let request = GenerationRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Generation request to {} failed: {}", self.endpoint, e);
                return None;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to read generation response body: {}", e);
                return None;
            }
        };

        if !status.is_success() {
            tracing::warn!("Generation endpoint returned {}: {}", status, body);
            return None;
        }

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Generation response is not valid JSON ({}): {}", e, body);
                return None;
            }
        };
        if value.is_null() {
            return None;
        }

        match extract_reply(&value) {
            Some(text) => Some(text),
            None => {
                tracing::warn!("Could not parse generation response: {}", body);
                None
            }
        }
    }
}

pub(crate) fn request_timeout(configured_secs: u64) -> Duration {
    Duration::from_secs(configured_secs.max(MIN_TIMEOUT_SECS))
}

/// Known response shapes, most specific first. A shape matches when its
/// fields are present; sibling fields are ignored and later shapes are not
/// consulted once one matches.
fn response_shapes() -> [fn(&Value) -> Option<&Value>; 7] {
    [
        |v| v.get("choices")?.get(0)?.get("message")?.get("content"),
        |v| v.get("choices")?.get(0)?.get("text"),
        |v| v.get("choices")?.get(0)?.get("delta")?.get("content"),
        |v| v.get("output")?.get(0)?.get("content"),
        |v| v.get("output")?.get(0)?.get("generated_text"),
        |v| v.get("text"),
        |v| v.get("generated_text"),
    ]
}

fn extract_reply(value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    response_shapes()
        .iter()
        .find_map(|probe| probe(value))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_with(api_key: &str, endpoint: &str) -> GenerationClient {
        let config = AssistantConfig {
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
            ..Default::default()
        };
        GenerationClient::new(&config)
    }

    #[test]
    fn extracts_chat_completion_shape() {
        let body = json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(extract_reply(&body).as_deref(), Some("hi"));
    }

    #[test]
    fn extracts_choice_text_shape() {
        let body = json!({"choices": [{"text": "plain"}]});
        assert_eq!(extract_reply(&body).as_deref(), Some("plain"));
    }

    #[test]
    fn extracts_choice_delta_shape() {
        let body = json!({"choices": [{"delta": {"content": "chunk"}}]});
        assert_eq!(extract_reply(&body).as_deref(), Some("chunk"));
    }

    #[test]
    fn extracts_output_content_shape() {
        let body = json!({"output": [{"content": "out"}]});
        assert_eq!(extract_reply(&body).as_deref(), Some("out"));
    }

    #[test]
    fn extracts_output_generated_text_shape() {
        let body = json!({"output": [{"generated_text": "x"}]});
        assert_eq!(extract_reply(&body).as_deref(), Some("x"));
    }

    #[test]
    fn extracts_top_level_text_shape() {
        let body = json!({"text": "top"});
        assert_eq!(extract_reply(&body).as_deref(), Some("top"));
    }

    #[test]
    fn extracts_top_level_generated_text_shape() {
        let body = json!({"generated_text": "gen"});
        assert_eq!(extract_reply(&body).as_deref(), Some("gen"));
    }

    #[test]
    fn unknown_shape_yields_none() {
        let body = json!({"foo": "bar"});
        assert_eq!(extract_reply(&body), None);
    }

    #[test]
    fn null_body_yields_none() {
        assert_eq!(extract_reply(&Value::Null), None);
    }

    #[test]
    fn empty_choices_falls_through_to_later_shapes() {
        let body = json!({"choices": [], "text": "fallback"});
        assert_eq!(extract_reply(&body).as_deref(), Some("fallback"));
    }

    #[test]
    fn choices_shape_wins_over_top_level_text() {
        let body = json!({"choices": [{"text": "from choices"}], "text": "top level"});
        assert_eq!(extract_reply(&body).as_deref(), Some("from choices"));
    }

    #[test]
    fn matched_shape_with_non_string_value_yields_none() {
        // Structural match stops the probe sequence even when the value is
        // unusable.
        let body = json!({"choices": [{"message": {"content": 5}}], "text": "top level"});
        assert_eq!(extract_reply(&body), None);
    }

    #[test]
    fn timeout_is_floor_clamped() {
        assert_eq!(request_timeout(1), Duration::from_secs(5));
        assert_eq!(request_timeout(0), Duration::from_secs(5));
        assert_eq!(request_timeout(30), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn empty_api_key_short_circuits_without_network() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        // A live listener on the endpoint records whether any connection
        // arrives; a blank credential must never produce one.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let endpoint = format!("http://{}/v1/generate", listener.local_addr().expect("addr"));
        let connected = Arc::new(AtomicBool::new(false));
        let connected_flag = connected.clone();
        tokio::spawn(async move {
            if listener.accept().await.is_ok() {
                connected_flag.store(true, Ordering::SeqCst);
            }
        });

        let client = client_with("", &endpoint);
        let messages = vec![PromptMessage {
            role: "user".to_string(),
            content: "hello".to_string(),
        }];
        assert_eq!(client.generate(&messages).await, None);

        // Let any stray connection land before checking.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            !connected.load(Ordering::SeqCst),
            "blank credential must not open a connection"
        );
    }

    #[tokio::test]
    async fn transport_failure_yields_none() {
        let client = client_with("sk-test", "http://127.0.0.1:1/v1/generate");
        let messages = vec![PromptMessage {
            role: "user".to_string(),
            content: "hello".to_string(),
        }];
        assert_eq!(client.generate(&messages).await, None);
    }
}
