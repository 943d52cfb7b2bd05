use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GigaChatConfig;

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Single-shot chat client for the GigaChat completions API.
///
/// Access tokens are fetched with the Basic authorization key and cached
/// until shortly before expiry. There is no streaming and no retry: a
/// failed call is reported to the caller, which falls back to synthesis.
#[derive(Clone)]
pub struct GigaChatClient {
    client: Client,
    base_url: String,
    auth_url: String,
    credentials: String,
    scope: String,
    model: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl GigaChatClient {
    pub fn new(config: &GigaChatConfig) -> Result<Self> {
        let credentials = config
            .credentials
            .clone()
            .context("GIGACHAT_CREDENTIALS is not set")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            auth_url: config.auth_url.clone(),
            credentials,
            scope: config.scope.clone(),
            model: config.model.clone(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    pub async fn chat(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChatResp {
            choices: Vec<Choice>,
        }

        let token = self.access_token().await?;

        let url = format!("{}/api/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&ChatReq {
                model: &self.model,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
            })
            .send()
            .await
            .context("failed to call chat completions endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "chat completions returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        let response = response
            .json::<ChatResp>()
            .await
            .context("failed to decode chat completions response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat completions returned no choices"))?;

        Ok(content.trim().to_string())
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cached = self
                .token
                .lock()
                .map_err(|_| anyhow::anyhow!("token cache lock poisoned"))?;
            if let Some(token) = cached.as_ref() {
                // Refresh a minute early so an in-flight request never
                // crosses the expiry boundary.
                if token.expires_at - chrono::Duration::seconds(60) > Utc::now() {
                    return Ok(token.value.clone());
                }
            }
        }

        #[derive(Deserialize)]
        struct TokenResp {
            access_token: String,
            expires_at: i64,
        }

        let response = self
            .client
            .post(&self.auth_url)
            .header("Authorization", format!("Basic {}", self.credentials))
            .header("RqUID", Uuid::new_v4().to_string())
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .context("failed to call OAuth endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OAuth returned {status}: {}", normalize_err_body(&body));
        }

        let token = response
            .json::<TokenResp>()
            .await
            .context("failed to decode OAuth response")?;

        // expires_at is unix milliseconds.
        let expires_at = Utc
            .timestamp_millis_opt(token.expires_at)
            .single()
            .unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(25));

        let mut cached = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("token cache lock poisoned"))?;
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(err) = json.get("message").and_then(|v| v.as_str()) {
            return err.to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_api_message() {
        let body = r#"{"status": 401, "message": "Token has expired"}"#;
        assert_eq!(normalize_err_body(body), "Token has expired");
    }

    #[test]
    fn empty_error_body_is_labeled() {
        assert_eq!(normalize_err_body("   "), "<empty body>");
    }
}
