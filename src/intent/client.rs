//! OpenAI-compatible chat completions client for intent extraction.

use std::future::Future;
use std::pin::Pin;

use serde_json::json;
use tracing::debug;

use super::{prompt, Intent, IntentService};
use crate::app::DispatchContext;
use crate::config::IntentConfig;
use crate::error::IntentError;

/// Calls a chat completions endpoint once per transcript and expects a JSON
/// object matching the intent schema in the reply.
pub struct HttpIntentService {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    locale: String,
    client: reqwest::Client,
}

impl HttpIntentService {
    pub fn new(config: &IntentConfig, locale: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
            locale: locale.to_string(),
            client,
        })
    }

    /// Request body for one interpretation.
    pub fn request_body(&self, transcript: &str, context: &DispatchContext) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": prompt::system_prompt(&self.locale, &context.to_pairs()),
                },
                {
                    "role": "user",
                    "content": prompt::user_message(transcript),
                },
            ],
        })
    }

    async fn call(&self, transcript: &str, context: &DispatchContext) -> Result<Intent, IntentError> {
        let body = self.request_body(transcript, context);
        debug!(endpoint = %self.endpoint, model = %self.model, "Sending transcript to intent service");

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IntentError::Status { status, body });
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Err(IntentError::EmptyResponse);
        }
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| IntentError::Malformed(e.to_string()))?;
        let content = extract_content(&json)?;
        Intent::parse(content)
    }
}

/// Pull `choices[0].message.content` out of a completion.
fn extract_content(json: &serde_json::Value) -> Result<&str, IntentError> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or(IntentError::EmptyResponse)
}

impl IntentService for HttpIntentService {
    fn interpret<'a>(
        &'a self,
        transcript: &'a str,
        context: &'a DispatchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Intent, IntentError>> + Send + 'a>> {
        Box::pin(self.call(transcript, context))
    }
}
