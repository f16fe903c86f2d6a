use anyhow::{Result, anyhow};
use async_trait::async_trait;
use browser_pilot::{AgentError, Oracle};
use clap::ValueEnum;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

const MAX_TOKENS: u32 = 1000;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Which hosted model API the oracle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// OpenAI chat completions, or any compatible endpoint.
    Openai,
    /// Google Gemini `generateContent`.
    Gemini,
    /// Anthropic messages.
    Claude,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Openai => "gpt-4o",
            Provider::Gemini => "gemini-2.5-flash",
            Provider::Claude => "claude-sonnet-4-0",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Openai => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::Claude => "https://api.anthropic.com/v1",
        }
    }

    fn endpoint(self, base_url: &str, model: &str) -> String {
        match self {
            Provider::Openai => format!("{base_url}/chat/completions"),
            Provider::Gemini => format!("{base_url}/models/{model}:generateContent"),
            Provider::Claude => format!("{base_url}/messages"),
        }
    }

    fn request_body(self, model: &str, prompt: &str) -> Value {
        match self {
            Provider::Openai => json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": MAX_TOKENS,
                "temperature": 0.1,
            }),
            Provider::Gemini => json!({
                "contents": [{"role": "user", "parts": [{"text": prompt}]}],
                "generationConfig": {"maxOutputTokens": MAX_TOKENS, "temperature": 0.1},
            }),
            Provider::Claude => json!({
                "model": model,
                "max_tokens": MAX_TOKENS,
                "messages": [{"role": "user", "content": prompt}],
            }),
        }
    }

    fn authorize(self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        match self {
            Provider::Openai => request.bearer_auth(api_key),
            Provider::Gemini => request.header("x-goog-api-key", api_key),
            Provider::Claude => request
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        }
    }

    /// Pulls the reply text out of a successful response body.
    fn reply_text(self, body: &Value) -> Option<String> {
        match self {
            Provider::Openai => body["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string),
            Provider::Gemini => join_text(&body["candidates"][0]["content"]["parts"]),
            Provider::Claude => join_text(&body["content"]),
        }
    }
}

/// Concatenates the `text` of every part; `None` if there is none.
fn join_text(parts: &Value) -> Option<String> {
    let text: String = parts
        .as_array()?
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Hosted language model used as the decision oracle.
///
/// Stateless: every prompt is sent as a single user message with no history,
/// so each judgment depends only on what the prompt carries.
pub struct Brain {
    client: Client,
    provider: Provider,
    api_key: String,
    model: String,
    base_url: String,
}

impl Brain {
    pub fn new(provider: Provider, api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            provider,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(self.provider.endpoint(&self.base_url, &self.model))
            .json(&self.provider.request_body(&self.model, prompt));
        let response = self.provider.authorize(request, &self.api_key).send().await?;

        let status = response.status();
        let json_resp: Value = response.json().await?;

        if !status.is_success() {
            let err_msg = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            return Err(anyhow!("API error ({}): {}", status, err_msg));
        }

        self.provider
            .reply_text(&json_resp)
            .ok_or_else(|| anyhow!("No content in LLM response: {}", json_resp))
    }
}

#[async_trait]
impl Oracle for Brain {
    async fn respond(&self, prompt: &str) -> Result<String, AgentError> {
        let reply = self
            .complete(prompt)
            .await
            .map_err(|e| AgentError::OracleUnavailable(format!("{e:#}")))?;
        tracing::debug!(provider = ?self.provider, model = %self.model, chars = reply.len(), "oracle replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_each_api() {
        assert_eq!(
            Provider::Openai.endpoint("https://api.openai.com/v1", "gpt-4o"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            Provider::Gemini.endpoint("https://g.example/v1beta", "gemini-2.5-flash"),
            "https://g.example/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            Provider::Claude.endpoint("https://a.example/v1", "claude-sonnet-4-0"),
            "https://a.example/v1/messages"
        );
    }

    #[test]
    fn prompt_is_a_single_user_message() {
        let openai = Provider::Openai.request_body("gpt-4o", "hi");
        assert_eq!(openai["messages"], json!([{"role": "user", "content": "hi"}]));

        let gemini = Provider::Gemini.request_body("gemini-2.5-flash", "hi");
        assert_eq!(gemini["contents"][0]["parts"][0]["text"], "hi");
        assert!(gemini.get("model").is_none());

        let claude = Provider::Claude.request_body("claude-sonnet-4-0", "hi");
        assert_eq!(claude["max_tokens"], MAX_TOKENS);
        assert_eq!(claude["messages"][0]["content"], "hi");
    }

    #[test]
    fn reply_text_per_provider() {
        let openai = json!({"choices": [{"message": {"content": "True"}}]});
        assert_eq!(Provider::Openai.reply_text(&openai).as_deref(), Some("True"));

        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "Tr"}, {"text": "ue"}]}}]});
        assert_eq!(Provider::Gemini.reply_text(&gemini).as_deref(), Some("True"));

        let claude = json!({"content": [{"type": "text", "text": "True"}]});
        assert_eq!(Provider::Claude.reply_text(&claude).as_deref(), Some("True"));

        assert_eq!(Provider::Claude.reply_text(&json!({"content": []})), None);
        assert_eq!(Provider::Openai.reply_text(&json!({})), None);
    }
}
