use anyhow::{Result, anyhow};
use async_trait::async_trait;
use nlbrowse::Classifier;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = r#"You classify browser commands. Reply with ONE JSON object and nothing else.

Categories:
1. navigate - go to a website
2. search - search on a website
3. type - type text into an input field
4. click - click an element
5. wait - wait for a moment
6. scroll - scroll the page (value: up, down, top or bottom)
7. extract - extract information from the page
8. help - show help
9. exit - exit

Fields:
{"action": "category", "target": "element to interact with", "value": "text to type or search", "url": "url to navigate to", "element_type": "search_input|button|link|input|form|product|video"}

Use null for fields that do not apply. Example, "search for cats on youtube":
{"action": "search", "target": null, "value": "cats", "url": "https://www.youtube.com", "element_type": "search_input"}"#;

/// Chat-completions classifier. Replies are returned untouched; the
/// normalizer copes with fences and prose around the record.
pub struct LlmClassifier {
    client: Client,
    api_key: String,
    model: String,
}

impl LlmClassifier {
    pub fn new(model: &str) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY not set in environment"))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, command: &str) -> Result<String> {
        let response = self
            .client
            .post(ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": command},
                ],
                "temperature": 0.0,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            warn!("[Brain] API error ({}): {}", status, message);
            return Err(anyhow!("OpenAI API error ({}): {}", status, message));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("No content in LLM response: {}", body))?;

        debug!("[Brain] '{}' -> {}", command, content);
        Ok(content.to_string())
    }
}
