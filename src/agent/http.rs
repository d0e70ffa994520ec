//! HTTP-backed [`AgentClient`] speaking an OpenAI-compatible chat completion
//! API, adapted from the shape of comparable HTTP provider integrations in
//! this codebase (base URL + bearer key + model id).

use super::{AgentClient, AgentReply, ToolContext, TurnSummary};
use crate::error::{OrchestratorError, Result};
use crate::types::{Message, Role};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpAgentClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    recap_timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(endpoint: String, api_key: Option<String>, model: String, recap_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            recap_timeout,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.endpoint.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Agent(format!("request failed: {e}")))?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Agent(format!("invalid response body: {e}")))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| OrchestratorError::Agent("response missing message content".to_owned()))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn reply(&self, history: &[Message], _ctx: &ToolContext) -> Result<AgentReply> {
        let transcript = render_history(history);
        let text = self
            .complete("You are a helpful voice assistant.", &transcript)
            .await?;
        Ok(AgentReply::from_raw(text, false))
    }

    async fn recap(&self, summaries_most_recent_first: &[String]) -> Option<String> {
        if summaries_most_recent_first.is_empty() {
            return None;
        }
        let joined = summaries_most_recent_first.join("\n---\n");
        let prompt = format!(
            "Write a quick personal reminder based on these past summaries (most recent first):\n{joined}"
        );
        tokio::time::timeout(self.recap_timeout, self.complete("Recap writer.", &prompt))
            .await
            .ok()
            .and_then(|r| r.ok())
    }

    async fn summarize(&self, transcript: &str) -> Option<TurnSummary> {
        let text = self
            .complete(
                "Summarize this conversation. Respond with JSON only, matching exactly \
                 {\"participants\": [...], \"topics\": [...], \"action_items\": [...], \"prose\": \"...\"}.",
                transcript,
            )
            .await
            .ok()?;
        match serde_json::from_str::<TurnSummary>(&text) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(error = %e, "agent summary response was not valid structured JSON");
                None
            }
        }
    }
}

fn render_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
