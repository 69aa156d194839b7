//! LLM-backed exploit and patch generators over an OpenAI-compatible
//! chat completions endpoint.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::LlmConfig;
use crate::domain::ports::{ExploitGenerator, PatchGenerator};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No API key configured")]
    MissingApiKey,
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("Response contained no choices")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Remove markdown code fences the model wraps around source.
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Minimal chat completions client.
pub struct ChatClient {
    http_client: ReqwestClient,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
        })
    }

    pub async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(LlmError::Api { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

const EXPLOIT_SYSTEM: &str = "You are an offensive smart-contract security researcher. \
Reply with Solidity source only, no markdown.";

const PATCH_SYSTEM: &str = "You are a smart-contract security auditor repairing vulnerable code. \
Reply with the complete fixed Solidity source only, no markdown.";

fn exploit_prompt(source: &str, report: &str) -> String {
    format!(
        "Target contract (deployed from src/Target.sol as `Target`):\n```solidity\n{source}\n```\n\n\
         Static analysis report:\n{report}\n\n\
         Write a Foundry test contract that proves each vulnerability.\n\
         - One test function per independent vulnerability, named `testExploit_<Kind>_<NN>` \
           (e.g. `testExploit_Reentrancy_01`).\n\
         - Each function performs the attack and asserts its effect; assertions pass only if the attack succeeds.\n\
         - Include `setUp()` deploying the target, `import \"forge-std/Test.sol\";` and \
           `import \"../src/Target.sol\";`, and inherit `Test`."
    )
}

fn patch_prompt(source: &str, report: &str, failing_evidence: &str) -> String {
    format!(
        "Vulnerable contract:\n```solidity\n{source}\n```\n\n\
         Static analysis report:\n{report}\n\n\
         Exploits that currently succeed:\n{failing_evidence}\n\n\
         Return the complete fixed contract. Keep the contract name and public interface unchanged."
    )
}

pub struct LlmExploitGenerator {
    client: Arc<ChatClient>,
    temperature: f32,
}

impl LlmExploitGenerator {
    pub fn new(client: Arc<ChatClient>, config: &LlmConfig) -> Self {
        Self { client, temperature: config.exploit_temperature }
    }
}

#[async_trait]
impl ExploitGenerator for LlmExploitGenerator {
    fn name(&self) -> &'static str {
        "exploit generator"
    }

    async fn generate(&self, source: &str, report: &str) -> DomainResult<String> {
        let text = self
            .client
            .complete(EXPLOIT_SYSTEM, &exploit_prompt(source, report), self.temperature)
            .await
            .map_err(|e| DomainError::degraded(self.name(), e.to_string()))?;
        Ok(strip_code_fences(&text))
    }
}

pub struct LlmPatchGenerator {
    client: Arc<ChatClient>,
    temperature: f32,
}

impl LlmPatchGenerator {
    pub fn new(client: Arc<ChatClient>, config: &LlmConfig) -> Self {
        Self { client, temperature: config.patch_temperature }
    }
}

#[async_trait]
impl PatchGenerator for LlmPatchGenerator {
    fn name(&self) -> &'static str {
        "patch generator"
    }

    async fn fix(&self, source: &str, report: &str, failing_evidence: &str) -> DomainResult<String> {
        let text = self
            .client
            .complete(PATCH_SYSTEM, &patch_prompt(source, report, failing_evidence), self.temperature)
            .await
            .map_err(|e| DomainError::degraded(self.name(), e.to_string()))?;
        Ok(strip_code_fences(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        let text = "```solidity\ncontract A {}\n```\n";
        assert_eq!(strip_code_fences(text), "contract A {}");
        assert_eq!(strip_code_fences("contract B {}"), "contract B {}");
    }

    #[tokio::test]
    async fn test_missing_api_key_degrades() {
        let config = LlmConfig { api_key: None, ..LlmConfig::default() };
        let client = ChatClient {
            http_client: ReqwestClient::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: None,
        };
        let generator = LlmPatchGenerator::new(Arc::new(client), &config);
        let err = generator.fix("src", "", "").await.unwrap_err();
        assert!(matches!(err, DomainError::GeneratorDegraded { .. }));
    }
}
