//! OpenAI chat completions adapter.
//!
//! One client covers three capabilities:
//! - plan generation (structured output with both Terraform configurations)
//! - comparison (structured output with a single analysis field)
//! - synthesis (plain completion on a cheaper model)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{AdapterError, Comparator, PlanGenerator, Summarizer};
use crate::config::OpenAiSettings;
use crate::domain::ProviderPair;

const PLAN_SYSTEM_PROMPT: &str = "You are an infrastructure-as-code expert. From a description of \
infrastructure needs, write two separate Terraform configurations: one for AWS and one for Azure. \
Return only Terraform code, with no explanations. Both configurations must be valid and deployable.";

const COMPARISON_SYSTEM_PROMPT: &str = "You are a cloud cost analyst. Compare the infrastructure \
costs of AWS and Azure using the cost analyses provided. Explain where the costs differ and why, \
taking pricing models, reserved instances and potential long-term savings into account.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are an infrastructure-as-code expert. Given either \
infrastructure code or a cost analysis, write a very concise report that helps the user \
understand what it describes.";

/// OpenAI API client
pub struct OpenAiClient {
    api_key: String,
    settings: OpenAiSettings,
    client: reqwest::Client,
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
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TerraformPlans {
    aws_terraform: String,
    azure_terraform: String,
}

#[derive(Debug, Deserialize)]
struct CostComparison {
    analysis: String,
}

/// Structured output request: schema name plus JSON schema
struct ResponseSchema {
    name: &'static str,
    schema: Value,
}

impl ResponseSchema {
    fn plans() -> Self {
        Self {
            name: "terraform_plans",
            schema: json!({
                "type": "object",
                "properties": {
                    "aws_terraform": { "type": "string" },
                    "azure_terraform": { "type": "string" }
                },
                "required": ["aws_terraform", "azure_terraform"],
                "additionalProperties": false
            }),
        }
    }

    fn comparison() -> Self {
        Self {
            name: "cost_comparison",
            schema: json!({
                "type": "object",
                "properties": {
                    "analysis": { "type": "string" }
                },
                "required": ["analysis"],
                "additionalProperties": false
            }),
        }
    }

    fn to_response_format(&self) -> Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "strict": true,
                "schema": self.schema,
            }
        })
    }
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, settings: OpenAiSettings) -> Self {
        Self {
            api_key: api_key.into(),
            settings,
            client: reqwest::Client::new(),
        }
    }

    /// Create from resolved configuration. Fails without an API key.
    pub fn from_config(config: &crate::config::ResolvedConfig) -> Result<Self> {
        let api_key = config
            .openai
            .api_key
            .clone()
            .context("No OpenAI API key configured (set OPENAI_API_KEY)")?;

        let client = reqwest::Client::builder()
            .timeout(config.limits.call_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key,
            settings: config.openai.clone(),
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    /// Send one chat completion and return the assistant message content
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema: Option<&ResponseSchema>,
    ) -> Result<String, AdapterError> {
        let body = build_request(model, system_prompt, user_prompt, schema);

        debug!(model, url = %self.completions_url(), "Sending chat completion");

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(format!("Unreadable completion response: {}", e)))?;

        message_content(response)
    }

    async fn complete_structured<T: DeserializeOwned>(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema: ResponseSchema,
    ) -> Result<T, AdapterError> {
        let content = self
            .complete(model, system_prompt, user_prompt, Some(&schema))
            .await?;

        parse_structured(&content, schema.name)
    }
}

fn build_request(
    model: &str,
    system_prompt: &str,
    user_prompt: &str,
    schema: Option<&ResponseSchema>,
) -> Value {
    let messages = [
        ChatMessage {
            role: "system",
            content: system_prompt,
        },
        ChatMessage {
            role: "user",
            content: user_prompt,
        },
    ];

    let mut body = json!({
        "model": model,
        "messages": messages,
    });

    if let Some(schema) = schema {
        body["response_format"] = schema.to_response_format();
    }

    body
}

fn message_content(response: ChatResponse) -> Result<String, AdapterError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Malformed("Completion returned no choices".into()))?
        .message;

    if let Some(refusal) = message.refusal {
        return Err(AdapterError::Malformed(format!("Model refused: {}", refusal)));
    }

    message
        .content
        .ok_or_else(|| AdapterError::Malformed("Completion message has no content".into()))
}

fn parse_structured<T: DeserializeOwned>(content: &str, name: &str) -> Result<T, AdapterError> {
    serde_json::from_str(content)
        .map_err(|e| AdapterError::Malformed(format!("Invalid {} payload: {}", name, e)))
}

fn comparison_prompt(requirement_text: &str, aws_cost_raw: &str, azure_cost_raw: &str) -> String {
    format!(
        "Initial requirement:\n{}\n\nAWS cost analysis:\n{}\n\nAzure cost analysis:\n{}\n\n\
         Please provide a detailed comparison and a recommendation.",
        requirement_text, aws_cost_raw, azure_cost_raw
    )
}

#[async_trait]
impl PlanGenerator for OpenAiClient {
    async fn generate(&self, requirement_text: &str) -> Result<ProviderPair<String>, AdapterError> {
        let plans: TerraformPlans = self
            .complete_structured(
                &self.settings.plan_model,
                PLAN_SYSTEM_PROMPT,
                requirement_text,
                ResponseSchema::plans(),
            )
            .await?;

        Ok(ProviderPair::new(plans.aws_terraform, plans.azure_terraform))
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    async fn summarize(&self, text: &str) -> Result<String, AdapterError> {
        let content = self
            .complete(&self.settings.summary_model, SYNTHESIS_SYSTEM_PROMPT, text, None)
            .await?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Comparator for OpenAiClient {
    async fn compare(
        &self,
        requirement_text: &str,
        aws_cost_raw: &str,
        azure_cost_raw: &str,
    ) -> Result<String, AdapterError> {
        let prompt = comparison_prompt(requirement_text, aws_cost_raw, azure_cost_raw);

        let comparison: CostComparison = self
            .complete_structured(
                &self.settings.comparison_model,
                COMPARISON_SYSTEM_PROMPT,
                &prompt,
                ResponseSchema::comparison(),
            )
            .await?;

        Ok(comparison.analysis)
    }
}
