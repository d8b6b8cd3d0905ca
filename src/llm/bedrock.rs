//! Adapter for AWS Bedrock runtime, invoking Anthropic models through
//! global inference profiles.
//!
//! Requests are signed locally with SigV4 ([`sigv4`]); credentials are
//! resolved once at construction ([`credentials`]) and a missing set is
//! a configuration error raised before any network traffic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::chat::ChatMessage;
use crate::llm::anthropic::{MAX_TOKENS, lift_system_messages, parse_messages_payload};
use crate::llm::client::{CONNECTION_TEST_PROMPT, LlmClient};
use crate::llm::credentials::{self, AwsCredentials};
use crate::llm::sigv4;
use crate::llm::types::{Completion, LlmError};

const SERVICE: &str = "bedrock";
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct BedrockClient {
    http: reqwest::Client,
    credentials: Option<AwsCredentials>,
    region: String,
    model: String,
}

impl BedrockClient {
    /// Credentials are resolved here, once: explicit settings values win,
    /// then the process environment, then the shared credentials file.
    pub fn new(
        http: reqwest::Client,
        access_key: &str,
        secret_key: &str,
        session_token: &str,
        region: &str,
        model: &str,
    ) -> Self {
        let credentials = credentials::resolve(access_key, secret_key, session_token);
        match &credentials {
            Some(creds) => {
                tracing::debug!(provenance = %creds.provenance, "resolved AWS credentials")
            }
            None => tracing::warn!("no AWS credentials available for Bedrock"),
        }
        Self {
            http,
            credentials,
            region: region.to_string(),
            model: model.to_string(),
        }
    }

    fn host(&self) -> String {
        format!("bedrock-runtime.{}.amazonaws.com", self.region)
    }

    fn path(&self) -> String {
        format!("/model/{}/invoke", self.model)
    }

    async fn invoke(&self, body: Value) -> Result<Completion, LlmError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            LlmError::Configuration(
                "AWS credentials not configured; set them in settings, the \
                 AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY environment, or \
                 ~/.aws/credentials"
                    .to_string(),
            )
        })?;

        let host = self.host();
        let path = self.path();
        let body_bytes = serde_json::to_vec(&body)
            .map_err(|err| LlmError::Protocol(format!("failed to encode request body: {err}")))?;

        let signed = sigv4::sign_post(
            credentials,
            &host,
            &path,
            &self.region,
            SERVICE,
            &body_bytes,
            Utc::now(),
        );

        let mut request = self
            .http
            .post(format!("https://{host}{path}"))
            .timeout(REQUEST_TIMEOUT)
            .header("Content-Type", "application/json")
            .header("X-Amz-Date", &signed.amz_date)
            .header("X-Amz-Content-Sha256", &signed.content_sha256)
            .header("Authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        let response = request
            .body(body_bytes)
            .send()
            .await
            .map_err(|err| LlmError::Network(format!("no response from AWS Bedrock: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| LlmError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|err| LlmError::Protocol(format!("malformed Bedrock response: {err}")))?;
        parse_messages_payload(&payload)
    }
}

fn base_body() -> Value {
    json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": MAX_TOKENS,
    })
}

#[async_trait]
impl LlmClient for BedrockClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let mut body = base_body();
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }
        body["messages"] = json!([{"role": "user", "content": prompt}]);
        self.invoke(body).await
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
    ) -> Result<Completion, LlmError> {
        let (system, messages) = lift_system_messages(history, new_message);
        let mut body = base_body();
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        body["messages"] = json!(messages);
        self.invoke(body).await
    }

    async fn test_connection(&self) -> bool {
        self.complete(CONNECTION_TEST_PROMPT, None).await.is_ok()
    }

    fn provider_name(&self) -> &str {
        "AWS Bedrock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
