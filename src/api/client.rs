use super::error::map_api_request_error;
use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::{fragment_stream, ByteStream, FragmentStream, ModelError, ModelService};
use crate::config::Config;
use crate::types::{
    ApiErrorEnvelope, ChatCompletionRequest, Message, TokenizeRequest, TokenizeResponse,
};
use crate::util::join_endpoint;
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;

/// End-of-turn and end-of-instruction markers of the llama-2 chat template.
pub const LLAMA2_STOP_MARKERS: [&str; 3] = ["[INST]", "[/INST]", "</s>"];

const TOKENIZE_PATH: &str = "tokenize";
const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

/// Talks to a llama.cpp-compatible server that has the model loaded.
#[derive(Clone)]
pub struct LlamaClient {
    http: reqwest::Client,
    model: String,
    api_url: String,
    api_key: Option<String>,
}

impl LlamaClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            model: config.model_path.clone(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .post(url)
            .header("content-type", "application/json");
        match &self.api_key {
            Some(api_key) => request.header("authorization", format!("Bearer {api_key}")),
            None => request,
        }
    }
}

#[async_trait]
impl ModelService for LlamaClient {
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        let request_url = join_endpoint(&self.api_url, TOKENIZE_PATH);
        let response = self
            .post(&request_url)
            .json(&TokenizeRequest {
                content: text,
                add_special: true,
            })
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        let response = check_status(response, &request_url).await?;

        let body: TokenizeResponse = response.json().await.map_err(|error| {
            ModelError::Protocol(format!("tokenize response from '{request_url}': {error}"))
        })?;
        Ok(body.tokens)
    }

    async fn stream_complete(
        &self,
        messages: &[Message],
        stop: &[&str],
    ) -> Result<FragmentStream, ModelError> {
        let request_url = join_endpoint(&self.api_url, CHAT_COMPLETIONS_PATH);
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream: true,
            stop,
        };

        if debug_payload_enabled() {
            if let Ok(value) = serde_json::to_value(&payload) {
                emit_debug_payload(&request_url, &value);
            }
        }
        tracing::debug!(
            target: "chatsh::api",
            url = %request_url,
            messages = messages.len(),
            "requesting completion"
        );

        let response = self
            .post(&request_url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        let response = check_status(response, &request_url).await?;

        let request_url_for_stream = request_url.clone();
        let bytes: ByteStream = Box::pin(response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        }));
        Ok(fragment_stream(bytes))
    }
}

async fn check_status(
    response: reqwest::Response,
    request_url: &str,
) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_error_body(status.as_u16(), &body, request_url))
}

fn classify_error_body(status: u16, body: &str, request_url: &str) -> ModelError {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.is_context_overflow() => {
            ModelError::BudgetExceeded(envelope.error.message)
        }
        Ok(envelope) => ModelError::Http {
            url: request_url.to_string(),
            status,
            message: envelope.error.message,
        },
        Err(_) => ModelError::Http {
            url: request_url.to_string(),
            status,
            message: body.trim().to_string(),
        },
    }
}
