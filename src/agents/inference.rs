// Inference backend seam
//
// Agents treat model inference as an opaque request/response call. The
// concrete backend lives outside the coordination core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::AgentResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: InferenceRequest) -> AgentResult<InferenceResponse>;
}

/// Offline backend that answers with the prompt it was given
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoInferenceClient;

#[async_trait]
impl InferenceClient for EchoInferenceClient {
    async fn complete(&self, request: InferenceRequest) -> AgentResult<InferenceResponse> {
        let prompt_tokens = request.prompt.split_whitespace().count() as u32;
        let content: String = request
            .prompt
            .split_whitespace()
            .take(request.max_tokens as usize)
            .collect::<Vec<_>>()
            .join(" ");
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(InferenceResponse {
            content,
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_respects_max_tokens() {
        let client = EchoInferenceClient;
        let response = client
            .complete(InferenceRequest {
                model: "echo".to_string(),
                system: String::new(),
                prompt: "one two three four".to_string(),
                temperature: 0.0,
                max_tokens: 2,
            })
            .await
            .unwrap();

        assert_eq!(response.content, "one two");
        assert_eq!(
            response.usage,
            Some(Usage {
                prompt_tokens: 4,
                completion_tokens: 2
            })
        );
    }
}
