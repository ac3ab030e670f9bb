use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::agent::AgentBehavior;
use super::errors::{AgentError, AgentResult};
use super::events::AgentEvent;
use super::inference::{InferenceClient, InferenceRequest, InferenceResponse};
use super::messages::{self, AgentMessage};
use super::prompts::{library, PromptTemplate};
use super::state::AgentCore;
use super::tools::Tool;

/// Conversation turns kept per conversation in agent memory
const MAX_HISTORY_TURNS: usize = 20;

/// Model settings, read from the agent's `config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

impl ModelSettings {
    /// Reads whatever keys are present, defaults fill the rest
    pub fn from_config(config: &serde_json::Value) -> Self {
        let defaults = Self::default();
        Self {
            model: config
                .get("model")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or(defaults.model),
            temperature: config
                .get("temperature")
                .and_then(|v| v.as_f64())
                .map(|t| t as f32)
                .unwrap_or(defaults.temperature),
            max_tokens: config
                .get("max_tokens")
                .and_then(|v| v.as_u64())
                .map(|t| t as u32)
                .unwrap_or(defaults.max_tokens),
        }
    }

    fn request(&self, template: &PromptTemplate, prompt: String) -> InferenceRequest {
        InferenceRequest {
            model: self.model.clone(),
            system: template.system.clone(),
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Turn {
    role: String,
    content: String,
}

/// Conversational / task agent backed by the inference client
///
/// Handles `chat` and `task` messages. Chat history is kept in agent memory
/// under `conversation:<id>` and each reply is published as a `Message` event.
pub struct AssistantAgent {
    inference: Arc<dyn InferenceClient>,
}

impl AssistantAgent {
    pub fn new(inference: Arc<dyn InferenceClient>) -> Self {
        Self { inference }
    }

    async fn complete(
        &self,
        request: InferenceRequest,
        cancel: &CancellationToken,
    ) -> AgentResult<InferenceResponse> {
        if cancel.is_cancelled() {
            return Err(AgentError::TaskCancelled);
        }
        let response = self.inference.complete(request).await?;
        if cancel.is_cancelled() {
            return Err(AgentError::TaskCancelled);
        }
        Ok(response)
    }

    async fn chat(
        &self,
        core: &AgentCore,
        message: AgentMessage,
        cancel: &CancellationToken,
    ) -> AgentResult<serde_json::Value> {
        let conversation_id = message
            .conversation_id
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let memory_key = format!("conversation:{}", conversation_id);
        let mut history: Vec<Turn> = core
            .recall(&memory_key)
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let transcript = history
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n");
        let template = library::conversation();
        let prompt = template.render(&HashMap::from([
            ("history".to_string(), transcript),
            ("message".to_string(), message.content.clone()),
        ]));

        let settings = ModelSettings::from_config(&core.config());
        let response = self.complete(settings.request(&template, prompt), cancel).await?;

        history.push(Turn {
            role: "user".to_string(),
            content: message.content,
        });
        history.push(Turn {
            role: "assistant".to_string(),
            content: response.content.clone(),
        });
        if history.len() > MAX_HISTORY_TURNS {
            let excess = history.len() - MAX_HISTORY_TURNS;
            history.drain(..excess);
        }
        core.remember(memory_key, serde_json::to_value(&history)?);

        core.events().publish(AgentEvent::Message {
            agent_id: core.id().to_string(),
            conversation_id: Some(conversation_id.clone()),
            content: response.content.clone(),
            metadata: message.metadata,
        });

        Ok(json!({
            "content": response.content,
            "usage": response.usage,
            "conversationId": conversation_id,
        }))
    }

    async fn run_task(
        &self,
        core: &AgentCore,
        message: AgentMessage,
        cancel: &CancellationToken,
    ) -> AgentResult<serde_json::Value> {
        let template = library::task_execution();
        let input = serde_json::to_string_pretty(&message.metadata)?;
        let prompt = template.render(&HashMap::from([
            ("description".to_string(), message.content.clone()),
            ("input".to_string(), input),
        ]));

        let settings = ModelSettings::from_config(&core.config());
        let response = self.complete(settings.request(&template, prompt), cancel).await?;

        Ok(json!({
            "content": response.content,
            "usage": response.usage,
        }))
    }
}

#[async_trait]
impl AgentBehavior for AssistantAgent {
    fn default_capabilities(&self) -> Vec<String> {
        vec![
            "conversation".to_string(),
            "text-generation".to_string(),
            "analysis".to_string(),
        ]
    }

    async fn setup(&self, core: &Arc<AgentCore>) -> AgentResult<()> {
        let inference = Arc::clone(&self.inference);
        let settings = ModelSettings::from_config(&core.config());
        core.register_tool(Tool::from_fn(
            "generate_text",
            "Generate text for a prompt with the agent's model settings",
            json!({
                "type": "object",
                "properties": { "prompt": { "type": "string" } },
                "required": ["prompt"]
            }),
            move |params| {
                let inference = Arc::clone(&inference);
                let settings = settings.clone();
                async move {
                    let prompt = match params.get("prompt").and_then(|v| v.as_str()) {
                        Some(prompt) => prompt.to_string(),
                        None => {
                            return Err(AgentError::InvalidMessage(
                                "generate_text requires a prompt".to_string(),
                            ))
                        }
                    };
                    let request = InferenceRequest {
                        model: settings.model,
                        system: String::new(),
                        prompt,
                        temperature: settings.temperature,
                        max_tokens: settings.max_tokens,
                    };
                    match inference.complete(request).await {
                        Ok(response) => Ok(serde_json::to_value(response)?),
                        Err(e) => Err(e),
                    }
                }
            },
        ));
        Ok(())
    }

    async fn handle(
        &self,
        core: &Arc<AgentCore>,
        message: AgentMessage,
        cancel: CancellationToken,
    ) -> AgentResult<serde_json::Value> {
        match message.message_type.as_str() {
            "chat" => self.chat(core, message, &cancel).await,
            messages::TASK => self.run_task(core, message, &cancel).await,
            other => Err(AgentError::InvalidMessage(format!(
                "Assistant agent cannot handle '{}' messages",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::agent::Agent;
    use crate::agents::events::EventBus;
    use crate::agents::inference::EchoInferenceClient;
    use crate::agents::types::AgentType;
    use crate::infrastructure::repositories::InMemoryAgentRepository;
    use std::time::Duration;
    use uuid::Uuid;

    struct Failing;

    #[async_trait]
    impl InferenceClient for Failing {
        async fn complete(&self, _request: InferenceRequest) -> AgentResult<InferenceResponse> {
            Err(AgentError::Inference("backend down".to_string()))
        }
    }

    async fn assistant(inference: Arc<dyn InferenceClient>, events: EventBus) -> Agent {
        let core = AgentCore::new(
            "assistant",
            "Assistant",
            AgentType::Assistant,
            Arc::new(InMemoryAgentRepository::new()),
            events,
        );
        let agent = Agent::new(core, Box::new(AssistantAgent::new(inference)), Duration::from_secs(30));
        agent.initialize().await.unwrap();
        agent
    }

    #[test]
    fn model_settings_fall_back_to_defaults() {
        let settings = ModelSettings::from_config(&json!({"temperature": 0.1}));

        assert_eq!(settings.model, "claude-3-5-sonnet-20241022");
        assert!((settings.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(settings.max_tokens, 4096);
    }

    #[tokio::test]
    async fn chat_keeps_history_and_publishes_message() {
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let agent = assistant(Arc::new(EchoInferenceClient), events).await;

        let out = agent
            .process(AgentMessage::new("chat", "hello there").with_conversation("c1"))
            .await
            .unwrap();
        assert_eq!(out["conversationId"], json!("c1"));

        let history = agent.core().recall("conversation:c1").unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);

        let mut saw_message = false;
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Message { conversation_id, .. } = event {
                assert_eq!(conversation_id.as_deref(), Some("c1"));
                saw_message = true;
            }
        }
        assert!(saw_message);
    }

    #[tokio::test]
    async fn task_returns_content_and_usage() {
        let agent = assistant(Arc::new(EchoInferenceClient), EventBus::new(16)).await;
        let out = agent
            .process(AgentMessage::task(Uuid::new_v4(), "Summarize", json!({"text": "abc"})))
            .await
            .unwrap();

        assert!(out["content"].as_str().unwrap().contains("Summarize"));
        assert!(out["usage"].is_object());
    }

    #[tokio::test]
    async fn inference_errors_propagate() {
        let agent = assistant(Arc::new(Failing), EventBus::new(16)).await;
        let result = agent
            .process(AgentMessage::task(Uuid::new_v4(), "Summarize", json!({})))
            .await;

        assert!(matches!(result, Err(AgentError::Inference(_))));
    }

    #[tokio::test]
    async fn generate_text_tool_requires_prompt() {
        let agent = assistant(Arc::new(EchoInferenceClient), EventBus::new(16)).await;

        let result = agent.execute_tool("generate_text", json!({})).await;
        assert!(matches!(result, Err(AgentError::InvalidMessage(_))));

        let out = agent
            .execute_tool("generate_text", json!({"prompt": "write a haiku"}))
            .await
            .unwrap();
        assert_eq!(out["content"], json!("write a haiku"));
    }
}
