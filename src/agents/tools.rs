use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::errors::AgentResult;

/// Handler invoked when a tool is executed
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: serde_json::Value) -> AgentResult<serde_json::Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = AgentResult<serde_json::Value>> + Send,
{
    async fn call(&self, params: serde_json::Value) -> AgentResult<serde_json::Value> {
        (self.0)(params).await
    }
}

/// A named, schema-described tool an agent exposes
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }

    /// Builds a tool from an async closure
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        f: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult<serde_json::Value>> + Send + 'static,
    {
        Self::new(name, description, schema, Arc::new(FnHandler(f)))
    }

    pub async fn invoke(&self, params: serde_json::Value) -> AgentResult<serde_json::Value> {
        self.handler.call(params).await
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.schema.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// Name-keyed tool table; registering a name twice keeps one entry
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(Tool::descriptor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> Tool {
        Tool::from_fn("echo", "Echo params back", json!({"type": "object"}), |params| async move {
            Ok(params)
        })
    }

    #[tokio::test]
    async fn closure_tool_invokes_handler() {
        let tool = echo_tool();
        let out = tool.invoke(json!({"x": 1})).await.unwrap();

        assert_eq!(out, json!({"x": 1}));
    }

    #[test]
    fn registering_twice_keeps_single_entry() {
        let mut registry = ToolRegistry::default();
        registry.register(echo_tool());
        registry.register(echo_tool());

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("echo"));
        assert_eq!(registry.descriptors()[0].name, "echo");
    }
}
