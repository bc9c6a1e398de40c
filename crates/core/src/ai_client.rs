// crates/core/src/ai_client.rs

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Abstract chat-completions client with tool support.
///
/// Implementations can target OpenAI, Azure OpenAI, Ollama, vLLM, etc.
/// Calls block; async callers go through `spawn_blocking`.
pub trait AiClient: Send + Sync {
    /// Send a chat completion request with optional tools.
    fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// Failures a client reports in a form callers can classify.
///
/// Clients return these inside `anyhow::Error`; use `downcast_ref` to inspect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

/// A chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Value>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: None,
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self.tool_choice = Some("auto".to_string());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

pub fn system_message(content: &str) -> Value {
    json!({ "role": "system", "content": content })
}

pub fn user_message(content: &str) -> Value {
    json!({ "role": "user", "content": content })
}

/// A function tool definition in chat-completions form.
pub fn function_tool(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

/// A chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// The message of the first choice, if any.
    pub fn message(&self) -> Option<&ChatMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatMessage {
    /// Trimmed text content, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn first_tool_call(&self) -> Option<&ChatToolCall> {
        self.tool_calls.as_ref().and_then(|calls| calls.first())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    pub function: ChatToolFunction,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatToolFunction {
    pub name: String,
    /// Raw JSON string of the arguments.
    #[serde(default)]
    pub arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_tools_and_choice() {
        let request = ChatRequest::new(vec![user_message("Weather in Paris?")])
            .with_tools(vec![function_tool("svc1", "Get forecast.", json!({"type": "object"}))])
            .with_temperature(0.0);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "svc1");
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let body = serde_json::to_value(ChatRequest::new(vec![system_message("hi")])).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_response_parses_tool_call() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"call_1","type":"function",
            "function":{"name":"svc2","arguments":"{\"state\":\"CA\"}"}}]}}]}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        let message = response.message().unwrap();
        assert_eq!(message.text(), "");
        assert_eq!(message.first_tool_call().unwrap().function.name, "svc2");
    }
}
