// crates/host/src/agent_evaluator.rs

//! Evaluator that asks a chat model which service it would invoke.
//!
//! Every service in a scenario becomes one function tool. The model's first
//! tool call is the verdict; answering in plain text is a no-choice.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::json;

use toolpref_core::ai_client::{function_tool, system_message, user_message, AiClient, ChatRequest, ClientError};
use toolpref_core::error::TrialError;
use toolpref_core::oracle::{Choice, Evaluator, Scenario};

/// Function names the chat API accepts are limited to this length.
const MAX_TOOL_NAME: usize = 64;

const INSTRUCTIONS: &str = "You are an assistant with access to tools. \
Answer the user's request by calling the single most appropriate tool. \
If no tool fits, answer directly without calling one.";

pub struct AgentEvaluator<C: AiClient> {
    client: C,
    temperature: f32,
    /// The client's own request timeout, reported when it fires.
    request_timeout: Duration,
}

impl<C: AiClient> AgentEvaluator<C> {
    pub fn new(client: C, request_timeout: Duration) -> Self {
        Self {
            client,
            temperature: 0.0,
            request_timeout,
        }
    }

    fn request(&self, scenario: &Scenario) -> ChatRequest {
        let tools = scenario
            .services
            .iter()
            .map(|s| {
                function_tool(
                    &tool_name(&s.label, &s.name),
                    &s.description,
                    json!({ "type": "object", "properties": {} }),
                )
            })
            .collect();

        ChatRequest::new(vec![system_message(INSTRUCTIONS), user_message(&scenario.query)])
            .with_tools(tools)
            .with_temperature(self.temperature)
    }
}

impl<C: AiClient + 'static> Evaluator for AgentEvaluator<C> {
    fn evaluate(&self, scenario: &Scenario) -> Result<Choice, TrialError> {
        let response = self
            .client
            .chat(self.request(scenario))
            .map_err(|e| classify(e, self.request_timeout))?;
        let message = response
            .message()
            .ok_or_else(|| TrialError::Malformed("response has no choices".to_string()))?;

        let Some(call) = message.first_tool_call() else {
            return Ok(Choice::no_choice().with_raw(message.text()));
        };

        let called = call.function.name.as_str();
        let label = scenario
            .services
            .iter()
            .find(|s| tool_name(&s.label, &s.name) == called || s.label == called)
            .map(|s| s.label.clone())
            .ok_or_else(|| TrialError::Malformed(format!("model called unknown tool '{}'", called)))?;

        Ok(Choice::chose(label).with_raw(format!("{}({})", called, call.function.arguments)))
    }
}

/// `svc2_get-forecast`: unique through the label, readable through the name.
pub fn tool_name(label: &str, name: &str) -> String {
    static INVALID: OnceLock<Option<Regex>> = OnceLock::new();
    let sanitized = match INVALID.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").ok()) {
        Some(re) => re.replace_all(name, "_").into_owned(),
        None => name.to_string(),
    };
    let mut full = format!("{}_{}", label, sanitized.trim_matches('_'));
    full.truncate(MAX_TOOL_NAME);
    full
}

fn classify(err: anyhow::Error, request_timeout: Duration) -> TrialError {
    match err.downcast_ref::<ClientError>() {
        Some(ClientError::Timeout) => TrialError::Timeout(request_timeout),
        Some(other) => TrialError::Transport(other.to_string()),
        None => TrialError::Transport(format!("{:#}", err)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::Result;
    use toolpref_core::ai_client::ChatResponse;
    use toolpref_core::types::Candidate;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Replays one canned response body and keeps the last request.
    struct CannedClient {
        body: Result<serde_json::Value, ClientError>,
        seen: Mutex<Option<serde_json::Value>>,
    }

    impl CannedClient {
        fn new(body: serde_json::Value) -> Self {
            Self {
                body: Ok(body),
                seen: Mutex::new(None),
            }
        }

        fn failing(err: ClientError) -> Self {
            Self {
                body: Err(err),
                seen: Mutex::new(None),
            }
        }
    }

    impl AiClient for CannedClient {
        fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            *self.seen.lock().unwrap() = Some(serde_json::to_value(&request)?);
            match &self.body {
                Ok(body) => Ok(serde_json::from_value(body.clone())?),
                Err(err) => Err(err.clone().into()),
            }
        }
    }

    fn scenario() -> Scenario {
        let candidate = Candidate::baseline("cand-0000", "get-forecast", "Get forecast.").unwrap();
        let competitor = Candidate::competitor("weather-competitor-1", "get-forecast", "Fetch forecast.").unwrap();
        Scenario::build(&candidate, &[competitor], 1, "Rain in Oslo?")
    }

    fn tool_call(name: &str) -> serde_json::Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": name, "arguments": "{}" }
                    }]
                }
            }]
        })
    }

    #[test]
    fn test_tool_call_maps_back_to_label() {
        let evaluator = AgentEvaluator::new(CannedClient::new(tool_call("svc2_get-forecast")), TIMEOUT);
        let scenario = scenario();

        let choice = evaluator.evaluate(&scenario).unwrap();
        assert_eq!(choice, Choice::chose("svc2").with_raw("svc2_get-forecast({})"));
        // query index 1 puts the candidate second
        assert_eq!(scenario.resolve("svc2"), Some("cand-0000"));

        let request = evaluator.client.seen.lock().unwrap().clone().unwrap();
        assert_eq!(request["tools"].as_array().unwrap().len(), 2);
        assert_eq!(request["tools"][0]["function"]["description"], "Fetch forecast.");
        assert_eq!(request["messages"][1]["content"], "Rain in Oslo?");
    }

    #[test]
    fn test_text_answer_is_no_choice() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "It will rain." } }]
        });
        let choice = AgentEvaluator::new(CannedClient::new(body), TIMEOUT).evaluate(&scenario()).unwrap();
        assert_eq!(choice, Choice::no_choice().with_raw("It will rain."));
    }

    #[test]
    fn test_unknown_tool_is_malformed() {
        let evaluator = AgentEvaluator::new(CannedClient::new(tool_call("svc9_other")), TIMEOUT);
        assert!(matches!(evaluator.evaluate(&scenario()), Err(TrialError::Malformed(_))));
    }

    #[test]
    fn test_client_errors_are_classified() {
        let timeout = AgentEvaluator::new(CannedClient::failing(ClientError::Timeout), TIMEOUT);
        assert_eq!(timeout.evaluate(&scenario()), Err(TrialError::Timeout(TIMEOUT)));

        let http = AgentEvaluator::new(
            CannedClient::failing(ClientError::Http {
                status: 500,
                body: "boom".to_string(),
            }),
            TIMEOUT,
        );
        assert!(matches!(http.evaluate(&scenario()), Err(TrialError::Transport(_))));
    }

    #[test]
    fn test_tool_name_sanitizes_and_truncates() {
        assert_eq!(tool_name("svc1", "get forecast!"), "svc1_get_forecast");
        assert_eq!(tool_name("svc1", &"x".repeat(100)).len(), MAX_TOOL_NAME);
    }
}
