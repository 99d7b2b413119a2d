use crate::context::ContextPack;
use crate::model::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Claude,
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub context_pack: Option<ContextPack>,
    pub conversation_messages: Vec<Message>,
    pub enabled_agents: Vec<String>,
    pub model_provider: ModelProvider,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    #[serde(default)]
    pub ideas: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub topic_summary: Option<String>,
    #[serde(default)]
    pub agent_results: BTreeMap<String, AgentResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub topic_summary: Option<String>,
    pub agent_results: BTreeMap<String, AgentResult>,
}

impl ChatResponse {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            ..Default::default()
        }
    }

    /// The reply text, or the error the endpoint reported in its body.
    pub fn into_reply(self) -> Result<ChatReply, ChatError> {
        match (self.response, self.error) {
            (_, Some(error)) => Err(ChatError::Endpoint(error)),
            (Some(text), None) => Ok(ChatReply {
                text,
                topic_summary: self.topic_summary,
                agent_results: self.agent_results,
            }),
            (None, None) => Err(ChatError::Malformed("response carries neither reply nor error".to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat endpoint unreachable: {0}")]
    Transport(String),
    #[error("{0}")]
    Endpoint(String),
    #[error("malformed chat response: {0}")]
    Malformed(String),
}

impl ChatError {
    /// Text of the synthetic assistant message that reports this failure.
    pub fn as_reply(&self) -> String {
        format!("Error: {self}")
    }
}

/// The remote chat endpoint. Implementations only move bytes; everything
/// that touches the conversation graph happens in the session.
pub trait ChatBackend {
    fn send(&self, request: &ChatRequest) -> impl Future<Output = Result<ChatResponse, ChatError>>;
}

/// Idea titles of every successful agent, in agent-name order. Blank ideas
/// are skipped.
pub fn agent_ideas(results: &BTreeMap<String, AgentResult>) -> Vec<(String, String)> {
    results
        .iter()
        .filter(|(_, result)| result.success)
        .flat_map(|(agent, result)| {
            result
                .ideas
                .iter()
                .flatten()
                .map(|idea| idea.trim())
                .filter(|idea| !idea.is_empty())
                .map(move |idea| (agent.clone(), idea.to_string()))
        })
        .collect()
}

#[cfg(feature = "http")]
pub mod http {
    use super::*;
    use crate::config::ChatConfig;

    /// POSTs requests as JSON to a fixed endpoint URL.
    #[derive(Debug, Clone)]
    pub struct HttpChatBackend {
        client: reqwest::Client,
        endpoint: String,
    }

    impl HttpChatBackend {
        pub fn new(endpoint: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                endpoint: endpoint.into(),
            }
        }

        pub fn from_config(config: &ChatConfig) -> Self {
            Self::new(config.endpoint.clone())
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    impl ChatBackend for HttpChatBackend {
        async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
            let response = self
                .client
                .post(&self.endpoint)
                .json(request)
                .send()
                .await
                .map_err(|err| ChatError::Transport(err.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|err| ChatError::Transport(err.to_string()))?;
            match serde_json::from_str::<ChatResponse>(&text) {
                Ok(body) if status.is_success() || body.error.is_some() => Ok(body),
                Ok(_) => Err(ChatError::Endpoint(format!("HTTP {status}"))),
                Err(_) if !status.is_success() => Err(ChatError::Endpoint(format!("HTTP {status}"))),
                Err(err) => Err(ChatError::Malformed(err.to_string())),
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_wire_names() {
        let request = ChatRequest {
            message: "hi".to_string(),
            context_pack: None,
            conversation_messages: Vec::new(),
            enabled_agents: vec!["brainstorming".to_string()],
            model_provider: ModelProvider::Gemini,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contextPack"], serde_json::Value::Null);
        assert_eq!(json["enabledAgents"][0], "brainstorming");
        assert_eq!(json["modelProvider"], "gemini");
        assert!(json["conversationMessages"].is_array());
    }

    #[test]
    fn response_with_agent_results_parses() {
        let json = r#"{
            "response": "sure",
            "model": "claude-3-haiku-20240307",
            "topicSummary": "about foxes",
            "agentResults": {
                "brainstorming": {"success": true, "ideas": ["Fox habitats", "  ", "Urban wildlife"], "agent": "brainstorming"},
                "broken": {"success": false, "error": "timeout"}
            }
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let ideas = agent_ideas(&response.agent_results);
        assert_eq!(
            ideas,
            vec![
                ("brainstorming".to_string(), "Fox habitats".to_string()),
                ("brainstorming".to_string(), "Urban wildlife".to_string()),
            ]
        );
        let reply = response.into_reply().unwrap();
        assert_eq!(reply.text, "sure");
        assert_eq!(reply.topic_summary.as_deref(), Some("about foxes"));
    }

    #[test]
    fn error_body_becomes_endpoint_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"error": "No message provided"}"#).unwrap();
        assert_eq!(
            response.into_reply(),
            Err(ChatError::Endpoint("No message provided".to_string()))
        );
        assert!(ChatResponse::default().into_reply().is_err());
    }
}
