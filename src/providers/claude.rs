use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};

use super::retry::{RetryPolicy, http_client, send_with_retry};
use super::{
    Message, MessageRole, Provider, ProviderFuture, ProviderResponse, ProviderUsage, ToolSpec,
    format_error_parts,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
pub(crate) const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

#[derive(Debug, Clone)]
pub struct Claude {
    key: String,
    model: String,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl Claude {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    fn find_tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}

impl Provider for Claude {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self
                .find_tool(&tool_name)
                .cloned()
                .ok_or_else(|| anyhow!("tool '{}' not registered", tool_name))?;
            let client = http_client()?;
            let url = base_url();
            let body = request_body(&self.model, &self.messages, &tool);

            let text = send_with_retry(
                "Claude",
                RetryPolicy::default(),
                extract_claude_error,
                || {
                    client
                        .post(&url)
                        .header("x-api-key", &self.key)
                        .header("anthropic-version", API_VERSION)
                        .json(&body)
                },
            )
            .await?;
            extract_tool_response(&text, &tool_name, &self.model)
        })
    }
}

fn base_url() -> String {
    std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn request_body(model: &str, messages: &[Message], tool: &ToolSpec) -> Value {
    let system = messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(|message| message.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let user_messages = messages
        .iter()
        .filter(|message| message.role == MessageRole::User)
        .map(|message| json!({"role": "user", "content": [{"type": "text", "text": message.text}]}))
        .collect::<Vec<_>>();

    let mut body = json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "messages": user_messages,
        "tools": [
            {
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters
            }
        ],
        "tool_choice": {"type": "tool", "name": tool.name}
    });
    if !system.trim().is_empty() {
        body["system"] = json!(system);
    }
    body
}

fn extract_tool_response(
    text: &str,
    tool_name: &str,
    fallback_model: &str,
) -> Result<ProviderResponse> {
    let payload: ClaudeResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Claude response JSON: {}", err))?;
    let block = payload
        .content
        .iter()
        .find(|block| block.kind == "tool_use" && block.name.as_deref() == Some(tool_name))
        .ok_or_else(|| anyhow!("no tool call returned from Claude"))?;

    let input = block
        .input
        .clone()
        .ok_or_else(|| anyhow!("Claude tool_use missing input"))?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage
            .input_tokens
            .zip(usage.output_tokens)
            .map(|(input, output)| input + output),
    });
    Ok(ProviderResponse {
        args: input,
        model,
        usage,
    })
}

fn extract_claude_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ClaudeError>,
    }

    #[derive(Deserialize)]
    struct ClaudeError {
        #[serde(rename = "type")]
        kind: Option<String>,
        message: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, None))
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
    model: Option<String>,
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    input: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_extracts_tool_use_input() {
        let payload = r#"{
            "id": "msg_1",
            "type": "message",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "Here you go"},
                {"type": "tool_use", "id": "tu_1", "name": "deliver_translation",
                 "input": {"translation": "कूदती है", "source_language": "en", "target_language": "hi"}}
            ],
            "usage": {"input_tokens": 100, "output_tokens": 20}
        }"#;
        let response = extract_tool_response(payload, "deliver_translation", DEFAULT_MODEL).unwrap();
        assert_eq!(response.args["translation"], "कूदती है");
        assert_eq!(response.usage.unwrap().total_tokens, Some(120));
    }

    #[test]
    fn claude_error_body_keeps_message_and_type() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(
            extract_claude_error(body).as_deref(),
            Some("Overloaded | type: overloaded_error")
        );
    }

    #[test]
    fn request_forces_the_registered_tool() {
        let tool = ToolSpec {
            name: "deliver_translation".to_string(),
            description: "d".to_string(),
            parameters: json!({"type": "object"}),
        };
        let body = request_body(
            DEFAULT_MODEL,
            &[Message::system("rules".into()), Message::user("fox".into())],
            &tool,
        );
        assert_eq!(body["system"], "rules");
        assert_eq!(body["tool_choice"]["name"], "deliver_translation");
        assert_eq!(body["messages"][0]["content"][0]["text"], "fox");
    }
}
