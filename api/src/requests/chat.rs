use http::HeaderMap;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;

/// One message in a chat-completions conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Assembled body plus headers for one chat-completions call.
pub struct ChatRequest {
    pub body: Value,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

pub struct ChatRequestBuilder<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    api_key: Option<&'a str>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    stream: bool,
    timeout: Option<Duration>,
}

impl<'a> ChatRequestBuilder<'a> {
    pub fn new(model: &'a str, messages: &'a [ChatMessage]) -> Self {
        Self {
            model,
            messages,
            api_key: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: false,
            timeout: None,
        }
    }

    pub fn api_key(mut self, key: Option<&'a str>) -> Self {
        self.api_key = key;
        self
    }

    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> ChatRequest {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages,
            "stream": self.stream,
        });
        if let Some(map) = body.as_object_mut() {
            if let Some(temperature) = self.temperature {
                map.insert("temperature".to_string(), json!(temperature));
            }
            if let Some(top_p) = self.top_p {
                map.insert("top_p".to_string(), json!(top_p));
            }
            if let Some(max_tokens) = self.max_tokens {
                map.insert("max_tokens".to_string(), json!(max_tokens));
            }
            if self.stream {
                // Ask for the trailing usage chunk most providers gate
                // behind this option.
                map.insert("stream_options".to_string(), json!({"include_usage": true}));
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = self.api_key
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}"))
        {
            let mut value = value;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        ChatRequest {
            body,
            headers,
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn body_carries_model_messages_and_stream_flag() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hello")];
        let request = ChatRequestBuilder::new("m-1", &messages)
            .temperature(Some(0.3))
            .stream(true)
            .build();

        assert_eq!(request.body["model"], "m-1");
        assert_eq!(request.body["messages"][1]["role"], "user");
        assert_eq!(request.body["stream"], true);
        assert_eq!(request.body["temperature"], 0.3);
        assert_eq!(request.body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn api_key_becomes_sensitive_bearer_header() {
        let messages = vec![ChatMessage::user("hi")];
        let request = ChatRequestBuilder::new("m-1", &messages)
            .api_key(Some("sk-test"))
            .build();

        let auth = request.headers.get(AUTHORIZATION).map(|v| v.is_sensitive());
        assert_eq!(auth, Some(true));
    }

    #[test]
    fn optional_knobs_are_omitted_when_unset() {
        let messages = vec![ChatMessage::user("hi")];
        let request = ChatRequestBuilder::new("m-1", &messages).build();

        assert!(request.body.get("temperature").is_none());
        assert!(request.body.get("top_p").is_none());
        assert!(request.body.get("max_tokens").is_none());
        assert!(request.body.get("stream_options").is_none());
    }
}
