use http::HeaderMap;
use std::time::Duration;

const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(75);

/// HTTP endpoint configuration for one concrete provider deployment.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub headers: HeaderMap,
    pub stream_idle_timeout: Duration,
}

impl Provider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        }
    }

    pub fn url_for_path(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    /// Candidate chat-completions endpoints, canonical first.
    ///
    /// Some providers mount `chat/completions` directly on the base URL
    /// instead of under `/v1`. A 404 on the canonical endpoint earns one
    /// retry against the suffix-free variant; a base URL that already ends
    /// in a version segment gets no second candidate.
    pub fn chat_completions_urls(&self) -> Vec<String> {
        let base = self.base_url.trim_end_matches('/');
        if base_ends_with_version(base) {
            vec![self.url_for_path("chat/completions")]
        } else {
            vec![
                self.url_for_path("v1/chat/completions"),
                self.url_for_path("chat/completions"),
            ]
        }
    }
}

fn base_ends_with_version(base: &str) -> bool {
    base.rsplit('/').next().is_some_and(|segment| {
        let mut chars = segment.chars();
        chars.next() == Some('v') && chars.as_str().chars().all(|c| c.is_ascii_digit())
            && segment.len() > 1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn canonical_endpoint_comes_first() {
        let provider = Provider::new("openai", "https://api.openai.com");
        assert_eq!(
            provider.chat_completions_urls(),
            vec![
                "https://api.openai.com/v1/chat/completions".to_string(),
                "https://api.openai.com/chat/completions".to_string(),
            ]
        );
    }

    #[test]
    fn versioned_base_url_gets_single_candidate() {
        let provider = Provider::new("proxy", "https://llm.example.com/v1/");
        assert_eq!(
            provider.chat_completions_urls(),
            vec!["https://llm.example.com/v1/chat/completions".to_string()]
        );
    }

    #[test]
    fn url_for_path_normalizes_slashes() {
        let provider = Provider::new("p", "https://host/api/");
        assert_eq!(provider.url_for_path("/models"), "https://host/api/models");
    }
}
