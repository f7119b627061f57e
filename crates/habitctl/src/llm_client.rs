//! LLM client abstraction.
//!
//! A single blocking JSON call used by both the remote classifier and the
//! reply generator. Works against Ollama-style and OpenAI-compatible
//! endpoints; `FakeLlmClient` scripts responses for tests.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// LLM configuration (`[llm]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Remote calls are opt-in; when off the keyword matcher handles every turn
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Which HTTP API the endpoint speaks; `auto` guesses from the URL
    pub api_style: ApiStyle,
}

/// Remote API flavour. Exactly one is used per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStyle {
    #[default]
    Auto,
    /// `/api/generate`
    Ollama,
    /// `/v1/chat/completions`
    #[serde(rename = "openai")]
    OpenAi,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            api_key: None,
            timeout_secs: 30,
            api_style: ApiStyle::Auto,
        }
    }
}

/// LLM errors. All of them are recoverable for the coach.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM is disabled in configuration")]
    Disabled,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("LLM returned empty response")]
    EmptyResponse,
}

/// Generic LLM client trait
pub trait LlmClient: Send + Sync {
    /// Call LLM with a prompt and expect JSON response
    fn call_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_description: &str,
    ) -> Result<serde_json::Value, LlmError>;
}

/// Real LLM client implementation using HTTP
pub struct HttpLlmClient {
    config: LlmConfig,
    client: reqwest::blocking::Client,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// API used for every call; `Auto` resolves from the endpoint URL
    pub fn api_style(&self) -> ApiStyle {
        match self.config.api_style {
            ApiStyle::Auto => {
                let endpoint = &self.config.endpoint;
                if endpoint.contains("11434") || endpoint.contains("ollama") {
                    ApiStyle::Ollama
                } else {
                    ApiStyle::OpenAi
                }
            }
            style => style,
        }
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else {
            LlmError::HttpError(format!("Request failed: {}", e))
        }
    }
}

impl LlmClient for HttpLlmClient {
    fn call_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_description: &str,
    ) -> Result<serde_json::Value, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let full_prompt = format!(
            "{}\n\n{}\n\nYou must respond with valid JSON matching this schema:\n{}",
            system_prompt, user_prompt, schema_description
        );

        // One request per call; a failure goes back to the caller's fallback
        let style = self.api_style();
        debug!("Calling {} with {:?} API", self.config.model, style);
        match style {
            ApiStyle::Ollama => self.call_ollama(&full_prompt),
            _ => self.call_openai_compatible(system_prompt, &full_prompt),
        }
    }
}

impl HttpLlmClient {
    /// Call Ollama-style API
    fn call_ollama(&self, prompt: &str) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/api/generate", self.endpoint());

        let request_body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(LlmError::HttpError(format!("HTTP {} from Ollama", response.status())));
        }

        let response_json: serde_json::Value = response
            .json()
            .map_err(|e| LlmError::InvalidJson(format!("Failed to parse response: {}", e)))?;

        let text = response_json
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or(LlmError::EmptyResponse)?;

        parse_model_json(text)
    }

    /// Call OpenAI-compatible API
    fn call_openai_compatible(&self, system_prompt: &str, user_prompt: &str) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/v1/chat/completions", self.endpoint());

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
        });

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(LlmError::HttpError(format!(
                "HTTP {} from OpenAI-compatible API",
                response.status()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .map_err(|e| LlmError::InvalidJson(format!("Failed to parse response: {}", e)))?;

        let text = response_json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .ok_or(LlmError::EmptyResponse)?;

        parse_model_json(text)
    }
}

/// Parse model output as JSON, tolerating markdown fences and stray prose
/// around a single object.
pub fn parse_model_json(text: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    // ```json ... ``` or ``` ... ```
    let fenced = trimmed
        .find("```json")
        .map(|i| i + 7)
        .or_else(|| trimmed.find("```").map(|i| i + 3))
        .and_then(|start| {
            let rest = &trimmed[start..];
            rest.find("```").map(|end| rest[..end].trim())
        });
    if let Some(Ok(v)) = fenced.map(serde_json::from_str::<serde_json::Value>) {
        return Ok(v);
    }

    // First { to last }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(v) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(v);
            }
        }
    }

    Err(LlmError::InvalidJson(format!(
        "LLM output is not valid JSON: {}",
        trimmed.chars().take(100).collect::<String>()
    )))
}

/// Fake LLM client for testing
pub struct FakeLlmClient {
    responses: Mutex<Vec<Result<serde_json::Value, LlmError>>>,
    call_count: Mutex<usize>,
    last_prompt: Mutex<Option<String>>,
}

impl FakeLlmClient {
    /// Create a fake client with pre-defined responses.
    /// The last response repeats once the others are used up.
    pub fn new(responses: Vec<Result<serde_json::Value, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Create a fake client that always returns valid JSON
    pub fn always_valid(json: serde_json::Value) -> Self {
        Self::new(vec![Ok(json)])
    }

    /// Create a fake client that always returns an error
    pub fn always_error(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Get the number of calls made
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// User prompt of the most recent call
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LlmClient for FakeLlmClient {
    fn call_json(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _schema_description: &str,
    ) -> Result<serde_json::Value, LlmError> {
        *self.call_count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        *self.last_prompt.lock().unwrap_or_else(|e| e.into_inner()) = Some(user_prompt.to_string());

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.len() {
            0 => Err(LlmError::EmptyResponse),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_llm_config_default() {
        let config = LlmConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.endpoint, "http://localhost:11434");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_disabled_client_never_calls_out() {
        let client = HttpLlmClient::new(LlmConfig::default()).unwrap();
        assert_eq!(client.call_json("s", "u", "{}"), Err(LlmError::Disabled));
    }

    /// Local HTTP server answering every request with 503; returns the
    /// base URL and the request lines it has seen
    fn serve_unavailable() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let request_line = read_request(&mut stream);
                log.lock().unwrap().push(request_line);
                let _ = stream.write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                );
            }
        });
        (format!("http://{}", addr), seen)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                return String::new();
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let body_len = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < end + 4 + body_len {
                let n = stream.read(&mut chunk).unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return head.lines().next().unwrap_or_default().to_string();
        }
    }

    fn enabled_config(endpoint: String, api_style: ApiStyle) -> LlmConfig {
        LlmConfig {
            enabled: true,
            endpoint,
            timeout_secs: 5,
            api_style,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_ollama_failure_is_a_single_request() {
        let (base, seen) = serve_unavailable();
        let client = HttpLlmClient::new(enabled_config(format!("{}/ollama", base), ApiStyle::Auto)).unwrap();
        assert_eq!(client.api_style(), ApiStyle::Ollama);

        let result = client.call_json("s", "u", "{}");
        assert!(matches!(result, Err(LlmError::HttpError(ref m)) if m.contains("503")), "{:?}", result);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "{:?}", seen);
        assert!(seen[0].contains("/ollama/api/generate"));
    }

    #[test]
    fn test_openai_failure_is_a_single_request() {
        let (base, seen) = serve_unavailable();
        let client = HttpLlmClient::new(enabled_config(base, ApiStyle::OpenAi)).unwrap();

        assert!(client.call_json("s", "u", "{}").is_err());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "{:?}", seen);
        assert!(seen[0].contains("/v1/chat/completions"));
    }

    #[test]
    fn test_api_style_resolution() {
        let style = |endpoint: &str, api_style| {
            HttpLlmClient::new(enabled_config(endpoint.to_string(), api_style))
                .unwrap()
                .api_style()
        };
        assert_eq!(style("http://localhost:11434", ApiStyle::Auto), ApiStyle::Ollama);
        assert_eq!(style("https://api.example.com", ApiStyle::Auto), ApiStyle::OpenAi);
        assert_eq!(style("http://localhost:11434", ApiStyle::OpenAi), ApiStyle::OpenAi);
        assert_eq!(style("https://api.example.com", ApiStyle::Ollama), ApiStyle::Ollama);
    }

    #[test]
    fn test_fake_client_always_valid() {
        let json = serde_json::json!({"principle_id": "habit_loops"});
        let client = FakeLlmClient::always_valid(json.clone());

        assert_eq!(client.call_json("system", "user", "schema").unwrap(), json);
        assert_eq!(client.call_json("system", "user", "schema").unwrap(), json);
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.last_prompt().as_deref(), Some("user"));
    }

    #[test]
    fn test_fake_client_multiple_responses() {
        let client = FakeLlmClient::new(vec![
            Ok(serde_json::json!({"n": 1})),
            Err(LlmError::Timeout(30)),
        ]);

        assert_eq!(client.call_json("", "", "").unwrap()["n"], 1);
        assert_eq!(client.call_json("", "", ""), Err(LlmError::Timeout(30)));
        assert_eq!(client.call_json("", "", ""), Err(LlmError::Timeout(30)));
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn test_parse_model_json_variants() {
        assert_eq!(parse_model_json(r#"{"a":1}"#).unwrap()["a"], 1);
        assert_eq!(parse_model_json("```json\n{\"a\":2}\n```").unwrap()["a"], 2);
        assert_eq!(parse_model_json("Sure! {\"a\":3} hope that helps").unwrap()["a"], 3);
        assert_eq!(parse_model_json("   "), Err(LlmError::EmptyResponse));
        assert!(matches!(parse_model_json("no json here"), Err(LlmError::InvalidJson(_))));
    }
}
