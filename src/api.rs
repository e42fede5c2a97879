use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use zeroize::Zeroize;

use crate::config::{validate_prompt, Config, MAX_PROMPT_LEN};
use crate::credentials::{load_credential, Credential};
use crate::error::ChatError;
use crate::response::{api_error_message, extract, ParsedAnswer};

/// The JSON body posted to the responses endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    instructions: &'a str,
    model: &'a str,
    input: &'a str,
}

/// Collects response body chunks, in arrival order, into one buffer.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    buffer: Vec<u8>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the end of the buffer.
    ///
    /// Fails without touching the buffer if the extra space can't be
    /// allocated; the caller is expected to abandon the transfer.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), ChatError> {
        self.reserve(chunk.len())?;
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> Result<(), ChatError> {
        self.buffer
            .try_reserve(additional)
            .map_err(|_| ChatError::TransportMemory {
                received: self.buffer.len(),
                requested: additional,
            })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Builds the two request headers: JSON content type and bearer auth.
pub fn build_headers(credential: &Credential) -> Result<HeaderMap, ChatError> {
    let mut bearer = format!("Bearer {}", credential.as_str());
    let auth_value = HeaderValue::from_str(&bearer);
    bearer.zeroize();

    let mut auth_value = auth_value.map_err(|_| {
        ChatError::RequestBuild(
            "API key contains characters that are not allowed in an HTTP header".to_string(),
        )
    })?;
    auth_value.set_sensitive(true);

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(AUTHORIZATION, auth_value);
    Ok(headers)
}

/// Serializes the request body for `prompt` using the configured
/// instructions and model. Prompts over `MAX_PROMPT_LEN` characters are
/// refused here as well as at the command line.
pub fn build_body(config: &Config, prompt: &str) -> Result<String, ChatError> {
    if !validate_prompt(prompt) {
        return Err(ChatError::RequestBuild(format!(
            "prompt is longer than {} characters",
            MAX_PROMPT_LEN
        )));
    }

    let request = ChatRequest {
        instructions: &config.instructions,
        model: &config.model_id,
        input: prompt,
    };
    serde_json::to_string(&request)
        .map_err(|e| ChatError::RequestBuild(format!("failed to serialize request: {}", e)))
}

/// `ApiClient` sends a single prompt to an OpenAI-style responses endpoint
/// and hands back the generated text.
pub struct ApiClient {
    // The configuration for the API client
    config: Config,

    client: Client,
}

impl ApiClient {
    pub fn new(config: Config) -> Self {
        ApiClient {
            config,
            client: Client::new(),
        }
    }

    /// Runs the whole exchange for `prompt`: builds the body, loads the API
    /// key, posts the request once and extracts the answer.
    ///
    /// Every stage fails fast; the first error is returned and nothing after
    /// it runs. An oversized prompt is refused before the secrets file is
    /// touched, and no request is sent if the key can't be loaded.
    pub async fn do_completion(&self, prompt: &str) -> Result<ParsedAnswer, ChatError> {
        let body = build_body(&self.config, prompt)?;
        let secrets_path = self.config.secrets_path()?;
        let headers = {
            let credential = load_credential(&secrets_path)?;
            build_headers(&credential)?
        };

        let buffer = self.post(&self.config.endpoint(), headers, body).await?;
        extract(&buffer)
    }

    /// Posts `body` to `endpoint` and returns the full response body.
    ///
    /// The body is read chunk by chunk as the transport delivers it. There is
    /// one attempt only; a non-success HTTP status is reported as a transport
    /// error carrying the API's error message, or the raw body if it has none.
    pub async fn post(
        &self,
        endpoint: &str,
        headers: HeaderMap,
        body: String,
    ) -> Result<Vec<u8>, ChatError> {
        info!("Posting prompt to {}", endpoint);
        debug!("Request body is {} bytes", body.len());

        let mut response = self
            .client
            .post(endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        debug!("Response status: {}", status);

        let mut accumulator = ResponseAccumulator::new();
        while let Some(chunk) = response.chunk().await? {
            accumulator.append(&chunk)?;
        }
        debug!("Received {} response bytes", accumulator.len());
        if accumulator.is_empty() {
            warn!("The API returned an empty response body");
        }

        let buffer = accumulator.into_bytes();
        if !status.is_success() {
            let detail = serde_json::from_slice::<serde_json::Value>(&buffer)
                .ok()
                .and_then(|json| api_error_message(&json))
                .unwrap_or_else(|| String::from_utf8_lossy(&buffer).into_owned());
            return Err(ChatError::Transport(format!(
                "API request failed with status {}: {}",
                status, detail
            )));
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api: &str, secrets: &Path) -> Config {
        Config::parse_from([
            "chat-cli",
            "--api",
            api,
            "--secrets",
            secrets.to_str().unwrap(),
            "--model",
            "test-model",
            "--instructions",
            "Be brief.",
            "--delay-ms",
            "0",
        ])
    }

    fn secrets_dir(contents: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("secrets.json");
        fs::write(&path, contents).expect("Failed to write secrets");
        (dir, path)
    }

    fn load(contents: &str) -> Credential {
        let (_dir, path) = secrets_dir(contents);
        load_credential(&path).unwrap()
    }

    #[test]
    fn accumulator_concatenates_in_call_order() {
        let mut acc = ResponseAccumulator::new();
        for chunk in ["ab", "cd", "ef"] {
            acc.append(chunk.as_bytes()).unwrap();
        }
        assert_eq!(acc.into_bytes(), b"abcdef");

        let mut acc = ResponseAccumulator::new();
        for chunk in ["ef", "ab", "", "cd"] {
            acc.append(chunk.as_bytes()).unwrap();
        }
        assert_eq!(acc.len(), 6);
        assert_eq!(acc.into_bytes(), b"efabcd");
    }

    #[test]
    fn accumulator_reports_allocation_failure() {
        let mut acc = ResponseAccumulator::new();
        acc.append(b"partial").unwrap();
        let err = acc.reserve(usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            ChatError::TransportMemory {
                received: 7,
                requested: usize::MAX
            }
        ));
        assert_eq!(acc.into_bytes(), b"partial");
    }

    #[test]
    fn headers_are_content_type_and_bearer() {
        let headers = build_headers(&load(r#"{"OPENAI_API_KEY": "sk-abc"}"#)).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-abc");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn long_keys_are_not_truncated() {
        let key = "k".repeat(2048);
        let headers =
            build_headers(&load(&format!(r#"{{"OPENAI_API_KEY": "{}"}}"#, key))).unwrap();
        assert_eq!(
            headers[AUTHORIZATION].to_str().unwrap(),
            format!("Bearer {}", key)
        );
    }

    #[test]
    fn header_unsafe_keys_fail_to_build() {
        let err = build_headers(&load(r#"{"OPENAI_API_KEY": "sk\nInjected: yes"}"#)).unwrap_err();
        assert!(matches!(err, ChatError::RequestBuild(_)));
    }

    #[test]
    fn body_round_trips_the_prompt() {
        let (_dir, secrets) = secrets_dir("{}");
        let config = test_config("http://localhost", &secrets);
        let prompts = [
            "hello",
            "",
            "quotes \" and \\ backslashes",
            "line one\nline two\ttabbed",
            "unicode ✓ 日本語 🚀",
        ];
        for prompt in prompts {
            let body = build_body(&config, prompt).unwrap();
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            let object = json.as_object().unwrap();
            assert_eq!(object.len(), 3);
            assert_eq!(object["input"], prompt);
            assert_eq!(object["model"], "test-model");
            assert_eq!(object["instructions"], "Be brief.");
        }
    }

    #[test]
    fn body_rejects_oversized_prompt() {
        let (_dir, secrets) = secrets_dir("{}");
        let config = test_config("http://localhost", &secrets);
        assert!(build_body(&config, &"a".repeat(MAX_PROMPT_LEN)).is_ok());
        let err = build_body(&config, &"a".repeat(MAX_PROMPT_LEN + 1)).unwrap_err();
        assert!(matches!(err, ChatError::RequestBuild(_)));
    }

    #[tokio::test]
    async fn completion_posts_request_and_extracts_text() {
        let mock_server = MockServer::start().await;
        let (_dir, secrets) = secrets_dir(r#"{"OPENAI_API_KEY": "sk-test"}"#);

        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "instructions": "Be brief.",
                "model": "test-model",
                "input": "Say \"hi\"",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": [{"content": [{"type": "output_text", "text": "Greetings, master."}]}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        let answer = client.do_completion("Say \"hi\"").await.unwrap();
        assert_eq!(answer.as_str(), "Greetings, master.");
    }

    #[tokio::test]
    async fn missing_key_sends_nothing() {
        let mock_server = MockServer::start().await;
        let (_dir, secrets) = secrets_dir(r#"{"SOME_OTHER_KEY": "x"}"#);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        let err = client.do_completion("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::CredentialMissing { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn oversized_prompt_sends_nothing() {
        let mock_server = MockServer::start().await;
        let (_dir, secrets) = secrets_dir(r#"{"OPENAI_API_KEY": "sk-test"}"#);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        let err = client
            .do_completion(&"x".repeat(MAX_PROMPT_LEN + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::RequestBuild(_)), "{err:?}");
    }

    #[tokio::test]
    async fn oversized_prompt_is_refused_before_reading_secrets() {
        let mock_server = MockServer::start().await;
        let dir = TempDir::new().expect("Failed to create temp dir");
        let secrets = dir.path().join("does-not-exist.json");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        let err = client
            .do_completion(&"x".repeat(MAX_PROMPT_LEN + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::RequestBuild(_)), "{err:?}");

        // the same prompt at the limit gets as far as the missing file
        let err = client
            .do_completion(&"x".repeat(MAX_PROMPT_LEN))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::CredentialMissing { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error_with_api_message() {
        let mock_server = MockServer::start().await;
        let (_dir, secrets) = secrets_dir(r#"{"OPENAI_API_KEY": "sk-wrong"}"#);

        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {
                    "message": "Incorrect API key provided: sk-wrong.",
                    "type": "invalid_request_error",
                    "param": null,
                    "code": "invalid_api_key"
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        let err = client.do_completion("hello").await.unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, ChatError::Transport(_)), "{err:?}");
        assert!(text.contains("401"), "{text}");
        assert!(text.contains("Incorrect API key provided"), "{text}");
    }

    #[tokio::test]
    async fn error_status_with_html_body_surfaces_raw_text() {
        let mock_server = MockServer::start().await;
        let (_dir, secrets) = secrets_dir(r#"{"OPENAI_API_KEY": "sk-test"}"#);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        let err = client.do_completion("hello").await.unwrap_err();
        assert!(err.to_string().contains("<html>Bad Gateway</html>"));
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_parse_error() {
        let mock_server = MockServer::start().await;
        let (_dir, secrets) = secrets_dir(r#"{"OPENAI_API_KEY": "sk-test"}"#);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        match client.do_completion("hello").await.unwrap_err() {
            ChatError::ResponseParse { raw, .. } => assert_eq!(raw, "not json at all"),
            other => panic!("expected ResponseParse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_success_body_fails_extraction() {
        let mock_server = MockServer::start().await;
        let (_dir, secrets) = secrets_dir(r#"{"OPENAI_API_KEY": "sk-test"}"#);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = ApiClient::new(test_config(&mock_server.uri(), &secrets));
        let err = client.do_completion("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::ResponseParse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let (_dir, secrets) = secrets_dir(r#"{"OPENAI_API_KEY": "sk-test"}"#);
        // nothing listens on port 1
        let client = ApiClient::new(test_config("http://127.0.0.1:1", &secrets));
        let err = client.do_completion("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)), "{err:?}");
    }
}
