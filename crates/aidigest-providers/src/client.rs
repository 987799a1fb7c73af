//! HTTP client for both chat-completion backends.

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, info};

use crate::shared::{ChatError, ChatErrorKind, ChatResult, USER_AGENT, classify_reqwest_error};
use crate::stream::FragmentStream;
use crate::{Provider, gemini, openai};

/// Wall-clock budget for one chat call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fragment stream returned by [`ChatClient::generate_stream`].
pub type ChatStream = FragmentStream<BoxStream<'static, reqwest::Result<Bytes>>>;

/// Chat endpoint configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl ChatConfig {
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn validate(&self) -> ChatResult<()> {
        let name = self.provider.display_name();
        if self.base_url.trim().is_empty() {
            return Err(ChatError::config(format!("{name} API URL is not set.")));
        }
        if self.api_key.trim().is_empty() {
            return Err(ChatError::config(format!(
                "{name} API key is not set for {name} models."
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ChatError::config(format!("{name} model is not set.")));
        }
        url::Url::parse(self.base_url.trim()).map_err(|e| {
            ChatError::config(format!("Invalid {name} base URL {}: {e}", self.base_url))
        })?;
        Ok(())
    }

    /// Header carrying the API key, rejected up front when the key holds
    /// bytes that cannot appear in a header (e.g. a pasted newline).
    fn auth_header(&self) -> ChatResult<(&'static str, HeaderValue)> {
        let key = self.api_key.trim();
        let (name, value) = match self.provider {
            Provider::Gemini => ("x-goog-api-key", HeaderValue::from_str(key)),
            Provider::OpenAI => ("authorization", HeaderValue::from_str(&format!("Bearer {key}"))),
        };
        let mut value = value.map_err(|_invalid| {
            ChatError::config(format!(
                "{} API key contains characters that are not allowed in an HTTP header.",
                self.provider.display_name()
            ))
        })?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

/// Chat-completion client for one configured provider.
#[derive(Debug, Clone)]
pub struct ChatClient {
    config: ChatConfig,
    auth: (&'static str, HeaderValue),
    http: reqwest::Client,
}

impl ChatClient {
    /// Creates a client, validating the configuration before any I/O.
    ///
    /// # Errors
    /// Returns a `Config` error when the URL, key or model is missing, or
    /// when the key cannot be sent as a header.
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        config.validate()?;
        let auth = config.auth_header()?;
        Ok(Self {
            config,
            auth,
            http: reqwest::Client::new(),
        })
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sends one prompt and waits for the complete answer.
    ///
    /// # Errors
    /// Returns transport, timeout, HTTP status, content-policy or empty-result errors.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> ChatResult<String> {
        let provider = self.config.provider;
        let call = async {
            let response = self.send(prompt, system, false).await?;
            response.json::<Value>().await.map_err(|e| {
                ChatError::new(
                    ChatErrorKind::Parse,
                    format!("Failed to parse {provider} response JSON: {e}"),
                )
            })
        };
        let body = tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_elapsed| self.timeout_error())??;

        match provider {
            Provider::Gemini => gemini::parse_response(&body),
            Provider::OpenAI => openai::parse_response(&body),
        }
    }

    /// Sends one prompt and streams the answer as text fragments.
    ///
    /// The timeout bounds the request until response headers arrive.
    ///
    /// # Errors
    /// Returns transport, timeout or HTTP status errors raised before the
    /// body starts; later failures surface as stream items.
    pub async fn generate_stream(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> ChatResult<ChatStream> {
        let response = tokio::time::timeout(self.config.timeout, self.send(prompt, system, true))
            .await
            .map_err(|_elapsed| self.timeout_error())??;

        info!(provider = %self.config.provider, model = %self.config.model, "Streaming chat response");
        Ok(FragmentStream::new(
            response.bytes_stream().boxed(),
            self.config.provider,
        ))
    }

    async fn send(
        &self,
        prompt: &str,
        system: Option<&str>,
        stream: bool,
    ) -> ChatResult<reqwest::Response> {
        let config = &self.config;
        let request = match config.provider {
            Provider::Gemini => {
                let url = gemini::endpoint(&config.base_url, &config.model, stream);
                debug!(%url, "Gemini chat request");
                self.http
                    .post(url)
                    .headers(self.build_headers(stream))
                    .json(&gemini::GenerateContentRequest::new(prompt, system))
            }
            Provider::OpenAI => {
                let url = openai::endpoint(&config.base_url);
                debug!(%url, "OpenAI chat request");
                self.http
                    .post(url)
                    .headers(self.build_headers(stream))
                    .json(&openai::ChatCompletionRequest::new(
                        &config.model,
                        prompt,
                        system,
                        stream,
                    ))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ChatError::http_status(
                config.provider,
                status.as_u16(),
                &error_body,
            ));
        }
        Ok(response)
    }

    fn build_headers(&self, stream: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let (name, value) = &self.auth;
        headers.insert(*name, value.clone());
        if stream {
            headers.insert("accept", HeaderValue::from_static("text/event-stream"));
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
        headers
    }

    fn timeout_error(&self) -> ChatError {
        ChatError::timeout(format!(
            "{} Chat request timed out after {}s",
            self.config.provider,
            self.config.timeout.as_secs()
        ))
    }
}

/// Concatenates every fragment of a stream.
///
/// # Errors
/// Returns the first error the stream yields.
pub async fn collect_text<S>(mut stream: S) -> ChatResult<String>
where
    S: Stream<Item = ChatResult<String>> + Unpin,
{
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}
