//! GitHub repository contents API: read, look up and create-or-update files.

use std::fmt;

use aidigest_providers::USER_AGENT;
use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";

/// Resolved repository coordinates and credentials.
#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_url: String,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

/// Non-2xx answer from the API.
#[derive(Debug, Clone)]
pub struct GitHubApiError {
    pub path: String,
    pub status: StatusCode,
    pub message: String,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GitHub API request to {} failed: {} - {}",
            self.path,
            self.status.as_u16(),
            self.message
        )
    }
}

impl std::error::Error for GitHubApiError {}

/// Prefers the JSON `message` (plus `errors`) over the raw body.
fn api_error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    let Some(message) = json.get("message").and_then(Value::as_str) else {
        return body.to_string();
    };
    match json.get("errors") {
        Some(errors) if !errors.is_null() => format!("{message} Details: {errors}"),
        _ => message.to_string(),
    }
}

pub struct GitHubClient {
    settings: GitHubSettings,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Fails before any I/O when the token, owner or repo is missing.
    pub fn new(settings: GitHubSettings) -> Result<Self> {
        let missing: Vec<&str> = [
            ("token", &settings.token),
            ("owner", &settings.owner),
            ("repo", &settings.repo),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            bail!(
                "GitHub configuration is missing: {}. Set them in [github] or GITHUB_TOKEN.",
                missing.join(", ")
            );
        }
        url::Url::parse(&settings.api_url)
            .with_context(|| format!("Invalid GitHub API URL: {}", settings.api_url))?;

        Ok(Self {
            settings,
            http: reqwest::Client::new(),
        })
    }

    pub fn settings(&self) -> &GitHubSettings {
        &self.settings
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.settings.token.trim()))
                .context("GitHub token contains invalid header characters")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        Ok(headers)
    }

    fn contents_path(path: &str) -> String {
        format!("/contents/{}", path.trim_start_matches('/'))
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Option<Value>> {
        let url = format!(
            "{}/repos/{}/{}{path}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.owner,
            self.settings.repo
        );
        let mut request = self.http.request(method.clone(), &url).headers(self.headers()?);
        if method == Method::GET {
            request = request.query(&[("ref", self.settings.branch.as_str())]);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(%method, path, "GitHub API request");
        let response = request
            .send()
            .await
            .with_context(|| format!("GitHub API request to {path} failed"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read GitHub response for {path}"))?;

        if !status.is_success() {
            return Err(GitHubApiError {
                path: path.to_string(),
                status,
                message: api_error_message(&text),
            }
            .into());
        }
        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .with_context(|| format!("GitHub API returned invalid JSON for {path}"))
    }

    /// Blob SHA of `path` on the configured branch; `None` when it does not exist.
    pub async fn file_sha(&self, path: &str) -> Result<Option<String>> {
        match self.call(Method::GET, &Self::contents_path(path), None).await {
            Ok(data) => Ok(data
                .as_ref()
                .and_then(|d| d.get("sha"))
                .and_then(Value::as_str)
                .map(str::to_string)),
            Err(err)
                if err
                    .downcast_ref::<GitHubApiError>()
                    .is_some_and(|e| e.status == StatusCode::NOT_FOUND) =>
            {
                debug!(path, branch = %self.settings.branch, "File not found on GitHub");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Decoded UTF-8 contents of `path`.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let data = self
            .call(Method::GET, &Self::contents_path(path), None)
            .await?
            .with_context(|| format!("GitHub returned no content for {path}"))?;
        let encoded = data
            .get("content")
            .and_then(Value::as_str)
            .with_context(|| format!("GitHub response for {path} has no content field"))?;
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact)
            .with_context(|| format!("Failed to decode base64 content of {path}"))?;
        String::from_utf8(bytes).with_context(|| format!("{path} is not valid UTF-8"))
    }

    /// Creates `path`, or updates it when `sha` names the current blob.
    pub async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<()> {
        let mut payload = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": self.settings.branch,
        });
        if let Some(sha) = sha {
            payload["sha"] = Value::String(sha.to_string());
        }
        self.call(Method::PUT, &Self::contents_path(path), Some(payload))
            .await?;
        info!(path, "Committed file to GitHub");
        Ok(())
    }
}
