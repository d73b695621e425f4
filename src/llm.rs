//! Text generation providers
//!
//! The orchestrator only sees `TextGenerator`. Two backends implement it: a
//! local on-device model (Ollama-compatible endpoint) and the Claude API as
//! the cloud fallback. Which one is used is decided once by a capability
//! probe, never inside prompt building.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::EngineConfig;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const CLAUDE_API_URL: &str = "https://api.anthropic.com";
const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

/// Minimum platform version that ships the on-device model
const ON_DEVICE_MIN_VERSION: (u32, u32) = (26, 0);

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ProviderError {
  #[error("Provider unavailable: {0}")]
  Unavailable(String),

  #[error("Rate limited by provider")]
  RateLimited,

  #[error("Malformed provider output: {0}")]
  MalformedOutput(String),

  #[error("Network error: {0}")]
  Network(String),

  #[error("Model session is busy")]
  SessionBusy,

  #[error("API key not configured")]
  MissingApiKey,
}

impl ProviderError {
  /// Only a busy session is worth waiting out
  pub fn is_retryable(&self) -> bool {
    matches!(self, ProviderError::SessionBusy)
  }
}

impl From<reqwest::Error> for ProviderError {
  fn from(err: reqwest::Error) -> Self {
    ProviderError::Network(err.to_string())
  }
}

fn classify_status(status: StatusCode, detail: String) -> ProviderError {
  match status.as_u16() {
    429 => ProviderError::RateLimited,
    409 | 423 => ProviderError::SessionBusy,
    529 => ProviderError::Unavailable(format!("overloaded: {}", detail)),
    _ => ProviderError::Unavailable(format!("HTTP {}: {}", status, detail)),
  }
}

/// `path` resolved under `base_url`, which may itself carry a path prefix
fn endpoint(base_url: &str, path: &str) -> Result<Url, ProviderError> {
  Url::parse(&format!("{}/", base_url))
    .and_then(|base| base.join(path))
    .map_err(|e| ProviderError::Unavailable(format!("invalid base URL {}: {}", base_url, e)))
}

/// ---------------------------------------------------------------------------
/// Provider Contract
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
  pub temperature: f32,
  pub max_tokens: u32,
  pub system: Option<String>,
}

impl GenerationOptions {
  pub fn from_config(config: &EngineConfig) -> Self {
    Self {
      temperature: config.temperature,
      max_tokens: config.max_tokens,
      system: None,
    }
  }
}

/// Stateless text generation. Every call is a fresh session with no context
/// carried over from earlier calls.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  fn name(&self) -> &str;

  async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ProviderError>;
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
  model: &'a str,
  max_tokens: u32,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
  role: &'static str,
  content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
  content: Vec<ContentBlock>,
  usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Claude Client (cloud fallback)
/// ---------------------------------------------------------------------------

pub struct ClaudeClient {
  client: Client,
  api_key: String,
  base_url: String,
  model: String,
}

impl ClaudeClient {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      api_key: api_key.into(),
      base_url: CLAUDE_API_URL.to_string(),
      model: CLAUDE_MODEL.to_string(),
    }
  }

  pub fn from_config(config: &EngineConfig) -> Result<Self, ProviderError> {
    let api_key = config
      .anthropic_api_key
      .clone()
      .ok_or(ProviderError::MissingApiKey)?;
    Ok(Self::new(api_key))
  }

  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into().trim_end_matches('/').to_string();
    self
  }
}

#[async_trait]
impl TextGenerator for ClaudeClient {
  fn name(&self) -> &str {
    "claude"
  }

  async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ProviderError> {
    let request = ClaudeRequest {
      model: &self.model,
      max_tokens: options.max_tokens,
      temperature: options.temperature,
      system: options.system.as_deref(),
      messages: vec![ClaudeMessage {
        role: "user",
        content: prompt,
      }],
    };

    let response = self
      .client
      .post(endpoint(&self.base_url, "v1/messages")?)
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      let detail = serde_json::from_str::<ClaudeErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
      return Err(classify_status(status, detail));
    }

    let claude_response: ClaudeResponse =
      serde_json::from_str(&body).map_err(|e| ProviderError::MalformedOutput(e.to_string()))?;

    if let Some(usage) = &claude_response.usage {
      debug!(
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "Claude usage"
      );
    }

    // First non-empty text block
    claude_response
      .content
      .into_iter()
      .filter(|c| c.content_type == "text")
      .find_map(|c| c.text.filter(|t| !t.trim().is_empty()))
      .ok_or_else(|| ProviderError::MalformedOutput("No text content in response".to_string()))
  }
}

/// ---------------------------------------------------------------------------
/// Local Model Client (on-device)
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LocalGenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  stream: bool,
  options: LocalGenerateOptions,
}

#[derive(Debug, Serialize)]
struct LocalGenerateOptions {
  temperature: f32,
  num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct LocalGenerateResponse {
  #[serde(default)]
  response: String,
}

#[derive(Debug, Deserialize)]
struct LocalErrorResponse {
  error: String,
}

pub struct LocalModelClient {
  client: Client,
  base_url: String,
  model: String,
}

impl LocalModelClient {
  pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
      model: model.into(),
    }
  }

  pub fn from_config(config: &EngineConfig) -> Self {
    Self::new(&config.local_model_url, &config.local_model)
  }
}

#[async_trait]
impl TextGenerator for LocalModelClient {
  fn name(&self) -> &str {
    "on-device"
  }

  async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ProviderError> {
    let request = LocalGenerateRequest {
      model: &self.model,
      prompt,
      system: options.system.as_deref(),
      stream: false,
      options: LocalGenerateOptions {
        temperature: options.temperature,
        num_predict: options.max_tokens,
      },
    };

    let response = self
      .client
      .post(endpoint(&self.base_url, "api/generate")?)
      .json(&request)
      .send()
      .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      let detail = serde_json::from_str::<LocalErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
      return Err(classify_status(status, detail));
    }

    let parsed: LocalGenerateResponse =
      serde_json::from_str(&body).map_err(|e| ProviderError::MalformedOutput(e.to_string()))?;

    if parsed.response.trim().is_empty() {
      return Err(ProviderError::MalformedOutput("Empty response".to_string()));
    }
    Ok(parsed.response)
  }
}

/// ---------------------------------------------------------------------------
/// Capability Probe
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareClass {
  Entry,
  Standard,
  HighEnd,
  Workstation,
}

impl HardwareClass {
  /// Unknown labels are treated as entry-level
  pub fn from_label(label: &str) -> Self {
    match label.trim().to_lowercase().replace('-', "_").as_str() {
      "workstation" => HardwareClass::Workstation,
      "high_end" | "highend" => HardwareClass::HighEnd,
      "standard" => HardwareClass::Standard,
      _ => HardwareClass::Entry,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
  pub os_major: u32,
  pub os_minor: u32,
  pub hardware: HardwareClass,
}

impl DeviceCapabilities {
  /// Parse "major.minor[.patch]"; anything unparseable reads as 0
  pub fn new(platform_version: &str, hardware: HardwareClass) -> Self {
    let mut parts = platform_version
      .trim()
      .split('.')
      .map(|p| p.parse::<u32>().unwrap_or(0));
    Self {
      os_major: parts.next().unwrap_or(0),
      os_minor: parts.next().unwrap_or(0),
      hardware,
    }
  }

  pub fn from_config(config: &EngineConfig) -> Self {
    Self::new(
      &config.platform_version,
      HardwareClass::from_label(&config.hardware_class),
    )
  }

  pub fn supports_on_device(&self) -> bool {
    (self.os_major, self.os_minor) >= ON_DEVICE_MIN_VERSION
      && matches!(self.hardware, HardwareClass::HighEnd | HardwareClass::Workstation)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderChoice {
  OnDevice,
  Cloud,
}

impl ProviderChoice {
  pub fn select(caps: &DeviceCapabilities) -> Self {
    if caps.supports_on_device() {
      ProviderChoice::OnDevice
    } else {
      ProviderChoice::Cloud
    }
  }
}

/// The two interchangeable backends; either may be absent
#[derive(Clone, Default)]
pub struct ProviderSet {
  pub on_device: Option<Arc<dyn TextGenerator>>,
  pub cloud: Option<Arc<dyn TextGenerator>>,
}

impl ProviderSet {
  /// Local model always; Claude only when an API key is configured
  pub fn from_config(config: &EngineConfig) -> Self {
    let cloud = match ClaudeClient::from_config(config) {
      Ok(client) => Some(Arc::new(client) as Arc<dyn TextGenerator>),
      Err(_) => None,
    };
    Self {
      on_device: Some(Arc::new(LocalModelClient::from_config(config))),
      cloud,
    }
  }

  /// The chosen backend, falling back to the other when it is missing
  pub fn resolve(&self, choice: ProviderChoice) -> Option<Arc<dyn TextGenerator>> {
    let (preferred, fallback) = match choice {
      ProviderChoice::OnDevice => (&self.on_device, &self.cloud),
      ProviderChoice::Cloud => (&self.cloud, &self.on_device),
    };
    let resolved = preferred.clone().or_else(|| fallback.clone());
    if let Some(provider) = &resolved {
      info!(choice = ?choice, provider = provider.name(), "Text provider resolved");
    }
    resolved
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn options() -> GenerationOptions {
    GenerationOptions {
      temperature: 0.5,
      max_tokens: 256,
      system: Some("You are a coach.".to_string()),
    }
  }

  #[tokio::test]
  async fn test_claude_returns_first_text_block() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/v1/messages")
      .match_header("x-api-key", "sk-test")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(
        r#"{"content":[{"type":"text","text":"[1] CARDIO: Walk daily"}],
            "model":"claude","stop_reason":"end_turn",
            "usage":{"input_tokens":10,"output_tokens":5}}"#,
      )
      .create_async()
      .await;

    let client = ClaudeClient::new("sk-test").with_base_url(server.url());
    let text = client.generate("hello", &options()).await.unwrap();
    assert_eq!(text, "[1] CARDIO: Walk daily");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_claude_rate_limit_maps_to_rate_limited() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(429)
      .with_body(r#"{"error":{"type":"rate_limit_error","message":"slow down"}}"#)
      .create_async()
      .await;

    let client = ClaudeClient::new("sk-test").with_base_url(server.url());
    let err = client.generate("hello", &options()).await.unwrap_err();
    assert_eq!(err, ProviderError::RateLimited);
    assert!(!err.is_retryable());
  }

  #[tokio::test]
  async fn test_claude_overloaded_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(529)
      .with_body(r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#)
      .create_async()
      .await;

    let client = ClaudeClient::new("sk-test").with_base_url(server.url());
    let err = client.generate("hello", &options()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(ref m) if m.contains("Overloaded")));
  }

  #[tokio::test]
  async fn test_claude_without_text_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(r#"{"content":[{"type":"tool_use"}]}"#)
      .create_async()
      .await;

    let client = ClaudeClient::new("sk-test").with_base_url(server.url());
    let err = client.generate("hello", &options()).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedOutput(_)));
  }

  #[tokio::test]
  async fn test_connection_refused_is_network_error() {
    let client = ClaudeClient::new("sk-test").with_base_url("http://127.0.0.1:1");
    let err = client.generate("hello", &options()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
  }

  #[test]
  fn test_claude_requires_api_key() {
    let config = EngineConfig::default();
    assert!(matches!(
      ClaudeClient::from_config(&config),
      Err(ProviderError::MissingApiKey)
    ));
  }

  #[tokio::test]
  async fn test_local_model_generates() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_body(r#"{"model":"llama3.2:3b","response":"[1] STRENGTH: Lift","done":true}"#)
      .create_async()
      .await;

    let client = LocalModelClient::new(server.url(), "llama3.2:3b");
    let text = client.generate("hello", &options()).await.unwrap();
    assert_eq!(text, "[1] STRENGTH: Lift");
  }

  #[tokio::test]
  async fn test_local_model_busy_session() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/api/generate")
      .with_status(423)
      .with_body(r#"{"error":"model is busy"}"#)
      .create_async()
      .await;

    let client = LocalModelClient::new(server.url(), "llama3.2:3b");
    let err = client.generate("hello", &options()).await.unwrap_err();
    assert_eq!(err, ProviderError::SessionBusy);
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn test_local_model_empty_response_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_body(r#"{"response":"   ","done":true}"#)
      .create_async()
      .await;

    let client = LocalModelClient::new(server.url(), "llama3.2:3b");
    let err = client.generate("hello", &options()).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedOutput(_)));
  }

  #[test]
  fn test_provider_selection() {
    let eligible = DeviceCapabilities::new("26.0", HardwareClass::HighEnd);
    assert_eq!(ProviderChoice::select(&eligible), ProviderChoice::OnDevice);

    let workstation = DeviceCapabilities::new("27.1.2", HardwareClass::Workstation);
    assert_eq!(ProviderChoice::select(&workstation), ProviderChoice::OnDevice);

    let old_os = DeviceCapabilities::new("25.9", HardwareClass::Workstation);
    assert_eq!(ProviderChoice::select(&old_os), ProviderChoice::Cloud);

    let weak = DeviceCapabilities::new("26.2", HardwareClass::Standard);
    assert_eq!(ProviderChoice::select(&weak), ProviderChoice::Cloud);

    let garbage = DeviceCapabilities::new("unknown", HardwareClass::HighEnd);
    assert_eq!(ProviderChoice::select(&garbage), ProviderChoice::Cloud);
  }

  #[test]
  fn test_hardware_class_labels() {
    assert_eq!(HardwareClass::from_label("High-End"), HardwareClass::HighEnd);
    assert_eq!(HardwareClass::from_label("workstation"), HardwareClass::Workstation);
    assert_eq!(HardwareClass::from_label("toaster"), HardwareClass::Entry);
  }

  #[test]
  fn test_endpoint_keeps_base_path() {
    let url = endpoint("http://localhost:8080/proxy", "api/generate").unwrap();
    assert_eq!(url.as_str(), "http://localhost:8080/proxy/api/generate");

    let err = endpoint("not a url", "v1/messages").unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
  }

  #[test]
  fn test_resolve_falls_back_when_choice_missing() {
    let set = ProviderSet {
      on_device: None,
      cloud: Some(Arc::new(ClaudeClient::new("sk-test"))),
    };
    let provider = set.resolve(ProviderChoice::OnDevice).unwrap();
    assert_eq!(provider.name(), "claude");
    assert!(ProviderSet::default().resolve(ProviderChoice::Cloud).is_none());
  }
}
