//! Layered configuration: defaults, then `config.toml`, then environment,
//! then command-line flags (applied by the binary through the `with_*` builders).

use crate::generation::SamplingConfig;
use crate::memory::DEFAULT_MAX_SIZE;
use crate::{HalcyonError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Halcyon, a friendly conversational assistant. Answer briefly and warmly.";
const DEFAULT_FALLBACK_RESPONSE: &str =
    "I'm having trouble generating a response right now. Please try again.";

/// Which storage backend holds the conversation document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Memory,
}

/// Which generation provider answers utterances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible Chat Completions endpoint
    OpenAi,
    /// Deterministic local replies, no network
    Echo,
}

/// What the orchestrator does when generation fails or times out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Answer with the configured fallback reply; nothing is recorded
    #[default]
    Mask,
    /// Surface the failure to the caller
    Strict,
}

impl std::str::FromStr for BackendKind {
    type Err = HalcyonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(HalcyonError::Config(format!("unknown memory backend '{}'", other))),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = HalcyonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "echo" => Ok(Self::Echo),
            other => Err(HalcyonError::Config(format!("unknown provider '{}'", other))),
        }
    }
}

/// Memory store settings
#[derive(Debug, Clone)]
pub struct MemorySettings {
    pub backend: BackendKind,
    pub file: PathBuf,
    pub backup_file: PathBuf,
    pub max_size: usize,
}

/// Generation provider settings
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// `None` means: OpenAI when an API key is available, Echo otherwise
    pub provider: Option<ProviderKind>,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub system_prompt: Option<String>,
    pub timeout: Duration,
    /// How many prior exchanges are sent along as context
    pub context_exchanges: usize,
    pub max_response_chars: usize,
    pub min_response_chars: usize,
    pub sampling: SamplingConfig,
}

/// Request handling settings
#[derive(Debug, Clone)]
pub struct InteractionSettings {
    pub max_input_chars: usize,
    pub failure_policy: FailurePolicy,
    pub fallback_response: String,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            max_input_chars: 1000,
            failure_policy: FailurePolicy::Mask,
            fallback_response: DEFAULT_FALLBACK_RESPONSE.to_string(),
        }
    }
}

/// Configuration for Halcyon
#[derive(Debug, Clone)]
pub struct HalcyonConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub memory: MemorySettings,
    pub generation: GenerationSettings,
    pub interaction: InteractionSettings,
}

// ─── config.toml ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    host: Option<String>,
    port: Option<u16>,
    enable_cors: Option<bool>,
    #[serde(default)]
    memory: MemoryToml,
    #[serde(default)]
    generation: GenerationToml,
    #[serde(default)]
    interaction: InteractionToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryToml {
    backend: Option<BackendKind>,
    file: Option<PathBuf>,
    backup_file: Option<PathBuf>,
    max_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerationToml {
    provider: Option<ProviderKind>,
    base_url: Option<String>,
    model: Option<String>,
    api_key_env: Option<String>,
    system_prompt: Option<String>,
    timeout_secs: Option<u64>,
    context_exchanges: Option<usize>,
    max_response_chars: Option<usize>,
    min_response_chars: Option<usize>,
    sampling: Option<SamplingConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InteractionToml {
    max_input_chars: Option<usize>,
    failure_policy: Option<FailurePolicy>,
    fallback_response: Option<String>,
}

impl HalcyonConfig {
    /// Defaults, with data files placed under `home`
    pub fn new(home: &Path) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            enable_cors: true,
            memory: MemorySettings {
                backend: BackendKind::File,
                file: home.join("halcyon_memory.json"),
                backup_file: home.join("halcyon_backup.json"),
                max_size: DEFAULT_MAX_SIZE,
            },
            generation: GenerationSettings {
                provider: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                api_key_env: DEFAULT_API_KEY_ENV.to_string(),
                system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
                timeout: Duration::from_secs(30),
                context_exchanges: 5,
                max_response_chars: 500,
                min_response_chars: 10,
                sampling: SamplingConfig::default(),
            },
            interaction: InteractionSettings::default(),
        }
    }

    /// Resolve the full configuration from the process environment.
    ///
    /// Reads `config_path` if given, else `<home>/config.toml` when present.
    pub fn load(home: &Path, config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::new(home);

        let default_path = home.join("config.toml");
        let path = match config_path {
            Some(p) => Some(p.to_path_buf()),
            None if default_path.exists() => Some(default_path),
            None => None,
        };
        if let Some(path) = path {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                HalcyonError::Config(format!("failed to read {}: {}", path.display(), e))
            })?;
            config.merge_toml(&content)?;
            debug!("Loaded config from {}", path.display());
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a `config.toml` document
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let file: ConfigToml = toml::from_str(content)
            .map_err(|e| HalcyonError::Config(format!("invalid config.toml: {}", e)))?;

        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(cors) = file.enable_cors {
            self.enable_cors = cors;
        }

        let memory = file.memory;
        if let Some(backend) = memory.backend {
            self.memory.backend = backend;
        }
        if let Some(path) = memory.file {
            self.memory.file = path;
        }
        if let Some(path) = memory.backup_file {
            self.memory.backup_file = path;
        }
        if let Some(max) = memory.max_size {
            self.memory.max_size = max;
        }

        let generation = file.generation;
        if generation.provider.is_some() {
            self.generation.provider = generation.provider;
        }
        if let Some(url) = generation.base_url {
            self.generation.base_url = url;
        }
        if let Some(model) = generation.model {
            self.generation.model = model;
        }
        if let Some(env) = generation.api_key_env {
            self.generation.api_key_env = env;
        }
        if let Some(prompt) = generation.system_prompt {
            // An empty prompt disables the system message.
            self.generation.system_prompt = Some(prompt).filter(|p| !p.trim().is_empty());
        }
        if let Some(secs) = generation.timeout_secs {
            self.generation.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = generation.context_exchanges {
            self.generation.context_exchanges = n;
        }
        if let Some(n) = generation.max_response_chars {
            self.generation.max_response_chars = n;
        }
        if let Some(n) = generation.min_response_chars {
            self.generation.min_response_chars = n;
        }
        if let Some(sampling) = generation.sampling {
            self.generation.sampling = sampling;
        }

        let interaction = file.interaction;
        if let Some(n) = interaction.max_input_chars {
            self.interaction.max_input_chars = n;
        }
        if let Some(policy) = interaction.failure_policy {
            self.interaction.failure_policy = policy;
        }
        if let Some(text) = interaction.fallback_response {
            self.interaction.fallback_response = text;
        }

        Ok(())
    }

    /// Overlay environment variables, looked up through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_env("PORT", &port)?;
        }
        if let Some(path) = lookup("HALCYON_MEMORY_FILE") {
            self.memory.file = PathBuf::from(path);
        }
        if let Some(max) = lookup("HALCYON_MAX_SIZE") {
            self.memory.max_size = parse_env("HALCYON_MAX_SIZE", &max)?;
        }
        if let Some(provider) = lookup("HALCYON_PROVIDER") {
            self.generation.provider = Some(provider.parse()?);
        }
        if let Some(model) = lookup("HALCYON_MODEL") {
            self.generation.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.generation.base_url = url;
        }
        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memory.max_size == 0 {
            return Err(HalcyonError::Config("memory.max_size must be at least 1".to_string()));
        }
        if self.interaction.max_input_chars == 0 {
            return Err(HalcyonError::Config(
                "interaction.max_input_chars must be at least 1".to_string(),
            ));
        }
        if self.generation.timeout.is_zero() {
            return Err(HalcyonError::Config(
                "generation.timeout_secs must be at least 1".to_string(),
            ));
        }
        self.generation.sampling.validate()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_memory_file(mut self, path: PathBuf) -> Self {
        self.memory.file = path;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.interaction.failure_policy = policy;
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.generation.provider = Some(provider);
        self
    }

    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| HalcyonError::Config(format!("invalid {}='{}': {}", key, value, e)))
}

/// Halcyon's home directory: `HALCYON_HOME`, else `~/.halcyon`
pub fn halcyon_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HALCYON_HOME") {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| HalcyonError::Config("could not find home directory".to_string()))?;
    Ok(home.join(".halcyon"))
}
