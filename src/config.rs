//! TOML configuration parsing.
//!
//! A config file looks like:
//!
//! ```toml
//! [data]
//! root = "processed_data"
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [retrieval]
//! top_k = 3
//! default_product = "Softvence"
//!
//! [generation]
//! model = "arliai/qwq-32b-arliai-rpr-v1:free"
//!
//! [server]
//! bind = "127.0.0.1:8088"
//! ```
//!
//! Every section is optional. Secrets are never read from the file: the
//! `api_key_env` fields name the environment variable holding the key.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Directory holding one subdirectory per product.
    #[serde(default = "default_data_root")]
    pub root: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("processed_data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `openai` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_embedding_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_product")]
    pub default_product: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            default_product: default_product(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_product() -> String {
    "Softvence".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_generation_model(),
            api_key_env: default_generation_key_env(),
        }
    }
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}
fn default_generation_model() -> String {
    "arliai/qwq-32b-arliai-rpr-v1:free".to_string()
}
fn default_generation_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

/// Fixed texts that define the assistant's voice.
///
/// `persona`, `intro`, and `greeting` default to texts built from
/// `organization`; setting one overrides only that text.
#[derive(Debug, Deserialize, Clone)]
#[serde(from = "RawAssistantConfig")]
pub struct AssistantConfig {
    pub organization: String,
    /// Persona, tone, and style directive placed at the top of the system message.
    pub persona: String,
    /// Returned verbatim as the reply when retrieval finds no grounding.
    pub intro: String,
    /// First assistant turn of a fresh interactive transcript.
    pub greeting: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAssistantConfig {
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    persona: Option<String>,
    #[serde(default)]
    intro: Option<String>,
    #[serde(default)]
    greeting: Option<String>,
}

impl From<RawAssistantConfig> for AssistantConfig {
    fn from(raw: RawAssistantConfig) -> Self {
        let organization = raw.organization.unwrap_or_else(default_organization);
        Self {
            persona: raw.persona.unwrap_or_else(|| default_persona(&organization)),
            intro: raw.intro.unwrap_or_else(|| default_intro(&organization)),
            greeting: raw.greeting.unwrap_or_else(|| default_greeting(&organization)),
            organization,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        RawAssistantConfig::default().into()
    }
}

const SERVICE_AREAS: &str = "Brand Identity Design, UX/UI Design, Web Development, \
Mobile App Development, Consultation, Accounting & Bookkeeping, Data Analytics";

fn default_organization() -> String {
    "Softvence".to_string()
}

fn default_persona(org: &str) -> String {
    format!(
        "You are the voice of {org}, a cutting-edge technology agency dedicated to delivering \
innovative solutions in AI/ML, blockchain, web development, mobile apps, UX/UI design, and \
graphics & branding. Your responses should reflect our commitment to empowering businesses \
with tailored, scalable, and secure digital ecosystems.\n\n\
**Core Behavior:**\n\
- Use a professional, approachable, and customer-focused tone.\n\
- Be clear, concise, and eager to assist with actionable insights.\n\
- Highlight {org}'s expertise in technology and design when relevant.\n\
- If asked about the agency, say: '{org} is a technology agency specializing in AI/ML, \
blockchain, web and mobile development, UX/UI design, and branding. We're here to transform \
your ideas into impactful digital solutions.'\n\
- Avoid overly technical jargon unless the query demands it, ensuring responses are \
accessible to all clients.\n\
- If relevant, encourage users to connect via our contact channels for project discussions.\n"
    )
}

fn default_intro(org: &str) -> String {
    format!(
        "Welcome to {}! We're a technology agency specializing in {}. \
How can we help you achieve your goals?",
        org, SERVICE_AREAS
    )
}

fn default_greeting(org: &str) -> String {
    format!(
        "Assalamu alaikum! \u{1F31F} Welcome to {}'s chatbot! I'm here to answer your questions \
about our innovative solutions in {}. How can we help bring your ideas to life?",
        org, SERVICE_AREAS
    )
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on a single `/chat` reply. Unset means wait indefinitely.
    #[serde(default)]
    pub reply_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            reply_timeout_secs: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

impl Config {
    /// All defaults; used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config at `path`, or fall back to [`Config::minimal`] when the
/// file does not exist. A file that exists but is invalid is still an error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(
            "config file {} not found, using defaults",
            path.display()
        );
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.retrieval.default_product.trim().is_empty() {
        bail!("retrieval.default_product must not be empty");
    }

    if config.generation.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }

    if config.server.reply_timeout_secs == Some(0) {
        bail!("server.reply_timeout_secs must be > 0 when set");
    }

    match config.embedding.provider.as_str() {
        "hashing" | "local" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashing, local, or openai.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("pchat.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let config = load_config(&path).unwrap();
        assert_eq!(config.data.root, PathBuf::from("processed_data"));
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.default_product, "Softvence");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.generation.api_key_env, "OPENROUTER_API_KEY");
        assert!(config.server.reply_timeout_secs.is_none());
        assert!(config.assistant.intro.starts_with("Welcome to Softvence!"));
    }

    #[test]
    fn test_sections_override_defaults() {
        let (_tmp, path) = write_config(
            r#"
[data]
root = "/srv/products"

[embedding]
provider = "hashing"
dims = 64

[retrieval]
top_k = 5
default_product = "acme"

[assistant]
intro = "Hello from Acme."
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.data.root, PathBuf::from("/srv/products"));
        assert_eq!(config.embedding.dims, Some(64));
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.assistant.intro, "Hello from Acme.");
        // Untouched fields keep their defaults.
        assert_eq!(config.assistant.organization, "Softvence");
    }

    #[test]
    fn test_default_greeting_opens_with_salutation() {
        let assistant = AssistantConfig::default();
        assert!(assistant
            .greeting
            .starts_with("Assalamu alaikum! \u{1F31F} Welcome to Softvence's chatbot!"));
    }

    #[test]
    fn test_organization_drives_default_texts() {
        let (_tmp, path) = write_config(
            r#"
[assistant]
organization = "Acme"
greeting = "Hi there."
"#,
        );
        let assistant = load_config(&path).unwrap().assistant;
        assert_eq!(assistant.organization, "Acme");
        assert!(assistant.persona.starts_with("You are the voice of Acme,"));
        assert!(assistant.persona.contains("Acme's expertise"));
        assert!(assistant.intro.starts_with("Welcome to Acme!"));
        assert_eq!(assistant.greeting, "Hi there.");
        assert!(!assistant.persona.contains("Softvence"));
        assert!(!assistant.intro.contains("Softvence"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let (_tmp, path) = write_config("[retrieval]\ntop_k = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let (_tmp, path) = write_config("[embedding]\nprovider = \"bogus\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let (_tmp, path) = write_config("[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(&path).is_err());

        let (_tmp, path) = write_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        assert!(load_config(&path).is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_minimal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
    }
}
