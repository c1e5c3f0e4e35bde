use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/mindwell.sqlite3")
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// Directory holding the persisted knowledge store. Its absence at serve
    /// time is a startup error, not an empty store.
    #[serde(default = "default_knowledge_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dir: default_knowledge_dir(),
            top_k: default_top_k(),
        }
    }
}

fn default_knowledge_dir() -> PathBuf {
    PathBuf::from("./data/knowledge")
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("./corpus")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.pdf".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `local` (on-device sentence embeddings) or `gemini` (hosted API).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Overrides the dimension table for models this build does not know.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key (gemini only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Overrides the hosted-API endpoint; tests point this at a stub server.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
            api_key_env: default_api_key_env(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Overridable so tests can point the client at a stub server.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            temperature: default_temperature(),
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// How many recent turns feed history reconstruction.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Name of the environment variable holding the token-signing secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            token_ttl_minutes: default_token_ttl_minutes(),
        }
    }
}

fn default_secret_env() -> String {
    "MINDWELL_AUTH_SECRET".to_string()
}
fn default_token_ttl_minutes() -> i64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("server.port must be > 0");
    }

    if config.knowledge.top_k == 0 {
        anyhow::bail!("knowledge.top_k must be >= 1");
    }

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "local" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local or gemini.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.chat.history_limit == 0 {
        anyhow::bail!("chat.history_limit must be >= 1");
    }
    if config.auth.token_ttl_minutes <= 0 {
        anyhow::bail!("auth.token_ttl_minutes must be > 0");
    }

    Ok(())
}

/// Starter configuration written by `mindwell init`. Every value matches the
/// serde defaults, so deleting any line leaves behavior unchanged.
pub fn starter_toml() -> &'static str {
    r#"# mindwell configuration

[server]
host = "127.0.0.1"
port = 8000

[database]
path = "./data/mindwell.sqlite3"

[knowledge]
# Built by `mindwell ingest`; `mindwell serve` refuses to start without it.
dir = "./data/knowledge"
top_k = 3

[corpus]
root = "./corpus"
include_globs = ["**/*.txt", "**/*.md", "**/*.pdf"]
exclude_globs = []

[chunking]
max_chars = 1000
overlap_chars = 200

[embedding]
# "local" runs sentence embeddings on-device; "gemini" uses the hosted API
# and reads its key from the environment variable named by api_key_env.
provider = "local"
model = "all-minilm-l6-v2"
batch_size = 32
max_retries = 3
timeout_secs = 30
api_key_env = "GEMINI_API_KEY"

[llm]
model = "gemini-2.0-flash"
temperature = 0.7
api_key_env = "GEMINI_API_KEY"
timeout_secs = 60

[chat]
history_limit = 10

[auth]
# The signing secret itself lives in the environment, never in this file.
secret_env = "MINDWELL_AUTH_SECRET"
token_ttl_minutes = 30
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.knowledge.top_k, 3);
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.chat.history_limit, 10);
        assert_eq!(config.auth.token_ttl_minutes, 30);
    }

    #[test]
    fn starter_toml_parses_to_defaults() {
        let config: Config = toml::from_str(starter_toml()).unwrap();
        validate(&config).unwrap();
        let defaults = Config::default();
        assert_eq!(config.server.host, defaults.server.host);
        assert_eq!(config.embedding.model, defaults.embedding.model);
        assert_eq!(config.llm.base_url, defaults.llm.base_url);
    }

    #[test]
    fn rejects_overlap_not_below_max() {
        let config: Config = toml::from_str(
            "[chunking]\nmax_chars = 100\noverlap_chars = 100\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let config: Config =
            toml::from_str("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_top_k() {
        let config: Config = toml::from_str("[knowledge]\ntop_k = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }
}
