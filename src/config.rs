use serde::Deserialize;
use std::env;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_ICD_API_URL: &str = "https://id.who.int/icd/entity";
const DEFAULT_ICD_TOKEN_URL: &str = "https://icdaccessmanagement.who.int/connect/token";
const DEFAULT_DATABASE_URL: &str = "sqlite://medical_notes.db";
const DEFAULT_SEARCH_K: usize = 3;
const DEFAULT_SEARCH_MAX_K: usize = 50;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the medical notes server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key for the OpenAI-compatible completion and embedding endpoints.
    pub openai_api_key: String,
    /// Base URL of the OpenAI-compatible API (including the `/v1` prefix).
    pub openai_base_url: String,
    /// Chat model used for summarization, question answering, and extraction.
    pub completion_model: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// OAuth client id for the WHO ICD API.
    pub icd_client_id: String,
    /// OAuth client secret for the WHO ICD API.
    pub icd_client_secret: String,
    /// Base URL of the ICD entity API.
    pub icd_api_url: String,
    /// Token endpoint used for the client-credentials exchange.
    pub icd_token_url: String,
    /// SQLite connection string for the document store.
    pub database_url: String,
    /// Result count used when a search omits `k`.
    pub search_default_k: usize,
    /// Upper bound applied to any requested `k`.
    pub search_max_k: usize,
    /// Whether newly created documents are appended to the vector index.
    pub index_on_create: bool,
    /// Timeout applied to every outbound HTTP request.
    pub http_timeout_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic offline hashing embedder.
    Hashing,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self {
            openai_api_key: load_env("OPENAI_API_KEY")?,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::OpenAI),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            icd_client_id: load_env("ICD_CLIENT_ID")?,
            icd_client_secret: load_env("ICD_CLIENT_SECRET")?,
            icd_api_url: load_env_optional("ICD_API_URL")
                .unwrap_or_else(|| DEFAULT_ICD_API_URL.to_string()),
            icd_token_url: load_env_optional("ICD_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_ICD_TOKEN_URL.to_string()),
            database_url: load_env_optional("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            search_default_k: parse_optional("SEARCH_DEFAULT_K")?.unwrap_or(DEFAULT_SEARCH_K),
            search_max_k: parse_optional("SEARCH_MAX_K")?.unwrap_or(DEFAULT_SEARCH_MAX_K),
            index_on_create: load_env_optional("INDEX_ON_CREATE")
                .map(|value| {
                    parse_bool(&value)
                        .ok_or_else(|| ConfigError::InvalidValue("INDEX_ON_CREATE".to_string()))
                })
                .transpose()?
                .unwrap_or(true),
            http_timeout_secs: parse_optional("HTTP_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            server_port: parse_optional("SERVER_PORT")?,
        }
        .validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.search_max_k == 0 {
            return Err(ConfigError::InvalidValue("SEARCH_MAX_K".into()));
        }
        Ok(self)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

/// Load `.env` (when present) and build the configuration from the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        openai_base_url = %config.openai_base_url,
        completion_model = %config.completion_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        embedding_dimension = config.embedding_dimension,
        database_url = %config.database_url,
        index_on_create = config.index_on_create,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        openai_api_key: "sk-test".into(),
        openai_base_url: "http://127.0.0.1:9/v1".into(),
        completion_model: "gpt-test".into(),
        embedding_provider: EmbeddingProvider::Hashing,
        embedding_model: "text-embedding-test".into(),
        embedding_dimension: 32,
        icd_client_id: "client".into(),
        icd_client_secret: "secret".into(),
        icd_api_url: "http://127.0.0.1:9/icd/entity".into(),
        icd_token_url: "http://127.0.0.1:9/connect/token".into(),
        database_url: "sqlite::memory:".into(),
        search_default_k: DEFAULT_SEARCH_K,
        search_max_k: DEFAULT_SEARCH_MAX_K,
        index_on_create: true,
        http_timeout_secs: 5,
        server_port: None,
    }
}
