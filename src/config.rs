use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Name of the credential shared by the embedding and generation endpoints.
pub const API_KEY_VARIABLE: &str = "GEMINI_API_KEY";

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EMBEDDING_MODEL: &str = "models/gemini-embedding-001";
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_HASHING_DIMENSION: usize = 768;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_SEGMENT_MAX_TOKENS: usize = 2048;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_UPLOAD_LIMIT_BYTES: usize = 200 * 1024 * 1024;

/// Errors encountered while loading configuration from the secrets store and environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The API credential was found neither in the secrets store nor in the environment.
    #[error(
        "Gemini API key not found. Add GEMINI_API_KEY to the secrets file or set it as an environment variable."
    )]
    MissingCredential,
    /// Secrets file exists but could not be read.
    #[error("Failed to read secrets file {path}: {reason}")]
    Secrets {
        /// Path of the secrets file.
        path: String,
        /// Parser or I/O failure description.
        reason: String,
    },
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the PDF question-answering service.
///
/// Built once at startup and handed to the pipeline constructors behind an `Arc`; nothing
/// below `main` reads the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential used for both embedding and generation calls.
    pub gemini_api_key: String,
    /// Root of the Gemini REST API (version segment included).
    pub gemini_base_url: String,
    /// Embedding backend used to vectorize segments and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Requested vector size; `None` keeps the provider default.
    pub embedding_dimension: Option<usize>,
    /// Chat model used to answer questions.
    pub generation_model: String,
    /// Optional sampling temperature forwarded to the chat model.
    pub generation_temperature: Option<f32>,
    /// Number of segments retrieved as context for every question.
    pub retrieval_top_k: usize,
    /// Token budget above which a page is split into several segments.
    pub segment_max_tokens: usize,
    /// Optional timeout applied to every remote call.
    pub request_timeout: Option<Duration>,
    /// Idle time after which a session is evicted.
    pub session_ttl: Duration,
    /// Maximum accepted request body size for uploads.
    pub upload_limit_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Hosted Gemini embeddings API.
    Gemini,
    /// Offline feature-hashing embedder, deterministic across runs.
    Hashing,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "hashing" | "local" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl Config {
    /// Configuration with defaults for everything except the credential.
    pub fn new(gemini_api_key: impl Into<String>) -> Self {
        Self {
            gemini_api_key: gemini_api_key.into(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            embedding_provider: EmbeddingProvider::Gemini,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: None,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            generation_temperature: None,
            retrieval_top_k: DEFAULT_TOP_K,
            segment_max_tokens: DEFAULT_SEGMENT_MAX_TOKENS,
            request_timeout: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            upload_limit_bytes: DEFAULT_UPLOAD_LIMIT_BYTES,
            server_port: None,
        }
    }

    /// Load `.env`, then build the configuration from the secrets file and the environment.
    pub fn load(secrets_file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(secrets_file, |key| env::var(key).ok())?;
        tracing::debug!(
            base_url = %config.gemini_base_url,
            embedding_provider = ?config.embedding_provider,
            embedding_model = %config.embedding_model,
            generation_model = %config.generation_model,
            top_k = config.retrieval_top_k,
            server_port = ?config.server_port,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// The credential is resolved from `secrets_file` first and `lookup` second; every other
    /// setting comes from `lookup` alone.
    pub fn from_lookup<F>(secrets_file: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let api_key = resolve_api_key(secrets_file, lookup(API_KEY_VARIABLE))?;
        let mut config = Self::new(api_key);

        if let Some(url) = lookup("GEMINI_BASE_URL") {
            config.gemini_base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(provider) = lookup("EMBEDDING_PROVIDER") {
            config.embedding_provider = provider
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        config.embedding_dimension = parse_optional(&lookup, "EMBEDDING_DIMENSION")?;
        if let Some(model) = lookup("GENERATION_MODEL") {
            config.generation_model = model;
        }
        config.generation_temperature = parse_optional(&lookup, "GENERATION_TEMPERATURE")?;
        if let Some(top_k) = parse_optional::<usize, _>(&lookup, "RETRIEVAL_TOP_K")? {
            if top_k == 0 {
                return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
            }
            config.retrieval_top_k = top_k;
        }
        if let Some(tokens) = parse_optional::<usize, _>(&lookup, "SEGMENT_MAX_TOKENS")? {
            config.segment_max_tokens = tokens.max(1);
        }
        config.request_timeout =
            parse_optional::<u64, _>(&lookup, "REQUEST_TIMEOUT_SECS")?.map(Duration::from_secs);
        if let Some(ttl) = parse_optional::<u64, _>(&lookup, "SESSION_TTL_SECS")? {
            config.session_ttl = Duration::from_secs(ttl);
        }
        if let Some(limit) = parse_optional(&lookup, "UPLOAD_LIMIT_BYTES")? {
            config.upload_limit_bytes = limit;
        }
        config.server_port = parse_optional(&lookup, "SERVER_PORT")?;

        Ok(config)
    }

    /// Vector size the hashing embedder produces.
    pub fn hashing_dimension(&self) -> usize {
        self.embedding_dimension
            .unwrap_or(DEFAULT_HASHING_DIMENSION)
            .max(1)
    }
}

/// Resolve the API key, preferring the secrets store over the environment value.
pub fn resolve_api_key(
    secrets_file: Option<&Path>,
    env_value: Option<String>,
) -> Result<String, ConfigError> {
    if let Some(path) = secrets_file {
        if let Some(key) = read_secret(path, API_KEY_VARIABLE)? {
            tracing::debug!(path = %path.display(), "Using API key from secrets file");
            return Ok(key);
        }
    }

    env_value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingCredential)
}

fn read_secret(path: &Path, key: &str) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let secrets_error = |reason: String| ConfigError::Secrets {
        path: path.display().to_string(),
        reason,
    };
    let entries = dotenvy::from_path_iter(path).map_err(|err| secrets_error(err.to_string()))?;
    for entry in entries {
        let (name, value) = entry.map_err(|err| secrets_error(err.to_string()))?;
        if name == key && !value.trim().is_empty() {
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

fn parse_optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn secrets_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write secrets");
        file
    }

    #[test]
    fn secrets_file_wins_over_environment() {
        let secrets = secrets_file("GEMINI_API_KEY=from-secrets\n");
        let key = resolve_api_key(Some(secrets.path()), Some("from-env".into())).unwrap();
        assert_eq!(key, "from-secrets");
    }

    #[test]
    fn environment_is_used_when_secrets_lack_the_key() {
        let secrets = secrets_file("OTHER=value\n");
        let key = resolve_api_key(Some(secrets.path()), Some("from-env".into())).unwrap();
        assert_eq!(key, "from-env");

        let missing = Path::new("/definitely/not/here/secrets.env");
        let key = resolve_api_key(Some(missing), Some("from-env".into())).unwrap();
        assert_eq!(key, "from-env");
    }

    #[test]
    fn missing_credential_is_reported() {
        let error = Config::from_lookup(None, lookup_from(&[])).unwrap_err();
        assert!(matches!(error, ConfigError::MissingCredential));

        let error = Config::from_lookup(None, lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(error, ConfigError::MissingCredential));
    }

    #[test]
    fn defaults_follow_hosted_models() {
        let config = Config::from_lookup(None, lookup_from(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.embedding_model, "models/gemini-embedding-001");
        assert_eq!(config.generation_model, "gemini-2.5-pro");
        assert_eq!(config.embedding_provider, EmbeddingProvider::Gemini);
        assert_eq!(config.retrieval_top_k, 4);
        assert!(config.request_timeout.is_none());
        assert_eq!(config.hashing_dimension(), 768);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(
            None,
            lookup_from(&[
                ("GEMINI_API_KEY", "k"),
                ("GEMINI_BASE_URL", "http://localhost:9000/v1beta/"),
                ("EMBEDDING_PROVIDER", "hashing"),
                ("EMBEDDING_DIMENSION", "64"),
                ("RETRIEVAL_TOP_K", "2"),
                ("REQUEST_TIMEOUT_SECS", "30"),
                ("SESSION_TTL_SECS", "5"),
                ("SERVER_PORT", "8080"),
            ]),
        )
        .unwrap();
        assert_eq!(config.gemini_base_url, "http://localhost:9000/v1beta");
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(config.hashing_dimension(), 64);
        assert_eq!(config.retrieval_top_k, 2);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.session_ttl, Duration::from_secs(5));
        assert_eq!(config.server_port, Some(8080));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let error = Config::from_lookup(
            None,
            lookup_from(&[("GEMINI_API_KEY", "k"), ("SERVER_PORT", "not-a-port")]),
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "SERVER_PORT"));

        let error = Config::from_lookup(
            None,
            lookup_from(&[("GEMINI_API_KEY", "k"), ("RETRIEVAL_TOP_K", "0")]),
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(_)));
    }
}
