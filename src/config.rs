use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct BotdeskConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Base URL of the external auth service that `/auth/*` is forwarded to.
    #[serde(default = "default_auth_service_url")]
    pub service_url: String,
    /// PEM file holding the RS256 public key used to verify user tokens.
    #[serde(default = "default_public_key_path")]
    pub public_key_path: PathBuf,
    /// Inline RS256 public key; `\n` escapes are expanded.
    pub public_key: Option<String>,
    /// HS256 secret for user tokens. Only used when no public key is available.
    pub jwt_secret: Option<String>,
    /// HS256 secret for embedded chatbot session tokens.
    pub session_secret: Option<String>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            service_url: default_auth_service_url(),
            public_key_path: default_public_key_path(),
            public_key: None,
            jwt_secret: None,
            session_secret: None,
            session_ttl_secs: default_session_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_rag_url")]
    pub server_url: String,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            server_url: default_rag_url(),
            query_timeout_secs: default_query_timeout(),
            status_timeout_secs: default_status_timeout(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `openai` or `ollama`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            base_url: None,
            model: None,
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

// Default functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/botdesk.db")
}
fn default_auth_service_url() -> String {
    "http://localhost:8000".into()
}
fn default_public_key_path() -> PathBuf {
    PathBuf::from("config/public.pem")
}
fn default_session_ttl() -> i64 {
    86_400
}
fn default_rag_url() -> String {
    "http://localhost:5000/api".into()
}
fn default_query_timeout() -> u64 {
    10
}
fn default_status_timeout() -> u64 {
    5
}
fn default_upload_timeout() -> u64 {
    60
}
fn default_llm_provider() -> String {
    "openai".into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_file_size() -> usize {
    16 * 1024 * 1024
}

/// Load config from TOML file with env var overrides.
pub fn load(path: &str) -> anyhow::Result<BotdeskConfig> {
    let content = if std::path::Path::new(path).exists() {
        std::fs::read_to_string(path)?
    } else {
        tracing::warn!("Config file not found at {}, using defaults", path);
        String::new()
    };

    let mut config: BotdeskConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn apply_env_overrides(
    config: &mut BotdeskConfig,
    var: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = var("BOTDESK_HOST") {
        config.host = v;
    }
    if let Some(v) = var("BOTDESK_PORT").or_else(|| var("PORT")) {
        config.port = v.parse()?;
    }
    if let Some(v) = var("BOTDESK_DB_PATH") {
        config.database_path = PathBuf::from(v);
    }
    if let Some(v) = var("AUTH_SERVICE_URL") {
        config.auth.service_url = v;
    }
    if let Some(v) = var("JWT_SECRET_PUBLIC_KEY") {
        config.auth.public_key = Some(v);
    }
    if let Some(v) = var("CHATBOT_SESSION_SECRET") {
        config.auth.session_secret = Some(v);
    }
    if let Some(v) = var("RAG_SERVER_URL") {
        config.rag.server_url = v;
    }
    if let Some(v) = var("LLM_TYPE") {
        config.llm.provider = v;
    }
    match config.llm.provider.as_str() {
        "ollama" => {
            if let Some(v) = var("OLLAMA_BASE_URL") {
                config.llm.base_url = Some(v);
            }
            if let Some(v) = var("OLLAMA_MODEL") {
                config.llm.model = Some(v);
            }
        }
        _ => {
            if let Some(v) = var("OPENAI_API_KEY") {
                config.llm.api_key = Some(v);
            }
            if let Some(v) = var("OPENAI_MODEL") {
                config.llm.model = Some(v);
            }
        }
    }
    Ok(())
}
