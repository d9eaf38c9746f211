use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Config file looked up in the current directory.
pub const CONFIG_FILE: &str = ".ai-task-agent.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from `.ai-task-agent.toml`.
///
/// Every field has an environment fallback (`GITHUB_TOKEN`,
/// `GITHUB_REPOSITORY`, `OPENAI_API_KEY`, `MCP_SERVER_HOST`,
/// `MCP_SERVER_PORT`), so the tool works with zero config. File values win
/// for credentials; the server address env vars override the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token used by the MCP server.
    pub token: Option<String>,

    /// Default repository to operate on, in `owner/repo` form.
    pub repository: Option<String>,
}

/// Address the MCP server binds to, and that the agent connects to.
#[derive(Debug, Clone, Deserialize)]
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
    "localhost".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI API key for the live generator.
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
        }
    }
}

fn default_model() -> String {
    crate::llm::DEFAULT_MODEL.to_string()
}

impl Config {
    /// Load configuration from `.ai-task-agent.toml` in the current directory,
    /// falling back to defaults when the file does not exist, then apply
    /// environment fallbacks.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.github.token.is_none() {
            self.github.token = env::var("GITHUB_TOKEN").ok();
        }
        if self.github.repository.is_none() {
            self.github.repository = env::var("GITHUB_REPOSITORY").ok();
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = env::var("OPENAI_API_KEY").ok();
        }
        if let Ok(host) = env::var("MCP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("MCP_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
    }

    /// Resolve the GitHub token: config file value takes precedence, falls
    /// back to `GITHUB_TOKEN`.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| env::var("GITHUB_TOKEN").ok())
    }

    pub fn repository(&self) -> Option<String> {
        self.github
            .repository
            .clone()
            .or_else(|| env::var("GITHUB_REPOSITORY").ok())
    }

    pub fn openai_api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
    }

    /// Base URL of the MCP server the agent talks to.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }
}
