//! Application configuration, loaded via figment (TOML file + env overrides)
//! and validated fail-fast before the server starts.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use relayboard_domain::error::{Error, Result};
use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Postgres connection settings.
    pub database: DatabaseConfig,
    /// External board integration settings.
    pub board: BoardConfig,
    /// Document storage settings.
    pub storage: StorageConfig,
    /// Embedding provider settings.
    pub embeddings: EmbeddingConfig,
    /// Jira integration settings, for the Jira-refresh handler. Absent
    /// means that handler is not registered at startup.
    #[serde(default)]
    pub jira: Option<JiraConfig>,
    /// Directory integration settings, for the directory-group-sync
    /// handler. Absent means that handler is not registered at startup.
    #[serde(default)]
    pub directory: Option<DirectoryConfig>,
}

/// HTTP bind address and cron/admin auth.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to, e.g. `0.0.0.0:8080`.
    pub bind_address: String,
    /// Bearer token cron endpoints require (spec §6 "bearer-token authenticated").
    pub cron_token: String,
}

/// Postgres connection pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    pub url: String,
    /// Maximum pool size. Spec §5: "must be sized to support at least
    /// 3 × simultaneous search requests".
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// External board client settings (spec §4.3, §4.4, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// Base URL of the board API.
    pub api_base_url: String,
    /// API token used to authenticate outbound calls.
    pub api_token: String,
    /// Shared secret used to verify inbound webhook signatures.
    /// If absent, ingress proceeds but logs a warning (spec §4.4 step 3).
    pub webhook_secret: Option<String>,
    /// Board id contacts are synced to.
    pub contacts_board_id: Option<String>,
    /// Board id organizations are synced to.
    pub organizations_board_id: Option<String>,
    /// Maximum retries for rate-limited calls (spec §5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

/// Document storage backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory documents are stored under.
    pub root_dir: String,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding API.
    pub api_base_url: String,
    /// API key for the embedding provider.
    pub api_key: Option<String>,
    /// Model name to request.
    pub model: String,
}

/// Jira integration settings (spec §4.1 table "Jira-refresh").
#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
    /// Base URL, e.g. `https://company.atlassian.net`.
    pub base_url: String,
    /// Account email used for HTTP basic auth against the Jira Cloud API.
    pub user_email: String,
    /// API token.
    pub api_token: String,
}

/// Directory integration settings (spec §4.1 table "Directory-group sync").
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory's SCIM-style API.
    pub base_url: String,
    /// Bearer token.
    pub api_token: String,
}

impl AppConfig {
    /// Load configuration from `config/<env>.toml`, then `RELAYBOARD_`
    /// prefixed environment variables, then validate fail-fast.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no config file is found, parsing
    /// fails, or validation rejects a value.
    pub fn load() -> Result<Self> {
        let env_name = std::env::var("RELAYBOARD_ENV").unwrap_or_else(|_| "development".to_owned());
        let path = format!("config/{env_name}.toml");

        let config: AppConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RELAYBOARD_").split("__"))
            .extract()
            .map_err(|e| Error::configuration(format!("failed to load {path}: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation of values the rest of the system assumes are
    /// well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.server.cron_token.is_empty() {
            return Err(Error::configuration("server.cron_token must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(Error::configuration("database.max_connections must be > 0"));
        }
        if self.database.max_connections < 3 {
            // Spec §5: the ranking fan-out needs headroom for 3 concurrent
            // queries per in-flight search request.
            return Err(Error::configuration(
                "database.max_connections must be >= 3 to support concurrent hybrid-search ranking",
            ));
        }
        if self.board.api_base_url.is_empty() {
            return Err(Error::configuration("board.api_base_url must not be empty"));
        }
        if self.board.webhook_secret.is_none() {
            tracing::warn!("board.webhook_secret is not configured; webhook signatures will not be verified");
        }
        Ok(())
    }
}
