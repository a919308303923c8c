use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::env;
use config; // Explicitly import the config crate

const DEFAULT_NONCE_TTL_SECONDS: i64 = 86_400;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

/// A content type as declared in `config/default.toml`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentTypeConfig {
    pub name: String,
    pub label: String,
    #[serde(default = "default_true")]
    pub public: bool,
    #[serde(default)]
    pub taxonomies: Vec<String>,
}

/// A taxonomy as declared in `config/default.toml`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaxonomyConfig {
    pub name: String,
    pub label: String,
    /// Term slug attached to every new record of a type using this taxonomy.
    #[serde(default)]
    pub default_term: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    #[serde(default)]
    pub content_types: Vec<ContentTypeConfig>,
    #[serde(default)]
    pub taxonomies: Vec<TaxonomyConfig>,
    // These fields will be populated from the .env file
    pub database_path: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub use_secure_cookies: bool,
    pub nonce_ttl_seconds: u64,
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = env::var("DATABASE_PATH")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'DATABASE_PATH' is not set in your .env file.".to_string()
            ))?;

        let session_secret_key = env::var("SESSION_SECRET_KEY")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'SESSION_SECRET_KEY' is not set in your .env file.".to_string()
            ))?;

        // 128 hex characters, i.e. the 64 bytes actix's cookie Key wants.
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string()
            ));
        }

        let admin_url_prefix = env::var("ADMIN_URL_PREFIX")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'ADMIN_URL_PREFIX' is not set in your .env file.".to_string()
            ))?;

        if !is_valid_url_prefix(&admin_url_prefix) {
            return Err(config::ConfigError::Message(
                "FATAL: 'ADMIN_URL_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens.".to_string()
            ));
        }

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let nonce_ttl_seconds = match env::var("NONCE_TTL_SECONDS") {
            Ok(raw) => raw.trim().parse::<i64>().ok().filter(|ttl| *ttl > 0).ok_or_else(|| {
                config::ConfigError::Message(format!(
                    "FATAL: 'NONCE_TTL_SECONDS' must be a positive whole number, got '{}'.", raw
                ))
            })?,
            Err(_) => DEFAULT_NONCE_TTL_SECONDS,
        };

        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        let builder = config::Config::builder()
            // Web host/port and the content-type registry live in the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .set_override("nonce_ttl_seconds", nonce_ttl_seconds)?
            .build()?;

        builder.try_deserialize()
    }

    /// Returns the full path to the users/settings database file inside its own folder.
    pub fn users_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("users")
            .join("users.db")
    }

    /// Returns the full path to the posts database file inside its own folder.
    pub fn posts_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("posts")
            .join("posts.db")
    }

    pub fn admin_path(&self, rest: &str) -> String {
        format!("/management/{}/{}", self.admin_url_prefix, rest.trim_start_matches('/'))
    }
}

fn is_valid_url_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_prefix_rules() {
        assert!(is_valid_url_prefix("wp-admin_2"));
        assert!(!is_valid_url_prefix(""));
        assert!(!is_valid_url_prefix("admin/panel"));
        assert!(!is_valid_url_prefix("admin panel"));
    }

    #[test]
    fn content_types_deserialize_with_defaults() {
        let parsed: ContentTypeConfig = serde_json::from_str(r#"{"name":"book","label":"Books"}"#).unwrap();
        assert!(parsed.public);
        assert!(parsed.taxonomies.is_empty());
    }
}
