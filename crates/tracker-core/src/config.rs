use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub analytics: AnalyticsConfig,
}

impl AppConfig {
    /// Load configuration from default path (~/.config/progress-tracker/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Write current configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("progress-tracker")
            .join("config.toml")
    }

    /// Data directory for the database.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("progress-tracker")
    }

    /// Resolved database file path.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("learning_progress.db"))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Enable CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            cors: true,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. None = data_dir/learning_progress.db.
    pub path: Option<PathBuf>,
}

/// Login and per-user scoping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require a bearer token on every route except /health and /token.
    pub enabled: bool,
    /// Lifetime of an issued access token, in minutes.
    pub token_ttl_mins: u64,
    /// bcrypt work factor for new passwords.
    pub password_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_ttl_mins: 30,
            password_cost: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Width of the "recent progress" window, in days.
    pub recent_window_days: u32,
    /// Decimal places used when rendering hours and averages.
    pub display_precision: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 30,
            display_precision: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("127.0.0.1"));
        assert!(toml_str.contains("token_ttl_mins = 30"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.auth.enabled, config.auth.enabled);
        assert_eq!(
            parsed.analytics.recent_window_days,
            config.analytics.recent_window_days
        );
    }

    #[test]
    fn test_save_to_custom_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("tracker.toml");
        let mut config = AppConfig::default();
        config.analytics.recent_window_days = 7;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.analytics.recent_window_days, 7);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[auth]\nenabled = true\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.auth.enabled);
        assert_eq!(config.auth.token_ttl_mins, 30);
        assert_eq!(config.auth.password_cost, 12);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_database_path_override() {
        let mut config = AppConfig::default();
        assert!(config.database_path().ends_with("learning_progress.db"));
        config.database.path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/custom.db"));
    }
}
