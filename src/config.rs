//! Configuration parsing and structures

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env::substitute_env_vars;
use crate::server::ServerDefaults;

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fallbacks for settings a request URL does not carry
    #[serde(default)]
    pub defaults: RawDefaults,

    /// Transport settings
    #[serde(default)]
    pub connection: RawConnection,

    /// Where bind credentials come from
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// `defaults` section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDefaults {
    /// Paged results page size (0 disables paging)
    pub page_size: Option<u32>,

    /// Server-side size limit (0 for none)
    pub size_limit: Option<u32>,

    /// Server-side time limit in seconds (0 for none)
    pub time_limit: Option<u32>,

    /// Protocol version
    pub version: Option<u32>,
}

/// `connection` section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConnection {
    /// Transport connect timeout, e.g. "10s"
    #[serde(default, with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,

    /// Verify server certificates for ldaps:// and StartTLS
    pub tls_verify: Option<bool>,
}

/// Credential source (tagged enum)
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialsConfig {
    /// Prompt on the terminal when the server rejects a bind
    #[default]
    Interactive,

    /// Fixed identity, never prompts
    Static { username: String, password: String },

    /// Never supply credentials; rejected binds fail
    None,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Fallback server settings
    pub defaults: ServerDefaults,

    /// Credential source
    pub credentials: CredentialsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by filling in built-in defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            defaults,
            connection,
            credentials,
        } = self;

        let builtin = ServerDefaults::default();
        let defaults = ServerDefaults {
            page_size: defaults.page_size.unwrap_or(builtin.page_size),
            size_limit: defaults.size_limit.unwrap_or(builtin.size_limit),
            time_limit: defaults.time_limit.unwrap_or(builtin.time_limit),
            version: defaults.version.unwrap_or(builtin.version),
            connect_timeout: connection
                .connect_timeout
                .unwrap_or(builtin.connect_timeout),
            tls_verify: connection.tls_verify.unwrap_or(builtin.tls_verify),
        };

        Ok(Config {
            logging,
            defaults,
            credentials,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            defaults: ServerDefaults::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, after `${VAR}` substitution
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.defaults.version, 2 | 3) {
            return Err(ConfigError::ValidationError(format!(
                "Unsupported protocol version {} (expected 2 or 3)",
                self.defaults.version
            )));
        }

        if let CredentialsConfig::Static { username, .. } = &self.credentials {
            if username.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Static credentials require a username".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("{}").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.defaults, ServerDefaults::default());
        assert_eq!(config.credentials, CredentialsConfig::Interactive);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
logging:
  level: debug

defaults:
  page_size: 500
  size_limit: 1000
  time_limit: 30
  version: 3

connection:
  connect_timeout: 5s
  tls_verify: false

credentials:
  type: static
  username: cn=admin,dc=example,dc=org
  password: secret
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.defaults.page_size, 500);
        assert_eq!(config.defaults.size_limit, 1000);
        assert_eq!(config.defaults.time_limit, 30);
        assert_eq!(config.defaults.connect_timeout, Duration::from_secs(5));
        assert!(!config.defaults.tls_verify);

        match &config.credentials {
            CredentialsConfig::Static { username, password } => {
                assert_eq!(username, "cn=admin,dc=example,dc=org");
                assert_eq!(password, "secret");
            }
            other => panic!("Expected static credentials, got {:?}", other),
        }
        config.validate().unwrap();
    }

    #[test]
    fn test_credentials_none() {
        let config = Config::from_str("credentials:\n  type: none\n").unwrap();
        assert_eq!(config.credentials, CredentialsConfig::None);
    }

    #[test]
    fn test_env_substitution_in_config() {
        std::env::set_var("LDAPFS_CONFIG_TEST_PASSWORD", "from-env");
        let yaml = r#"
credentials:
  type: static
  username: ${LDAPFS_CONFIG_TEST_USER:-cn=reader}
  password: ${LDAPFS_CONFIG_TEST_PASSWORD}
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(
            config.credentials,
            CredentialsConfig::Static {
                username: "cn=reader".to_string(),
                password: "from-env".to_string(),
            }
        );
        std::env::remove_var("LDAPFS_CONFIG_TEST_PASSWORD");
    }

    #[test]
    fn test_validate_rejects_bad_version() {
        let config = Config::from_str("defaults:\n  version: 4\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("version 4"));
    }

    #[test]
    fn test_validate_rejects_static_without_username() {
        let yaml = "credentials:\n  type: static\n  username: \"\"\n  password: x\n";
        let config = Config::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_credential_type_is_parse_error() {
        let err = Config::from_str("credentials:\n  type: kerberos\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: warn").unwrap();
        let config = Config::from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(&PathBuf::from("/nonexistent/ldap-fs.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(..)));
    }
}
