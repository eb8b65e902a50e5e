use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_url: String,
    /// Base URL of the inference device, without a trailing slash.
    pub device_base_url: String,
    pub jwt_secret: String,
    pub media_dir: String,
    pub log_dir: String,
    pub detector_model_path: Option<String>,
    pub cookie_secure: bool,
    pub device_timeout_secs: u64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialServerConfig {
    pub listen_addr: Option<String>,
    pub database_url: Option<String>,
    pub device_base_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub media_dir: Option<String>,
    pub log_dir: Option<String>,
    pub detector_model_path: Option<String>,
    pub cookie_secure: Option<bool>,
    pub device_timeout_secs: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_media_dir() -> String {
    "media".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_DEVICE_TIMEOUT_SECS: u64 = 30;

impl PartialServerConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads every key through `lookup`, which receives the upper-case variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cookie_secure = match lookup("COOKIE_SECURE") {
            Some(raw) => Some(parse_bool("COOKIE_SECURE", &raw)?),
            None => None,
        };
        let device_timeout_secs = match lookup("DEVICE_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "DEVICE_TIMEOUT_SECS",
                value: raw.clone(),
            })?),
            None => None,
        };

        Ok(Self {
            listen_addr: lookup("LISTEN_ADDR"),
            database_url: lookup("DATABASE_URL"),
            device_base_url: lookup("DEVICE_BASE_URL"),
            jwt_secret: lookup("JWT_SECRET"),
            media_dir: lookup("MEDIA_DIR"),
            log_dir: lookup("LOG_DIR"),
            detector_model_path: lookup("DETECTOR_MODEL_PATH"),
            cookie_secure,
            device_timeout_secs,
        })
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) => PartialServerConfig::from_toml_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config = PartialServerConfig::from_env()?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config)
    }

    pub fn merge(
        env_config: PartialServerConfig,
        file_config: PartialServerConfig,
    ) -> Result<Self, ConfigError> {
        let device_base_url = env_config
            .device_base_url
            .or(file_config.device_base_url)
            .ok_or(ConfigError::Missing("DEVICE_BASE_URL"))?
            .trim_end_matches('/')
            .to_string();

        Ok(ServerConfig {
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            device_base_url,
            jwt_secret: env_config
                .jwt_secret
                .or(file_config.jwt_secret)
                .ok_or(ConfigError::Missing("JWT_SECRET"))?,
            media_dir: env_config
                .media_dir
                .or(file_config.media_dir)
                .unwrap_or_else(default_media_dir),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            detector_model_path: env_config
                .detector_model_path
                .or(file_config.detector_model_path),
            cookie_secure: env_config
                .cookie_secure
                .or(file_config.cookie_secure)
                .unwrap_or(false),
            device_timeout_secs: env_config
                .device_timeout_secs
                .or(file_config.device_timeout_secs)
                .unwrap_or(DEFAULT_DEVICE_TIMEOUT_SECS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_file() {
        let file: PartialServerConfig = toml::from_str(
            r#"
            database_url = "sqlite://file.db"
            device_base_url = "http://file-device:5000/"
            jwt_secret = "file-secret"
            media_dir = "file-media"
            "#,
        )
        .unwrap();
        let env = PartialServerConfig::from_lookup(lookup_from(&[
            ("DEVICE_BASE_URL", "http://env-device:5000/"),
            ("COOKIE_SECURE", "true"),
        ]))
        .unwrap();

        let config = ServerConfig::merge(env, file).unwrap();
        assert_eq!(config.device_base_url, "http://env-device:5000");
        assert_eq!(config.database_url, "sqlite://file.db");
        assert_eq!(config.jwt_secret, "file-secret");
        assert_eq!(config.media_dir, "file-media");
        assert_eq!(config.log_dir, "logs");
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert!(config.cookie_secure);
        assert_eq!(config.device_timeout_secs, 30);
        assert!(config.detector_model_path.is_none());
    }

    #[test]
    fn test_missing_required_key() {
        let env = PartialServerConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", "s"),
        ]))
        .unwrap();
        let err = ServerConfig::merge(env, PartialServerConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DEVICE_BASE_URL")));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = PartialServerConfig::from_lookup(lookup_from(&[("COOKIE_SECURE", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "COOKIE_SECURE", .. }));

        let err =
            PartialServerConfig::from_lookup(lookup_from(&[("DEVICE_TIMEOUT_SECS", "soon")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DEVICE_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn test_missing_file_is_empty_layer() {
        let partial =
            PartialServerConfig::from_toml_file(Path::new("/definitely/not/here.toml")).unwrap();
        assert!(partial.database_url.is_none());
    }
}
