use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Configuration surface every emissions service shares: the bind
/// port and the identity used for log and trace attribution. Service
/// crates flatten this into their own config struct.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    8080
}

fn default_service_name() -> String {
    "emissions-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from an optional `configuration` file, overridden by
    /// `APP__`-prefixed environment variables.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.service_name, "emissions-service");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"port": 9090, "service_name": "emissions-auth", "log_level": "debug"}"#,
        )
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.service_name, "emissions-auth");
        assert_eq!(config.log_level, "debug");
    }
}
