use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

const DEFAULT_REFRESH_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub tokens: TokenConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub bcrypt_cost: u32,
    pub permission_cache_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub prefix: String,
    pub window_seconds: u64,
    pub max_requests: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment,
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/emissions"),
                    is_prod,
                )?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            tokens: TokenConfig {
                access_secret: get_env("ACCESS_TOKEN_SECRET", Some("dev-access-secret"), is_prod)?,
                access_ttl_seconds: parse_number(
                    "ACCESS_TOKEN_TTL_SECONDS",
                    &get_env("ACCESS_TOKEN_TTL_SECONDS", Some("900"), is_prod)?,
                )?,
                refresh_ttl_seconds: resolve_refresh_ttl(
                    env::var("REFRESH_TOKEN_EXPIRES_SECONDS").ok(),
                    env::var("REFRESH_TOKEN_EXPIRES_DAYS").ok(),
                )?,
            },
            security: SecurityConfig {
                bcrypt_cost: parse_number(
                    "BCRYPT_COST",
                    &get_env("BCRYPT_COST", Some("12"), is_prod)?,
                )?,
                permission_cache_ttl_seconds: parse_number(
                    "PERMISSION_CACHE_TTL_SECONDS",
                    &get_env("PERMISSION_CACHE_TTL_SECONDS", Some("3600"), is_prod)?,
                )?,
            },
            rate_limit: RateLimitConfig {
                prefix: get_env("RATE_LIMIT_PREFIX", Some("ratelimit:auth"), is_prod)?,
                window_seconds: parse_number(
                    "RATE_LIMIT_WINDOW_SECONDS",
                    &get_env("RATE_LIMIT_WINDOW_SECONDS", Some("900"), is_prod)?,
                )?,
                max_requests: parse_number(
                    "RATE_LIMIT_MAX",
                    &get_env("RATE_LIMIT_MAX", Some("10"), is_prod)?,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.tokens.access_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_TTL_SECONDS must be positive"
            )));
        }

        if self.tokens.refresh_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "refresh token lifetime must be positive"
            )));
        }

        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BCRYPT_COST must be between 4 and 31"
            )));
        }

        if self.environment == Environment::Prod
            && self.tokens.access_secret == "dev-access-secret"
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_SECRET must not use the dev default in production"
            )));
        }

        Ok(())
    }
}

/// An explicit seconds value wins over a days value; neither set means
/// the 30-day default.
fn resolve_refresh_ttl(
    seconds: Option<String>,
    days: Option<String>,
) -> Result<i64, AppError> {
    if let Some(raw) = seconds {
        return parse_number("REFRESH_TOKEN_EXPIRES_SECONDS", &raw);
    }
    let days: i64 = match days {
        Some(raw) => parse_number("REFRESH_TOKEN_EXPIRES_DAYS", &raw)?,
        None => DEFAULT_REFRESH_DAYS,
    };
    Ok(days * 86_400)
}

/// Parse a numeric setting. A value that does not parse is a hard
/// configuration error, never silently replaced by a default.
fn parse_number<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value {:?}: {}", key, raw, e))
    })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_seconds_win_over_days() {
        let ttl = resolve_refresh_ttl(Some("3600".to_string()), Some("7".to_string())).unwrap();
        assert_eq!(ttl, 3600);
    }

    #[test]
    fn test_days_convert_to_seconds() {
        let ttl = resolve_refresh_ttl(None, Some("7".to_string())).unwrap();
        assert_eq!(ttl, 7 * 86_400);
    }

    #[test]
    fn test_default_is_thirty_days() {
        let ttl = resolve_refresh_ttl(None, None).unwrap();
        assert_eq!(ttl, 30 * 86_400);
    }

    #[test]
    fn test_garbage_lifetime_is_config_error() {
        assert!(resolve_refresh_ttl(Some("soon".to_string()), None).is_err());
    }

    #[test]
    fn test_unparsable_numbers_are_config_errors() {
        // A typo'd value must surface, not silently revert to a default
        for raw in ["twelve", "", "12.5", "1e3"] {
            assert!(matches!(
                parse_number::<u32>("BCRYPT_COST", raw),
                Err(AppError::ConfigError(_))
            ));
        }
        assert!(matches!(
            parse_number::<u64>("RATE_LIMIT_MAX", "-1"),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn test_valid_numbers_parse() {
        assert_eq!(parse_number::<u32>("BCRYPT_COST", "12").unwrap(), 12);
        assert_eq!(
            parse_number::<u64>("RATE_LIMIT_WINDOW_SECONDS", "900").unwrap(),
            900
        );
    }
}
