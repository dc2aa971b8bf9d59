//! Server configuration loaded from the environment

use anyhow::Context;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_JWT_EXPIRY_HOURS: i64 = 24;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// Explicit CORS origin allowlist
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());

        let jwt_expiry_hours = std::env::var("JWT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JWT_EXPIRY_HOURS);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            bind_address,
            jwt_secret,
            jwt_expiry_hours,
            allowed_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_vars() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/paygate_test");
        std::env::set_var("JWT_SECRET", "test-secret");
    }

    fn clear_optional_vars() {
        std::env::remove_var("BIND_ADDRESS");
        std::env::remove_var("JWT_EXPIRY_HOURS");
        std::env::remove_var("ALLOWED_ORIGINS");
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        set_required_vars();
        clear_optional_vars();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.jwt_expiry_hours, DEFAULT_JWT_EXPIRY_HOURS);
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    #[serial]
    fn test_missing_database_url_fails() {
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("JWT_SECRET", "test-secret");

        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_allowed_origins_parsed_and_trimmed() {
        set_required_vars();
        clear_optional_vars();
        std::env::set_var(
            "ALLOWED_ORIGINS",
            "https://app.example.com, https://admin.example.com,",
        );

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.allowed_origins,
            vec![
                "https://app.example.com".to_string(),
                "https://admin.example.com".to_string()
            ]
        );

        std::env::remove_var("ALLOWED_ORIGINS");
    }
}
