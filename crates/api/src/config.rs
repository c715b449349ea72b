//! Application configuration

use std::env;

use crate::chat::BusinessHours;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub cors_allowed_origins: Vec<String>,

    // Database (in-memory stores when absent)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // Chat
    /// Prefix turning a stored attachment path into a URL
    pub media_url: String,
    /// Per-connection outbound queue capacity
    pub ws_outbound_buffer: usize,
    /// `None` disables the business-hours trigger
    pub business_hours: Option<BusinessHours>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            cors_allowed_origins: Vec::new(),
            database_url: None,
            database_max_connections: 10,
            jwt_secret: String::new(),
            jwt_expiry_hours: 24,
            media_url: "/media/".to_string(),
            ws_outbound_buffer: 64,
            business_hours: Some(BusinessHours::default()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            // Database
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(defaults.database_max_connections),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(defaults.jwt_expiry_hours),

            // Chat
            media_url: env::var("MEDIA_URL").unwrap_or(defaults.media_url),
            ws_outbound_buffer: env::var("WS_OUTBOUND_BUFFER")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .unwrap_or(defaults.ws_outbound_buffer)
                .max(1),
            business_hours: {
                let window = env::var("BUSINESS_HOURS").unwrap_or_else(|_| "09:00-17:00".to_string());
                let offset = env::var("BUSINESS_UTC_OFFSET").unwrap_or_else(|_| "+00:00".to_string());
                if window.trim().eq_ignore_ascii_case("off") {
                    None
                } else {
                    Some(
                        BusinessHours::parse(&window, &offset)
                            .map_err(|e| ConfigError::Invalid("BUSINESS_HOURS", e.to_string()))?,
                    )
                }
            },
        })
    }

    pub fn uses_database(&self) -> bool {
        self.database_url.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "CORS_ALLOWED_ORIGINS",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "JWT_SECRET",
        "MEDIA_URL",
        "WS_OUTBOUND_BUFFER",
        "BUSINESS_HOURS",
        "BUSINESS_UTC_OFFSET",
    ];

    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn setup_minimal_config() {
        cleanup_config();
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    #[test]
    #[serial]
    fn test_defaults() {
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert!(config.database_url.is_none());
        assert!(!config.uses_database());
        assert_eq!(config.media_url, "/media/");
        assert_eq!(config.ws_outbound_buffer, 64);
        assert_eq!(config.business_hours, Some(BusinessHours::default()));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_jwt_secret_required_and_strong() {
        cleanup_config();
        assert!(matches!(Config::from_env(), Err(ConfigError::Missing("JWT_SECRET"))));

        env::set_var("JWT_SECRET", "short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_business_hours_settings() {
        setup_minimal_config();

        env::set_var("BUSINESS_HOURS", "off");
        assert!(Config::from_env().unwrap().business_hours.is_none());

        env::set_var("BUSINESS_HOURS", "08:30-18:00");
        env::set_var("BUSINESS_UTC_OFFSET", "-05:00");
        let hours = Config::from_env().unwrap().business_hours.unwrap();
        assert_eq!(hours.utc_offset.whole_hours(), -5);

        env::set_var("BUSINESS_HOURS", "late");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("BUSINESS_HOURS", _))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_list_and_optional_values() {
        setup_minimal_config();
        env::set_var("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example");
        env::set_var("DATABASE_URL", "postgres://localhost/parley");
        env::set_var("WS_OUTBOUND_BUFFER", "0");

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(config.uses_database());
        assert_eq!(config.ws_outbound_buffer, 1);

        cleanup_config();
    }
}
