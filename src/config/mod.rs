use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub otp: OtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub min_password_length: usize,
    pub reset_token_ttl_secs: u64,
    /// Emails that receive the admin role on signup, from ADMIN_EMAILS
    /// (comma-separated). Bootstraps the first operators of a deployment.
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    pub ttl_secs: u64,
    /// Universal bypass code accepted in non-production environments,
    /// so mobile review builds can sign up without a mail inbox.
    pub bypass_code: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Environment defaults first, explicit env vars override
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout_secs =
                v.parse().unwrap_or(self.database.connection_timeout_secs);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("MIN_PASSWORD_LENGTH") {
            self.security.min_password_length =
                v.parse().unwrap_or(self.security.min_password_length);
        }
        if let Ok(v) = env::var("RESET_TOKEN_TTL_SECS") {
            self.security.reset_token_ttl_secs =
                v.parse().unwrap_or(self.security.reset_token_ttl_secs);
        }
        if let Ok(v) = env::var("ADMIN_EMAILS") {
            self.security.admin_emails = parse_admin_emails(&v);
        }
        if let Ok(v) = env::var("OTP_TTL_SECS") {
            self.otp.ttl_secs = v.parse().unwrap_or(self.otp.ttl_secs);
        }
        if let Ok(v) = env::var("OTP_BYPASS_CODE") {
            self.otp.bypass_code = if v.is_empty() { None } else { Some(v) };
        }
        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            api: ApiConfig {
                default_page_size: 25,
                max_page_size: 200,
            },
            security: SecurityConfig {
                jwt_secret: "dev-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7,
                min_password_length: 8,
                reset_token_ttl_secs: 30 * 60,
                admin_emails: Vec::new(),
            },
            otp: OtpConfig {
                ttl_secs: 10 * 60,
                bypass_code: Some("000000".to_string()),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout_secs: 10,
            },
            api: ApiConfig {
                default_page_size: 25,
                max_page_size: 100,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                min_password_length: 8,
                reset_token_ttl_secs: 30 * 60,
                admin_emails: Vec::new(),
            },
            otp: OtpConfig {
                ttl_secs: 10 * 60,
                bypass_code: Some("000000".to_string()),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout_secs: 5,
            },
            api: ApiConfig {
                default_page_size: 25,
                max_page_size: 100,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                min_password_length: 10,
                reset_token_ttl_secs: 15 * 60,
                admin_emails: Vec::new(),
            },
            otp: OtpConfig {
                ttl_secs: 5 * 60,
                bypass_code: None,
            },
        }
    }
}

fn parse_admin_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_allows_otp_bypass() {
        let config = AppConfig::development();
        assert_eq!(config.otp.bypass_code.as_deref(), Some("000000"));
        assert_eq!(config.api.default_page_size, 25);
    }

    #[test]
    fn admin_emails_parsed_trimmed_and_lowercased() {
        let emails = parse_admin_emails(" Ops@Example.com, ,admin@example.com ");
        assert_eq!(emails, vec!["ops@example.com", "admin@example.com"]);
        assert!(parse_admin_emails("").is_empty());
    }

    #[test]
    fn production_disables_otp_bypass() {
        let config = AppConfig::production();
        assert!(config.otp.bypass_code.is_none());
        assert!(config.security.min_password_length >= 10);
    }
}
