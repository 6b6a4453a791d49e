/// Configuration management for the API server
///
/// Loaded once at startup from environment variables (and a local `.env`
/// when present) into a typed [`Config`]. Nothing reads the environment
/// after this.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:8080)
/// - `APP_URL`: public base URL used in emailed links
/// - `STORAGE_BACKEND`: `postgres` (default) or `memory`
/// - `DATABASE_URL`: PostgreSQL connection string (required for `postgres`)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `JWT_SECRET`: signing key for bearer access tokens, 32+ characters
/// - `CREDENTIAL_SECRET`: HMAC key for stored token digests, 32+ characters
/// - `OTP_TTL_MINUTES` (10), `OTP_LENGTH` (6), `ACTIVATION_TTL_HOURS` (168)
/// - `SESSION_TTL_HOURS` (12), `ACCESS_TOKEN_TTL_MINUTES` (30)
/// - `BREVO_API_KEY`: transactional email key; absent means log-only mail
/// - `SENDER_EMAIL`: from-address for outgoing mail
/// - `UPLOAD_DIR`: floor plan storage directory (default: uploads)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for any (default)
/// - `PRODUCTION`: enables HSTS and `Secure` cookies
///
/// # Example
///
/// ```no_run
/// use propdesk_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::str::FromStr;

use chrono::Duration;
use propdesk_shared::auth::{
    credentials::{CredentialPolicy, MIN_OTP_LENGTH, MIN_SECRET_LENGTH},
    session::SessionPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageBackend,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,

    /// Directory floor plans are written to
    pub upload_dir: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Base of links sent by email, without trailing slash
    pub public_url: String,

    pub cors_origins: Vec<String>,
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// IMPORTANT: keep secret; generate with `openssl rand -hex 32`
    pub jwt_secret: String,
    pub credential_secret: String,
    pub otp_ttl_minutes: i64,
    pub otp_length: usize,
    pub activation_ttl_hours: i64,
    pub session_ttl_hours: i64,
    pub access_token_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub brevo_api_key: Option<String>,
    pub sender_email: String,
}

fn var_or<T: FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        _ => Ok(default),
    }
}

fn secret(name: &str) -> anyhow::Result<String> {
    let value = env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))?;
    if value.len() < MIN_SECRET_LENGTH {
        anyhow::bail!("{} must be at least {} characters long", name, MIN_SECRET_LENGTH);
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("STORAGE_BACKEND must be postgres or memory, got {}", other),
        };

        let database_url = match (storage, env::var("DATABASE_URL")) {
            (_, Ok(url)) => url,
            (StorageBackend::Memory, Err(_)) => String::new(),
            (StorageBackend::Postgres, Err(_)) => {
                anyhow::bail!("DATABASE_URL environment variable is required")
            }
        };

        let port = var_or("API_PORT", 8080u16)?;
        let public_url = env::var("APP_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));

        let otp_length = var_or("OTP_LENGTH", 6usize)?;
        if otp_length < MIN_OTP_LENGTH {
            anyhow::bail!("OTP_LENGTH must be at least {}", MIN_OTP_LENGTH);
        }

        let config = Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
                public_url: public_url.trim_end_matches('/').to_string(),
                cors_origins: env::var("CORS_ORIGINS")
                    .unwrap_or_else(|_| "*".to_string())
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                production: var_or("PRODUCTION", false)?,
            },
            storage,
            database: DatabaseConfig {
                url: database_url,
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10u32)?,
            },
            auth: AuthConfig {
                jwt_secret: secret("JWT_SECRET")?,
                credential_secret: secret("CREDENTIAL_SECRET")?,
                otp_ttl_minutes: var_or("OTP_TTL_MINUTES", 10i64)?,
                otp_length,
                activation_ttl_hours: var_or("ACTIVATION_TTL_HOURS", 168i64)?,
                session_ttl_hours: var_or("SESSION_TTL_HOURS", 12i64)?,
                access_token_ttl_minutes: var_or("ACCESS_TOKEN_TTL_MINUTES", 30i64)?,
            },
            email: EmailConfig {
                brevo_api_key: env::var("BREVO_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                sender_email: env::var("SENDER_EMAIL")
                    .unwrap_or_else(|_| "no-reply@propdesk.local".to_string()),
            },
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
        };

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn credential_policy(&self) -> CredentialPolicy {
        CredentialPolicy {
            secret: self.auth.credential_secret.clone(),
            otp_ttl: Duration::minutes(self.auth.otp_ttl_minutes),
            otp_length: self.auth.otp_length,
            activation_ttl: Duration::hours(self.auth.activation_ttl_hours),
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            session_ttl: Duration::hours(self.auth.session_ttl_hours),
            jwt_secret: self.auth.jwt_secret.clone(),
            access_token_ttl: Duration::minutes(self.auth.access_token_ttl_minutes),
        }
    }

    /// In-memory configuration for tests and local experiments
    pub fn for_tests() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
                cors_origins: vec!["*".to_string()],
                production: false,
            },
            storage: StorageBackend::Memory,
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
            },
            auth: AuthConfig {
                jwt_secret: "test-jwt-secret-at-least-32-bytes-long".to_string(),
                credential_secret: "test-credential-secret-at-least-32-bytes".to_string(),
                otp_ttl_minutes: 10,
                otp_length: 6,
                activation_ttl_hours: 168,
                session_ttl_hours: 12,
                access_token_ttl_minutes: 30,
            },
            email: EmailConfig {
                brevo_api_key: None,
                sender_email: "no-reply@propdesk.test".to_string(),
            },
            upload_dir: "uploads".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = Config::for_tests();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_policies_follow_config() {
        let mut config = Config::for_tests();
        config.auth.otp_ttl_minutes = 5;
        config.auth.session_ttl_hours = 2;

        assert_eq!(config.credential_policy().otp_ttl, Duration::minutes(5));
        assert_eq!(config.session_policy().session_ttl, Duration::hours(2));
        assert_eq!(config.credential_policy().otp_length, 6);
    }

    #[test]
    fn test_var_or_falls_back_when_unset() {
        let value: u32 = var_or("PROPDESK_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
