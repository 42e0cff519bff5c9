use jsonwebtoken::Algorithm;
use std::env;
use thiserror::Error;

/// Startup configuration errors. These are fatal: nothing here is a
/// per-request condition.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for environment variable {0}")]
    InvalidVar(&'static str),

    #[error("signing key is not set")]
    MissingSigningKey,

    #[error("unsupported signing algorithm {0:?}, expected an HMAC variant")]
    UnsupportedAlgorithm(Algorithm),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = require("DATABASE_URL")?;
        let jwt_secret = require("JWT_SECRET")?;

        let jwt_algorithm = match env::var("JWT_ALGORITHM") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidVar("JWT_ALGORITHM"))?,
            Err(_) => Algorithm::HS256,
        };

        let access_token_expire_minutes = match env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidVar("ACCESS_TOKEN_EXPIRE_MINUTES"))?,
            Err(_) => 30,
        };

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match env::var("PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidVar("PORT"))?,
            Err(_) => 8080,
        };

        Ok(Config {
            database: DatabaseConfig { url: database_url },
            auth: AuthConfig {
                jwt_secret,
                jwt_algorithm,
                access_token_expire_minutes,
            },
            server: ServerConfig { host, port },
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}
