//! Service configuration read from the environment (and an optional `.env`).

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ServiceError::ConfigError {
                message: format!("Unsupported storage backend: {}", other),
            }),
        }
    }
}

/// Upper bound for `SESSION_TTL_HOURS` (one year).
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: IpAddr,
    pub http_port: u16,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: usize,
    pub session_ttl_hours: i64,
    pub max_upload_bytes: usize,
    pub cookie_secure: bool,
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ServiceError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ServiceError::ConfigError {
            message: format!("Invalid {}: {}", key, raw),
        }),
        None => Ok(default),
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::Postgres,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ServiceError::ConfigError {
                message: "DATABASE_URL environment variable is required".to_string(),
            });
        }

        let session_ttl_hours = parse_var(&lookup, "SESSION_TTL_HOURS", 24 * 14)?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
            return Err(ServiceError::ConfigError {
                message: format!(
                    "SESSION_TTL_HOURS must be between 1 and {}, got {}",
                    MAX_SESSION_TTL_HOURS, session_ttl_hours
                ),
            });
        }

        Ok(Self {
            bind_address: parse_var(&lookup, "BIND_ADDRESS", IpAddr::from([0, 0, 0, 0]))?,
            http_port: parse_var(&lookup, "HTTP_PORT", 8000)?,
            storage_backend,
            database_url,
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 16)?,
            session_ttl_hours,
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            cookie_secure: parse_var(&lookup, "COOKIE_SECURE", false)?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.http_port)
    }
}

/// Replaces the credentials part of a connection URL with `***`.
pub fn mask_database_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end + 3 => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
