// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The DB pool reads its own sizing variables in db/pool.rs.

use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// PostgreSQL connection string. Without one the server keeps documents in memory.
    pub database_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `docket_server=debug`).
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Demand `sslmode=require` or stricter on the database URL.
    pub require_db_tls: bool,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `DOCKET_HOST` | `0.0.0.0` |
    /// | `DOCKET_PORT` | `8080` |
    /// | `DOCKET_DATABASE_URL` | *(none)* |
    /// | `DOCKET_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `DOCKET_LOG_FILTER` | `info` |
    /// | `DOCKET_LOG_FORMAT` | `text` |
    /// | `DOCKET_REQUIRE_DB_TLS` | `true` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("DOCKET_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("DOCKET_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let database_url = env("DOCKET_DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        let cors_origins = env("DOCKET_CORS_ORIGINS").ok();

        let log_filter = env("DOCKET_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("DOCKET_LOG_FORMAT").ok().as_deref().map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let require_db_tls = env("DOCKET_REQUIRE_DB_TLS")
            .ok()
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off"))
            .unwrap_or(true);

        Self { listen_addr, database_url, cors_origins, log_filter, log_format, require_db_tls }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = ServerConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
        assert!(cfg.database_url.is_none());
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert!(cfg.require_db_tls);
    }

    #[test]
    fn custom_host_and_port() {
        let mut m = HashMap::new();
        m.insert("DOCKET_HOST", "127.0.0.1");
        m.insert("DOCKET_PORT", "3000");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn invalid_port_uses_default() {
        let mut m = HashMap::new();
        m.insert("DOCKET_PORT", "not_a_number");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 8080);
    }

    #[test]
    fn database_url_from_env() {
        let mut m = HashMap::new();
        m.insert("DOCKET_DATABASE_URL", "postgres://u:p@host/db");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://u:p@host/db"));
    }

    #[test]
    fn blank_database_url_means_memory_store() {
        let mut m = HashMap::new();
        m.insert("DOCKET_DATABASE_URL", "  ");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn json_log_format_and_filter() {
        let mut m = HashMap::new();
        m.insert("DOCKET_LOG_FORMAT", "JSON");
        m.insert("DOCKET_LOG_FILTER", "debug,tower_http=trace");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.log_filter, "debug,tower_http=trace");
    }

    #[test]
    fn db_tls_can_be_disabled() {
        let mut m = HashMap::new();
        m.insert("DOCKET_REQUIRE_DB_TLS", "false");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert!(!cfg.require_db_tls);
    }

    #[test]
    fn cors_origins_from_env() {
        let mut m = HashMap::new();
        m.insert("DOCKET_CORS_ORIGINS", "https://app.docket.dev");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.cors_origins.as_deref(), Some("https://app.docket.dev"));
    }
}
