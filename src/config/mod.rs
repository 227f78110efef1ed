use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 3005;
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "depd";
const DEFAULT_DB_USER: &str = "depd";
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 1000;

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `depd.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP listen port (default: 3005).
    port: Option<u16>,
    /// Full Postgres connection URL; takes precedence over the discrete fields.
    database_url: Option<String>,
    db_host: Option<String>,
    db_port: Option<u16>,
    db_name: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
    /// Allowed CORS origins. Empty means same-origin only; `["*"]` allows any.
    cors_origins: Option<Vec<String>>,
    /// Per-IP rate limit window in seconds (default: 900).
    rate_limit_window_secs: Option<u64>,
    /// Per-IP request cap within the window (default: 1000).
    rate_limit_max_requests: Option<u64>,
    /// Log level filter string, e.g. "debug", "info,depd=trace" (default: "info").
    log: Option<String>,
}

fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config file — using defaults");
            None
        }
    }
}

// ─── ServiceConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub log: String,
    /// Full Postgres URL (DEPD_DATABASE_URL). When set, the discrete db_*
    /// fields are ignored.
    pub database_url: Option<String>,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: Option<String>,
    pub cors_origins: Vec<String>,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u64,
}

/// CLI/env overrides forwarded from clap. Everything is optional; the TOML
/// file and built-in defaults fill the gaps.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub log: Option<String>,
    pub config_file: Option<PathBuf>,
}

impl ServiceConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file (`--config`, default `./depd.toml`)
    ///   3. Built-in defaults
    pub fn new(overrides: ConfigOverrides) -> Self {
        let config_path = overrides
            .config_file
            .unwrap_or_else(|| PathBuf::from("depd.toml"));
        let toml = load_toml(&config_path).unwrap_or_default();

        let port = overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = overrides
            .log
            .or(toml.log)
            .unwrap_or_else(|| "info".to_string());

        let database_url = overrides
            .database_url
            .filter(|u| !u.is_empty())
            .or(toml.database_url);

        let db_host = env_or("DEPD_DB_HOST", toml.db_host, DEFAULT_DB_HOST);
        let db_port = std::env::var("DEPD_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .or(toml.db_port)
            .unwrap_or(DEFAULT_DB_PORT);
        let db_name = env_or("DEPD_DB_NAME", toml.db_name, DEFAULT_DB_NAME);
        let db_user = env_or("DEPD_DB_USER", toml.db_user, DEFAULT_DB_USER);
        let db_password = std::env::var("DEPD_DB_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty())
            .or(toml.db_password);

        let cors_origins = std::env::var("DEPD_CORS_ORIGINS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .or(toml.cors_origins)
            .unwrap_or_default();

        let rate_limit_window_secs = std::env::var("DEPD_RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(toml.rate_limit_window_secs)
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);
        let rate_limit_max_requests = std::env::var("DEPD_RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(toml.rate_limit_max_requests)
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS);

        Self {
            port,
            log,
            database_url,
            db_host,
            db_port,
            db_name,
            db_user,
            db_password,
            cors_origins,
            rate_limit_window_secs,
            rate_limit_max_requests,
        }
    }
}

fn env_or(var: &str, toml_value: Option<String>, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .or(toml_value)
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_and_no_overrides() {
        let cfg = ServiceConfig::new(ConfigOverrides {
            config_file: Some(PathBuf::from("/nonexistent/depd.toml")),
            ..Default::default()
        });
        assert_eq!(cfg.port, 3005);
        assert_eq!(cfg.rate_limit_window_secs, 900);
        assert_eq!(cfg.rate_limit_max_requests, 1000);
        assert_eq!(cfg.log, "info");
        assert!(cfg.cors_origins.is_empty());
    }

    #[test]
    fn toml_overrides_defaults_and_cli_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depd.toml");
        std::fs::write(
            &path,
            r#"
port = 4100
log = "debug"
rate_limit_max_requests = 5
cors_origins = ["https://app.example.com"]
"#,
        )
        .unwrap();

        let cfg = ServiceConfig::new(ConfigOverrides {
            config_file: Some(path.clone()),
            ..Default::default()
        });
        assert_eq!(cfg.port, 4100);
        assert_eq!(cfg.log, "debug");
        assert_eq!(cfg.rate_limit_max_requests, 5);
        assert_eq!(cfg.cors_origins, vec!["https://app.example.com"]);

        let cfg = ServiceConfig::new(ConfigOverrides {
            port: Some(3200),
            config_file: Some(path),
            ..Default::default()
        });
        assert_eq!(cfg.port, 3200, "CLI value beats TOML");
        assert_eq!(cfg.log, "debug", "TOML still fills unset fields");
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depd.toml");
        std::fs::write(&path, "port = \"not a number").unwrap();
        let cfg = ServiceConfig::new(ConfigOverrides {
            config_file: Some(path),
            ..Default::default()
        });
        assert_eq!(cfg.port, 3005);
    }
}
