use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use wfh_core::config::{AppConfig, LoadOptions};

struct ConfigFile {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl ConfigFile {
    fn detect() -> Self {
        let path = ["wfh.toml", "config/wfh.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists());
        let doc = load_config_file_doc(path.as_deref());
        Self { path, doc }
    }

    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        let source = field_source(key_path, env_keys, self.doc.as_ref(), self.path.as_deref());
        render_line(key_path, value, source)
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let file = ConfigFile::detect();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(file.line("database.url", &config.database.url, &["WFH_DATABASE_URL"]));
    lines.push(file.line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        &["WFH_DATABASE_MAX_CONNECTIONS"],
    ));
    lines.push(file.line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        &["WFH_DATABASE_TIMEOUT_SECS"],
    ));

    lines.push(file.line(
        "server.bind_address",
        &config.server.bind_address,
        &["WFH_SERVER_BIND_ADDRESS"],
    ));
    lines.push(file.line(
        "server.port",
        &config.server.port.to_string(),
        &["WFH_SERVER_PORT", "PORT"],
    ));
    lines.push(file.line(
        "server.request_timeout_secs",
        &config.server.request_timeout_secs.to_string(),
        &["WFH_SERVER_REQUEST_TIMEOUT_SECS"],
    ));
    lines.push(file.line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        &["WFH_SERVER_GRACEFUL_SHUTDOWN_SECS"],
    ));
    lines.push(file.line(
        "server.allowed_origins",
        &config.server.allowed_origins.join(","),
        &["WFH_SERVER_ALLOWED_ORIGINS"],
    ));

    lines.push(file.line(
        "auth.jwt_secret",
        &redact_secret(config.auth.jwt_secret.expose_secret()),
        &["WFH_AUTH_JWT_SECRET"],
    ));
    lines.push(file.line(
        "auth.token_ttl_minutes",
        &config.auth.token_ttl_minutes.to_string(),
        &["WFH_AUTH_TOKEN_TTL_MINUTES"],
    ));

    lines.push(file.line(
        "logging.level",
        &config.logging.level,
        &["WFH_LOGGING_LEVEL", "WFH_LOG_LEVEL"],
    ));
    lines.push(file.line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        &["WFH_LOGGING_FORMAT", "WFH_LOG_FORMAT"],
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Shows only enough of a secret to tell two configured values apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(2).collect();
    format!("{prefix}***<redacted {} chars>", trimmed.chars().count())
}
