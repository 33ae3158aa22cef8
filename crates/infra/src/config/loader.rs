//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Read `.env` from the working directory, when present
//! 2. If `TOKENLINK_CLIENT_ID` is set, build the configuration from
//!    `TOKENLINK_*` variables
//! 3. Otherwise probe for a config file (TOML or JSON, by extension)
//!
//! Every path ends in [`LinkConfig::validate`].
//!
//! ## Environment Variables
//! - `TOKENLINK_CLIENT_ID`, `TOKENLINK_CLIENT_SECRET`,
//!   `TOKENLINK_REDIRECT_URI`, `TOKENLINK_INSTALLATION_SECRET`: required
//! - `TOKENLINK_SCOPES`: space or comma separated
//! - `TOKENLINK_REGION`: `na`, `eu` or `fe`
//! - `TOKENLINK_STORE_PATH`: encrypted blob location
//! - `TOKENLINK_LOG_LEVEL`, `TOKENLINK_LOG_JSON`: tracing bootstrap
//!
//! ## File Locations
//! `tokenlink.toml`, `tokenlink.json`, `config.toml`, `config.json` in the
//! working directory, then the same names next to the executable.

use std::path::{Path, PathBuf};

use tokenlink_domain::{DomainError, LinkConfig, Region, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["tokenlink.toml", "tokenlink.json", "config.toml", "config.json"];

/// Load configuration with the environment-then-file strategy.
///
/// # Errors
/// Returns `DomainError::Config` when no source is found, a source cannot be
/// parsed, or the result fails validation.
pub fn load() -> Result<LinkConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }

    if std::env::var_os("TOKENLINK_CLIENT_ID").is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    tracing::debug!("TOKENLINK_CLIENT_ID not set, probing for a config file");
    load_from_file(None)
}

/// Load configuration from `TOKENLINK_*` environment variables.
///
/// # Errors
/// Returns `DomainError::Config` if a required variable is missing or a
/// value is invalid.
pub fn load_from_env() -> Result<LinkConfig> {
    let mut config = LinkConfig::new(
        env_var("TOKENLINK_CLIENT_ID")?,
        env_var("TOKENLINK_CLIENT_SECRET")?,
        env_var("TOKENLINK_REDIRECT_URI")?,
        env_var("TOKENLINK_INSTALLATION_SECRET")?,
    );

    if let Ok(scopes) = std::env::var("TOKENLINK_SCOPES") {
        config.scopes = parse_scopes(&scopes);
    }
    if let Ok(region) = std::env::var("TOKENLINK_REGION") {
        config.region = region.parse::<Region>()?;
    }
    if let Ok(path) = std::env::var("TOKENLINK_STORE_PATH") {
        config.store_path = PathBuf::from(path);
    }
    if let Ok(level) = std::env::var("TOKENLINK_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("TOKENLINK_LOG_JSON", config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file.
///
/// If `path` is `None`, the first file found by [`probe_config_paths`] is
/// used.
///
/// # Errors
/// Returns `DomainError::Config` if the file is missing or unreadable, the
/// format is unsupported or invalid, or validation fails.
pub fn load_from_file(path: Option<PathBuf>) -> Result<LinkConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(DomainError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            DomainError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| DomainError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse by file extension (`.toml` or `.json`).
fn parse_config(contents: &str, path: &Path) -> Result<LinkConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| DomainError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| DomainError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(DomainError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the working directory, then beside the
/// executable.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }
    first_existing(&dirs)
}

fn first_existing(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn parse_scopes(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| DomainError::Config(format!("Missing required environment variable: {key}")))
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
