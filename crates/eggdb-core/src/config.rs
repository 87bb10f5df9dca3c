use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Default user agent for store page fetches. Several grocery storefronts
/// serve an empty shell to non-browser agents.
pub const DEFAULT_SCRAPER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("EGGDB_ENV", "development"))?;

    let bind_addr = parse_addr("EGGDB_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("EGGDB_LOG_LEVEL", "info");
    let catalog_path = PathBuf::from(or_default("EGGDB_CATALOG_PATH", "./config/catalog.yaml"));

    let db_max_connections = parse_u32("EGGDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("EGGDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("EGGDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_request_timeout_ms = parse_u64("EGGDB_SCRAPER_REQUEST_TIMEOUT_MS", "30000")?;
    let scraper_user_agent = or_default("EGGDB_SCRAPER_USER_AGENT", DEFAULT_SCRAPER_USER_AGENT);
    let scraper_max_retries = parse_u32("EGGDB_SCRAPER_MAX_RETRIES", "3")?;
    let scraper_retry_backoff_base_ms = parse_u64("EGGDB_SCRAPER_RETRY_BACKOFF_BASE_MS", "1000")?;
    let scraper_max_concurrent_locations =
        parse_usize("EGGDB_SCRAPER_MAX_CONCURRENT_LOCATIONS", "1")?;
    if scraper_max_concurrent_locations == 0 {
        return Err(invalid(
            "EGGDB_SCRAPER_MAX_CONCURRENT_LOCATIONS",
            "must be at least 1".to_string(),
        ));
    }
    let scraper_inter_request_delay_ms = parse_u64("EGGDB_SCRAPER_INTER_REQUEST_DELAY_MS", "250")?;

    let crawler_url = optional("EGGDB_CRAWLER_URL");
    let crawler_token = optional("EGGDB_CRAWLER_TOKEN");

    let sample_size = parse_usize("EGGDB_SAMPLE_SIZE", "50")?;
    if sample_size == 0 {
        return Err(invalid("EGGDB_SAMPLE_SIZE", "must be at least 1".to_string()));
    }
    let sample_cron = or_default("EGGDB_SAMPLE_CRON", "0 0 14 * * *");
    let full_cron = or_default("EGGDB_FULL_CRON", "0 0 9 * * SUN");
    let scheduler_enabled = parse_bool("EGGDB_SCHEDULER_ENABLED", "true")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_ms,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        scraper_max_concurrent_locations,
        scraper_inter_request_delay_ms,
        crawler_url,
        crawler_token,
        sample_size,
        sample_cron,
        full_cron,
        scheduler_enabled,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "EGGDB_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
