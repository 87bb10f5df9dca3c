use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub catalog_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Per-request timeout for store page fetches, in milliseconds.
    pub scraper_request_timeout_ms: u64,
    pub scraper_user_agent: String,
    /// Additional attempts after the first failed fetch.
    pub scraper_max_retries: u32,
    /// Base delay for exponential backoff: `base * 2^attempt` milliseconds.
    pub scraper_retry_backoff_base_ms: u64,
    pub scraper_max_concurrent_locations: usize,
    pub scraper_inter_request_delay_ms: u64,
    /// Base URL of the upstream crawling service. `None` means direct HTTP fetches.
    pub crawler_url: Option<String>,
    pub crawler_token: Option<String>,
    /// Number of catalog locations visited by a `sample` run.
    pub sample_size: usize,
    pub sample_cron: String,
    pub full_cron: String,
    pub scheduler_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("catalog_path", &self.catalog_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "scraper_request_timeout_ms",
                &self.scraper_request_timeout_ms,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_ms",
                &self.scraper_retry_backoff_base_ms,
            )
            .field(
                "scraper_max_concurrent_locations",
                &self.scraper_max_concurrent_locations,
            )
            .field(
                "scraper_inter_request_delay_ms",
                &self.scraper_inter_request_delay_ms,
            )
            .field("crawler_url", &self.crawler_url)
            .field(
                "crawler_token",
                &self.crawler_token.as_ref().map(|_| "[redacted]"),
            )
            .field("sample_size", &self.sample_size)
            .field("sample_cron", &self.sample_cron)
            .field("full_cron", &self.full_cron)
            .field("scheduler_enabled", &self.scheduler_enabled)
            .finish()
    }
}
