use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::generation::handlers::MAX_CANDIDATES;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub unsplash_access_key: String,
    /// Directory of reference templates. `None` generates without templates.
    pub template_dir: Option<PathBuf>,
    pub weasyprint_bin: PathBuf,
    pub candidate_count: usize,
    pub images_per_keyword: u32,
    pub run_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let candidate_count = check_candidate_count(parse_env("CANDIDATE_COUNT", 3usize)?)?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            unsplash_access_key: require_env("UNSPLASH_ACCESS_KEY")?,
            template_dir: std::env::var("TEMPLATE_DIR").ok().map(PathBuf::from),
            weasyprint_bin: std::env::var("WEASYPRINT_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("weasyprint")),
            candidate_count,
            images_per_keyword: parse_env("IMAGES_PER_KEYWORD", 5u32)?,
            run_timeout_secs: parse_env("RUN_TIMEOUT_SECS", 300u64)?,
            port: parse_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// The default must be a count every request could also ask for.
fn check_candidate_count(count: usize) -> Result<usize> {
    if !(1..=MAX_CANDIDATES).contains(&count) {
        anyhow::bail!("CANDIDATE_COUNT must be between 1 and {MAX_CANDIDATES}, got {count}");
    }
    Ok(count)
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
