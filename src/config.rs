use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::gemini::DEFAULT_GEMINI_BASE_URL;
use crate::image_lookup::DEFAULT_IMAGE_LOOKUP_URL;
use crate::pipeline::DEFAULT_GENERATION_TIMEOUT;

const DEFAULT_PORT: u16 = 5000;

#[derive(Clone, Debug)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub image_lookup_url: String,
    pub bind_address: String,
    pub cache_dir: PathBuf,
    pub cache_base_url: String,
    pub generation_timeout: Duration,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let gemini_api_key =
            var("GEMINI_API_KEY").ok_or_else(|| anyhow!("missing GEMINI_API_KEY"))?;
        let port = match var("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid PORT: {raw}"))?,
            None => DEFAULT_PORT,
        };
        let bind_address = format!("0.0.0.0:{port}");
        let generation_timeout = match var("GENERATION_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid GENERATION_TIMEOUT_SECS: {raw}"))?,
            ),
            None => DEFAULT_GENERATION_TIMEOUT,
        };
        let cache_dir = var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);
        let cache_base_url =
            resolve_cache_base_url(var("CACHE_URL"), var("DOMAIN"), &bind_address);

        Ok(Self {
            gemini_api_key,
            gemini_base_url: var("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            image_lookup_url: var("IMAGE_LOOKUP_URL")
                .unwrap_or_else(|| DEFAULT_IMAGE_LOOKUP_URL.to_string()),
            bind_address,
            cache_dir,
            cache_base_url,
            generation_timeout,
        })
    }
}

fn default_cache_dir() -> PathBuf {
    let mut base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("virality-compare");
    base
}

fn resolve_cache_base_url(
    cache_url: Option<String>,
    domain: Option<String>,
    bind_address: &str,
) -> String {
    if let Some(cache_url) = cache_url {
        return format!("{}/cache", cache_url.trim().trim_end_matches('/'));
    }
    let raw_domain = domain.unwrap_or_else(|| bind_address.to_string());
    let trimmed = raw_domain.trim().trim_end_matches('/');
    // Strip any stacked schemes and keep the innermost one.
    let mut scheme = "http";
    let mut host = trimmed;
    loop {
        if let Some(rest) = host.strip_prefix("https://") {
            scheme = "https";
            host = rest;
        } else if let Some(rest) = host.strip_prefix("http://") {
            scheme = "http";
            host = rest;
        } else {
            break;
        }
    }
    format!("{scheme}://{host}/cache")
}
