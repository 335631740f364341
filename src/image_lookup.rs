use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use url::{Url, form_urlencoded};

pub const DEFAULT_IMAGE_LOOKUP_URL: &str = "https://source.unsplash.com/512x512/";

const QUERY_WORDS: usize = 3;

static LOOKUP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct ImageLookup {
    base_url: Url,
}

impl ImageLookup {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn parse(base_url: &str) -> Result<Self, url::ParseError> {
        Url::parse(base_url).map(Self::new)
    }

    /// Lookup URL keyed by the first words of `prompt`, with a freshness token
    /// so repeated calls never return the same URL.
    pub fn lookup_url(&self, prompt: &str) -> String {
        let keywords = prompt
            .split_whitespace()
            .take(QUERY_WORDS)
            .collect::<Vec<_>>()
            .join(" ");
        let seq = LOOKUP_SEQ.fetch_add(1, Ordering::Relaxed);
        let token = format!("{}-{seq}", Utc::now().timestamp_millis());
        self.with_query(&keywords, Some(&token))
    }

    pub fn fallback_url(&self, prompt: &str) -> String {
        self.with_query(prompt.trim(), None)
    }

    fn with_query(&self, keywords: &str, token: Option<&str>) -> String {
        let mut query: String = form_urlencoded::byte_serialize(keywords.as_bytes()).collect();
        if let Some(token) = token {
            query.push_str("&t=");
            query.push_str(token);
        }
        let mut url = self.base_url.clone();
        url.set_query(Some(&query));
        url.to_string()
    }
}

pub fn fallback_description(prompt: &str) -> String {
    format!("AI generated concept for: {}", prompt.trim())
}
