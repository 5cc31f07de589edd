// Static configuration: feed identifier -> upstream URL registry and server settings
// MTA subway GTFS-RT feeds: https://api.mta.info/#/subwayRealTimeFeeds
//
// The registry is built once at startup and shared read-only for the process lifetime.

use crate::error::{FeedError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const MTA_FEED_BASE_URL: &str =
    "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs";

/// Built-in feeds as (identifier, URL suffix).
const MTA_FEEDS: &[(&str, &str)] = &[
    ("1234567", ""),
    ("ace", "-ace"),
    ("bdfm", "-bdfm"),
    ("g", "-g"),
    ("jz", "-jz"),
    ("l", "-l"),
    ("nqrw", "-nqrw"),
    ("si", "-si"),
];

// ============================================================================
// Feed Registry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedEntry {
    pub feed_id: String,
    pub url: String,
}

/// Ordered, immutable mapping of feed identifiers to upstream URLs.
#[derive(Debug, Clone)]
pub struct FeedRegistry {
    entries: Vec<FeedEntry>,
}

impl FeedRegistry {
    pub fn new(entries: Vec<FeedEntry>) -> Result<Self> {
        let registry = Self { entries };
        if registry.is_empty() {
            return Err(FeedError::Config("feed registry is empty".to_string()));
        }

        let entries = registry.entries();

        for (i, entry) in entries.iter().enumerate() {
            if entry.feed_id.trim().is_empty() {
                return Err(FeedError::Config(format!("feed #{} has a blank identifier", i + 1)));
            }
            if !(entry.url.starts_with("http://") || entry.url.starts_with("https://")) {
                return Err(FeedError::Config(format!(
                    "feed '{}' has an invalid URL: '{}'",
                    entry.feed_id, entry.url
                )));
            }
            if entries[..i].iter().any(|e| e.feed_id == entry.feed_id) {
                return Err(FeedError::Config(format!(
                    "feed '{}' is configured more than once",
                    entry.feed_id
                )));
            }
        }

        Ok(registry)
    }

    pub fn mta_default() -> Self {
        let entries = MTA_FEEDS
            .iter()
            .map(|(id, suffix)| FeedEntry {
                feed_id: id.to_string(),
                url: format!("{}{}", MTA_FEED_BASE_URL, suffix),
            })
            .collect();

        Self { entries }
    }

    /// Reads a `feed_id,url` CSV with a header row.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut entries = Vec::new();
        for record in rdr.deserialize::<FeedEntry>() {
            let entry = record
                .map_err(|e| FeedError::Config(format!("Failed to parse feeds CSV: {}", e)))?;
            entries.push(entry);
        }

        Self::new(entries)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            FeedError::Config(format!("Failed to open feeds file {}: {}", path.display(), e))
        })?;
        Self::from_csv_reader(file)
    }

    pub fn url_for(&self, feed_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.feed_id == feed_id)
            .map(|e| e.url.as_str())
    }

    pub fn contains(&self, feed_id: &str) -> bool {
        self.url_for(feed_id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.feed_id.clone()).collect()
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Server Settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub feed_timeout: Duration,
    pub probe_timeout: Duration,
    pub probe_feed: String,
    pub user_agent: String,
    pub registry: FeedRegistry,
}

impl AppConfig {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_FEED_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
    pub const DEFAULT_PROBE_FEED: &'static str = "ace";
    pub const DEFAULT_USER_AGENT: &'static str = "SubwayMap/1.0";

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_var(&lookup, "PORT", Self::DEFAULT_PORT)?;

        let feed_timeout_ms = parse_var(&lookup, "FEED_TIMEOUT_MS", Self::DEFAULT_FEED_TIMEOUT_MS)?;
        let probe_timeout_ms =
            parse_var(&lookup, "PROBE_TIMEOUT_MS", Self::DEFAULT_PROBE_TIMEOUT_MS)?;
        if feed_timeout_ms == 0 || probe_timeout_ms == 0 {
            return Err(FeedError::Config("timeouts must be greater than zero".to_string()));
        }

        let registry = match lookup("FEEDS_FILE") {
            Some(path) if !path.trim().is_empty() => FeedRegistry::from_csv_path(path.trim())?,
            _ => FeedRegistry::mta_default(),
        };

        let probe_feed =
            lookup("PROBE_FEED").unwrap_or_else(|| Self::DEFAULT_PROBE_FEED.to_string());
        if !registry.contains(&probe_feed) {
            return Err(FeedError::Config(format!(
                "PROBE_FEED '{}' is not a configured feed",
                probe_feed
            )));
        }

        let user_agent =
            lookup("USER_AGENT").unwrap_or_else(|| Self::DEFAULT_USER_AGENT.to_string());

        Ok(Self {
            host,
            port,
            feed_timeout: Duration::from_millis(feed_timeout_ms),
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            probe_feed,
            user_agent,
            registry,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FeedError::Config(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
