// API models served to the map client
// JSON field names are camelCase to match what the front-end consumes.

use crate::error::FeedError;
use chrono::{SecondsFormat, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Data Structures
// ============================================================================

/// One predicted arrival/departure of a trip at a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub trip_id: String,
    pub route_id: String,
    pub stop_id: String,
    /// Epoch milliseconds
    pub arrival: Option<i64>,
    /// Epoch milliseconds
    pub departure: Option<i64>,
    /// Seconds
    pub delay: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub feed_id: String,
    pub data: Vec<NormalizedEvent>,
    pub timestamp: String,
    pub count: usize,
}

impl FeedSnapshot {
    pub fn new(feed_id: String, data: Vec<NormalizedEvent>) -> Self {
        let count = data.len();
        FeedSnapshot {
            feed_id,
            data,
            timestamp: now_rfc3339(),
            count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFailure {
    pub feed_id: String,
    pub error: bool,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub details: String,
}

impl FeedFailure {
    pub fn from_error(feed_id: String, err: &FeedError) -> Self {
        FeedFailure {
            feed_id,
            error: true,
            stage: err.stage().to_string(),
            status: err.upstream_status(),
            details: err.to_string(),
        }
    }
}

/// Outcome of one feed pipeline.
pub type FeedFetchResult = std::result::Result<FeedSnapshot, FeedFailure>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub feeds: Vec<FeedSnapshot>,
    #[serde(rename = "totalTrains")]
    pub total_events: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FeedFailure>,
    pub timestamp: String,
}

impl AggregateResponse {
    /// Splits settled results into successes and failures, keeping input order.
    pub fn from_results(results: Vec<FeedFetchResult>) -> Self {
        let mut feeds = Vec::new();
        let mut errors = Vec::new();

        for result in results {
            match result {
                Ok(snapshot) => feeds.push(snapshot),
                Err(failure) => errors.push(failure),
            }
        }

        let total_events = feeds.iter().map(|f| f.count).sum();

        AggregateResponse {
            feeds,
            total_events,
            errors,
            timestamp: now_rfc3339(),
        }
    }
}

impl AggregateResponse {
    /// Distinct route identifiers across the successful feeds, sorted.
    pub fn route_ids(&self) -> Vec<String> {
        let routes: BTreeSet<&str> = self
            .feeds
            .iter()
            .flat_map(|f| f.data.iter().map(|e| e.route_id.as_str()))
            .collect();

        routes.into_iter().map(str::to_string).collect()
    }

    /// Events for one route in feed order; the route is matched case-insensitively.
    pub fn events_for_route(&self, route_id: &str) -> Vec<NormalizedEvent> {
        self.feeds
            .iter()
            .flat_map(|f| f.data.iter())
            .filter(|e| e.route_id.eq_ignore_ascii_case(route_id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteListing {
    pub data: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FeedFailure>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEvents {
    pub route_id: String,
    pub data: Vec<NormalizedEvent>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FeedFailure>,
    pub timestamp: String,
}

/// Connectivity check result: transfer and decode only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub status: String,
    pub feed_id: String,
    pub response_status: u16,
    pub buffer_size: usize,
    pub entity_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_timestamp: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedListing {
    pub feed_id: String,
    pub url: String,
}

// ============================================================================
// Timestamps
// ============================================================================

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Formats an epoch-seconds feed timestamp in New York local time.
pub fn format_feed_timestamp(timestamp: u64) -> String {
    match i64::try_from(timestamp)
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    {
        Some(dt) => dt
            .with_timezone(&New_York)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string(),
        None => format!("Invalid timestamp: {}", timestamp),
    }
}
