// Feed aggregation
// fetch -> decode -> normalize per feed; all feeds run concurrently and every
// pipeline settles on its own before results are merged.

use crate::config::FeedRegistry;
use crate::decoder;
use crate::error::{FeedError, Result};
use crate::fetcher::FeedSource;
use crate::models::{
    AggregateResponse, FeedFailure, FeedFetchResult, FeedSnapshot, ProbeReport,
    format_feed_timestamp, now_rfc3339,
};
use crate::normalizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

pub struct FeedAggregator {
    registry: Arc<FeedRegistry>,
    source: Arc<dyn FeedSource>,
    feed_timeout: Duration,
}

impl FeedAggregator {
    pub fn new(
        registry: Arc<FeedRegistry>,
        source: Arc<dyn FeedSource>,
        feed_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            feed_timeout,
        }
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    /// Runs one feed's pipeline. Unknown identifiers fail before any request is made.
    pub async fn aggregate_one(&self, feed_id: &str) -> Result<FeedSnapshot> {
        let url = self
            .registry
            .url_for(feed_id)
            .ok_or_else(|| FeedError::NotFound(feed_id.to_string()))?;

        run_pipeline(self.source.as_ref(), feed_id, url, self.feed_timeout).await
    }

    pub async fn aggregate_all(&self) -> AggregateResponse {
        let ids = self.registry.ids();
        self.aggregate(&ids).await
    }

    /// Fans out one task per feed and waits for all of them; results keep `feed_ids` order.
    ///
    /// Tasks live in a `JoinSet`, so dropping the returned future aborts every
    /// in-flight fetch.
    pub async fn aggregate(&self, feed_ids: &[String]) -> AggregateResponse {
        tracing::info!(feeds = feed_ids.len(), "Starting to fetch feeds");

        let mut slots: Vec<Option<Result<FeedSnapshot>>> = Vec::with_capacity(feed_ids.len());
        let mut tasks = JoinSet::new();

        for (index, feed_id) in feed_ids.iter().enumerate() {
            let Some(url) = self.registry.url_for(feed_id) else {
                slots.push(Some(Err(FeedError::NotFound(feed_id.clone()))));
                continue;
            };
            slots.push(None);

            let source = Arc::clone(&self.source);
            let url = url.to_string();
            let id = feed_id.clone();
            let timeout = self.feed_timeout;

            tasks.spawn(async move {
                (index, run_pipeline(source.as_ref(), &id, &url, timeout).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                // The slot stays empty and is reported below.
                Err(e) => tracing::error!(error = %e, "Feed task did not complete"),
            }
        }

        let results: Vec<FeedFetchResult> = feed_ids
            .iter()
            .zip(slots)
            .map(|(feed_id, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    Err(FeedError::Join("feed task panicked".to_string()))
                });
                outcome.map_err(|e| {
                    tracing::error!(
                        feed = %feed_id,
                        stage = e.stage(),
                        error = %e,
                        "Feed failed"
                    );
                    FeedFailure::from_error(feed_id.clone(), &e)
                })
            })
            .collect();

        let response = AggregateResponse::from_results(results);
        tracing::info!(
            successful = response.feeds.len(),
            failed = response.errors.len(),
            total_events = response.total_events,
            "Feeds summary"
        );
        response
    }

    /// Fetches and decodes one feed without normalizing it.
    pub async fn probe(&self, feed_id: &str, timeout: Duration) -> Result<ProbeReport> {
        let url = self
            .registry
            .url_for(feed_id)
            .ok_or_else(|| FeedError::NotFound(feed_id.to_string()))?;

        tracing::info!(feed = feed_id, url, "Testing upstream connectivity");

        let fetched = self.source.fetch(url, timeout).await?;
        let feed = decoder::decode(&fetched.body)?;

        Ok(ProbeReport {
            status: "success".to_string(),
            feed_id: feed_id.to_string(),
            response_status: fetched.status,
            buffer_size: fetched.body.len(),
            entity_count: feed.entity.len(),
            feed_timestamp: feed.header.timestamp.map(format_feed_timestamp),
            timestamp: now_rfc3339(),
        })
    }
}

async fn run_pipeline(
    source: &dyn FeedSource,
    feed_id: &str,
    url: &str,
    timeout: Duration,
) -> Result<FeedSnapshot> {
    let fetched = source.fetch(url, timeout).await?;
    let feed = decoder::decode(&fetched.body)?;
    let (events, stats) = normalizer::normalize_with_stats(&feed);

    tracing::info!(
        feed = feed_id,
        bytes = fetched.body.len(),
        entities = stats.entities_seen,
        skipped_entities = stats.entities_skipped,
        skipped_updates = stats.updates_skipped,
        events = events.len(),
        "Processed feed"
    );

    Ok(FeedSnapshot::new(feed_id.to_string(), events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedEntry;
    use crate::error::FetchError;
    use crate::fetcher::FetchedFeed;
    use async_trait::async_trait;
    use bytes::Bytes;
    use gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
    use gtfs_rt::{FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate};
    use prost::Message;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    enum Canned {
        Feed(Vec<u8>),
        Fail(FetchError),
        Panic,
    }

    /// In-memory source keyed by URL; records every URL it was asked for.
    struct StubSource {
        responses: HashMap<String, Canned>,
        calls: Mutex<Vec<String>>,
    }

    impl StubSource {
        fn new(responses: Vec<(&str, Canned)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(url, canned)| (url.to_string(), canned))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FeedSource for StubSource {
        async fn fetch(
            &self,
            url: &str,
            timeout: Duration,
        ) -> std::result::Result<FetchedFeed, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.responses.get(url) {
                Some(Canned::Feed(bytes)) => Ok(FetchedFeed {
                    status: 200,
                    body: Bytes::from(bytes.clone()),
                }),
                Some(Canned::Fail(e)) => Err(e.clone()),
                Some(Canned::Panic) => panic!("stub source blew up"),
                None => Err(FetchError::Timeout {
                    url: url.to_string(),
                    after: timeout,
                }),
            }
        }
    }

    /// Waits before answering every request with the same payload.
    struct SlowSource {
        delay: Duration,
        body: Vec<u8>,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl FeedSource for SlowSource {
        async fn fetch(
            &self,
            _url: &str,
            _timeout: Duration,
        ) -> std::result::Result<FetchedFeed, FetchError> {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedFeed {
                status: 200,
                body: Bytes::from(self.body.clone()),
            })
        }
    }

    fn slow_source(delay: Duration) -> Arc<SlowSource> {
        Arc::new(SlowSource {
            delay,
            body: encoded_feed("L", &[("L08N", 300)]),
            completed: AtomicUsize::new(0),
        })
    }

    fn encoded_feed(route_id: &str, stops: &[(&str, i64)]) -> Vec<u8> {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1_700_000_000),
                ..Default::default()
            },
            entity: vec![FeedEntity {
                id: format!("{}-trip", route_id),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        route_id: Some(route_id.to_string()),
                        trip_id: Some(format!("{}_T1", route_id)),
                        ..Default::default()
                    },
                    stop_time_update: stops
                        .iter()
                        .map(|(stop_id, time)| StopTimeUpdate {
                            stop_id: Some(stop_id.to_string()),
                            arrival: Some(StopTimeEvent {
                                time: Some(*time),
                                ..Default::default()
                            }),
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        feed.encode_to_vec()
    }

    fn registry(ids: &[&str]) -> Arc<FeedRegistry> {
        let entries = ids
            .iter()
            .map(|id| FeedEntry {
                feed_id: id.to_string(),
                url: format!("http://feeds.test/{}", id),
            })
            .collect();
        Arc::new(FeedRegistry::new(entries).unwrap())
    }

    fn aggregator(ids: &[&str], source: Arc<StubSource>) -> FeedAggregator {
        FeedAggregator::new(registry(ids), source, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_feeds() {
        let source = Arc::new(StubSource::new(vec![
            (
                "http://feeds.test/ace",
                Canned::Feed(encoded_feed("A", &[("A27N", 100), ("A28N", 200)])),
            ),
            (
                "http://feeds.test/g",
                Canned::Fail(FetchError::HttpStatus {
                    url: "http://feeds.test/g".to_string(),
                    code: 503,
                }),
            ),
            ("http://feeds.test/l", Canned::Feed(encoded_feed("L", &[("L08N", 300)]))),
        ]));

        let response = aggregator(&["ace", "g", "l"], source).aggregate_all().await;

        let ids: Vec<&str> = response.feeds.iter().map(|f| f.feed_id.as_str()).collect();
        assert_eq!(ids, vec!["ace", "l"]);
        assert_eq!(response.total_events, 3);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].feed_id, "g");
        assert_eq!(response.errors[0].stage, "fetch");
        assert_eq!(response.errors[0].status, Some(503));
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported_per_feed() {
        let source = Arc::new(StubSource::new(vec![
            ("http://feeds.test/ace", Canned::Feed(vec![0xFF, 0xFE, 0x00, 0x01])),
            ("http://feeds.test/l", Canned::Feed(encoded_feed("L", &[("L08N", 300)]))),
        ]));

        let response = aggregator(&["ace", "l"], source).aggregate_all().await;

        assert_eq!(response.feeds.len(), 1);
        assert_eq!(response.errors[0].feed_id, "ace");
        assert_eq!(response.errors[0].stage, "decode");
    }

    #[tokio::test]
    async fn test_timeout_feed_only_in_errors() {
        // No canned response for "si": the stub answers with a timeout.
        let source = Arc::new(StubSource::new(vec![(
            "http://feeds.test/l",
            Canned::Feed(encoded_feed("L", &[("L08N", 300)])),
        )]));

        let response = aggregator(&["l", "si"], source).aggregate_all().await;

        assert!(response.feeds.iter().all(|f| f.feed_id != "si"));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].feed_id, "si");
        assert!(response.errors[0].details.starts_with("Timed out"));
    }

    #[tokio::test]
    async fn test_panicking_pipeline_does_not_affect_siblings() {
        let source = Arc::new(StubSource::new(vec![
            ("http://feeds.test/ace", Canned::Panic),
            ("http://feeds.test/l", Canned::Feed(encoded_feed("L", &[("L08N", 300)]))),
        ]));

        let response = aggregator(&["ace", "l"], source).aggregate_all().await;

        assert_eq!(response.feeds.len(), 1);
        assert_eq!(response.feeds[0].feed_id, "l");
        assert_eq!(response.errors[0].feed_id, "ace");
        assert_eq!(response.errors[0].stage, "internal");
    }

    #[tokio::test]
    async fn test_unknown_feed_fails_without_network_call() {
        let source = Arc::new(StubSource::new(vec![]));
        let agg = aggregator(&["l"], Arc::clone(&source));

        let err = agg.aggregate_one("zzz").await.unwrap_err();
        assert_eq!(err, FeedError::NotFound("zzz".to_string()));

        let response = agg.aggregate(&["zzz".to_string()]).await;
        assert_eq!(response.errors[0].stage, "lookup");

        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_one_returns_snapshot() {
        let source = Arc::new(StubSource::new(vec![(
            "http://feeds.test/l",
            Canned::Feed(encoded_feed("L", &[("L08N", 300), ("L10N", 400)])),
        )]));

        let snapshot = aggregator(&["l"], source).aggregate_one("l").await.unwrap();
        assert_eq!(snapshot.feed_id, "l");
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.data[1].arrival, Some(400_000));
    }

    #[tokio::test]
    async fn test_probe_reports_sizes() {
        let bytes = encoded_feed("A", &[("A27N", 100)]);
        let len = bytes.len();
        let source = Arc::new(StubSource::new(vec![(
            "http://feeds.test/ace",
            Canned::Feed(bytes),
        )]));

        let report = aggregator(&["ace"], source)
            .probe("ace", Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(report.status, "success");
        assert_eq!(report.response_status, 200);
        assert_eq!(report.buffer_size, len);
        assert_eq!(report.entity_count, 1);
        assert_eq!(report.feed_timestamp.as_deref(), Some("2023-11-14 17:13:20 EST"));
    }

    #[tokio::test]
    async fn test_feeds_are_fetched_concurrently() {
        let delay = Duration::from_millis(300);
        let source = slow_source(delay);
        let agg = FeedAggregator::new(
            registry(&["ace", "g", "l", "si"]),
            Arc::clone(&source) as Arc<dyn FeedSource>,
            Duration::from_secs(5),
        );

        let started = Instant::now();
        let response = agg.aggregate_all().await;
        let elapsed = started.elapsed();

        assert_eq!(response.feeds.len(), 4);
        assert!(response.errors.is_empty());
        assert!(
            elapsed < delay * 4 / 2,
            "four 300ms fetches took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_results_follow_requested_order() {
        let source = slow_source(Duration::from_millis(20));
        let agg = FeedAggregator::new(
            registry(&["ace", "g", "l", "si"]),
            source,
            Duration::from_secs(5),
        );

        let requested: Vec<String> = ["si", "zzz", "ace", "l"]
            .iter()
            .map(|id| id.to_string())
            .collect();
        let response = agg.aggregate(&requested).await;

        let ids: Vec<&str> = response.feeds.iter().map(|f| f.feed_id.as_str()).collect();
        assert_eq!(ids, vec!["si", "ace", "l"]);
        assert_eq!(response.errors[0].feed_id, "zzz");
    }

    #[tokio::test]
    async fn test_dropping_aggregate_aborts_fetches() {
        let source = slow_source(Duration::from_millis(200));
        let agg = FeedAggregator::new(
            registry(&["ace", "l"]),
            Arc::clone(&source) as Arc<dyn FeedSource>,
            Duration::from_secs(5),
        );

        let cut_short = tokio::time::timeout(Duration::from_millis(20), agg.aggregate_all()).await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(source.completed.load(Ordering::SeqCst), 0);
    }
}
