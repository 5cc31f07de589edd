// Trip update normalization
// Entities and stop-time updates are visited in feed order; anything incomplete
// is skipped on its own, so one bad record never drops the rest of the batch.

use crate::models::NormalizedEvent;
use gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
use gtfs_rt::{FeedEntity, FeedMessage};

/// Why a record was left out of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationSkip {
    NoTripUpdate,
    NoRouteId,
    NoStopId,
    NoEventTime,
    TimeOutOfRange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub entities_seen: usize,
    pub entities_skipped: usize,
    pub updates_seen: usize,
    pub updates_skipped: usize,
}

pub fn normalize(feed: &FeedMessage) -> Vec<NormalizedEvent> {
    normalize_with_stats(feed).0
}

pub fn normalize_with_stats(feed: &FeedMessage) -> (Vec<NormalizedEvent>, NormalizeStats) {
    let mut events = Vec::new();
    let mut stats = NormalizeStats::default();

    for (index, entity) in feed.entity.iter().enumerate() {
        stats.entities_seen += 1;

        let (trip_id, route_id, updates) = match trip_context(entity, index) {
            Ok(ctx) => ctx,
            Err(reason) => {
                tracing::trace!(entity = %entity.id, index, ?reason, "Skipping entity");
                stats.entities_skipped += 1;
                continue;
            }
        };

        for update in updates {
            stats.updates_seen += 1;

            match normalize_stop_update(&trip_id, route_id, update) {
                Ok(event) => events.push(event),
                Err(reason) => {
                    tracing::trace!(entity = %entity.id, ?reason, "Skipping stop time update");
                    stats.updates_skipped += 1;
                }
            }
        }
    }

    (events, stats)
}

fn trip_context(
    entity: &FeedEntity,
    index: usize,
) -> Result<(String, &str, &[StopTimeUpdate]), NormalizationSkip> {
    let trip_update = entity
        .trip_update
        .as_ref()
        .ok_or(NormalizationSkip::NoTripUpdate)?;

    let route_id = non_empty(trip_update.trip.route_id.as_deref())
        .ok_or(NormalizationSkip::NoRouteId)?;

    let trip_id = non_empty(trip_update.trip.trip_id.as_deref())
        .map(String::from)
        .unwrap_or_else(|| format!("unknown_{}", index));

    Ok((trip_id, route_id, trip_update.stop_time_update.as_slice()))
}

fn normalize_stop_update(
    trip_id: &str,
    route_id: &str,
    update: &StopTimeUpdate,
) -> Result<NormalizedEvent, NormalizationSkip> {
    let stop_id = non_empty(update.stop_id.as_deref()).ok_or(NormalizationSkip::NoStopId)?;

    let arrival = timed_event(update.arrival.as_ref());
    let departure = timed_event(update.departure.as_ref());

    if arrival.is_none() && departure.is_none() {
        return Err(NormalizationSkip::NoEventTime);
    }

    let arrival_ms = arrival.map(|(time, _)| to_millis(time)).transpose()?;
    let departure_ms = departure.map(|(time, _)| to_millis(time)).transpose()?;

    let delay = arrival
        .and_then(|(_, delay)| delay)
        .or_else(|| departure.and_then(|(_, delay)| delay))
        .unwrap_or(0);

    Ok(NormalizedEvent {
        trip_id: trip_id.to_string(),
        route_id: route_id.to_string(),
        stop_id: stop_id.to_string(),
        arrival: arrival_ms,
        departure: departure_ms,
        delay,
    })
}

/// `(time, delay)` for an event that carries a usable time; a zero time counts as absent.
fn timed_event(event: Option<&StopTimeEvent>) -> Option<(i64, Option<i32>)> {
    let event = event?;
    match event.time {
        Some(time) if time != 0 => Some((time, event.delay)),
        _ => None,
    }
}

fn to_millis(seconds: i64) -> Result<i64, NormalizationSkip> {
    seconds
        .checked_mul(1000)
        .ok_or(NormalizationSkip::TimeOutOfRange)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
