// HTTP surface: feed API under /api/mta, health check, and the embedded map client

use actix_web::{HttpResponse, web};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::aggregator::FeedAggregator;
use crate::error::FeedError;
use crate::models::{FeedListing, RouteEvents, RouteListing, now_rfc3339};

// Embed static files at compile time
const INDEX_HTML: &str = include_str!("../static/index.html");
const MAP_JS: &str = include_str!("../static/subway-map.js");

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<FeedAggregator>,
    pub probe_feed: String,
    pub probe_timeout: Duration,
    pub started_at: Instant,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedErrorBody {
    error: String,
    details: String,
    feed_id: String,
    timestamp: String,
}

impl FeedErrorBody {
    fn from_error(feed_id: String, err: &FeedError) -> Self {
        let error = match err {
            FeedError::NotFound(_) => "Feed not found",
            _ => "Failed to fetch feed data",
        };

        FeedErrorBody {
            error: error.to_string(),
            details: err.to_string(),
            feed_id,
            timestamp: now_rfc3339(),
        }
    }
}

// ============================================================================
// Frontend Routes
// ============================================================================

pub async fn serve_index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn serve_js() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(MAP_JS)
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn get_feed(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let feed_id = path.into_inner();

    match state.aggregator.aggregate_one(&feed_id).await {
        Ok(snapshot) => {
            tracing::info!(feed = %feed_id, events = snapshot.count, "Served feed");
            HttpResponse::Ok().json(snapshot.data)
        }
        Err(e @ FeedError::NotFound(_)) => {
            tracing::warn!(feed = %feed_id, "Feed not found");
            HttpResponse::NotFound().json(FeedErrorBody::from_error(feed_id, &e))
        }
        Err(e) => {
            tracing::error!(feed = %feed_id, stage = e.stage(), error = %e, "Error fetching feed");
            HttpResponse::InternalServerError().json(FeedErrorBody::from_error(feed_id, &e))
        }
    }
}

async fn get_all_feeds(state: web::Data<AppState>) -> HttpResponse {
    let response = state.aggregator.aggregate_all().await;
    HttpResponse::Ok().json(response)
}

async fn list_routes(state: web::Data<AppState>) -> HttpResponse {
    let response = state.aggregator.aggregate_all().await;
    let routes = response.route_ids();
    tracing::info!(routes = routes.len(), "Served active routes");

    HttpResponse::Ok().json(RouteListing {
        data: routes,
        errors: response.errors,
        timestamp: now_rfc3339(),
    })
}

async fn get_route(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let route_id = path.into_inner().to_uppercase();
    let response = state.aggregator.aggregate_all().await;
    let events = response.events_for_route(&route_id);

    if events.is_empty() {
        tracing::warn!(route = %route_id, "Route not found");
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "Route not found",
            "routeId": route_id,
            "timestamp": now_rfc3339(),
        }));
    }

    tracing::info!(route = %route_id, events = events.len(), "Served route");
    HttpResponse::Ok().json(RouteEvents {
        route_id,
        count: events.len(),
        data: events,
        errors: response.errors,
        timestamp: now_rfc3339(),
    })
}

async fn list_feeds(state: web::Data<AppState>) -> HttpResponse {
    let feeds: Vec<FeedListing> = state
        .aggregator
        .registry()
        .entries()
        .iter()
        .map(|e| FeedListing {
            feed_id: e.feed_id.clone(),
            url: e.url.clone(),
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({
        "feeds": feeds,
        "timestamp": now_rfc3339(),
    }))
}

async fn test_connectivity(state: web::Data<AppState>) -> HttpResponse {
    match state
        .aggregator
        .probe(&state.probe_feed, state.probe_timeout)
        .await
    {
        Ok(report) => {
            tracing::info!(
                feed = %report.feed_id,
                bytes = report.buffer_size,
                entities = report.entity_count,
                "Upstream connectivity confirmed"
            );
            HttpResponse::Ok().json(report)
        }
        Err(e) => {
            tracing::warn!(
                feed = %state.probe_feed,
                error = %e,
                "Upstream connectivity test failed"
            );
            HttpResponse::InternalServerError().json(serde_json::json!({
                "status": "error",
                "error": e.to_string(),
                "timestamp": now_rfc3339(),
            }))
        }
    }
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "OK",
        "timestamp": now_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

// ============================================================================
// Route Table
// ============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(serve_index))
        .route("/subway-map.js", web::get().to(serve_js))
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api/mta")
                .route("/feed/{feed_id}", web::get().to(get_feed))
                .route("/feeds/all", web::get().to(get_all_feeds))
                .route("/feeds", web::get().to(list_feeds))
                .route("/routes", web::get().to(list_routes))
                .route("/by-route/{route_id}", web::get().to(get_route))
                .route("/test", web::get().to(test_connectivity)),
        );
}
