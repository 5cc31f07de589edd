// Backend API server with embedded frontend
// NYC Subway real-time map: MTA GTFS-RT proxy with integrated web UI

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use std::sync::Arc;
use std::time::Instant;

use subwaymap::aggregator::FeedAggregator;
use subwaymap::config::AppConfig;
use subwaymap::fetcher::HttpFeedSource;
use subwaymap::routes::{self, AppState};

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let source = HttpFeedSource::new(config.user_agent.clone())
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let registry = Arc::new(config.registry.clone());
    let aggregator = FeedAggregator::new(registry, Arc::new(source), config.feed_timeout);

    let app_state = AppState {
        aggregator: Arc::new(aggregator),
        probe_feed: config.probe_feed.clone(),
        probe_timeout: config.probe_timeout,
        started_at: Instant::now(),
    };

    let feed_ids = config.registry.ids().join(", ");

    println!("\n🚇 NYC Subway Map server");
    println!("🌐 Server running on: http://{}:{}", config.host, config.port);
    println!("📱 Web UI available at: http://localhost:{}", config.port);
    println!("📡 Feeds: {}", feed_ids);
    println!(
        "⏱️  Feed timeout: {}ms | Probe timeout: {}ms\n",
        config.feed_timeout.as_millis(),
        config.probe_timeout.as_millis()
    );

    println!("📍 Available Routes:");
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Frontend:                                                   │");
    println!("│   GET  /                           - Web UI (embedded)      │");
    println!("│   GET  /subway-map.js              - JavaScript (embedded)  │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ API:                                                        │");
    println!("│   GET  /api/mta/feed/:feedId       - One feed's events      │");
    println!("│   GET  /api/mta/feeds/all          - All feeds merged       │");
    println!("│   GET  /api/mta/feeds              - Configured feeds       │");
    println!("│   GET  /api/mta/routes             - Active routes          │");
    println!("│   GET  /api/mta/by-route/:route    - One route's events     │");
    println!("│   GET  /api/mta/test               - Upstream connectivity  │");
    println!("│   GET  /health                     - Health check           │");
    println!("└─────────────────────────────────────────────────────────────┘\n");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure)
            // Client-side routing fallback
            .default_service(web::to(routes::serve_index))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            eprintln!("\n❌ Server cannot start: {}", e);
            eprintln!("\n💡 Troubleshooting:");
            eprintln!("   1. Check PORT, FEED_TIMEOUT_MS and PROBE_TIMEOUT_MS are numbers");
            eprintln!("   2. Check FEEDS_FILE points to a `feed_id,url` CSV");
            eprintln!("   3. Check PROBE_FEED names one of the configured feeds\n");
            std::process::exit(1);
        }
    };

    tracing::info!(
        feeds = config.registry.len(),
        port = config.port,
        "Configuration loaded"
    );

    actix_web::rt::System::new().block_on(run_server(config))
}
