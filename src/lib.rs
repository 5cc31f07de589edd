// Real-time NYC subway feed proxy
// MTA GTFS-RT feeds are fetched, flattened into arrival/departure events and
// served as JSON to the map client.

pub mod aggregator;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalizer;
pub mod routes;
