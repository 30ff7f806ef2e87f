//! Modules d'export (GeoJSON, PostgreSQL)

pub mod geojson;
pub mod pool;

pub use pool::{create_pool, DatabaseConfig, SslMode};
