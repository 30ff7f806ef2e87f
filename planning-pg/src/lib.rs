//! # planning-pg
//!
//! Ingestion de plans KML/KMZ et gestion des affectations zone / block d'un
//! projet de construction dans PostGIS.
//!
//! ## Features
//!
//! - Ingestion concurrente de fichiers KML/KMZ (statut, statistiques, emprise)
//! - Rapprochement des features avec les zones / blocks déjà affectés
//! - Affectation et suppression dans PostgreSQL/PostGIS avec pool de connexions
//! - Export GeoJSON stylé
//!
//! ## Usage CLI
//!
//! ```bash
//! # Inspecter un dossier de plans
//! planning-pg inspect --path ./plans/ --report report.json
//!
//! # Rapprocher avec les affectations d'un projet
//! planning-pg match --path ./site.kmz --project P001
//!
//! # Affecter la feature 3 à un nouveau block
//! planning-pg assign-block --path ./site.kmz --feature 3 --project P001 --zone Z1 --block-name "Lô A"
//! ```

pub mod config;
pub mod export;
pub mod ingest;
pub mod planning;
pub mod report;

pub use config::Config;
pub use export::pool::{create_pool, DatabaseConfig};
pub use planning::{Backend, PgPlanningAreaStore, PlanningAreaStore, SnapshotStore};
pub use report::{IngestReport, IngestStatus};
