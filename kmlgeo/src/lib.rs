//! # kmlgeo
//!
//! Ingestion de fichiers KML / KMZ et rapprochement avec les géométries
//! déjà affectées (zones, blocks) d'un projet.
//!
//! ## Features
//!
//! - Parsing XML événementiel avec `quick-xml`, KMZ via `zip`
//! - Décodage UTF-8 optimisé avec `simdutf8`, repli `encoding_rs`
//! - Types `geo` pour l'interopérabilité avec l'écosystème Rust géospatial
//! - Conversion WKT `LINESTRING` / `POLYGON` pour la persistance
//! - Suivi des fichiers ingérés (statut, visibilité, couleur)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kmlgeo::{IngestionStore, SourceFile};
//! use std::path::Path;
//!
//! let mut store = IngestionStore::default();
//! let id = store.submit(&SourceFile::open(Path::new("site.kmz"))?);
//!
//! if let Some(stats) = store.get(id).and_then(|job| job.statistics) {
//!     println!("{} features", stats.total_features);
//! }
//! ```

pub mod archive;
pub mod bounds;
pub mod convert;
pub mod error;
pub mod matcher;
pub mod parser;
pub mod stats;
pub mod store;
pub mod types;

pub use bounds::{compute_bounds, Bounds};
pub use convert::{close_ring, from_wkt, to_line_string_wkt, to_polygon_wkt, to_wkb_placeholder, PendingWkb};
pub use error::KmlError;
pub use matcher::{AssignmentIndex, ExactWktMatcher, GeometryMatcher, LayerKind, MatchResult};
pub use parser::{parse_by_extension, parse_kml, parse_kmz, validate};
pub use stats::{compute_statistics, FileStatistics};
pub use store::{IngestionJob, IngestionStore, JobId, JobStatus, StoreError};
pub use types::{AssignedBlock, AssignedZone, GeometryType, ParsedFeature, ParsedFileResult, Properties, SourceFile};

use std::path::Path;

/// Extensions acceptées à l'upload
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["kml", "kmz"];

/// Vrai si le nom de fichier porte une extension `.kml` / `.kmz`
pub fn is_supported_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| ext.eq_ignore_ascii_case(s))
        })
}

/// Parse et valide un fichier.
///
/// # Errors
///
/// Erreurs de parsing, ou `EmptyOrInvalidGeometry` si aucune feature ne
/// porte de coordonnées.
pub fn load(file: &SourceFile) -> Result<ParsedFileResult, KmlError> {
    let result = parser::parse_file(file)?;
    if !validate(Some(&result)) {
        return Err(KmlError::EmptyOrInvalidGeometry);
    }
    Ok(result)
}

/// Comme [`load`], depuis un chemin
pub fn load_path(path: &Path) -> Result<ParsedFileResult, KmlError> {
    load(&SourceFile::open(path)?)
}
