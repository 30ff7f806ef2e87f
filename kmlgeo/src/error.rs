//! Types d'erreurs pour le crate kmlgeo

use thiserror::Error;

/// Erreurs pouvant survenir lors de l'ingestion ou de la conversion KML
#[derive(Debug, Error)]
pub enum KmlError {
    /// Erreur d'I/O lors de la lecture du fichier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Extension autre que .kml / .kmz
    #[error("Unsupported file type: {0}. Only KML and KMZ files are supported.")]
    UnsupportedFileType(String),

    /// Archive KMZ sans entrée .kml
    #[error("No KML file found in KMZ archive")]
    NoKmlEntryFound,

    /// Archive zip illisible
    #[error("Invalid KMZ archive: {0}")]
    InvalidArchive(String),

    /// Document XML/KML structurellement invalide
    #[error("Malformed KML document: {0}")]
    MalformedDocument(String),

    /// Parsing réussi mais aucune géométrie exploitable
    #[error("Invalid KML/KMZ file or no valid geometries found")]
    EmptyOrInvalidGeometry,

    /// Type de géométrie non convertible vers la cible WKT demandée
    #[error("Unsupported geometry type for {target}: {geometry_type}")]
    UnsupportedGeometryType {
        geometry_type: String,
        target: &'static str,
    },

    /// Anneau de polygone trop court
    #[error("Ring must have at least 3 coordinates, got {0}")]
    InvalidRing(usize),

    /// Multi-géométrie sans premier membre
    #[error("Empty {0} has no member to convert")]
    EmptyGeometry(String),

    /// Texte WKT illisible
    #[error("Invalid WKT: {0}")]
    InvalidWkt(String),
}

impl KmlError {
    /// Crée une erreur de type de géométrie non supporté
    pub fn unsupported_geometry(geometry_type: impl Into<String>, target: &'static str) -> Self {
        Self::UnsupportedGeometryType {
            geometry_type: geometry_type.into(),
            target,
        }
    }

    /// Crée une erreur de document malformé
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument(reason.into())
    }
}
