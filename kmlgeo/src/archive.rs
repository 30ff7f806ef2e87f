//! Extraction du document KML d'une archive KMZ (zip)

use std::io::{Cursor, Read};

use tracing::debug;
use zip::ZipArchive;

use crate::KmlError;

/// Taille maximale d'un document KML décompressé
pub const MAX_KML_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Document KML extrait d'une archive KMZ
#[derive(Debug)]
pub struct KmzEntry {
    /// Nom de l'entrée dans l'archive
    pub name: String,

    /// Contenu brut (non décodé)
    pub content: Vec<u8>,
}

/// Extrait la première entrée `.kml` de l'archive (ordre de l'archive)
///
/// # Errors
///
/// `InvalidArchive` si le zip est illisible, `NoKmlEntryFound` si aucune
/// entrée ne se termine par `.kml` (insensible à la casse), ou si
/// l'entrée dépasse [`MAX_KML_ENTRY_BYTES`] une fois décompressée.
pub fn extract_kml(bytes: &[u8]) -> Result<KmzEntry, KmlError> {
    extract_kml_limited(bytes, MAX_KML_ENTRY_BYTES)
}

/// Comme [`extract_kml`], avec une limite de taille explicite.
///
/// La taille annoncée par l'en-tête zip n'est pas utilisée : seuls les
/// octets effectivement décompressés comptent.
pub fn extract_kml_limited(bytes: &[u8], limit: u64) -> Result<KmzEntry, KmlError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| KmlError::InvalidArchive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| KmlError::InvalidArchive(e.to_string()))?;

        if entry.is_dir() || !entry.name().to_lowercase().ends_with(".kml") {
            continue;
        }

        let name = entry.name().to_string();
        let mut content = Vec::new();
        entry.by_ref().take(limit.saturating_add(1)).read_to_end(&mut content)?;

        if content.len() as u64 > limit {
            return Err(KmlError::InvalidArchive(format!(
                "{} exceeds {} bytes once decompressed",
                name, limit
            )));
        }

        debug!(entry = %name, bytes = content.len(), "KML entry extracted from KMZ");

        return Ok(KmzEntry { name, content });
    }

    Err(KmlError::NoKmlEntryFound)
}
