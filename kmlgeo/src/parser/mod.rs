//! Parsing des fichiers KML / KMZ vers un `ParsedFileResult`

pub mod coords;
pub mod kml;

use std::borrow::Cow;
use std::path::Path;

use encoding_rs::Encoding;
use memchr::memmem;
use tracing::{debug, error, warn};

use crate::archive;
use crate::types::{ParsedFileResult, SourceFile};
use crate::KmlError;

/// Parse un fichier selon son extension (insensible à la casse)
///
/// # Errors
///
/// `UnsupportedFileType` hors `.kml` / `.kmz`, `MalformedDocument` si le
/// document XML est illisible, erreurs d'archive pour un KMZ.
pub fn parse_by_extension(name: &str, bytes: &[u8]) -> Result<ParsedFileResult, KmlError> {
    let lower = name.to_lowercase();

    if lower.ends_with(".kml") {
        let text = decode_text(bytes);
        parse_kml(&text).ok_or_else(|| KmlError::malformed(format!("{} could not be parsed", name)))
    } else if lower.ends_with(".kmz") {
        parse_kmz(bytes)
    } else {
        Err(KmlError::UnsupportedFileType(name.to_string()))
    }
}

/// Parse un fichier source déjà chargé en mémoire
pub fn parse_file(file: &SourceFile) -> Result<ParsedFileResult, KmlError> {
    parse_by_extension(&file.name, &file.bytes)
}

/// Lit puis parse un fichier du disque
pub fn parse_path(path: &Path) -> Result<ParsedFileResult, KmlError> {
    let file = SourceFile::open(path)?;
    parse_file(&file)
}

/// Parse un texte KML.
///
/// Retourne `None` si le document est structurellement invalide, la cause
/// étant journalisée.
pub fn parse_kml(text: &str) -> Option<ParsedFileResult> {
    match try_parse_kml(text) {
        Ok(result) => Some(result),
        Err(e) => {
            error!(error = %e, "Error parsing KML");
            None
        }
    }
}

/// Variante stricte de [`parse_kml`]
pub fn try_parse_kml(text: &str) -> Result<ParsedFileResult, KmlError> {
    let features = kml::parse_document(text)?;
    debug!(features = features.len(), "KML parsed");
    Ok(ParsedFileResult::new(features))
}

/// Parse une archive KMZ : première entrée `.kml`, décodée puis parsée
pub fn parse_kmz(bytes: &[u8]) -> Result<ParsedFileResult, KmlError> {
    let entry = archive::extract_kml(bytes)?;
    let text = decode_text(&entry.content);
    parse_kml(&text)
        .ok_or_else(|| KmlError::malformed(format!("{} could not be parsed", entry.name)))
}

/// Vrai si le résultat contient au moins une feature avec des coordonnées
pub fn validate(result: Option<&ParsedFileResult>) -> bool {
    result.map_or(false, |r| r.features.iter().any(|f| f.has_coordinates()))
}

/// Décode le contenu d'un document KML en texte.
///
/// UTF-8 en priorité (validation SIMD), sinon l'encodage déclaré dans le
/// prologue XML, sinon UTF-8 avec remplacement. Le BOM UTF-8 est retiré.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = simdutf8::basic::from_utf8(bytes) {
        return Cow::Borrowed(text);
    }

    let encoding = declared_encoding(bytes).unwrap_or(encoding_rs::UTF_8);
    let (decoded, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(encoding = used.name(), "Invalid byte sequences replaced while decoding");
    } else {
        debug!(encoding = used.name(), "Document decoded");
    }
    decoded
}

/// Encodage de `<?xml ... encoding="..."?>`
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(256)];
    if !head.starts_with(b"<?xml") {
        return None;
    }

    let prolog = &head[..memmem::find(head, b"?>")?];
    let start = memmem::find(prolog, b"encoding")? + b"encoding".len();
    let rest = skip_spaces(skip_spaces(&prolog[start..]).strip_prefix(b"=")?);

    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &rest[1..];
    let end = memchr::memchr(quote, value)?;

    Encoding::for_label(&value[..end])
}

fn skip_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
