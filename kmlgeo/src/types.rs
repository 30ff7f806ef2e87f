//! Types de données pour le crate kmlgeo

use geo::{CoordsIter, Geometry};
use serde::{Deserialize, Serialize};

/// Attributs d'une feature, dans l'ordre du document source
pub type Properties = geojson::JsonObject;

/// Tag du type de géométrie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    Line,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    Rect,
    Triangle,
}

impl GeometryType {
    pub fn of(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::Line(_) => Self::Line,
            Geometry::LineString(_) => Self::LineString,
            Geometry::Polygon(_) => Self::Polygon,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::GeometryCollection,
            Geometry::Rect(_) => Self::Rect,
            Geometry::Triangle(_) => Self::Triangle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Line => "Line",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
            Self::Rect => "Rect",
            Self::Triangle => "Triangle",
        }
    }
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Une feature extraite d'un fichier KML
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeature {
    /// Géométrie en [lng, lat] (absente pour un Placemark sans géométrie)
    pub geometry: Option<Geometry>,

    /// Attributs (name, description, ExtendedData, ...)
    pub properties: Properties,
}

impl ParsedFeature {
    pub fn new(geometry: Option<Geometry>, properties: Properties) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry.as_ref().map(GeometryType::of)
    }

    /// Vrai si la feature porte une géométrie avec au moins une coordonnée
    pub fn has_coordinates(&self) -> bool {
        self.geometry
            .as_ref()
            .map_or(false, |g| g.coords_iter().next().is_some())
    }

    /// Valeur textuelle de l'attribut `name`
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(|v| v.as_str())
    }
}

/// Résultat du parsing d'un fichier KML/KMZ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFileResult {
    /// Features dans l'ordre du document
    pub features: Vec<ParsedFeature>,
}

impl ParsedFileResult {
    pub fn new(features: Vec<ParsedFeature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Fichier soumis à l'ingestion (nom + contenu brut)
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lit un fichier depuis le disque
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = std::fs::read(path)?;
        Ok(Self { name, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Zone déjà rattachée à une géométrie côté persistance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignedZone {
    pub id: String,
    pub name: Option<String>,
    pub geometry: Option<Geometry>,
    pub blocks: Vec<AssignedBlock>,
}

impl AssignedZone {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Zone")
    }
}

/// Block (hạng mục) rattaché à une zone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignedBlock {
    /// Identifiant durable, absent tant que le block n'est pas créé
    pub id: Option<String>,
    pub name: Option<String>,
    pub geometry: Option<Geometry>,
}

impl AssignedBlock {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Block")
    }

    /// Vrai si le block possède un identifiant non vide
    pub fn has_confirmed_id(&self) -> bool {
        self.id.as_deref().map_or(false, |id| !id.trim().is_empty())
    }
}
