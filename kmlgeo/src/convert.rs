//! Conversion des géométries vers le WKT attendu par l'API de persistance
//!
//! Le format est celui produit historiquement par le front :
//! `LINESTRING(x1 y1, x2 y2)` et `POLYGON((x1 y1, ...), (...))`,
//! coordonnées en [lng, lat] dans l'ordre source.

use std::fmt::Write;

use geo::{Coord, Geometry, LineString};
use geozero::wkt::Wkt;
use geozero::ToGeo;

use crate::types::GeometryType;
use crate::KmlError;

/// WKT en attente d'un véritable encodage WKB.
///
/// Le contenu est le texte WKT inchangé : ne jamais l'envoyer à un
/// consommateur qui attend du WKB binaire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWkb(String);

impl PendingWkb {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PendingWkb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convertit une géométrie en `LINESTRING(...)`
///
/// - LineString : telle quelle
/// - Polygon : anneau extérieur
/// - MultiLineString : première ligne
pub fn to_line_string_wkt(geometry: &Geometry) -> Result<String, KmlError> {
    let line = match geometry {
        Geometry::LineString(ls) => ls,
        Geometry::Polygon(p) => p.exterior(),
        Geometry::MultiLineString(mls) => mls
            .0
            .first()
            .ok_or_else(|| KmlError::EmptyGeometry("MultiLineString".into()))?,
        other => {
            return Err(KmlError::unsupported_geometry(
                GeometryType::of(other).as_str(),
                "LINESTRING",
            ))
        }
    };

    let mut out = String::with_capacity(16 + line.0.len() * 24);
    out.push_str("LINESTRING(");
    write_coords(&mut out, &line.0);
    out.push(')');
    Ok(out)
}

/// Convertit une géométrie en `POLYGON((...), ...)`
///
/// - Polygon : tous les anneaux dans l'ordre
/// - MultiPolygon : premier polygone
/// - LineString : anneau fermé unique
pub fn to_polygon_wkt(geometry: &Geometry) -> Result<String, KmlError> {
    let rings: Vec<Vec<Coord>> = match geometry {
        Geometry::Polygon(p) => polygon_rings(p),
        Geometry::MultiPolygon(mp) => {
            let first = mp
                .0
                .first()
                .ok_or_else(|| KmlError::EmptyGeometry("MultiPolygon".into()))?;
            polygon_rings(first)
        }
        Geometry::LineString(ls) => vec![close_ring(&ls.0)?],
        other => {
            return Err(KmlError::unsupported_geometry(
                GeometryType::of(other).as_str(),
                "POLYGON",
            ))
        }
    };

    let mut out = String::from("POLYGON(");
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('(');
        write_coords(&mut out, ring);
        out.push(')');
    }
    out.push(')');
    Ok(out)
}

/// Ferme un anneau en ajoutant le premier point si nécessaire.
///
/// Idempotent : un anneau déjà fermé est retourné tel quel.
pub fn close_ring(points: &[Coord]) -> Result<Vec<Coord>, KmlError> {
    if points.len() < 3 {
        return Err(KmlError::InvalidRing(points.len()));
    }

    let first = points[0];
    let last = points[points.len() - 1];

    let mut ring = points.to_vec();
    if first.x != last.x || first.y != last.y {
        ring.push(first);
    }
    Ok(ring)
}

/// Enveloppe un WKT dans le type placeholder (aucun encodage binaire)
pub fn to_wkb_placeholder(wkt: impl Into<String>) -> PendingWkb {
    PendingWkb(wkt.into())
}

/// Relit un texte WKT en géométrie
pub fn from_wkt(text: &str) -> Result<Geometry, KmlError> {
    Wkt(text)
        .to_geo()
        .map_err(|e| KmlError::InvalidWkt(e.to_string()))
}

fn polygon_rings(polygon: &geo::Polygon) -> Vec<Vec<Coord>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring: &LineString| ring.0.clone())
        .collect()
}

fn write_coords(out: &mut String, coords: &[Coord]) {
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        // Écriture dans une String : ne peut pas échouer
        let _ = write!(out, "{} {}", number(c.x), number(c.y));
    }
}

/// -0 s'écrit "0", comme côté navigateur
fn number(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, line_string, point, polygon, MultiLineString, MultiPolygon};

    #[test]
    fn test_line_string_wkt() {
        let ls = line_string![(x: 105.8, y: 21.0), (x: 105.9, y: 21.1)];
        let wkt = to_line_string_wkt(&Geometry::LineString(ls)).unwrap();
        assert_eq!(wkt, "LINESTRING(105.8 21, 105.9 21.1)");
    }

    #[test]
    fn test_polygon_to_line_string_uses_exterior() {
        let poly = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)],
            interiors: [[(x: 0.2, y: 0.2), (x: 0.4, y: 0.2), (x: 0.4, y: 0.4), (x: 0.2, y: 0.2)]]
        );
        let wkt = to_line_string_wkt(&Geometry::Polygon(poly)).unwrap();
        assert_eq!(wkt, "LINESTRING(0 0, 1 0, 1 1, 0 0)");
    }

    #[test]
    fn test_multi_line_string_takes_first() {
        let mls = MultiLineString::new(vec![
            line_string![(x: 1.0, y: 2.0), (x: 3.0, y: 4.0)],
            line_string![(x: 5.0, y: 6.0), (x: 7.0, y: 8.0)],
        ]);
        let wkt = to_line_string_wkt(&Geometry::MultiLineString(mls)).unwrap();
        assert_eq!(wkt, "LINESTRING(1 2, 3 4)");
    }

    #[test]
    fn test_point_is_unsupported() {
        let err = to_line_string_wkt(&Geometry::Point(point!(x: 1.0, y: 2.0))).unwrap_err();
        match err {
            KmlError::UnsupportedGeometryType { geometry_type, .. } => {
                assert_eq!(geometry_type, "Point")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(to_polygon_wkt(&Geometry::Point(point!(x: 1.0, y: 2.0))).is_err());
    }

    #[test]
    fn test_polygon_wkt_all_rings() {
        let poly = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 0.0)],
            interiors: [[(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0), (x: 1.0, y: 1.0)]]
        );
        let wkt = to_polygon_wkt(&Geometry::Polygon(poly)).unwrap();
        assert_eq!(
            wkt,
            "POLYGON((0 0, 4 0, 4 4, 0 0), (1 1, 2 1, 2 2, 1 1))"
        );
    }

    #[test]
    fn test_multi_polygon_takes_first() {
        let mp = MultiPolygon::new(vec![
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
            polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0)],
        ]);
        let wkt = to_polygon_wkt(&Geometry::MultiPolygon(mp)).unwrap();
        assert_eq!(wkt, "POLYGON((0 0, 1 0, 1 1, 0 0))");
    }

    #[test]
    fn test_line_string_closed_into_polygon() {
        let ls = line_string![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0)];
        let wkt = to_polygon_wkt(&Geometry::LineString(ls)).unwrap();
        assert_eq!(wkt, "POLYGON((0 0, 2 0, 2 2, 0 0))");
    }

    #[test]
    fn test_close_ring_too_short() {
        let pts = [coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }];
        assert!(matches!(close_ring(&pts), Err(KmlError::InvalidRing(2))));
    }

    #[test]
    fn test_close_ring_idempotent() {
        let pts = [
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
        ];
        let once = close_ring(&pts).unwrap();
        let twice = close_ring(&once).unwrap();
        assert_eq!(once.len(), 4);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_polygon_round_trip() {
        let poly = polygon![
            (x: 105.81, y: 21.02),
            (x: 105.83, y: 21.02),
            (x: 105.83, y: 21.04),
            (x: 105.81, y: 21.02),
        ];
        let wkt = to_polygon_wkt(&Geometry::Polygon(poly)).unwrap();
        let back = from_wkt(&wkt).unwrap();
        assert_eq!(to_polygon_wkt(&back).unwrap(), wkt);
    }

    #[test]
    fn test_wkb_placeholder_is_identity() {
        let wkb = to_wkb_placeholder("LINESTRING(1 2, 3 4)");
        assert_eq!(wkb.as_str(), "LINESTRING(1 2, 3 4)");
    }

    #[test]
    fn test_negative_zero() {
        let ls = line_string![(x: -0.0, y: 1.5), (x: 2.0, y: -0.0)];
        let wkt = to_line_string_wkt(&Geometry::LineString(ls)).unwrap();
        assert_eq!(wkt, "LINESTRING(0 1.5, 2 0)");
    }
}
