//! Emprise (bounding box) des features parsées

use geo::{Coord, Geometry, LineString, Polygon};
use serde::Serialize;

use crate::types::ParsedFileResult;

/// Emprise en latitude / longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl Bounds {
    fn from_coord(c: Coord) -> Self {
        Self {
            min_lat: c.y,
            min_lng: c.x,
            max_lat: c.y,
            max_lng: c.x,
        }
    }

    /// `[[minLat, minLng], [maxLat, maxLng]]`
    pub fn corners(&self) -> [[f64; 2]; 2] {
        [[self.min_lat, self.min_lng], [self.max_lat, self.max_lng]]
    }

    pub fn contains(&self, c: Coord) -> bool {
        (self.min_lat..=self.max_lat).contains(&c.y) && (self.min_lng..=self.max_lng).contains(&c.x)
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lat: self.max_lat.max(other.max_lat),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }
}

/// Accumulateur min/max
#[derive(Debug, Default)]
struct Extent(Option<Bounds>);

impl Extent {
    fn push(&mut self, c: Coord) {
        // Coordonnées non finies ignorées (NaN casserait min/max)
        if !c.x.is_finite() || !c.y.is_finite() {
            return;
        }
        self.0 = Some(match self.0 {
            None => Bounds::from_coord(c),
            Some(b) => b.union(&Bounds::from_coord(c)),
        });
    }

    fn line(&mut self, ls: &LineString) {
        for c in ls.0.iter() {
            self.push(*c);
        }
    }

    fn polygon(&mut self, p: &Polygon) {
        self.line(p.exterior());
        for ring in p.interiors() {
            self.line(ring);
        }
    }

    fn geometry(&mut self, geometry: &Geometry) {
        match geometry {
            Geometry::Point(p) => self.push(p.0),
            Geometry::Line(l) => {
                self.push(l.start);
                self.push(l.end);
            }
            Geometry::LineString(ls) => self.line(ls),
            Geometry::Polygon(p) => self.polygon(p),
            Geometry::MultiPoint(mp) => mp.0.iter().for_each(|p| self.push(p.0)),
            Geometry::MultiLineString(mls) => mls.0.iter().for_each(|ls| self.line(ls)),
            Geometry::MultiPolygon(mp) => mp.0.iter().for_each(|p| self.polygon(p)),
            Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| self.geometry(g)),
            Geometry::Rect(r) => {
                self.push(r.min());
                self.push(r.max());
            }
            Geometry::Triangle(t) => {
                self.push(t.v1());
                self.push(t.v2());
                self.push(t.v3());
            }
        }
    }
}

/// Emprise de toutes les features, `None` si aucune coordonnée
pub fn compute_bounds(result: &ParsedFileResult) -> Option<Bounds> {
    let mut extent = Extent::default();
    for geometry in result.features.iter().filter_map(|f| f.geometry.as_ref()) {
        extent.geometry(geometry);
    }
    extent.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParsedFeature, Properties};
    use geo::{line_string, point, polygon, CoordsIter, MultiPolygon};

    fn result_of(geometries: Vec<Geometry>) -> ParsedFileResult {
        ParsedFileResult::new(
            geometries
                .into_iter()
                .map(|g| ParsedFeature::new(Some(g), Properties::new()))
                .collect(),
        )
    }

    #[test]
    fn test_empty_has_no_bounds() {
        assert_eq!(compute_bounds(&ParsedFileResult::default()), None);
        let no_geom = ParsedFileResult::new(vec![ParsedFeature::new(None, Properties::new())]);
        assert_eq!(compute_bounds(&no_geom), None);
    }

    #[test]
    fn test_single_point() {
        let result = result_of(vec![Geometry::Point(point!(x: 105.8, y: 21.0))]);
        let bounds = compute_bounds(&result).unwrap();
        assert_eq!(bounds.corners(), [[21.0, 105.8], [21.0, 105.8]]);
    }

    #[test]
    fn test_bounds_are_minimal_and_attained() {
        let geometries = vec![
            Geometry::Point(point!(x: 105.80, y: 21.00)),
            Geometry::LineString(line_string![(x: 105.70, y: 21.05), (x: 105.90, y: 20.95)]),
            Geometry::Polygon(polygon![(x: 105.75, y: 21.10), (x: 105.76, y: 21.10), (x: 105.76, y: 21.11)]),
            Geometry::MultiPolygon(MultiPolygon::new(vec![polygon![
                (x: 105.60, y: 21.00),
                (x: 105.61, y: 21.00),
                (x: 105.61, y: 21.01),
            ]])),
        ];
        let result = result_of(geometries.clone());
        let bounds = compute_bounds(&result).unwrap();

        assert_eq!(bounds.corners(), [[20.95, 105.60], [21.11, 105.90]]);

        let all: Vec<Coord> = geometries.iter().flat_map(|g| g.coords_iter()).collect();
        assert!(all.iter().all(|c| bounds.contains(*c)));
        assert!(all.iter().any(|c| c.y == bounds.min_lat));
        assert!(all.iter().any(|c| c.y == bounds.max_lat));
        assert!(all.iter().any(|c| c.x == bounds.min_lng));
        assert!(all.iter().any(|c| c.x == bounds.max_lng));
    }

    #[test]
    fn test_triangle_vertices() {
        let triangle = geo::Triangle::new(
            Coord { x: 1.0, y: 2.0 },
            Coord { x: 3.0, y: 0.5 },
            Coord { x: 2.0, y: 4.0 },
        );
        let result = result_of(vec![Geometry::Triangle(triangle)]);
        let bounds = compute_bounds(&result).unwrap();
        assert_eq!(bounds.corners(), [[0.5, 1.0], [4.0, 3.0]]);
    }
}
