//! Statistiques par type de géométrie

use serde::Serialize;

use crate::types::{GeometryType, ParsedFileResult};

/// Comptages calculés une fois par parsing réussi
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatistics {
    pub total_features: usize,
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,
    pub multi_polygons: usize,
}

impl FileStatistics {
    /// Somme des quatre types suivis
    pub fn tracked(&self) -> usize {
        self.points + self.lines + self.polygons + self.multi_polygons
    }

    /// Cumule les comptages d'un autre fichier
    pub fn merge(&mut self, other: &FileStatistics) {
        self.total_features += other.total_features;
        self.points += other.points;
        self.lines += other.lines;
        self.polygons += other.polygons;
        self.multi_polygons += other.multi_polygons;
    }
}

/// Un seul passage sur les features
pub fn compute_statistics(result: &ParsedFileResult) -> FileStatistics {
    let mut stats = FileStatistics {
        total_features: result.features.len(),
        ..Default::default()
    };

    for feature in &result.features {
        match feature.geometry_type() {
            Some(GeometryType::Point) => stats.points += 1,
            Some(GeometryType::LineString) => stats.lines += 1,
            Some(GeometryType::Polygon) => stats.polygons += 1,
            Some(GeometryType::MultiPolygon) => stats.multi_polygons += 1,
            // Les autres types ne comptent que dans le total
            _ => {}
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParsedFeature, Properties};
    use geo::{line_string, point, polygon, Geometry, MultiPoint, MultiPolygon};

    fn feature(geometry: Geometry) -> ParsedFeature {
        ParsedFeature::new(Some(geometry), Properties::new())
    }

    #[test]
    fn test_statistics_counts() {
        let result = ParsedFileResult::new(vec![
            feature(Geometry::Point(point!(x: 1.0, y: 2.0))),
            feature(Geometry::Point(point!(x: 3.0, y: 4.0))),
            feature(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)])),
            feature(Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)])),
            feature(Geometry::MultiPolygon(MultiPolygon::new(vec![]))),
        ]);

        let stats = compute_statistics(&result);
        assert_eq!(
            stats,
            FileStatistics {
                total_features: 5,
                points: 2,
                lines: 1,
                polygons: 1,
                multi_polygons: 1,
            }
        );
        assert_eq!(stats.total_features, result.len());
        assert_eq!(stats.tracked(), stats.total_features);
    }

    #[test]
    fn test_untracked_types_only_in_total() {
        let result = ParsedFileResult::new(vec![
            feature(Geometry::MultiPoint(MultiPoint::new(vec![point!(x: 1.0, y: 2.0)]))),
            ParsedFeature::new(None, Properties::new()),
        ]);

        let stats = compute_statistics(&result);
        assert_eq!(stats.total_features, 2);
        assert_eq!(stats.tracked(), 0);
    }

    #[test]
    fn test_empty_result() {
        let stats = compute_statistics(&ParsedFileResult::default());
        assert_eq!(stats, FileStatistics::default());
    }
}
