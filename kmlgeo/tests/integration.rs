//! Tests d'intégration : ingestion KML / KMZ de bout en bout

use std::io::{Cursor, Write};
use std::path::Path;

use kmlgeo::{
    AssignedBlock, AssignedZone, AssignmentIndex, FileStatistics, IngestionStore, JobStatus,
    KmlError, MatchResult, SourceFile,
};
use zip::write::FileOptions;

const SITE_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>Khu đô thị</name>
    <Placemark>
      <name>Phân khu A</name>
      <Polygon><outerBoundaryIs><LinearRing><coordinates>
        105.78,21.02,0 105.79,21.02,0 105.79,21.03,0 105.78,21.02,0
      </coordinates></LinearRing></outerBoundaryIs></Polygon>
    </Placemark>
    <Placemark>
      <name>Cổng chính</name>
      <Point><coordinates>105.785,21.025,0</coordinates></Point>
    </Placemark>
  </Document>
</kml>"#;

fn build_kmz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_kml_polygon_and_point() {
    let mut store = IngestionStore::default();
    let id = store.submit(&SourceFile::new("site.kml", SITE_KML));

    let job = store.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(
        job.statistics,
        Some(FileStatistics {
            total_features: 2,
            points: 1,
            lines: 0,
            polygons: 1,
            multi_polygons: 0,
        })
    );

    let result = job.result.as_ref().unwrap();
    assert_eq!(result.features[0].name(), Some("Phân khu A"));

    let bounds = kmlgeo::compute_bounds(result).unwrap();
    assert_eq!(bounds.corners(), [[21.02, 105.78], [21.03, 105.79]]);
}

#[test]
fn test_kmz_round_trip() {
    let kmz = build_kmz(&[("files/icon.png", &b"\x89PNG"[..]), ("doc.kml", SITE_KML.as_bytes())]);

    let mut store = IngestionStore::default();
    let id = store.submit(&SourceFile::new("site.KMZ", kmz));

    let job = store.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.statistics.unwrap().total_features, 2);
}

#[test]
fn test_kmz_without_kml_entry() {
    let kmz = build_kmz(&[("readme.txt", &b"no geometry here"[..])]);

    assert!(matches!(
        kmlgeo::parse_by_extension("site.kmz", &kmz),
        Err(KmlError::NoKmlEntryFound)
    ));

    let mut store = IngestionStore::default();
    let id = store.submit(&SourceFile::new("site.kmz", kmz));
    let job = store.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_message.as_deref(), Some("No KML file found in KMZ archive"));
    assert!(job.result.is_none());
}

#[test]
fn test_visibility_toggle_scenario() {
    let mut store = IngestionStore::default();
    let a = store.submit(&SourceFile::new("a.kml", SITE_KML));
    let b = store.submit(&SourceFile::new(
        "b.kml",
        "<kml><Placemark><LineString><coordinates>1,2 3,4</coordinates></LineString></Placemark></kml>",
    ));
    let failed = store.submit(&SourceFile::new("c.kml", "<kml><Placemark>"));
    assert_eq!(store.get(failed).unwrap().status, JobStatus::Error);

    let before: Vec<usize> = store.visible_feature_collections().iter().map(|r| r.len()).collect();
    assert_eq!(before, vec![2, 1]);

    store.toggle_visibility(a).unwrap();
    let hidden: Vec<usize> = store.visible_feature_collections().iter().map(|r| r.len()).collect();
    assert_eq!(hidden, vec![1]);

    store.toggle_visibility(a).unwrap();
    let restored: Vec<usize> = store.visible_feature_collections().iter().map(|r| r.len()).collect();
    assert_eq!(restored, before);

    assert_eq!(store.get(b).unwrap().status, JobStatus::Success);
}

#[test]
fn test_match_after_ingestion() {
    let result = kmlgeo::load(&SourceFile::new("site.kml", SITE_KML)).unwrap();
    let polygon = result.features[0].geometry.clone();

    let mut index = AssignmentIndex::new(vec![AssignedZone {
        id: "zone-1".into(),
        name: None,
        geometry: None,
        blocks: vec![AssignedBlock {
            id: Some("block-7".into()),
            name: Some("Lô A".into()),
            geometry: polygon,
        }],
    }]);

    let buckets = index.categorize(&result.features, None);
    assert_eq!(buckets.block_with_id.len(), 1);
    assert_eq!(
        buckets.block_with_id[0].assignment,
        Some(MatchResult::Block {
            id: "block-7".into(),
            name: "Lô A".into(),
            has_confirmed_id: true,
        })
    );
    assert_eq!(buckets.unassigned.len(), 1);
}

#[test]
fn test_parse_real_file() {
    let fixture_path = Path::new("../fixtures/site.kmz");

    if !fixture_path.exists() {
        eprintln!("Fixture not found, skipping test");
        return;
    }

    let result = kmlgeo::load_path(fixture_path).expect("Failed to parse fixture");
    assert!(!result.is_empty());
}
