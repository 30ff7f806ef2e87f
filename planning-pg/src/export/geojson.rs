//! Export vers GeoJSON avec geozero (streaming)
//!
//! Les propriétés KML sont recopiées dans leur ordre d'origine, suivies des
//! clés de style simplestyle (`stroke`, `fill`, ...) et de la catégorie.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use serde_json::{json, Map, Value};

use kmlgeo::{LayerKind, ParsedFeature};

use crate::config::LayerStyle;

/// Feature prête à l'export
#[derive(Debug)]
pub struct StyledFeature<'a> {
    pub id: String,
    pub feature: &'a ParsedFeature,
    pub style: &'a LayerStyle,
    pub layer: Option<LayerKind>,
}

/// Exporte des features en FeatureCollection GeoJSON
pub fn export_to_geojson(features: &[StyledFeature], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write_collection(&mut writer, features)?;
    writer.flush()?;

    Ok(())
}

/// Écrit la FeatureCollection dans un writer quelconque
pub fn write_collection<W: Write>(writer: &mut W, features: &[StyledFeature]) -> Result<()> {
    write!(writer, r#"{{"type":"FeatureCollection","features":["#)?;

    for (i, feature) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(writer, feature)?;
    }

    write!(writer, "]}}")?;
    Ok(())
}

fn write_feature<W: Write>(writer: &mut W, styled: &StyledFeature) -> Result<()> {
    write!(writer, r#"{{"type":"Feature","id":"#)?;
    serde_json::to_writer(&mut *writer, &styled.id)?;

    write!(writer, r#","geometry":"#)?;
    match &styled.feature.geometry {
        Some(geometry) => {
            let mut geom_buf = Vec::new();
            let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
            geometry.process_geom(&mut geom_writer)?;
            writer.write_all(&geom_buf)?;
        }
        None => write!(writer, "null")?,
    }

    write!(writer, r#","properties":"#)?;
    serde_json::to_writer(&mut *writer, &properties(styled))?;
    write!(writer, "}}")?;

    Ok(())
}

fn properties(styled: &StyledFeature) -> Map<String, Value> {
    let mut props = styled.feature.properties.clone();
    let style = styled.style;

    props.insert("stroke".into(), json!(style.color));
    props.insert("stroke-width".into(), json!(style.weight));
    props.insert("stroke-opacity".into(), json!(style.opacity));
    props.insert("fill".into(), json!(style.color));
    props.insert("fill-opacity".into(), json!(style.fill_opacity));
    if let Some(dash) = &style.dash_array {
        props.insert("stroke-dasharray".into(), json!(dash));
    }
    if let Some(layer) = styled.layer {
        props.insert("layer".into(), json!(layer.as_str()));
    }

    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Point};
    use kmlgeo::Properties;
    use std::io::Cursor;

    fn style() -> LayerStyle {
        LayerStyle {
            color: "#27ae60".into(),
            weight: 4.0,
            opacity: 0.9,
            fill_opacity: 0.6,
            dash_array: None,
        }
    }

    fn feature() -> ParsedFeature {
        let mut props = Properties::new();
        props.insert("name".into(), json!("Block \"A\""));
        props.insert("description".into(), json!("line\nbreak"));
        ParsedFeature::new(Some(Geometry::Point(Point::new(105.8, 21.0))), props)
    }

    #[test]
    fn test_write_collection() {
        let feature = feature();
        let style = style();
        let styled = vec![StyledFeature {
            id: "feature-0".into(),
            feature: &feature,
            style: &style,
            layer: Some(LayerKind::BlockWithId),
        }];

        let mut buffer = Cursor::new(Vec::new());
        write_collection(&mut buffer, &styled).unwrap();

        let json: Value = serde_json::from_slice(&buffer.into_inner()).unwrap();
        assert_eq!(json["type"], "FeatureCollection");

        let f = &json["features"][0];
        assert_eq!(f["id"], "feature-0");
        assert_eq!(f["geometry"]["type"], "Point");
        assert_eq!(f["properties"]["name"], "Block \"A\"");
        assert_eq!(f["properties"]["description"], "line\nbreak");
        assert_eq!(f["properties"]["stroke"], "#27ae60");
        assert_eq!(f["properties"]["layer"], "block_with_id");

        let keys: Vec<&String> = f["properties"].as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "name");
        assert_eq!(keys[1], "description");
    }

    #[test]
    fn test_feature_without_geometry() {
        let feature = ParsedFeature::new(None, Properties::new());
        let style = style();
        let styled = vec![StyledFeature {
            id: "feature-0".into(),
            feature: &feature,
            style: &style,
            layer: None,
        }];

        let mut buffer = Cursor::new(Vec::new());
        write_collection(&mut buffer, &styled).unwrap();

        let json: Value = serde_json::from_slice(&buffer.into_inner()).unwrap();
        assert!(json["features"][0]["geometry"].is_null());
        assert!(json["features"][0]["properties"].get("layer").is_none());
    }

    #[test]
    fn test_export_to_geojson() {
        let feature = feature();
        let style = style();
        let styled = vec![StyledFeature {
            id: "feature-0".into(),
            feature: &feature,
            style: &style,
            layer: None,
        }];

        let output_path = std::env::temp_dir().join("planning_pg_test_export.geojson");
        export_to_geojson(&styled, &output_path).unwrap();

        let content = std::fs::read_to_string(&output_path).unwrap();
        assert!(content.contains(r#""type":"FeatureCollection""#));
        assert!(content.contains(r#""id":"feature-0""#));

        std::fs::remove_file(output_path).ok();
    }
}
